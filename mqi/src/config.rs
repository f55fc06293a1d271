//! Launcher configuration and JSON persistence.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Executable name looked up on `PATH` (or inside `engine_dir`).
pub const DEFAULT_ENGINE: &str = "swipl";

/// How to reach (and optionally start) the engine.
///
/// Every field has a default, so a JSON file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct LauncherConfig {
    /// Start the engine as a child process (`false` attaches to a running one).
    pub launch: bool,
    /// Full path to the engine executable; overrides `engine_dir`.
    pub executable: Option<PathBuf>,
    /// Directory containing the default engine executable.
    pub engine_dir: Option<PathBuf>,
    /// Raw arguments placed before the server-mode flags.
    pub engine_args: Vec<String>,
    /// TCP port to listen on (launch) or connect to (attach).
    pub port: Option<u16>,
    /// Unix domain socket path; an empty path lets the engine choose one.
    pub unix_domain_socket: Option<PathBuf>,
    /// Authentication token; the engine generates one when absent.
    pub password: Option<String>,
    /// Default engine-side goal time limit in seconds.
    pub query_timeout_secs: Option<f64>,
    /// Backlog of pending connections.
    pub pending_connections: Option<u32>,
    /// File receiving all engine output.
    pub output_file: Option<PathBuf>,
    /// Kill the engine when the thread that launched it exits (Linux).
    pub kill_on_exit: bool,
    /// Connection attempts before giving up.
    pub connect_attempts: u32,
    /// Pause between connection attempts, in milliseconds.
    pub connect_retry_delay_ms: u64,
    /// How long [`Launcher::shutdown`](crate::Launcher::shutdown) waits for
    /// the engine to exit before killing it, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            launch: true,
            executable: None,
            engine_dir: None,
            engine_args: Vec::new(),
            port: None,
            unix_domain_socket: None,
            password: None,
            query_timeout_secs: None,
            pending_connections: None,
            output_file: None,
            kill_on_exit: false,
            connect_attempts: 3,
            connect_retry_delay_ms: 1,
            shutdown_timeout_ms: 5000,
        }
    }
}

impl LauncherConfig {
    /// Loads a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Writes the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(|e| Error::Io(e.into()))
    }

    /// Checks the combination rules that must hold before any spawn.
    pub fn validate(&self) -> Result<()> {
        if let Some(socket) = &self.unix_domain_socket {
            if cfg!(not(unix)) {
                return Err(Error::InvalidConfig(
                    "Unix domain sockets are not supported on this platform".into(),
                ));
            }
            if self.port.is_some() {
                return Err(Error::InvalidConfig(
                    "must only provide one of: port or unix_domain_socket".into(),
                ));
            }
            if !self.launch && socket.as_os_str().is_empty() {
                return Err(Error::InvalidConfig(
                    "attaching requires an explicit unix_domain_socket path".into(),
                ));
            }
        }
        if !self.launch {
            if self.output_file.is_some() {
                return Err(Error::InvalidConfig(
                    "output_file only works when launching the engine".into(),
                ));
            }
            if self.port.is_none() && self.unix_domain_socket.is_none() {
                return Err(Error::InvalidConfig(
                    "attaching requires a port or unix_domain_socket".into(),
                ));
            }
            if self.password.is_none() {
                return Err(Error::InvalidConfig(
                    "attaching requires the engine password".into(),
                ));
            }
        }
        if self.query_timeout_secs.is_some_and(|secs| !secs.is_finite()) {
            return Err(Error::InvalidConfig(
                "query_timeout_secs must be a finite number".into(),
            ));
        }
        if self.connect_attempts == 0 {
            return Err(Error::InvalidConfig(
                "connect_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Engine executable to spawn.
    pub fn program(&self) -> PathBuf {
        match (&self.executable, &self.engine_dir) {
            (Some(exe), _) => exe.clone(),
            (None, Some(dir)) => dir.join(DEFAULT_ENGINE),
            (None, None) => PathBuf::from(DEFAULT_ENGINE),
        }
    }

    /// Full argument list passed to [`program`](Self::program).
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.engine_args.clone();
        args.extend(
            [
                "--quiet",
                "-g",
                "mqi_start",
                "-t",
                "halt",
                "--",
                "--write_connection_values=true",
            ]
            .map(String::from),
        );
        if let Some(n) = self.pending_connections {
            args.push(format!("--pending_connections={n}"));
        }
        if let Some(secs) = self.query_timeout_secs {
            args.push(format!("--query_timeout={secs}"));
        }
        if let Some(password) = &self.password {
            args.push(format!("--password={password}"));
        }
        if let Some(file) = &self.output_file {
            args.push(format!("--write_output_to_file={}", file.display()));
        }
        if let Some(port) = self.port {
            args.push(format!("--port={port}"));
        }
        match &self.unix_domain_socket {
            Some(path) if path.as_os_str().is_empty() => {
                args.push("--unix_domain_socket".into());
            }
            Some(path) => args.push(format!("--unix_domain_socket={}", path.display())),
            None => {}
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attach(port: u16) -> LauncherConfig {
        LauncherConfig {
            launch: false,
            port: Some(port),
            password: Some("pw".into()),
            ..LauncherConfig::default()
        }
    }

    #[test]
    fn default_is_valid() {
        LauncherConfig::default().validate().unwrap();
        attach(4242).validate().unwrap();
    }

    #[test]
    fn socket_and_port_are_exclusive() {
        let cfg = LauncherConfig {
            port: Some(4242),
            unix_domain_socket: Some(PathBuf::new()),
            ..LauncherConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn query_timeout_must_be_finite() {
        for secs in [f64::NAN, f64::INFINITY] {
            let cfg = LauncherConfig {
                query_timeout_secs: Some(secs),
                ..LauncherConfig::default()
            };
            assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
        }
    }

    #[test]
    fn output_file_requires_launch() {
        let cfg = LauncherConfig {
            output_file: Some("out.log".into()),
            ..attach(4242)
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn attach_requires_address_and_password() {
        let no_addr = LauncherConfig {
            port: None,
            ..attach(0)
        };
        assert!(no_addr.validate().is_err());
        let no_password = LauncherConfig {
            password: None,
            ..attach(4242)
        };
        assert!(no_password.validate().is_err());
    }

    #[test]
    fn zero_attempts_rejected() {
        let cfg = LauncherConfig {
            connect_attempts: 0,
            ..LauncherConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn program_resolution() {
        assert_eq!(LauncherConfig::default().program(), PathBuf::from("swipl"));
        let in_dir = LauncherConfig {
            engine_dir: Some("/opt/swipl/bin".into()),
            ..LauncherConfig::default()
        };
        assert_eq!(in_dir.program(), PathBuf::from("/opt/swipl/bin/swipl"));
        let explicit = LauncherConfig {
            executable: Some("/usr/local/bin/swipl-9".into()),
            ..in_dir
        };
        assert_eq!(explicit.program(), PathBuf::from("/usr/local/bin/swipl-9"));
    }

    #[test]
    fn minimal_command_args() {
        assert_eq!(
            LauncherConfig::default().command_args(),
            [
                "--quiet",
                "-g",
                "mqi_start",
                "-t",
                "halt",
                "--",
                "--write_connection_values=true"
            ]
        );
    }

    #[test]
    fn full_command_args() {
        let cfg = LauncherConfig {
            engine_args: vec!["--stack-limit=1g".into()],
            pending_connections: Some(8),
            query_timeout_secs: Some(2.5),
            password: Some("s3cret".into()),
            output_file: Some("/tmp/engine.log".into()),
            unix_domain_socket: Some(PathBuf::new()),
            ..LauncherConfig::default()
        };
        let args = cfg.command_args();
        assert_eq!(args[0], "--stack-limit=1g");
        assert_eq!(args[1], "--quiet");
        assert_eq!(
            args[8..],
            [
                "--pending_connections=8",
                "--query_timeout=2.5",
                "--password=s3cret",
                "--write_output_to_file=/tmp/engine.log",
                "--unix_domain_socket",
            ]
        );

        let with_path = LauncherConfig {
            unix_domain_socket: Some("/tmp/mqi.sock".into()),
            ..LauncherConfig::default()
        };
        assert_eq!(
            with_path.command_args().last().map(String::as_str),
            Some("--unix_domain_socket=/tmp/mqi.sock")
        );
        let with_port = LauncherConfig {
            port: Some(4242),
            ..LauncherConfig::default()
        };
        assert_eq!(
            with_port.command_args().last().map(String::as_str),
            Some("--port=4242")
        );
    }

    #[test]
    fn load_and_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mqi.json");
        let cfg = LauncherConfig {
            port: Some(4242),
            query_timeout_secs: Some(10.0),
            ..LauncherConfig::default()
        };
        cfg.save(&path).unwrap();
        assert_eq!(LauncherConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn load_fills_missing_keys_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{"launch": false, "port": 4242, "password": "pw"}"#).unwrap();
        let cfg = LauncherConfig::load(&path).unwrap();
        assert_eq!(cfg, attach(4242));
        assert_eq!(cfg.connect_attempts, 3);
    }

    #[test]
    fn load_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ launch: nope").unwrap();
        assert!(matches!(
            LauncherConfig::load(&path),
            Err(Error::InvalidConfig(_))
        ));
    }
}
