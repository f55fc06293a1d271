//! Chainable construction of a [`Launcher`].

use std::path::PathBuf;

use super::Launcher;
use crate::config::LauncherConfig;
use crate::error::Result;

/// Builder for [`Launcher`]; obtained with [`Launcher::builder`].
#[derive(Debug, Clone, Default)]
pub struct LauncherBuilder {
    /// Configuration accumulated so far.
    config: LauncherConfig,
}

impl LauncherBuilder {
    /// Starts from an existing configuration.
    pub const fn from_config(config: LauncherConfig) -> Self {
        Self { config }
    }

    /// Attaches to an already running engine instead of launching one.
    pub const fn attach(mut self) -> Self {
        self.config.launch = false;
        self
    }

    /// Sets the full path to the engine executable.
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.executable = Some(path.into());
        self
    }

    /// Sets the directory containing the engine executable.
    pub fn engine_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.engine_dir = Some(dir.into());
        self
    }

    /// Adds a raw engine argument, placed before the server-mode flags.
    pub fn engine_arg(mut self, arg: impl Into<String>) -> Self {
        self.config.engine_args.push(arg.into());
        self
    }

    /// Uses TCP on `port`.
    pub const fn port(mut self, port: u16) -> Self {
        self.config.port = Some(port);
        self
    }

    /// Uses a Unix domain socket; an empty path lets the engine pick one.
    pub fn unix_domain_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.unix_domain_socket = Some(path.into());
        self
    }

    /// Sets the authentication token.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Sets the engine's default goal time limit in seconds.
    pub const fn query_timeout(mut self, secs: f64) -> Self {
        self.config.query_timeout_secs = Some(secs);
        self
    }

    /// Sets the pending connection backlog.
    pub const fn pending_connections(mut self, n: u32) -> Self {
        self.config.pending_connections = Some(n);
        self
    }

    /// Redirects all engine output to `path`.
    pub fn output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_file = Some(path.into());
        self
    }

    /// Kills the engine when the launching thread exits (Linux only).
    pub const fn kill_on_exit(mut self, enabled: bool) -> Self {
        self.config.kill_on_exit = enabled;
        self
    }

    /// Sets the number of connection attempts (default: 3).
    pub const fn connect_attempts(mut self, attempts: u32) -> Self {
        self.config.connect_attempts = attempts;
        self
    }

    /// Sets the pause between connection attempts (default: 1 ms).
    pub const fn connect_retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.connect_retry_delay_ms = ms;
        self
    }

    /// Sets how long shutdown waits before killing the engine (default: 5 s).
    pub const fn shutdown_timeout_ms(mut self, ms: u64) -> Self {
        self.config.shutdown_timeout_ms = ms;
        self
    }

    /// Extracts a serializable configuration snapshot.
    pub fn to_config(&self) -> LauncherConfig {
        self.config.clone()
    }

    /// Validates the configuration and creates the launcher.
    ///
    /// Nothing is spawned until the first connection or [`Launcher::start`].
    pub fn build(self) -> Result<Launcher> {
        Launcher::new(self.config)
    }
}
