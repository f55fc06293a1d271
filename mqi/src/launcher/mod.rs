//! Engine process launcher.
//!
//! A [`Launcher`] either spawns the engine in server mode and reads its
//! connection values from standard output, or attaches to an engine that is
//! already running. Either way it produces one [`EngineEndpoint`] that every
//! [`Connection`] created from it shares.

mod builder;
mod pre_exec;

use std::fmt;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

pub use builder::LauncherBuilder;

use crate::config::LauncherConfig;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::transport::Address;

/// Where and how to authenticate with a running engine.
#[derive(Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct EngineEndpoint {
    /// Listening address.
    pub address: Address,
    /// Authentication token sent as the first message.
    pub password: String,
}

impl fmt::Debug for EngineEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineEndpoint")
            .field("address", &self.address)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Mutable launch state, guarded by the launcher's mutex.
#[derive(Debug, Default)]
struct LaunchState {
    /// The spawned engine, if this launcher started one.
    child: Option<Child>,
    /// Connection values, once known.
    endpoint: Option<Arc<EngineEndpoint>>,
}

/// Starts or locates the engine and hands out connections to it.
///
/// Share it behind an [`Arc`]; each [`Connection`] keeps the launcher alive.
#[derive(Debug)]
pub struct Launcher {
    /// Validated configuration.
    config: LauncherConfig,
    /// Child process and endpoint.
    state: Mutex<LaunchState>,
    /// Set once any connection sees `connection_failed` or halts the engine.
    connection_failed: AtomicBool,
}

impl Launcher {
    /// Returns a new [`LauncherBuilder`] with default settings.
    pub fn builder() -> LauncherBuilder {
        LauncherBuilder::default()
    }

    /// Creates a launcher after validating `config`.
    pub fn new(config: LauncherConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: Mutex::default(),
            connection_failed: AtomicBool::new(false),
        })
    }

    /// The configuration this launcher was built with.
    pub const fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// Launches or attaches to the engine; later calls return the same endpoint.
    pub fn start(&self) -> Result<Arc<EngineEndpoint>> {
        let mut state = self.lock();
        if let Some(endpoint) = &state.endpoint {
            return Ok(Arc::clone(endpoint));
        }
        let endpoint = if self.config.launch {
            self.spawn(&mut state)?
        } else {
            self.attach()?
        };
        let endpoint = Arc::new(endpoint);
        state.endpoint = Some(Arc::clone(&endpoint));
        Ok(endpoint)
    }

    /// Opens and authenticates a new connection, starting the engine if needed.
    pub fn connect(self: &Arc<Self>) -> Result<Connection> {
        let mut connection = Connection::new(Arc::clone(self));
        connection.start()?;
        Ok(connection)
    }

    /// Returns `true` once an endpoint has been produced.
    pub fn is_started(&self) -> bool {
        self.lock().endpoint.is_some()
    }

    /// The endpoint, if the launcher has started.
    pub fn endpoint(&self) -> Option<Arc<EngineEndpoint>> {
        self.lock().endpoint.clone()
    }

    /// OS process id of the launched engine.
    pub fn process_id(&self) -> Option<u32> {
        self.lock().child.as_ref().map(Child::id)
    }

    /// Returns `true` while the launched engine process is running.
    pub fn is_alive(&self) -> bool {
        self.lock()
            .child
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }

    /// Whether the engine has been reported gone.
    pub fn connection_failed(&self) -> bool {
        self.connection_failed.load(Ordering::Acquire)
    }

    /// Records that the engine process should be treated as gone.
    pub(crate) fn mark_connection_failed(&self) {
        if !self.connection_failed.swap(true, Ordering::AcqRel) {
            warn!("engine marked as failed");
        }
    }

    /// Stops a launched engine and forgets the endpoint.
    ///
    /// Unless the engine is already marked failed, `quit.` is sent over a
    /// fresh connection. The process then gets `shutdown_timeout_ms` to
    /// exit before it is killed. An attached engine is left running.
    pub fn shutdown(self: &Arc<Self>) -> Result<()> {
        let launched = self.lock().child.is_some();
        if launched && !self.connection_failed() {
            let halted = Connection::new(Arc::clone(self)).halt_server();
            if let Err(err) = halted {
                warn!(error = %err, "graceful halt failed");
            }
        }

        let child = {
            let mut state = self.lock();
            state.endpoint = None;
            state.child.take()
        };
        self.connection_failed.store(false, Ordering::Release);
        let Some(mut child) = child else {
            return Ok(());
        };

        let deadline = Instant::now() + Duration::from_millis(self.config.shutdown_timeout_ms);
        while Instant::now() < deadline {
            if child.try_wait()?.is_some() {
                info!(pid = child.id(), "engine exited");
                return Ok(());
            }
            thread::sleep(Duration::from_millis(20));
        }
        warn!(pid = child.id(), "engine did not exit in time, killing");
        child.kill()?;
        child.wait()?;
        Ok(())
    }

    /// Locks the launch state, recovering from a poisoned mutex.
    fn lock(&self) -> MutexGuard<'_, LaunchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Builds the endpoint of an engine started elsewhere.
    fn attach(&self) -> Result<EngineEndpoint> {
        let address = match (&self.config.unix_domain_socket, self.config.port) {
            (Some(path), _) => Address::Unix(path.clone()),
            (None, Some(port)) => Address::loopback(port),
            (None, None) => {
                return Err(Error::InvalidConfig(
                    "attaching requires a port or unix_domain_socket".into(),
                ));
            }
        };
        let password = self.config.password.clone().ok_or_else(|| {
            Error::InvalidConfig("attaching requires the engine password".into())
        })?;
        info!(%address, "attached to running engine");
        Ok(EngineEndpoint { address, password })
    }

    /// Spawns the engine and reads its connection values.
    fn spawn(&self, state: &mut LaunchState) -> Result<EngineEndpoint> {
        let program = self.config.program();
        let args = self.config.command_args();
        debug!(program = %program.display(), ?args, "spawning engine");

        let mut cmd = Command::new(&program);
        cmd.args(&args).stdin(Stdio::null()).stdout(Stdio::piped());
        pre_exec::apply(&mut cmd, self.config.kill_on_exit);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                Error::Launch(format!("engine executable not found: {}", program.display()))
            }
            _ => Error::Launch(format!("failed to start {}: {e}", program.display())),
        })?;

        let values = match child.stdout.take() {
            Some(stdout) => {
                let mut reader = BufReader::new(stdout);
                read_connection_values(&mut reader, self.config.unix_domain_socket.is_some())
                    .and_then(|endpoint| {
                        forward_output(reader)?;
                        Ok(endpoint)
                    })
            }
            None => Err(Error::Launch("engine stdout was not captured".into())),
        };
        match values {
            Ok(endpoint) => {
                info!(pid = child.id(), address = %endpoint.address, "engine launched");
                state.child = Some(child);
                Ok(endpoint)
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(err)
            }
        }
    }
}

impl Drop for Launcher {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut child) = state.child.take()
            && matches!(child.try_wait(), Ok(None))
        {
            debug!(pid = child.id(), "killing engine on drop");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Reads the address line and the password line the engine prints at startup.
fn read_connection_values(reader: &mut impl BufRead, unix: bool) -> Result<EngineEndpoint> {
    let first = read_value(reader)?;
    let address = if unix {
        if first.is_empty() {
            return Err(Error::Launch("no Unix domain socket found in stdout".into()));
        }
        Address::Unix(PathBuf::from(first))
    } else {
        if first.is_empty() {
            return Err(Error::Launch("no port found in stdout".into()));
        }
        let port = first
            .parse()
            .map_err(|_| Error::Launch(format!("invalid port in stdout: {first}")))?;
        Address::loopback(port)
    };
    let password = read_value(reader)?;
    if password.is_empty() {
        return Err(Error::Launch("no password found in stdout".into()));
    }
    Ok(EngineEndpoint { address, password })
}

/// Reads one line without its surrounding whitespace.
fn read_value(reader: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line.trim().to_owned())
}

/// Drains remaining engine output into the log so the pipe never fills.
fn forward_output(reader: BufReader<ChildStdout>) -> Result<()> {
    thread::Builder::new()
        .name("mqi-engine-output".into())
        .spawn(move || {
            for line in reader.lines().map_while(io::Result::ok) {
                debug!(target: "mqi::engine", "{line}");
            }
        })?;
    Ok(())
}
