//! One authenticated session with the engine.
//!
//! A [`Connection`] walks `Unconnected → Connecting → Authenticating →
//! VersionCheck → Ready` the first time it is used, and lands in `Failed`
//! if any step (or a later socket error) goes wrong. A failed connection is
//! never revived; create a new one from the [`Launcher`].
//!
//! Connections are blocking and carry one request at a time. Run several
//! connections on separate threads for parallel queries.

use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use mqi_proto::{
    ExceptionKind, Handshake, LengthUnit, ProtocolVersion, QueryOutcome, Request, ServerThreads,
    Solution, Term,
};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::launcher::Launcher;
use crate::transport::{self, Dialer, SocketDialer, Transport};

/// Lifecycle of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionState {
    /// No socket yet.
    Unconnected,
    /// Starting the engine and dialing it.
    Connecting,
    /// Password sent, waiting for the reply.
    Authenticating,
    /// Checking the negotiated protocol version.
    VersionCheck,
    /// Accepting queries.
    Ready,
    /// Unusable; create a new connection.
    Failed,
}

/// A blocking query session with the engine.
#[derive(Debug)]
pub struct Connection {
    /// Owner of the engine process and the shared failure flag.
    launcher: Arc<Launcher>,
    /// Opens the socket.
    dialer: Box<dyn Dialer>,
    /// Current lifecycle state.
    state: ConnectionState,
    /// Socket, buffered for reads.
    stream: Option<BufReader<Box<dyn Transport>>>,
    /// Version negotiated during the handshake.
    version: Option<ProtocolVersion>,
    /// Engine threads serving this connection.
    threads: Option<ServerThreads>,
}

impl Connection {
    /// Creates an unconnected session; the handshake runs on first use.
    pub fn new(launcher: Arc<Launcher>) -> Self {
        Self::with_dialer(launcher, SocketDialer)
    }

    /// Like [`new`](Self::new), but opening sockets through `dialer`.
    pub fn with_dialer(launcher: Arc<Launcher>, dialer: impl Dialer + 'static) -> Self {
        Self {
            launcher,
            dialer: Box::new(dialer),
            state: ConnectionState::Unconnected,
            stream: None,
            version: None,
            threads: None,
        }
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Protocol version negotiated with the engine, once ready.
    pub const fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.version
    }

    /// Engine threads serving this connection, if the engine reported them.
    pub const fn server_threads(&self) -> Option<&ServerThreads> {
        self.threads.as_ref()
    }

    /// The launcher this connection belongs to.
    pub const fn launcher(&self) -> &Arc<Launcher> {
        &self.launcher
    }

    /// Connects and authenticates, starting the engine if needed.
    ///
    /// Does nothing on a ready connection and fails with
    /// [`Error::NotConnected`] on a failed one.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Ready => return Ok(()),
            ConnectionState::Failed => return Err(Error::NotConnected),
            _ => {}
        }
        self.handshake().inspect_err(|_| self.fail())
    }

    /// Runs `goal` and returns every solution in one reply.
    ///
    /// `timeout` is an engine-side limit in seconds; `None` uses the
    /// engine's default.
    pub fn query(&mut self, goal: &str, timeout: Option<f64>) -> Result<QueryOutcome> {
        let timeout = finite(timeout)?;
        self.start()?;
        self.send(&Request::Run {
            goal: goal.trim().to_owned(),
            timeout,
        })?;
        self.receive()
    }

    /// Starts `goal` asynchronously; fetch results with
    /// [`query_async_result`](Self::query_async_result).
    ///
    /// With `find_all` every solution arrives in the first result batch,
    /// otherwise one solution per batch.
    pub fn query_async(&mut self, goal: &str, find_all: bool, timeout: Option<f64>) -> Result<()> {
        let timeout = finite(timeout)?;
        self.start()?;
        self.send(&Request::RunAsync {
            goal: goal.trim().to_owned(),
            timeout,
            find_all,
        })?;
        self.receive().map(drop)
    }

    /// Fetches the next batch of the running asynchronous query.
    ///
    /// Waits up to `wait` seconds (`None` waits forever). Returns
    /// [`QueryOutcome::NoMoreResults`] once the query is exhausted.
    pub fn query_async_result(&mut self, wait: Option<f64>) -> Result<QueryOutcome> {
        let wait = finite(wait)?;
        self.start()?;
        self.send(&Request::AsyncResult { timeout: wait })?;
        self.receive()
    }

    /// Polls [`query_async_result`](Self::query_async_result) until the
    /// query is exhausted and returns all solutions in order.
    pub fn drain_async(&mut self, wait: Option<f64>) -> Result<Vec<Solution>> {
        let mut solutions = Vec::new();
        loop {
            match self.query_async_result(wait)? {
                QueryOutcome::True(batch) => solutions.extend(batch),
                QueryOutcome::NoMoreResults => return Ok(solutions),
                _ => {}
            }
        }
    }

    /// Asks the engine to abandon the running asynchronous query.
    pub fn cancel_query_async(&mut self) -> Result<()> {
        self.start()?;
        self.send(&Request::CancelAsync)?;
        self.receive().map(drop)
    }

    /// Halts the engine process.
    ///
    /// The launcher is marked failed whether or not the engine acknowledges,
    /// so no connection tries to talk to it again.
    pub fn halt_server(&mut self) -> Result<()> {
        let result = self.start().and_then(|()| {
            self.send(&Request::Quit)?;
            self.receive().map(drop)
        });
        info!("engine halt requested");
        self.launcher.mark_connection_failed();
        self.fail();
        result
    }

    /// Closes the session with a `close.` handshake.
    ///
    /// The connection returns to `Unconnected` and may be started again.
    pub fn close(&mut self) -> Result<()> {
        if self.state != ConnectionState::Ready {
            return Ok(());
        }
        let result = self
            .send(&Request::Close)
            .and_then(|()| self.receive().map(drop));
        self.reset();
        result
    }

    /// Tears the session down if the engine has been reported gone.
    ///
    /// With the failure flag set, a best-effort `close.` is sent and the
    /// socket is dropped. Otherwise a healthy connection is left open.
    pub fn stop(&mut self) {
        if !self.launcher.connection_failed() {
            return;
        }
        if let Err(err) = self.close() {
            warn!(error = %err, "close after engine failure did not complete");
        }
        self.reset();
    }

    /// Connecting through version check; errors leave cleanup to the caller.
    fn handshake(&mut self) -> Result<()> {
        self.transition(ConnectionState::Connecting);
        let endpoint = self.launcher.start()?;
        let config = self.launcher.config();
        let stream = transport::connect_with_retry(
            self.dialer.as_ref(),
            &endpoint.address,
            config.connect_attempts,
            Duration::from_millis(config.connect_retry_delay_ms),
        )?;
        self.stream = Some(BufReader::new(stream));

        self.transition(ConnectionState::Authenticating);
        self.send(&Request::Password(endpoint.password.clone()))?;
        let raw = self.receive_raw()?;
        let handshake = Term::parse(&raw)
            .ok()
            .as_ref()
            .and_then(Handshake::from_reply)
            .ok_or_else(|| Error::Launch(format!("failed to accept password: {raw}")))?;

        self.transition(ConnectionState::VersionCheck);
        let required = ProtocolVersion::REQUIRED;
        if !handshake.version.satisfies(required) {
            return Err(Error::Launch(format!(
                "engine protocol version {} is incompatible: major version must be {} \
                 and minor version >= {}",
                handshake.version, required.major, required.minor
            )));
        }
        self.version = Some(handshake.version);
        self.threads = handshake.threads;
        self.transition(ConnectionState::Ready);
        info!(
            address = %endpoint.address,
            version = %handshake.version,
            "connection ready"
        );
        Ok(())
    }

    /// Length unit for frames; bytes until a version is negotiated.
    fn unit(&self) -> LengthUnit {
        self.version
            .map_or(LengthUnit::Bytes, ProtocolVersion::length_unit)
    }

    /// Frames and writes one request.
    fn send(&mut self, request: &Request) -> Result<()> {
        let unit = self.unit();
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        let text = request.to_string();
        if matches!(request, Request::Password(_)) {
            debug!("sending password");
        } else {
            debug!(request = %text, "send");
        }
        mqi_proto::encode(stream.get_mut(), &text, unit).map_err(|err| {
            self.fail();
            Error::Transport(err)
        })
    }

    /// Reads one reply frame as text.
    fn receive_raw(&mut self) -> Result<String> {
        let unit = self.unit();
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        match mqi_proto::decode(stream, unit) {
            Ok(raw) => {
                debug!(reply = %raw, "receive");
                Ok(raw)
            }
            Err(err) => {
                self.fail();
                Err(Error::Transport(err))
            }
        }
    }

    /// Reads and classifies one reply; engine exceptions become errors.
    fn receive(&mut self) -> Result<QueryOutcome> {
        let raw = self.receive_raw()?;
        match mqi_proto::decode_reply(&raw)? {
            QueryOutcome::Exception { kind, payload } => {
                if kind == ExceptionKind::ConnectionFailed {
                    self.launcher.mark_connection_failed();
                }
                Err(Error::from_exception(kind, payload))
            }
            outcome => Ok(outcome),
        }
    }

    /// Logs and applies a state change.
    fn transition(&mut self, next: ConnectionState) {
        debug!(from = ?self.state, to = ?next, "connection state");
        self.state = next;
    }

    /// Drops the socket and enters `Failed`.
    fn fail(&mut self) {
        self.stream = None;
        if self.state != ConnectionState::Failed {
            self.transition(ConnectionState::Failed);
        }
    }

    /// Drops the socket and returns to `Unconnected`, unless failed.
    fn reset(&mut self) {
        self.stream = None;
        self.version = None;
        self.threads = None;
        if self.state != ConnectionState::Failed {
            self.transition(ConnectionState::Unconnected);
        }
    }
}

/// Rejects NaN and infinite timeouts, which have no engine syntax.
fn finite(timeout: Option<f64>) -> Result<Option<f64>> {
    match timeout {
        Some(secs) if !secs.is_finite() => Err(Error::InvalidTimeout(secs)),
        _ => Ok(timeout),
    }
}
