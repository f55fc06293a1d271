//! Error types for mqi operations.

use std::io;

use mqi_proto::{DecodeError, ExceptionKind};

/// Alias for `Result<T, mqi::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the launcher, connections and queries.
///
/// Engine exceptions map onto the query variants ([`Error::QueryTimeout`],
/// [`Error::NoQuery`], ...); each carries the raw reply text.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The engine could not be started, did not report its connection
    /// values, rejected the password or speaks an incompatible protocol.
    #[error("launch error: {0}")]
    Launch(String),

    /// The launcher configuration is contradictory or incomplete.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A timeout was NaN or infinite; nothing was sent to the engine.
    #[error("timeout must be a finite number of seconds, got {0}")]
    InvalidTimeout(f64),

    /// Every connection attempt was refused.
    #[error("could not connect to {address} after {attempts} attempts")]
    ConnectExhausted {
        /// The address that was dialled.
        address: String,
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        source: io::Error,
    },

    /// The connection has failed and can no longer be used.
    #[error("connection is not open")]
    NotConnected,

    /// Reading or writing the socket failed.
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    /// The engine reported `connection_failed`.
    #[error("engine connection failed: {0}")]
    ConnectionFailed(String),

    /// The goal exceeded its time limit.
    #[error("query timed out: {0}")]
    QueryTimeout(String),

    /// A result or cancellation was requested with no query pending.
    #[error("no query pending: {0}")]
    NoQuery(String),

    /// The asynchronous goal was cancelled.
    #[error("query cancelled: {0}")]
    QueryCancelled(String),

    /// The asynchronous result was polled before it was ready.
    #[error("result not available: {0}")]
    ResultNotAvailable(String),

    /// Any other engine exception, such as a syntax error in the goal.
    #[error("engine exception: {payload}")]
    Engine {
        /// The raw reply text, verbatim.
        payload: String,
    },

    /// A reply could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Local I/O outside the socket (config files, process pipes).
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Maps a classified engine exception onto its error variant.
    pub(crate) fn from_exception(kind: ExceptionKind, payload: String) -> Self {
        match kind {
            ExceptionKind::ConnectionFailed => Self::ConnectionFailed(payload),
            ExceptionKind::TimeLimitExceeded => Self::QueryTimeout(payload),
            ExceptionKind::NoQuery => Self::NoQuery(payload),
            ExceptionKind::CancelGoal => Self::QueryCancelled(payload),
            ExceptionKind::ResultNotAvailable => Self::ResultNotAvailable(payload),
            _ => Self::Engine { payload },
        }
    }

    /// Returns `true` for socket-level failures.
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ConnectExhausted { .. } | Self::NotConnected | Self::Transport(_)
        )
    }

    /// Returns `true` if the engine process should be treated as gone.
    pub const fn is_engine_gone(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_)) || self.is_transport()
    }
}
