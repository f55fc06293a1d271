//! Client for the SWI-Prolog machine query interface (MQI).
//!
//! `mqi` launches a Prolog engine in server mode (or attaches to one that
//! is already running), opens authenticated connections to it and runs
//! goals, decoding each reply into a typed [`QueryOutcome`] or [`Error`].
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mqi::Launcher;
//!
//! let launcher = Arc::new(Launcher::builder().query_timeout(10.0).build()?);
//! let mut conn = launcher.connect()?;
//!
//! let outcome = conn.query("member(X, [a, b, c])", None)?;
//! for solution in outcome.solutions() {
//!     println!("X = {}", solution.get("X").unwrap_or("_"));
//! }
//!
//! // One solution per batch until the query is exhausted.
//! conn.query_async("between(1, 3, N)", false, None)?;
//! let all = conn.drain_async(None)?;
//! assert_eq!(all.len(), 3);
//!
//! launcher.shutdown()?;
//! # Ok::<(), mqi::Error>(())
//! ```
//!
//! Each [`Connection`] is a blocking session carrying one request at a
//! time. For parallel queries open one connection per thread from the same
//! [`Launcher`].

mod config;
mod connection;
mod error;
#[cfg(test)]
mod fake_engine;
mod launcher;
mod transport;

pub use config::{DEFAULT_ENGINE, LauncherConfig};
pub use connection::{Connection, ConnectionState};
pub use error::{Error, Result};
pub use launcher::{EngineEndpoint, Launcher, LauncherBuilder};
pub use mqi_proto::{
    Binding, ExceptionKind, ProtocolVersion, QueryOutcome, ServerThreads, Solution, Term,
};
pub use transport::{Address, Dialer, SocketDialer, Transport};
