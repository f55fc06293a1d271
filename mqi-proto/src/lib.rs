//! Wire protocol for the Prolog machine query interface (MQI).
//!
//! Requests are engine-syntax terms and replies are JSON-encoded terms,
//! both framed as `<length>.\n<payload>` over any reliable byte stream
//! (TCP loopback or a Unix domain socket).

mod codec;
mod error;
mod message;
mod reply;
mod term;

pub use codec::{LengthUnit, decode, encode, terminate};
pub use error::{DecodeError, Result};
pub use message::{Handshake, ProtocolVersion, Request, ServerThreads};
pub use reply::{Binding, ExceptionKind, QueryOutcome, Solution, classify, decode as decode_reply};
pub use term::Term;
