//! Request messages and handshake types.

use std::fmt;

use crate::codec::LengthUnit;
use crate::term::Term;

/// Request sent from client to engine.
///
/// `Display` renders the wire text, including the trailing `.`.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Request {
    /// The bare authentication token, always the first message.
    Password(String),
    /// Run a goal and return all solutions in one reply.
    Run {
        /// Goal text, embedded verbatim.
        goal: String,
        /// Engine-side time limit in seconds (`_` when absent).
        timeout: Option<f64>,
    },
    /// Start a goal whose results are fetched with [`Request::AsyncResult`].
    RunAsync {
        /// Goal text, embedded verbatim.
        goal: String,
        /// Engine-side time limit in seconds (`_` when absent).
        timeout: Option<f64>,
        /// Collect every solution into the first result batch.
        find_all: bool,
    },
    /// Fetch the next batch of an asynchronous query.
    AsyncResult {
        /// Seconds to wait for a result (`-1` waits forever).
        timeout: Option<f64>,
    },
    /// Abandon the running asynchronous goal.
    CancelAsync,
    /// Close this connection.
    Close,
    /// Halt the engine process.
    Quit,
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(token) => write!(f, "{}.", token.trim()),
            Self::Run { goal, timeout } => {
                write!(f, "run(({}), {}).", goal.trim(), Timeout(*timeout, "_"))
            }
            Self::RunAsync {
                goal,
                timeout,
                find_all,
            } => write!(
                f,
                "run_async(({}), {}, {find_all}).",
                goal.trim(),
                Timeout(*timeout, "_")
            ),
            Self::AsyncResult { timeout } => {
                write!(f, "async_result({}).", Timeout(*timeout, "-1"))
            }
            Self::CancelAsync => f.write_str("cancel_async."),
            Self::Close => f.write_str("close."),
            Self::Quit => f.write_str("quit."),
        }
    }
}

/// Optional timeout rendered with a fallback token.
///
/// Values are written with `f64`'s `Display`, so NaN and infinities come out
/// as `NaN` and `inf`, which the engine cannot parse. Callers reject them
/// before building a request.
struct Timeout(Option<f64>, &'static str);

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(secs) => write!(f, "{secs}"),
            None => f.write_str(self.1),
        }
    }
}

/// Engine protocol version negotiated during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub struct ProtocolVersion {
    /// Major version; a mismatch is never compatible.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl ProtocolVersion {
    /// Engines that predate version negotiation.
    pub const LEGACY: Self = Self::new(0, 0);

    /// The version this client is written against.
    pub const REQUIRED: Self = Self::new(1, 0);

    /// Creates a version.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Returns `true` for the un-negotiated `0.0` version.
    pub const fn is_legacy(self) -> bool {
        self.major == 0 && self.minor == 0
    }

    /// Whether a server speaking `self` can serve a client requiring `required`.
    ///
    /// Legacy servers are always accepted. Otherwise the major versions must
    /// match and the server's minor version must be at least the required one.
    pub const fn satisfies(self, required: Self) -> bool {
        self.is_legacy() || (self.major == required.major && self.minor >= required.minor)
    }

    /// How frame lengths are counted under this version.
    pub const fn length_unit(self) -> LengthUnit {
        if self.major == 0 {
            LengthUnit::Chars
        } else {
            LengthUnit::Bytes
        }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::LEGACY
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Engine-side thread identifiers serving one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ServerThreads {
    /// Thread reading this connection's socket.
    pub communication: String,
    /// Thread running this connection's goals.
    pub goal: String,
}

/// Accepted handshake reply.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Handshake {
    /// Server thread ids, when reported.
    pub threads: Option<ServerThreads>,
    /// Server protocol version ([`ProtocolVersion::LEGACY`] when absent).
    pub version: ProtocolVersion,
}

impl Handshake {
    /// Interprets the reply to the password message.
    ///
    /// Returns `None` unless the root is `true`. The reply normally reads
    /// `true([[threads(Comm, Goal), version(Major, Minor)]])`; missing or
    /// malformed parts fall back to no threads and the legacy version.
    pub fn from_reply(reply: &Term) -> Option<Self> {
        if !reply.is("true") {
            return None;
        }
        let first = reply
            .args()
            .first()
            .and_then(Term::as_list)
            .and_then(<[Term]>::first)
            .and_then(Term::as_list)
            .unwrap_or_default();

        let threads = first.first().and_then(|t| match t.args() {
            [communication, goal] if t.is("threads") => Some(ServerThreads {
                communication: communication.text(),
                goal: goal.text(),
            }),
            _ => None,
        });
        let version = first
            .get(1)
            .and_then(|v| match v.args() {
                [major, minor] => Some(ProtocolVersion::new(major.as_u32()?, minor.as_u32()?)),
                _ => None,
            })
            .unwrap_or_default();

        Some(Self { threads, version })
    }
}
