//! Scripted in-process engine for tests.
//!
//! Listens on loopback TCP (or a Unix socket), checks the password, answers
//! the handshake and then serves a fixed fact base:
//!
//! - `father(bob)` succeeds with no bindings.
//! - `father(X)` binds `X` to `bob`, then `tom`.
//! - `likes(josé, X)` binds `X` to `crème brûlée`.
//! - `sleep(..)` exceeds its time limit.
//! - `lose_connection` reports `connection_failed`.
//! - Goals with unbalanced parentheses raise a syntax error.
//! - Everything else fails.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use mqi_proto::{LengthUnit, ProtocolVersion};

use crate::config::LauncherConfig;
use crate::transport::{Address, Dialer, SocketDialer, Transport};

/// Acknowledgement for commands without bindings.
const TRUE: &str = r#"{"functor":"true","args":[[[]]]}"#;

/// Reply to a goal with unbalanced parentheses.
pub(crate) const SYNTAX_ERROR_REPLY: &str = r#"{"functor":"exception","args":[{"functor":"error","args":[{"functor":"syntax_error","args":["cannot_start_term"]},"_"]}]}"#;

/// A running fake engine.
pub(crate) struct FakeEngine {
    /// Where the engine listens.
    address: Address,
    /// Expected password.
    password: String,
    /// Every frame received, across all connections.
    requests: Arc<Mutex<Vec<String>>>,
    /// Keeps the socket directory alive.
    _dir: Option<tempfile::TempDir>,
}

impl FakeEngine {
    /// Starts a TCP engine speaking protocol version 1.0.
    pub(crate) fn start(password: &str) -> Self {
        Self::with_version(password, Some(ProtocolVersion::REQUIRED))
    }

    /// Starts a TCP engine; `None` omits the version from the handshake.
    pub(crate) fn with_version(password: &str, version: Option<ProtocolVersion>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let script = Script::new(password, version);
        let requests = Arc::clone(&script.requests);
        thread::spawn(move || {
            for stream in listener.incoming().map_while(Result::ok) {
                let _ = stream.set_nodelay(true);
                let script = script.clone();
                thread::spawn(move || script.serve(stream));
            }
        });
        Self {
            address: Address::loopback(port),
            password: password.into(),
            requests,
            _dir: None,
        }
    }

    /// Starts a version 1.0 engine on a Unix domain socket.
    #[cfg(unix)]
    pub(crate) fn start_unix(password: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mqi.sock");
        let listener = std::os::unix::net::UnixListener::bind(&path).unwrap();
        let script = Script::new(password, Some(ProtocolVersion::REQUIRED));
        let requests = Arc::clone(&script.requests);
        thread::spawn(move || {
            for stream in listener.incoming().map_while(Result::ok) {
                let script = script.clone();
                thread::spawn(move || script.serve(stream));
            }
        });
        Self {
            address: Address::Unix(path),
            password: password.into(),
            requests,
            _dir: Some(dir),
        }
    }

    /// TCP port, or 0 for a Unix socket engine.
    pub(crate) fn port(&self) -> u16 {
        match &self.address {
            Address::Tcp { port, .. } => *port,
            Address::Unix(_) => 0,
        }
    }

    /// Frames received so far, in arrival order.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Configuration attaching to this engine.
    pub(crate) fn attach_config(&self) -> LauncherConfig {
        let mut config = LauncherConfig {
            launch: false,
            password: Some(self.password.clone()),
            ..LauncherConfig::default()
        };
        match &self.address {
            Address::Tcp { port, .. } => config.port = Some(*port),
            Address::Unix(path) => config.unix_domain_socket = Some(path.clone()),
        }
        config
    }
}

/// Shared per-engine behaviour, cloned into each connection thread.
#[derive(Clone)]
struct Script {
    /// Expected password.
    password: String,
    /// Version reported in the handshake.
    version: Option<ProtocolVersion>,
    /// Received frames.
    requests: Arc<Mutex<Vec<String>>>,
}

impl Script {
    /// Script with no requests recorded yet.
    fn new(password: &str, version: Option<ProtocolVersion>) -> Self {
        Self {
            password: password.into(),
            version,
            requests: Arc::default(),
        }
    }

    /// Appends a received frame.
    fn record(&self, frame: &str) {
        self.requests.lock().unwrap().push(frame.to_owned());
    }

    /// Reply to an accepted password, with the version when one is set.
    fn handshake(&self) -> String {
        let threads = r#"{"functor":"threads","args":["mqi1_conn1_comm","mqi1_conn1_goal"]}"#;
        match self.version {
            Some(v) => format!(
                r#"{{"functor":"true","args":[[[{threads},{{"functor":"version","args":[{},{}]}}]]]}}"#,
                v.major, v.minor
            ),
            None => format!(r#"{{"functor":"true","args":[[[{threads}]]]}}"#),
        }
    }

    /// Runs one connection until the client closes it or sends `quit`.
    ///
    /// Framing is bytes until the handshake, then follows the version.
    fn serve(&self, mut stream: impl Read + Write) {
        let Ok(password) = mqi_proto::decode(&mut stream, LengthUnit::Bytes) else {
            return;
        };
        self.record(&password);
        if password != self.password {
            let _ = mqi_proto::encode(&mut stream, "false", LengthUnit::Bytes);
            return;
        }
        if mqi_proto::encode(&mut stream, &self.handshake(), LengthUnit::Bytes).is_err() {
            return;
        }
        let unit = self.version.unwrap_or_default().length_unit();
        let mut session = Session::default();
        while let Ok(request) = mqi_proto::decode(&mut stream, unit) {
            self.record(&request);
            let (reply, done) = session.respond(&request);
            if mqi_proto::encode(&mut stream, &reply, unit).is_err() || done {
                return;
            }
        }
    }
}

/// Result of running a goal against the fact base.
enum Answer {
    /// No solutions.
    False,
    /// One JSON binding list per solution.
    Solutions(Vec<String>),
    /// Exception reason as JSON.
    Exception(&'static str),
    /// The goal does not parse.
    SyntaxError,
}

/// Looks `goal` up in the fact base.
fn solve(goal: &str) -> Answer {
    // One binding group holding `name = value`.
    let binding = |name: &str, value: &str| {
        format!(r#"[{{"functor":"=","args":["{name}","{value}"]}}]"#)
    };
    let opens = goal.matches('(').count();
    let closes = goal.matches(')').count();
    match goal {
        _ if opens != closes => Answer::SyntaxError,
        "father(bob)" => Answer::Solutions(vec!["[]".into()]),
        "father(X)" => Answer::Solutions(vec![binding("X", "bob"), binding("X", "tom")]),
        "likes(josé, X)" => Answer::Solutions(vec![binding("X", "crème brûlée")]),
        "lose_connection" => Answer::Exception(r#""connection_failed""#),
        _ if goal.starts_with("sleep(") => Answer::Exception(r#""time_limit_exceeded""#),
        _ => Answer::False,
    }
}

/// `true` reply carrying the given binding groups.
fn true_reply(groups: &[String]) -> String {
    format!(r#"{{"functor":"true","args":[[{}]]}}"#, groups.join(","))
}

/// `exception` reply wrapping `reason`.
fn exception(reason: &str) -> String {
    format!(r#"{{"functor":"exception","args":[{reason}]}}"#)
}

/// Reply text for a synchronous `run`.
fn render(answer: Answer) -> String {
    match answer {
        Answer::False => "false".into(),
        Answer::Solutions(groups) => true_reply(&groups),
        Answer::Exception(reason) => exception(reason),
        Answer::SyntaxError => SYNTAX_ERROR_REPLY.into(),
    }
}

/// Per-connection asynchronous query state.
#[derive(Default)]
struct Session {
    /// Result batches of the running asynchronous query.
    pending: Option<VecDeque<String>>,
    /// The asynchronous query was cancelled and not yet reported.
    cancelled: bool,
}

impl Session {
    /// Returns the reply and whether the connection should close after it.
    fn respond(&mut self, request: &str) -> (String, bool) {
        if request == "quit" || request == "close" {
            return (TRUE.into(), true);
        }
        if request == "cancel_async" {
            let reply = if self.pending.take().is_some() {
                self.cancelled = true;
                TRUE.into()
            } else {
                exception(r#""no_query""#)
            };
            return (reply, false);
        }
        if request.starts_with("async_result(") {
            return (self.next_batch(), false);
        }
        if let Some(rest) = request.strip_prefix("run_async((") {
            let Some((goal, tail)) = rest.rsplit_once("), ") else {
                return (exception(r#""bad_request""#), false);
            };
            let find_all = tail.ends_with("true)");
            let batches = match solve(goal) {
                Answer::False => VecDeque::from([String::from("false")]),
                Answer::Solutions(groups) if find_all => VecDeque::from([true_reply(&groups)]),
                Answer::Solutions(groups) => groups
                    .into_iter()
                    .map(|g| true_reply(&[g]))
                    .collect(),
                Answer::Exception(reason) => VecDeque::from([exception(reason)]),
                Answer::SyntaxError => VecDeque::from([SYNTAX_ERROR_REPLY.to_owned()]),
            };
            self.pending = Some(batches);
            self.cancelled = false;
            return (TRUE.into(), false);
        }
        if let Some(rest) = request.strip_prefix("run((") {
            let reply = match rest.rsplit_once("), ") {
                Some((goal, _)) => render(solve(goal)),
                None => exception(r#""bad_request""#),
            };
            return (reply, false);
        }
        (exception(r#""unknown_command""#), false)
    }

    /// Reply to `async_result`: the next batch, or why there is none.
    fn next_batch(&mut self) -> String {
        if self.cancelled {
            self.cancelled = false;
            return exception(r#""cancel_goal""#);
        }
        match &mut self.pending {
            None => exception(r#""no_query""#),
            Some(batches) => match batches.pop_front() {
                Some(batch) => batch,
                None => {
                    self.pending = None;
                    exception(r#""no_more_results""#)
                }
            },
        }
    }
}

/// Refuses a fixed number of dials, then dials for real.
#[derive(Debug)]
pub(crate) struct FlakyDialer {
    /// Refusals still to hand out.
    failures: AtomicU32,
    /// Total calls to `dial`, shared with the test.
    pub(crate) calls: Arc<AtomicU32>,
}

impl FlakyDialer {
    /// Dialer that refuses the first `failures` dials.
    pub(crate) fn new(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            calls: Arc::default(),
        }
    }
}

impl Dialer for FlakyDialer {
    /// Counts the call, then refuses or dials the real socket.
    fn dial(&self, address: &Address) -> io::Result<Box<dyn Transport>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(io::ErrorKind::ConnectionRefused.into());
        }
        SocketDialer.dial(address)
    }
}
