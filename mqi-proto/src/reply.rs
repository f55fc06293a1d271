//! Classification of engine replies into query outcomes.
//!
//! A reply is one of:
//!
//! - `false`: the goal has no (more) solutions.
//! - `true([[Name = Value, ...], ...])`: one inner list per solution.
//! - `exception(Reason)`: an engine-side failure, or the
//!   `no_more_results` sentinel ending an asynchronous result stream.

use crate::error::{DecodeError, Result};
use crate::term::Term;

/// One variable binding of a solution.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Binding {
    /// Variable name as written in the goal.
    pub name: String,
    /// Bound value rendered in engine syntax.
    pub value: String,
}

/// One solution; empty when the goal had no variables to bind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct Solution {
    /// Bindings in the order the engine reported them.
    pub bindings: Vec<Binding>,
}

impl Solution {
    /// Value bound to `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.value.as_str())
    }

    /// Returns `true` when nothing was bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Reason carried by an `exception(Reason)` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExceptionKind {
    /// The engine lost its connection state; the process should be
    /// treated as gone.
    ConnectionFailed,
    /// The goal ran past its time limit.
    TimeLimitExceeded,
    /// A result was requested with no query pending.
    NoQuery,
    /// The asynchronous goal was cancelled.
    CancelGoal,
    /// The asynchronous result is not ready yet.
    ResultNotAvailable,
    /// Any other reason, such as a syntax or existence error.
    Other,
}

impl ExceptionKind {
    /// Classifies an exception reason term.
    pub fn of(reason: &Term) -> Self {
        match reason {
            Term::Atom(atom) => match atom.as_str() {
                "connection_failed" => Self::ConnectionFailed,
                "time_limit_exceeded" => Self::TimeLimitExceeded,
                "no_query" => Self::NoQuery,
                "cancel_goal" => Self::CancelGoal,
                "result_not_available" => Self::ResultNotAvailable,
                _ => Self::Other,
            },
            _ => Self::Other,
        }
    }
}

/// Decoded reply to a query-protocol request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QueryOutcome {
    /// The goal failed.
    False,
    /// The goal succeeded with zero or more solutions.
    True(Vec<Solution>),
    /// An asynchronous result stream is exhausted.
    NoMoreResults,
    /// The engine raised an exception.
    Exception {
        /// Classified reason.
        kind: ExceptionKind,
        /// The raw reply text, verbatim.
        payload: String,
    },
}

impl QueryOutcome {
    /// Returns `true` for [`QueryOutcome::True`].
    pub const fn is_true(&self) -> bool {
        matches!(self, Self::True(_))
    }

    /// Solutions of a successful outcome; empty otherwise.
    pub fn solutions(&self) -> &[Solution] {
        match self {
            Self::True(solutions) => solutions,
            _ => &[],
        }
    }

    /// Flat `(name, value)` view of the outcome.
    ///
    /// - `False` gives `[("false", None)]` and `NoMoreResults` gives
    ///   `[("null", None)]`.
    /// - Each empty solution contributes `("true", None)`; bound solutions
    ///   contribute their bindings in order.
    /// - When the first entry is named `true`, one more `("true", None)`
    ///   marker is appended. This distinguishes "true with one empty
    ///   solution" from a bare list of bindings, and also fires for a first
    ///   binding whose name is the atom `true`.
    /// - Exceptions have no flat view.
    pub fn bindings(&self) -> Vec<(String, Option<String>)> {
        match self {
            Self::False => vec![("false".into(), None)],
            Self::NoMoreResults => vec![("null".into(), None)],
            Self::Exception { .. } => Vec::new(),
            Self::True(solutions) => {
                let mut flat: Vec<(String, Option<String>)> = Vec::new();
                for solution in solutions {
                    if solution.is_empty() {
                        flat.push(("true".into(), None));
                    }
                    flat.extend(
                        solution
                            .bindings
                            .iter()
                            .map(|b| (b.name.clone(), Some(b.value.clone()))),
                    );
                }
                if flat.first().is_some_and(|(name, _)| name == "true") {
                    flat.push(("true".into(), None));
                }
                flat
            }
        }
    }
}

/// Parses and classifies a reply payload.
pub fn decode(message: &str) -> Result<QueryOutcome> {
    let term = Term::parse(message)?;
    classify(&term, message)
}

/// Classifies an already-parsed reply; `raw` is kept for exceptions.
pub fn classify(term: &Term, raw: &str) -> Result<QueryOutcome> {
    match term.name() {
        Some("false") => Ok(QueryOutcome::False),
        Some("true") => solutions(term).map(QueryOutcome::True),
        Some("exception") => match term.args() {
            [reason] if reason.is("no_more_results") && reason.args().is_empty() => {
                Ok(QueryOutcome::NoMoreResults)
            }
            [reason] => Ok(QueryOutcome::Exception {
                kind: ExceptionKind::of(reason),
                payload: raw.to_owned(),
            }),
            _ => Err(DecodeError::UnexpectedShape(raw.to_owned())),
        },
        _ => Err(DecodeError::UnexpectedShape(raw.to_owned())),
    }
}

/// Extracts the solution groups of a `true` reply.
fn solutions(term: &Term) -> Result<Vec<Solution>> {
    let Some(groups) = term.args().first() else {
        return Ok(Vec::new());
    };
    let groups = groups
        .as_list()
        .ok_or_else(|| DecodeError::UnexpectedShape(term.to_string()))?;
    groups
        .iter()
        .map(|group| {
            let items = group
                .as_list()
                .ok_or_else(|| DecodeError::UnexpectedShape(group.to_string()))?;
            let bindings = items
                .iter()
                .map(|item| match item.args() {
                    [name, value] => Ok(Binding {
                        name: name.text(),
                        value: value.to_string(),
                    }),
                    _ => Err(DecodeError::UnexpectedShape(item.to_string())),
                })
                .collect::<Result<_>>()?;
            Ok(Solution { bindings })
        })
        .collect()
}
