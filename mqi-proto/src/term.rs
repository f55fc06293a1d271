//! Generic term tree exchanged with the engine.
//!
//! Replies arrive in the engine's JSON term encoding:
//!
//! | Prolog            | JSON                                   |
//! |-------------------|----------------------------------------|
//! | atom `bob`        | `"bob"`                                |
//! | variable `X`      | `"X"` (leading uppercase or `_`)       |
//! | number `42`       | `42`                                   |
//! | list `[a, b]`     | `["a", "b"]`                           |
//! | compound `f(a)`   | `{"functor": "f", "args": ["a"]}`      |
//!
//! [`Term`]'s `Display` renders the tree back to engine syntax so values
//! can be embedded in follow-up goals unchanged.

use std::fmt;

use serde_json::Value;

use crate::error::{DecodeError, Result};

/// A decoded term. Trees are immutable once built.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Term {
    /// An atom such as `bob` or `'hello world'`.
    Atom(String),
    /// An integer or float, kept digit for digit as the engine wrote it.
    Number(serde_json::Number),
    /// A variable such as `X` or `_G123`.
    Variable(String),
    /// A compound term `functor(args...)`.
    Compound {
        /// Name of the compound.
        functor: String,
        /// Positional arguments.
        args: Vec<Self>,
    },
    /// A proper list.
    List(Vec<Self>),
}

impl Term {
    /// Parses a JSON-encoded term.
    pub fn parse(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_json(&value)
    }

    /// Converts an already-parsed JSON value into a term.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) if is_variable_name(s) => Ok(Self::Variable(s.clone())),
            Value::String(s) => Ok(Self::Atom(s.clone())),
            Value::Bool(b) => Ok(Self::Atom(b.to_string())),
            Value::Number(n) => Ok(Self::Number(n.clone())),
            Value::Array(items) => items
                .iter()
                .map(Self::from_json)
                .collect::<Result<_>>()
                .map(Self::List),
            Value::Object(map) => match (map.get("functor"), map.get("args")) {
                (Some(Value::String(functor)), Some(Value::Array(args))) => Ok(Self::Compound {
                    functor: functor.clone(),
                    args: args.iter().map(Self::from_json).collect::<Result<_>>()?,
                }),
                _ => Err(DecodeError::UnsupportedJson(value.to_string())),
            },
            Value::Null => Err(DecodeError::UnsupportedJson("null".into())),
        }
    }

    /// Atom text or compound functor; `None` for other terms.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Atom(name) | Self::Compound { functor: name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    /// Compound arguments; empty for every other term.
    pub fn args(&self) -> &[Self] {
        match self {
            Self::Compound { args, .. } => args,
            _ => &[],
        }
    }

    /// List elements, if this is a list.
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns `true` for the atom `name` or a compound with functor `name`.
    pub fn is(&self, name: &str) -> bool {
        self.name() == Some(name)
    }

    /// Unquoted text of an atom or variable, or the rendered term otherwise.
    pub fn text(&self) -> String {
        match self {
            Self::Atom(s) | Self::Variable(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Non-negative integer value, if this is a number that fits in `u32`.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(atom) => write_atom(f, atom),
            Self::Number(n) => write!(f, "{n}"),
            Self::Variable(name) => f.write_str(name),
            Self::Compound { functor, args } => {
                write_atom(f, functor)?;
                f.write_str("(")?;
                write_seq(f, args)?;
                f.write_str(")")
            }
            Self::List(items) => {
                f.write_str("[")?;
                write_seq(f, items)?;
                f.write_str("]")
            }
        }
    }
}

/// Variables start with an uppercase letter or `_` and contain only
/// identifier characters.
fn is_variable_name(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c == '_' || c.is_uppercase())
        && s.chars().all(|c| c == '_' || c.is_alphanumeric())
}

/// Atoms need quotes unless they are a plain lowercase identifier.
fn needs_quotes(atom: &str) -> bool {
    if atom == "[]" || atom == "{}" {
        return false;
    }
    let mut chars = atom.chars();
    match chars.next() {
        Some(c) if c.is_lowercase() => !chars.all(|c| c == '_' || c.is_alphanumeric()),
        _ => true,
    }
}

/// Writes an atom, quoting and escaping it when required.
fn write_atom(f: &mut fmt::Formatter<'_>, atom: &str) -> fmt::Result {
    if !needs_quotes(atom) {
        return f.write_str(atom);
    }
    f.write_str("'")?;
    for c in atom.chars() {
        match c {
            '\'' => f.write_str("\\'")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            _ => write!(f, "{c}")?,
        }
    }
    f.write_str("'")
}

/// Writes comma-separated terms.
fn write_seq(f: &mut fmt::Formatter<'_>, terms: &[Term]) -> fmt::Result {
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{term}")?;
    }
    Ok(())
}
