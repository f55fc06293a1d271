//! Errors raised while decoding engine replies.

/// Alias for `Result<T, mqi_proto::DecodeError>`.
pub type Result<T> = std::result::Result<T, DecodeError>;

/// A reply could not be turned into a term or outcome.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The payload was not valid JSON.
    #[error("invalid JSON reply: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON value has no term equivalent.
    #[error("unsupported JSON in term: {0}")]
    UnsupportedJson(String),

    /// The term parsed but does not have the shape of a reply.
    #[error("unexpected reply shape: {0}")]
    UnexpectedShape(String),
}
