/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Liveness probe or native handle failure. The connection stays
    /// disconnected and must be re-established by the caller.
    #[error("{message}: {diagnostic}")]
    Connection { message: String, diagnostic: String },
    /// Engine-reported failure while executing a statement.
    #[error("query failed: {diagnostic} (sql: {sql})")]
    Query {
        /// Statement text that failed.
        sql: String,
        /// Diagnostic text reported by the engine or the transport.
        diagnostic: String,
    },
    /// Malformed caller input, rejected before any engine round-trip.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: String, reason: String },
    /// Abstract column type tag with no engine keyword.
    #[error("unsupported column type '{0}'")]
    UnsupportedType(String),
    /// Transaction state violation (nested start, commit without start).
    #[error("transaction error: {0}")]
    Transaction(String),
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Non-success HTTP status code with raw response body.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// The native handle can no longer be used.
    #[error("native handle unavailable: {0}")]
    Disconnected(String),
    /// Reply decoding or protocol-shape validation error.
    #[error("decode error: {0}")]
    Decode(String),
}

impl AdapterError {
    pub(crate) fn invalid_argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Formats an engine error as `[code] message`, or the bare message when the
/// engine did not report a code.
pub(crate) fn engine_diagnostic(code: Option<u32>, message: &str) -> String {
    match code {
        Some(code) => format!("[{code}] {message}"),
        None => message.to_owned(),
    }
}
