/// Result alias that carries the custom [`LampShowError`] type.
pub type Result<T> = std::result::Result<T, LampShowError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum LampShowError {
    /// Free-form message for failures that do not warrant their own variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Schedule or configuration JSON could not be parsed.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    /// The bus could not be opened. Fatal: the run never starts.
    #[error("failed to connect to bus on `{port}`: {source}")]
    Connect {
        port: String,
        #[source]
        source: crate::bus::BusError,
    },
    /// A schedule entry names an action the pattern library cannot resolve.
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    /// A pattern that could never drive an output, such as an empty bit list.
    #[error("invalid pattern `{action}`: {reason}")]
    InvalidPattern { action: String, reason: String },
}

impl LampShowError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for LampShowError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for LampShowError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
