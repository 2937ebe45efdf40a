/// Errors produced while loading or validating a [`ParameterSet`](super::ParameterSet).
#[derive(thiserror::Error, Debug)]
pub enum ParamError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed configuration document: {reason}")]
    Parse { reason: String },

    #[error("no configuration named \"{name}\" in document")]
    NotFound { name: String },

    #[error("configuration \"{name}\" has no type attribute")]
    MissingKind { name: String },

    #[error("parameter \"{key}\" is missing from configuration \"{config}\"")]
    MissingParameter { config: String, key: String },

    #[error("parameter \"{key}\" on \"{config}\" must be {expected}, got \"{value}\"")]
    InvalidType {
        config: String,
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("parameter \"{key}\" on \"{config}\" must be {expected}, got {value}")]
    InvalidRange {
        config: String,
        key: String,
        value: f64,
        expected: &'static str,
    },

    #[error("unknown algorithm kind \"{0}\"")]
    UnknownKind(String),
}

impl ParamError {
    /// `NotFound` is a positive status: the document is fine, it just does
    /// not contain the requested block. Everything else aborts the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ParamError::NotFound { .. })
    }
}
