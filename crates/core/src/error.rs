/// Result alias that carries the custom [`SpectraError`] type.
pub type Result<T> = std::result::Result<T, SpectraError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum SpectraError {
    /// A user supplied value could not be applied: malformed automation
    /// expression, unknown parameter, ill-typed project field.
    #[error("configuration error: {0}")]
    Config(String),
    /// Two indices that must agree (display list and composition order,
    /// bindings and the automation registry) have drifted apart.
    #[error("structural inconsistency: {0}")]
    StructuralInconsistency(String),
    /// A type tag that no factory knows how to build.
    #[error("unsupported {kind} variant `{tag}`")]
    UnsupportedVariant { kind: &'static str, tag: String },
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Free-form message, mostly surfaced by the command line front end.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("fft failure: {0}")]
    Fft(#[from] realfft::FftError),
}

impl SpectraError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Creates a [`SpectraError::Config`] error.
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }

    pub fn unsupported(kind: &'static str, tag: impl Into<String>) -> Self {
        Self::UnsupportedVariant {
            kind,
            tag: tag.into(),
        }
    }
}

impl From<&str> for SpectraError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for SpectraError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
