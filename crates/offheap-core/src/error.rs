use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Runtime module not found (candidates: {})", candidates.join(", "))]
    ModuleNotFound { candidates: Vec<String> },

    #[error("Failed to enumerate process modules: {0}")]
    ModuleEnumerationFailed(String),

    #[error("Routine '{name}' not found ({tried} pattern(s) tried)")]
    RoutineNotFound { name: String, tried: usize },

    #[error("No patterns registered for routine '{0}'")]
    UnknownRoutine(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Failed to resolve type {type_name}: {message}")]
    TypeResolution { type_name: String, message: String },

    #[error("Failed to allocate {size} bytes of unmanaged memory")]
    AllocationFailed { size: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn type_resolution(type_name: &str, message: impl Into<String>) -> Self {
        Error::TypeResolution {
            type_name: type_name.to_string(),
            message: message.into(),
        }
    }

    /// Check if this error must abort initialization of anything built on
    /// the runtime module.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ModuleNotFound { .. } | Error::ModuleEnumerationFailed(_)
        )
    }

    /// Check if this error reports a missing routine, module or file
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ModuleNotFound { .. } | Error::RoutineNotFound { .. } => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
