use thiserror::Error;

/// CLI-facing error: a message plus the process exit code.
///
/// Exit codes:
/// - `2` invalid input files, flags or configuration
/// - `3` data problems (nothing left to model)
/// - `4` model or runtime failures
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failures raised by the model fitters themselves.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("mixed model did not converge for `{series}`: {reason}")]
    NonConvergence { series: String, reason: String },

    #[error("least squares solve failed for `{0}` (design matrix too ill-conditioned)")]
    Singular(String),
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        AppError::new(4, err.to_string())
    }
}
