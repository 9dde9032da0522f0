//! Error types.
//!
//! - `ErrorModelError`: failures raised by the estimation engine. Callers decide
//!   which ones are recoverable (see `app::pipeline`).
//! - `AppError`: what the binary reports, carrying a process exit code.

/// Failures of the error-model engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ErrorModelError {
    #[error("Insufficient reflections ({actual} < {required}) to perform error modelling.")]
    InsufficientData { actual: usize, required: usize },

    #[error("Error model refinement resulted in a negative value for {parameter}.")]
    NegativeParameter { parameter: &'static str },

    #[error("Invalid error model parameters: a = {a}, b = {b} (need a > 0, b >= 0).")]
    InvalidParameters { a: f64, b: f64 },

    #[error("Column '{column}' has {len} rows, expected {expected}.")]
    ColumnLength {
        column: &'static str,
        len: usize,
        expected: usize,
    },

    #[error("Parameter vector has {actual} entries, expected {expected}.")]
    ParameterCount { actual: usize, expected: usize },

    #[error("Error model has not been configured with reflection data.")]
    NotConfigured,

    #[error("Error model has been finalised; parameters are frozen.")]
    Finalized,

    #[error("Regression for error model parameters failed: {0}")]
    Regression(String),

    #[error("Minimiser failed: {0}")]
    Minimiser(String),
}

impl From<argmin::core::Error> for ErrorModelError {
    fn from(err: argmin::core::Error) -> Self {
        // Our own errors travel through the minimiser boxed; unwrap them again.
        match err.downcast::<ErrorModelError>() {
            Ok(inner) => inner,
            Err(other) => ErrorModelError::Minimiser(other.to_string()),
        }
    }
}

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
}

impl From<ErrorModelError> for AppError {
    fn from(err: ErrorModelError) -> Self {
        let code = match err {
            ErrorModelError::ColumnLength { .. } => 2,
            ErrorModelError::InsufficientData { .. } | ErrorModelError::InvalidParameters { .. } => 3,
            _ => 4,
        };
        AppError::new(code, err.to_string())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_maps_to_data_exit_code() {
        let err: AppError = ErrorModelError::InsufficientData {
            actual: 50,
            required: 250,
        }
        .into();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("50 < 250"));
    }

    #[test]
    fn minimiser_error_round_trips_engine_errors() {
        let boxed = argmin::core::Error::new(ErrorModelError::NotConfigured);
        assert_eq!(ErrorModelError::from(boxed), ErrorModelError::NotConfigured);
    }
}
