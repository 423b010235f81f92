//! Error taxonomy shared by stages, the pipeline driver and estimators.

use thiserror::Error;

/// Convenient alias for results returned by pipeline modules.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// A bound argument is not accepted by the wrapped function.
    #[error("`{function}` does not accept argument `{argument}` (accepted: {accepted})")]
    ArgumentMismatch {
        function: String,
        argument: String,
        accepted: String,
    },

    #[error("unknown transform function `{0}`")]
    UnknownFunction(String),

    #[error("pipeline has no step named `{0}`")]
    UnknownStep(String),

    /// Array shape or layout does not satisfy a stage's input contract.
    #[error("shape mismatch in {context}: expected {expected}, got {got}")]
    Shape {
        context: String,
        expected: String,
        got: String,
    },

    #[error("{estimator} is not fitted yet; call fit before predict")]
    NotFitted { estimator: String },

    #[error("invalid value for `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),
}

impl PipelineError {
    pub fn shape(
        context: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        Self::Shape {
            context: context.into(),
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn argument_mismatch(function: &str, argument: &str, accepted: &[&str]) -> Self {
        let accepted = if accepted.is_empty() {
            "none".to_string()
        } else {
            accepted.join(", ")
        };
        Self::ArgumentMismatch {
            function: function.to_string(),
            argument: argument.to_string(),
            accepted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_mismatch_lists_accepted_names() {
        let err = PipelineError::argument_mismatch("log_amplitude", "n_fft", &["reference", "amin"]);
        let message = err.to_string();
        assert!(message.contains("`log_amplitude`"));
        assert!(message.contains("`n_fft`"));
        assert!(message.contains("reference, amin"));
    }

    #[test]
    fn argument_mismatch_without_parameters_says_none() {
        let err = PipelineError::argument_mismatch("transpose", "axes", &[]);
        assert!(err.to_string().contains("accepted: none"));
    }

    #[test]
    fn shape_error_mentions_both_sides() {
        let err = PipelineError::shape("vstack", "128 columns", "64 columns");
        assert_eq!(
            err.to_string(),
            "shape mismatch in vstack: expected 128 columns, got 64 columns"
        );
    }
}
