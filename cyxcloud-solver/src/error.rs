//! Error types for the solver crate
//!
//! Model construction problems are reported as [`ModelError`], engine faults
//! as [`EngineError`].

use thiserror::Error;

/// Result type alias for model construction
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while validating a model before it is handed to an engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Empty domain for variable {name}: [{lo}, {hi}]")]
    EmptyVariableDomain { name: String, lo: i64, hi: i64 },

    #[error("Unknown variable index: {index} (declared: {declared})")]
    UnknownVariable { index: usize, declared: usize },

    #[error("Enforcement literal is not boolean: {0}")]
    NonBooleanLiteral(String),

    #[error("Linear constraint #{0} has an empty domain")]
    EmptyConstraintDomain(usize),

    #[error("{0} aggregation has no arguments")]
    EmptyAggregation(&'static str),

    #[error("Engine rejected the model: {0}")]
    Rejected(String),
}

/// Errors raised by an optimization engine itself (not by the model)
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Model rejected: {0}")]
    Model(#[from] ModelError),

    #[error("Engine fault: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModelError::EmptyVariableDomain {
            name: "op_0".to_string(),
            lo: 1,
            hi: -1,
        };
        assert_eq!(err.to_string(), "Empty domain for variable op_0: [1, -1]");
    }

    #[test]
    fn test_engine_error_from_model() {
        let err: EngineError = ModelError::EmptyAggregation("max").into();
        assert!(matches!(err, EngineError::Model(_)));
        assert_eq!(err.to_string(), "Model rejected: max aggregation has no arguments");
    }

    #[test]
    fn test_rejected_display() {
        let err = ModelError::Rejected("MODEL_INVALID".to_string());
        assert_eq!(err.to_string(), "Engine rejected the model: MODEL_INVALID");
    }
}
