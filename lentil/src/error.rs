use thiserror::Error;

/// Categories of fatal errors raised before any model fitting.
///
/// Library functions return `anyhow::Result`; these are wrapped inside,
/// so use `err.downcast_ref::<DecontError>()` to tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecontError {
    /// The count data can't be used: missing or negative values, not a
    /// proper genes x cells matrix, or empty cells
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A label vector or hyperparameter is out of its domain
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub fn invalid_input(msg: impl Into<String>) -> anyhow::Error {
    DecontError::InvalidInput(msg.into()).into()
}

pub fn invalid_parameter(msg: impl Into<String>) -> anyhow::Error {
    DecontError::InvalidParameter(msg.into()).into()
}

pub fn is_invalid_input(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<DecontError>(),
        Some(DecontError::InvalidInput(_))
    )
}

pub fn is_invalid_parameter(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<DecontError>(),
        Some(DecontError::InvalidParameter(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn category_survives_context() {
        let err: anyhow::Result<()> = Err(invalid_parameter("delta must be positive"));
        let err = err.context("batch b1").unwrap_err();
        assert!(is_invalid_parameter(&err));
        assert!(!is_invalid_input(&err));
    }
}
