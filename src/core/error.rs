use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while building or pricing a calculation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CalculationError {
    /// The request or an argument failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The country code is not known to the country repository, or the
    /// country is inactive.
    #[error("unknown country: {0}")]
    UnknownCountry(String),

    /// A single rule could not be evaluated and was skipped.
    #[error("rule '{rule_id}' failed to evaluate: {reason}")]
    RuleEvaluation { rule_id: String, reason: String },

    /// Two amounts with different currencies were combined.
    #[error("currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: String, found: String },

    /// The aggregate was used in a way its current state does not allow.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// An amount left the representable decimal range.
    #[error("amount out of range: {0}")]
    Overflow(String),

    /// A collaborator repository failed to answer.
    #[error("repository error: {0}")]
    Repository(String),
}

impl CalculationError {
    /// Whether the error must abort the whole calculation instead of being
    /// recorded as a diagnostic.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::CurrencyMismatch { .. } | Self::Repository(_)
        )
    }
}

/// Two [`Money`](super::Money) operands carry different currencies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("currency mismatch: expected {expected}, found {found}")]
pub struct CurrencyMismatch {
    pub expected: String,
    pub found: String,
}

impl From<CurrencyMismatch> for CalculationError {
    fn from(err: CurrencyMismatch) -> Self {
        Self::CurrencyMismatch {
            expected: err.expected,
            found: err.found,
        }
    }
}

/// Returned by [`Money`](super::Money) arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error(transparent)]
    CurrencyMismatch(#[from] CurrencyMismatch),

    #[error("amount out of range: {0}")]
    Overflow(String),
}

impl From<MoneyError> for CalculationError {
    fn from(err: MoneyError) -> Self {
        match err {
            MoneyError::CurrencyMismatch(mismatch) => mismatch.into(),
            MoneyError::Overflow(expr) => Self::Overflow(expr),
        }
    }
}

/// A single validation error with field path and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Path to the invalid field (e.g. "country_codes[1]").
    pub field: String,
    /// Human-readable error description.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Fold a list of validation errors into a single [`CalculationError`].
pub(crate) fn join_validation_errors(errors: &[ValidationError]) -> CalculationError {
    let msg = errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    CalculationError::Validation(msg)
}
