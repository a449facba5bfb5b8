use thiserror::Error;

use crate::core::CalculationError;

use super::expr::ExprError;

/// Errors raised while constructing or mutating a rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RuleError {
    /// A required field is empty.
    #[error("rule {0} must not be empty")]
    MissingField(&'static str),

    #[error("invalid country code '{0}'")]
    InvalidCountry(String),

    #[error("priority must be at least 1, got {0}")]
    InvalidPriority(i32),

    #[error("effective_to {to} is before effective_from {from}")]
    InvalidDateRange { from: String, to: String },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("duplicate parameter '{0}'")]
    DuplicateParameter(String),

    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    #[error("unknown condition operator '{0}'")]
    UnknownOperator(String),

    #[error("unknown rule type '{0}'")]
    UnknownRuleType(String),
}

/// A single rule failed to evaluate. The rule is skipped; pricing of its
/// country continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rule '{rule_id}' failed to evaluate: {source}")]
pub struct RuleEvaluationError {
    pub rule_id: String,
    #[source]
    pub source: ExprError,
}

impl From<RuleEvaluationError> for CalculationError {
    fn from(err: RuleEvaluationError) -> Self {
        Self::RuleEvaluation {
            rule_id: err.rule_id,
            reason: err.source.to_string(),
        }
    }
}

impl From<RuleError> for CalculationError {
    fn from(err: RuleError) -> Self {
        Self::Validation(err.to_string())
    }
}
