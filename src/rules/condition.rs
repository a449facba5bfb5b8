//! Applicability conditions attached to rules.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::RuleError;
use super::expr::{ExprError, Value};

/// Comparison operator of a [`RuleCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    /// The context value is a comma-separated list containing the operand.
    Contains,
    /// The operand is a comma-separated list containing the context value.
    In,
}

impl ConditionOperator {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "notEquals",
            Self::GreaterThan => "greaterThan",
            Self::GreaterThanOrEqual => "greaterThanOrEqual",
            Self::LessThan => "lessThan",
            Self::LessThanOrEqual => "lessThanOrEqual",
            Self::Contains => "contains",
            Self::In => "in",
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConditionOperator {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim() {
            "equals" | "==" => Self::Equals,
            "notEquals" | "!=" => Self::NotEquals,
            "greaterThan" | ">" => Self::GreaterThan,
            "greaterThanOrEqual" | ">=" => Self::GreaterThanOrEqual,
            "lessThan" | "<" => Self::LessThan,
            "lessThanOrEqual" | "<=" => Self::LessThanOrEqual,
            "contains" => Self::Contains,
            "in" => Self::In,
            other => return Err(RuleError::UnknownOperator(other.to_string())),
        };
        Ok(op)
    }
}

/// A predicate over one context variable. A rule applies only when every
/// one of its conditions holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCondition {
    parameter: String,
    operator: ConditionOperator,
    value: String,
}

impl RuleCondition {
    pub fn new(
        parameter: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<String>,
    ) -> Result<Self, RuleError> {
        let parameter = parameter.into();
        if !crate::core::is_identifier(&parameter) {
            return Err(RuleError::InvalidCondition(format!(
                "'{parameter}' is not a valid parameter name"
            )));
        }
        Ok(Self {
            parameter,
            operator,
            value: value.into(),
        })
    }

    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    pub fn operator(&self) -> ConditionOperator {
        self.operator
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Check the condition against the bound variables.
    ///
    /// Numbers compare numerically (the operand must parse as a decimal);
    /// text compares case-insensitively and only supports equality, `contains`
    /// and `in`.
    pub fn evaluate(&self, vars: &BTreeMap<String, Value>) -> Result<bool, ExprError> {
        let actual = vars
            .get(&self.parameter)
            .ok_or_else(|| ExprError::UnboundVariable(self.parameter.clone()))?;

        match self.operator {
            ConditionOperator::Contains => {
                let list = actual.to_string();
                return Ok(list_contains(&list, &self.value));
            }
            ConditionOperator::In => {
                return Ok(list_contains(&self.value, &actual.to_string()));
            }
            _ => {}
        }

        match actual {
            Value::Number(n) => {
                let expected = Decimal::from_str(self.value.trim()).map_err(|_| {
                    ExprError::Type(format!(
                        "condition on '{}' compares a number with '{}'",
                        self.parameter, self.value
                    ))
                })?;
                Ok(match self.operator {
                    ConditionOperator::Equals => *n == expected,
                    ConditionOperator::NotEquals => *n != expected,
                    ConditionOperator::GreaterThan => *n > expected,
                    ConditionOperator::GreaterThanOrEqual => *n >= expected,
                    ConditionOperator::LessThan => *n < expected,
                    ConditionOperator::LessThanOrEqual => *n <= expected,
                    ConditionOperator::Contains | ConditionOperator::In => false,
                })
            }
            Value::Text(_) | Value::Bool(_) => {
                let equal = actual.to_string().eq_ignore_ascii_case(self.value.trim());
                match self.operator {
                    ConditionOperator::Equals => Ok(equal),
                    ConditionOperator::NotEquals => Ok(!equal),
                    op => Err(ExprError::Type(format!(
                        "'{op}' needs a number, but '{}' is {}",
                        self.parameter,
                        actual.type_name()
                    ))),
                }
            }
        }
    }
}

fn list_contains(list: &str, item: &str) -> bool {
    let item = item.trim();
    list.split(',')
        .map(str::trim)
        .any(|entry| !entry.is_empty() && entry.eq_ignore_ascii_case(item))
}
