//! Declarative pricing rules and their evaluation.
//!
//! A [`Rule`] carries an expression in a small sandboxed language
//! ([`Expression`]), optional [`RuleCondition`]s and a validity window.
//! The [`RuleEvaluator`] turns a rule plus an [`EvaluationContext`] into a
//! monetary effect; rules are supplied by a [`RuleRepository`].

mod condition;
mod error;
mod evaluator;
mod expr;
mod repository;
mod rule;

pub use condition::{ConditionOperator, RuleCondition};
pub use error::{RuleError, RuleEvaluationError};
pub use evaluator::{EvaluationContext, RuleEvaluator, sort_by_priority, vars};
pub use expr::{
    BinaryOp, ExprError, Expression, MAX_DEPTH, MAX_EXPRESSION_LEN, UnaryOp, Value,
};
pub use repository::{InMemoryRuleRepository, RuleRepository};
pub use rule::{
    DEFAULT_PRIORITY, ParameterType, Rule, RuleBuilder, RuleDefinition, RuleParameter, RuleType,
};
