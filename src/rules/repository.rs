//! Rule repository collaborator.

use chrono::NaiveDate;

use super::rule::Rule;
use crate::core::CalculationError;

/// Source of candidate pricing rules.
///
/// Implementations must be safe to call from several threads at once;
/// the engine only reads from them.
pub trait RuleRepository: Send + Sync {
    /// Rules for `country_code` that are active and effective on `as_of`.
    fn active_rules_for_country(
        &self,
        country_code: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<Rule>, CalculationError>;
}

/// Rule repository holding its rules in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRuleRepository {
    rules: Vec<Rule>,
}

impl InMemoryRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.insert(rule);
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Load a JSON array of rule definitions.
    ///
    /// Every entry goes through the same validation as [`RuleBuilder`](super::RuleBuilder).
    #[cfg(feature = "json")]
    pub fn from_json(json: &str) -> Result<Self, CalculationError> {
        let rules: Vec<Rule> = serde_json::from_str(json)
            .map_err(|e| CalculationError::Validation(format!("invalid rule set: {e}")))?;
        Ok(Self::from_rules(rules))
    }
}

impl RuleRepository for InMemoryRuleRepository {
    fn active_rules_for_country(
        &self,
        country_code: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<Rule>, CalculationError> {
        Ok(self
            .rules
            .iter()
            .filter(|r| r.country_code() == country_code && r.is_in_effect(as_of))
            .cloned()
            .collect())
    }
}
