//! Rule evaluation against a calculation context.

use std::collections::BTreeMap;

use tracing::trace;

use super::error::RuleEvaluationError;
use super::expr::{ExprError, Value};
use super::rule::Rule;
use crate::core::{CurrencyCode, Money};

/// Names of the variables the engine binds for every rule.
pub mod vars {
    /// Running price seen by the rule: the service tier's base price until
    /// a rule has had an effect, the running country price afterwards.
    pub const BASE_PRICE: &str = "basePrice";
    /// The service tier's base price; never updated.
    pub const SERVICE_PRICE: &str = "servicePrice";
    /// Sum of the effects of all rules evaluated so far for the country.
    pub const RUNNING_TOTAL: &str = "runningTotal";
    pub const TRANSACTION_VOLUME: &str = "transactionVolume";
    pub const SERVICE_TYPE: &str = "serviceType";
    pub const FILING_FREQUENCY: &str = "filingFrequency";
    pub const FILINGS_PER_YEAR: &str = "filingsPerYear";
    pub const COUNTRY_CODE: &str = "countryCode";
    pub const COUNTRY_COUNT: &str = "countryCount";
    /// Comma-joined list of requested additional services.
    pub const ADDITIONAL_SERVICES: &str = "additionalServices";
    pub const ADDITIONAL_SERVICE_COUNT: &str = "additionalServiceCount";

    pub const ALL: &[&str] = &[
        BASE_PRICE,
        SERVICE_PRICE,
        RUNNING_TOTAL,
        TRANSACTION_VOLUME,
        SERVICE_TYPE,
        FILING_FREQUENCY,
        FILINGS_PER_YEAR,
        COUNTRY_CODE,
        COUNTRY_COUNT,
        ADDITIONAL_SERVICES,
        ADDITIONAL_SERVICE_COUNT,
    ];

    pub fn is_builtin(name: &str) -> bool {
        ALL.contains(&name)
    }
}

/// Variable bindings and currency a rule is evaluated in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationContext {
    currency: CurrencyCode,
    variables: BTreeMap<String, Value>,
    supplied: BTreeMap<String, String>,
}

impl EvaluationContext {
    pub fn new(currency: CurrencyCode) -> Self {
        Self {
            currency,
            variables: BTreeMap::new(),
            supplied: BTreeMap::new(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Raw values for rule-declared parameters, taken from the request.
    pub fn with_supplied_parameters(mut self, supplied: BTreeMap<String, String>) -> Self {
        self.supplied = supplied;
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }
}

/// Evaluates single rules. Stateless; safe to share across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEvaluator;

impl RuleEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `rule` in `context` and return its monetary effect.
    ///
    /// The caller has already checked the rule's validity window. A rule
    /// whose conditions do not all hold has a zero effect.
    pub fn evaluate(
        &self,
        rule: &Rule,
        context: &EvaluationContext,
    ) -> Result<Money, RuleEvaluationError> {
        let fail = |source: ExprError| RuleEvaluationError {
            rule_id: rule.rule_id().to_string(),
            source,
        };

        let scope = bind_parameters(rule, context).map_err(fail)?;

        for condition in rule.conditions() {
            if !condition.evaluate(&scope).map_err(fail)? {
                trace!(
                    rule_id = rule.rule_id(),
                    parameter = condition.parameter(),
                    "condition not met"
                );
                return Ok(Money::zero(context.currency.clone()));
            }
        }

        let expression = rule.compile().map_err(fail)?;
        let amount = expression.evaluate_number(&scope).map_err(fail)?;
        Ok(Money::of(amount, context.currency.clone()))
    }
}

/// Copy the context bindings and add the rule's own parameters.
fn bind_parameters(
    rule: &Rule,
    context: &EvaluationContext,
) -> Result<BTreeMap<String, Value>, ExprError> {
    let mut scope = context.variables.clone();
    for parameter in rule.parameters() {
        if vars::is_builtin(parameter.name()) {
            return Err(ExprError::Type(format!(
                "parameter '{}' shadows a built-in variable",
                parameter.name()
            )));
        }
        let supplied = context.supplied.get(parameter.name()).map(String::as_str);
        scope.insert(parameter.name().to_string(), parameter.bind(supplied)?);
    }
    Ok(scope)
}

/// Sort rules into evaluation order: ascending priority, then rule id.
pub fn sort_by_priority(rules: &mut [Rule]) {
    rules.sort_by(|a, b| {
        a.priority()
            .cmp(&b.priority())
            .then_with(|| a.rule_id().cmp(b.rule_id()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{
        ConditionOperator, ParameterType, RuleBuilder, RuleCondition, RuleParameter, RuleType,
    };
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn context() -> EvaluationContext {
        EvaluationContext::new(CurrencyCode::parse("GBP").unwrap())
            .with_variable(vars::BASE_PRICE, dec!(1000))
            .with_variable(vars::TRANSACTION_VOLUME, dec!(250))
            .with_variable(vars::SERVICE_TYPE, "Standard")
    }

    fn rule(expression: &str) -> RuleBuilder {
        RuleBuilder::new(
            "GB",
            RuleType::VatRate,
            "test",
            expression,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
        .id("R1")
    }

    #[test]
    fn evaluates_in_context_currency() {
        let effect = RuleEvaluator
            .evaluate(&rule("basePrice * 0.20").build().unwrap(), &context())
            .unwrap();
        assert_eq!(effect, Money::new(dec!(200), "GBP").unwrap());
    }

    #[test]
    fn failed_condition_yields_zero() {
        let r = rule("basePrice")
            .condition(
                RuleCondition::new("transactionVolume", ConditionOperator::GreaterThan, "1000")
                    .unwrap(),
            )
            .build()
            .unwrap();
        assert!(RuleEvaluator.evaluate(&r, &context()).unwrap().is_zero());
    }

    #[test]
    fn parameters_use_supplied_then_default() {
        let r = rule("basePrice * rate")
            .parameter(RuleParameter::new("rate", ParameterType::Decimal, "0.1").unwrap())
            .build()
            .unwrap();
        let defaulted = RuleEvaluator.evaluate(&r, &context()).unwrap();
        assert_eq!(defaulted.amount(), dec!(100));

        let mut supplied = BTreeMap::new();
        supplied.insert("rate".to_string(), "0.3".to_string());
        let ctx = context().with_supplied_parameters(supplied);
        assert_eq!(RuleEvaluator.evaluate(&r, &ctx).unwrap().amount(), dec!(300));
    }

    #[test]
    fn conditions_may_reference_parameters() {
        let r = rule("50")
            .parameter(RuleParameter::new("entities", ParameterType::Integer, "1").unwrap())
            .condition(
                RuleCondition::new("entities", ConditionOperator::GreaterThan, "1").unwrap(),
            )
            .build()
            .unwrap();
        assert!(RuleEvaluator.evaluate(&r, &context()).unwrap().is_zero());
        let mut supplied = BTreeMap::new();
        supplied.insert("entities".to_string(), "3".to_string());
        let ctx = context().with_supplied_parameters(supplied);
        assert_eq!(RuleEvaluator.evaluate(&r, &ctx).unwrap().amount(), dec!(50));
    }

    #[test]
    fn failures_name_the_rule() {
        let err = RuleEvaluator
            .evaluate(&rule("basePrice *").build().unwrap(), &context())
            .unwrap_err();
        assert_eq!(err.rule_id, "R1");
        assert!(matches!(err.source, ExprError::Syntax { .. }));

        let err = RuleEvaluator
            .evaluate(&rule("unknownVar + 1").build().unwrap(), &context())
            .unwrap_err();
        assert_eq!(err.source, ExprError::UnboundVariable("unknownVar".into()));

        let shadow = rule("basePrice")
            .parameter(RuleParameter::new("basePrice", ParameterType::Decimal, "1").unwrap())
            .build()
            .unwrap();
        assert!(RuleEvaluator.evaluate(&shadow, &context()).is_err());
    }

    #[test]
    fn evaluation_leaves_context_untouched() {
        let ctx = context();
        let before = ctx.clone();
        let r = rule("basePrice * rate")
            .parameter(RuleParameter::new("rate", ParameterType::Decimal, "0.1").unwrap())
            .build()
            .unwrap();
        RuleEvaluator.evaluate(&r, &ctx).unwrap();
        assert_eq!(ctx, before);
    }

    #[test]
    fn priority_sort_is_deterministic() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let make = |id: &str, priority: i32| {
            RuleBuilder::new("GB", RuleType::Threshold, id, "1", date)
                .id(id)
                .priority(priority)
                .build()
                .unwrap()
        };
        let mut rules = vec![make("c", 2), make("b", 1), make("a", 2)];
        sort_by_priority(&mut rules);
        let ids: Vec<_> = rules.iter().map(|r| r.rule_id()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }
}
