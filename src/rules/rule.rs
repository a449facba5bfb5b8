use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::condition::RuleCondition;
use super::error::RuleError;
use super::expr::{ExprError, Expression, Value};
use crate::core::is_identifier;

/// Priority given to rules built without an explicit one.
pub const DEFAULT_PRIORITY: i32 = 100;

/// Category of a pricing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleType {
    /// Establishes the country's base filing price.
    VatRate,
    /// Scales the price once volume or other thresholds are crossed.
    Threshold,
    /// Surcharge for complex filings.
    Complexity,
    /// Country-specific extras (fiscal representation, local formats).
    SpecialRequirement,
    /// Country-level reduction, usually a negative effect.
    Discount,
}

impl RuleType {
    /// Base rules make up the "base cost" column of a country breakdown;
    /// everything else is reported as "additional cost".
    pub fn is_base(&self) -> bool {
        matches!(self, Self::VatRate | Self::Threshold)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VatRate => "VatRate",
            Self::Threshold => "Threshold",
            Self::Complexity => "Complexity",
            Self::SpecialRequirement => "SpecialRequirement",
            Self::Discount => "Discount",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleType {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "VatRate" => Ok(Self::VatRate),
            "Threshold" => Ok(Self::Threshold),
            "Complexity" => Ok(Self::Complexity),
            "SpecialRequirement" => Ok(Self::SpecialRequirement),
            "Discount" => Ok(Self::Discount),
            other => Err(RuleError::UnknownRuleType(other.to_string())),
        }
    }
}

/// Declared type of a rule parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    Decimal,
    Integer,
    Text,
    Boolean,
}

impl FromStr for ParameterType {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "decimal" | "number" => Ok(Self::Decimal),
            "integer" | "int" => Ok(Self::Integer),
            "string" | "text" => Ok(Self::Text),
            "bool" | "boolean" => Ok(Self::Boolean),
            other => Err(RuleError::InvalidParameter(format!(
                "unknown data type '{other}'"
            ))),
        }
    }
}

impl ParameterType {
    /// Convert raw text into a typed value.
    pub fn convert(&self, raw: &str) -> Result<Value, ExprError> {
        let raw = raw.trim();
        let mismatch = || ExprError::Type(format!("'{raw}' is not a valid {self:?} value"));
        match self {
            Self::Decimal => Decimal::from_str(raw)
                .map(Value::Number)
                .map_err(|_| mismatch()),
            Self::Integer => raw
                .parse::<i64>()
                .map(|n| Value::Number(Decimal::from(n)))
                .map_err(|_| mismatch()),
            Self::Text => Ok(Value::Text(raw.to_string())),
            Self::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "0" => Ok(Value::Bool(false)),
                _ => Err(mismatch()),
            },
        }
    }
}

/// A variable a rule declares for its expression, with a default binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleParameter {
    name: String,
    data_type: ParameterType,
    default_value: String,
}

impl RuleParameter {
    pub fn new(
        name: impl Into<String>,
        data_type: ParameterType,
        default_value: impl Into<String>,
    ) -> Result<Self, RuleError> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(RuleError::InvalidParameter(format!(
                "'{name}' must match [A-Za-z][A-Za-z0-9_]*"
            )));
        }
        Ok(Self {
            name,
            data_type,
            default_value: default_value.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> ParameterType {
        self.data_type
    }

    pub fn default_value(&self) -> &str {
        &self.default_value
    }

    /// Typed binding: the supplied value when present, else the default.
    pub fn bind(&self, supplied: Option<&str>) -> Result<Value, ExprError> {
        self.data_type
            .convert(supplied.unwrap_or(&self.default_value))
    }
}

/// A jurisdiction-specific pricing rule.
///
/// Rules are created through [`RuleBuilder`] and changed only through
/// their mutating methods, which keep the rule valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RuleDefinition", into = "RuleDefinition")]
pub struct Rule {
    rule_id: String,
    country_code: String,
    rule_type: RuleType,
    name: String,
    expression: String,
    effective_from: NaiveDate,
    effective_to: Option<NaiveDate>,
    priority: i32,
    is_active: bool,
    parameters: Vec<RuleParameter>,
    conditions: Vec<RuleCondition>,
}

impl Rule {
    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    pub fn rule_type(&self) -> RuleType {
        self.rule_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn effective_from(&self) -> NaiveDate {
        self.effective_from
    }

    pub fn effective_to(&self) -> Option<NaiveDate> {
        self.effective_to
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn parameters(&self) -> &[RuleParameter] {
        &self.parameters
    }

    pub fn conditions(&self) -> &[RuleCondition] {
        &self.conditions
    }

    /// Whether the rule applies on `date`: active and inside its validity
    /// window (both bounds inclusive).
    pub fn is_in_effect(&self, date: NaiveDate) -> bool {
        self.is_active
            && self.effective_from <= date
            && self.effective_to.is_none_or(|to| date <= to)
    }

    /// Parse the expression without evaluating it.
    pub fn compile(&self) -> Result<Expression, ExprError> {
        Expression::parse(&self.expression)
    }

    pub fn update_priority(&mut self, priority: i32) -> Result<(), RuleError> {
        if priority < 1 {
            return Err(RuleError::InvalidPriority(priority));
        }
        self.priority = priority;
        Ok(())
    }

    pub fn update_effective_dates(
        &mut self,
        from: NaiveDate,
        to: Option<NaiveDate>,
    ) -> Result<(), RuleError> {
        check_date_range(from, to)?;
        self.effective_from = from;
        self.effective_to = to;
        Ok(())
    }

    pub fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    pub fn add_parameter(&mut self, parameter: RuleParameter) -> Result<(), RuleError> {
        if self.parameters.iter().any(|p| p.name == parameter.name) {
            return Err(RuleError::DuplicateParameter(parameter.name));
        }
        self.parameters.push(parameter);
        Ok(())
    }

    pub fn add_condition(&mut self, condition: RuleCondition) {
        self.conditions.push(condition);
    }
}

fn check_date_range(from: NaiveDate, to: Option<NaiveDate>) -> Result<(), RuleError> {
    match to {
        Some(to) if to < from => Err(RuleError::InvalidDateRange {
            from: from.to_string(),
            to: to.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Builder for [`Rule`].
///
/// ```
/// use chrono::NaiveDate;
/// use vatcost::rules::*;
///
/// let rule = RuleBuilder::new(
///     "gb",
///     RuleType::VatRate,
///     "UK base filing fee",
///     "basePrice * 0.20",
///     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
/// )
/// .id("GB-BASE")
/// .priority(1)
/// .build()
/// .unwrap();
/// assert_eq!(rule.country_code(), "GB");
/// ```
pub struct RuleBuilder {
    rule_id: Option<String>,
    country_code: String,
    rule_type: RuleType,
    name: String,
    expression: String,
    effective_from: NaiveDate,
    effective_to: Option<NaiveDate>,
    priority: i32,
    is_active: bool,
    parameters: Vec<RuleParameter>,
    conditions: Vec<RuleCondition>,
}

impl RuleBuilder {
    pub fn new(
        country_code: impl Into<String>,
        rule_type: RuleType,
        name: impl Into<String>,
        expression: impl Into<String>,
        effective_from: NaiveDate,
    ) -> Self {
        Self {
            rule_id: None,
            country_code: country_code.into(),
            rule_type,
            name: name.into(),
            expression: expression.into(),
            effective_from,
            effective_to: None,
            priority: DEFAULT_PRIORITY,
            is_active: true,
            parameters: Vec::new(),
            conditions: Vec::new(),
        }
    }

    /// Set the identifier; a random UUID is used otherwise.
    pub fn id(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn effective_to(mut self, date: NaiveDate) -> Self {
        self.effective_to = Some(date);
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    pub fn parameter(mut self, parameter: RuleParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn condition(mut self, condition: RuleCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn build(self) -> Result<Rule, RuleError> {
        let country_code = self.country_code.trim().to_ascii_uppercase();
        if country_code.is_empty() {
            return Err(RuleError::MissingField("country code"));
        }
        if country_code.len() != 2 || !country_code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(RuleError::InvalidCountry(self.country_code));
        }
        if self.name.trim().is_empty() {
            return Err(RuleError::MissingField("name"));
        }
        if self.expression.trim().is_empty() {
            return Err(RuleError::MissingField("expression"));
        }
        let rule_id = match self.rule_id {
            Some(id) if id.trim().is_empty() => return Err(RuleError::MissingField("id")),
            Some(id) => id,
            None => uuid::Uuid::new_v4().to_string(),
        };
        if self.priority < 1 {
            return Err(RuleError::InvalidPriority(self.priority));
        }
        check_date_range(self.effective_from, self.effective_to)?;

        let mut rule = Rule {
            rule_id,
            country_code,
            rule_type: self.rule_type,
            name: self.name,
            expression: self.expression,
            effective_from: self.effective_from,
            effective_to: self.effective_to,
            priority: self.priority,
            is_active: self.is_active,
            parameters: Vec::with_capacity(self.parameters.len()),
            conditions: self.conditions,
        };
        for parameter in self.parameters {
            rule.add_parameter(parameter)?;
        }
        Ok(rule)
    }
}

/// Plain serializable shape of a [`Rule`], used for rule-set files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    #[serde(default)]
    pub rule_id: Option<String>,
    pub country_code: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub name: String,
    pub expression: String,
    pub effective_from: NaiveDate,
    #[serde(default)]
    pub effective_to: Option<NaiveDate>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub parameters: Vec<RuleParameter>,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_active() -> bool {
    true
}

impl TryFrom<RuleDefinition> for Rule {
    type Error = RuleError;

    fn try_from(def: RuleDefinition) -> Result<Self, Self::Error> {
        let mut builder = RuleBuilder::new(
            def.country_code,
            def.rule_type,
            def.name,
            def.expression,
            def.effective_from,
        )
        .priority(def.priority)
        .active(def.is_active);
        if let Some(id) = def.rule_id {
            builder = builder.id(id);
        }
        if let Some(to) = def.effective_to {
            builder = builder.effective_to(to);
        }
        for parameter in def.parameters {
            builder = builder.parameter(parameter);
        }
        for condition in def.conditions {
            builder = builder.condition(condition);
        }
        builder.build()
    }
}

impl From<Rule> for RuleDefinition {
    fn from(rule: Rule) -> Self {
        Self {
            rule_id: Some(rule.rule_id),
            country_code: rule.country_code,
            rule_type: rule.rule_type,
            name: rule.name,
            expression: rule.expression,
            effective_from: rule.effective_from,
            effective_to: rule.effective_to,
            priority: rule.priority,
            is_active: rule.is_active,
            parameters: rule.parameters,
            conditions: rule.conditions,
        }
    }
}
