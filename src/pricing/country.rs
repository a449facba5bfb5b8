//! Per-country pricing: folds a country's rules into base, additional and
//! total cost.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::{
    CalculationError, CalculationRequest, Country, CountryRepository, CurrencyCode, Money,
    MoneyError,
};
use crate::rules::{EvaluationContext, RuleEvaluator, RuleRepository, sort_by_priority, vars};

/// Request-wide inputs shared by every country of one calculation.
#[derive(Debug, Clone)]
pub struct PricingInput<'a> {
    pub request: &'a CalculationRequest,
    /// Calculation currency; every country result is expressed in it.
    pub currency: CurrencyCode,
    /// Service tier base price, the initial `basePrice`.
    pub base_price: Decimal,
    /// Date rules must be in effect on.
    pub as_of: NaiveDate,
}

/// Priced result for one country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountryPricing {
    pub country: Country,
    /// Effects of `VatRate` and `Threshold` rules.
    pub base_cost: Money,
    /// Effects of all other rule types.
    pub additional_cost: Money,
    /// `base_cost + additional_cost`.
    pub total_cost: Money,
    /// Rules with a non-zero effect, in evaluation order.
    pub applied_rules: Vec<String>,
    /// Rules that failed to evaluate and were skipped.
    pub diagnostics: Vec<CalculationError>,
}

/// Prices single countries from the rules in a [`RuleRepository`].
pub struct CountryCostCalculator<'a, R: ?Sized, C: ?Sized> {
    rules: &'a R,
    countries: &'a C,
    evaluator: RuleEvaluator,
}

impl<'a, R, C> CountryCostCalculator<'a, R, C>
where
    R: RuleRepository + ?Sized,
    C: CountryRepository + ?Sized,
{
    pub fn new(rules: &'a R, countries: &'a C) -> Self {
        Self {
            rules,
            countries,
            evaluator: RuleEvaluator::new(),
        }
    }

    /// Look up an active country, failing with `UnknownCountry` otherwise.
    pub fn resolve_country(&self, country_code: &str) -> Result<Country, CalculationError> {
        let code = country_code.trim().to_ascii_uppercase();
        match self.countries.get_by_code(&code)? {
            Some(country) if country.is_active() => Ok(country),
            Some(_) => {
                warn!(country = %code, "country is inactive");
                Err(CalculationError::UnknownCountry(code))
            }
            None => {
                warn!(country = %code, "country not found");
                Err(CalculationError::UnknownCountry(code))
            }
        }
    }

    /// Price `country_code` for the request in `input`.
    ///
    /// Rules run in priority order starting from a zero price; each rule's
    /// effect is added to the running price. A rule that fails to evaluate,
    /// or whose effect would push a sum out of the decimal range, is
    /// skipped and recorded in `diagnostics`.
    pub fn price_country(
        &self,
        country_code: &str,
        input: &PricingInput<'_>,
    ) -> Result<CountryPricing, CalculationError> {
        let country = self.resolve_country(country_code)?;
        let code = country.code().to_string();

        let mut rules: Vec<_> = self
            .rules
            .active_rules_for_country(&code, input.as_of)?
            .into_iter()
            .filter(|r| r.country_code() == code && r.is_in_effect(input.as_of))
            .collect();
        sort_by_priority(&mut rules);

        let mut context = base_context(&country, input);
        let zero = Money::zero(input.currency.clone());
        let mut base_cost = zero.clone();
        let mut additional_cost = zero.clone();
        let mut running = zero;
        let mut applied_rules = Vec::new();
        let mut diagnostics = Vec::new();

        for rule in &rules {
            let effect = match self.evaluator.evaluate(rule, &context) {
                Ok(effect) => effect,
                Err(e) => {
                    warn!(country = %code, rule_id = %e.rule_id, error = %e, "rule skipped");
                    diagnostics.push(e.into());
                    continue;
                }
            };
            if effect.is_zero() {
                continue;
            }
            let folded = running.add(&effect).and_then(|next| {
                if rule.rule_type().is_base() {
                    Ok((next, base_cost.add(&effect)?, additional_cost.clone()))
                } else {
                    Ok((next, base_cost.clone(), additional_cost.add(&effect)?))
                }
            });
            let (next, base, additional) = match folded {
                Ok(sums) => sums,
                Err(MoneyError::Overflow(expr)) => {
                    warn!(country = %code, rule_id = rule.rule_id(), %expr, "rule effect out of range");
                    diagnostics.push(CalculationError::RuleEvaluation {
                        rule_id: rule.rule_id().to_string(),
                        reason: format!("amount out of range: {expr}"),
                    });
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            running = next;
            base_cost = base;
            additional_cost = additional;
            debug!(
                country = %code,
                rule_id = rule.rule_id(),
                effect = %effect.amount(),
                running = %running.amount(),
                "rule applied"
            );
            applied_rules.push(rule.rule_id().to_string());
            context.set(vars::BASE_PRICE, running.amount());
            context.set(vars::RUNNING_TOTAL, running.amount());
        }

        if running.is_negative() {
            return Err(CalculationError::InvalidOperation(format!(
                "country {code} priced negative ({running})"
            )));
        }

        Ok(CountryPricing {
            country,
            base_cost,
            additional_cost,
            total_cost: running,
            applied_rules,
            diagnostics,
        })
    }
}

/// Built-in variables for one country, before any rule has run.
fn base_context(country: &Country, input: &PricingInput<'_>) -> EvaluationContext {
    let request = input.request;
    EvaluationContext::new(input.currency.clone())
        .with_variable(vars::BASE_PRICE, input.base_price)
        .with_variable(vars::SERVICE_PRICE, input.base_price)
        .with_variable(vars::RUNNING_TOTAL, Decimal::ZERO)
        .with_variable(
            vars::TRANSACTION_VOLUME,
            Decimal::from(request.transaction_volume),
        )
        .with_variable(vars::SERVICE_TYPE, request.service_type.as_str())
        .with_variable(vars::FILING_FREQUENCY, request.frequency.as_str())
        .with_variable(
            vars::FILINGS_PER_YEAR,
            Decimal::from(request.frequency.filings_per_year()),
        )
        .with_variable(vars::COUNTRY_CODE, country.code())
        .with_variable(
            vars::COUNTRY_COUNT,
            Decimal::from(request.country_codes.len()),
        )
        .with_variable(
            vars::ADDITIONAL_SERVICES,
            request.additional_services.join(","),
        )
        .with_variable(
            vars::ADDITIONAL_SERVICE_COUNT,
            Decimal::from(request.additional_services.len()),
        )
        .with_supplied_parameters(request.parameters.clone())
}
