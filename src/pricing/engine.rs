//! The `calculate` entry point.
//!
//! A request is validated, every country is priced independently (on the
//! rayon pool with the `parallel` feature), the results are folded into a
//! [`Calculation`] in request order, configured discounts are applied and
//! the calculation is finalized into a [`CalculationModel`].

use tracing::{debug, info, warn};

use super::calculation::Calculation;
use super::config::EngineConfig;
use super::country::{CountryCostCalculator, CountryPricing, PricingInput};
use super::model::CalculationModel;
use crate::core::currencies::minor_units;
use crate::core::{
    CalculationError, CalculationRequest, CountryRepository, CurrencyCode, join_validation_errors,
    normalize_request, validate_request,
};
use crate::rules::RuleRepository;

/// Prices calculation requests against a rule and a country repository.
///
/// ```
/// use chrono::NaiveDate;
/// use rust_decimal_macros::dec;
/// use vatcost::core::*;
/// use vatcost::pricing::PricingEngine;
/// use vatcost::rules::{InMemoryRuleRepository, RuleBuilder, RuleType};
///
/// let rules = InMemoryRuleRepository::new().with_rule(
///     RuleBuilder::new("GB", RuleType::VatRate, "UK VAT", "basePrice * 0.20",
///         NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
///         .build()
///         .unwrap(),
/// );
/// let engine = PricingEngine::new(rules, InMemoryCountryRepository::european());
///
/// let request = CalculationRequest::builder(ServiceType::Standard, 100, FilingFrequency::Quarterly)
///     .country("GB")
///     .calculation_date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
///     .build()
///     .unwrap();
/// let model = engine.calculate(&request).unwrap();
/// assert_eq!(model.currency_code, "GBP");
/// assert_eq!(model.total_cost, dec!(200));
/// ```
pub struct PricingEngine<R, C> {
    rules: R,
    countries: C,
    config: EngineConfig,
}

impl<R, C> PricingEngine<R, C>
where
    R: RuleRepository,
    C: CountryRepository,
{
    pub fn new(rules: R, countries: C) -> Self {
        Self::with_config(rules, countries, EngineConfig::default())
    }

    pub fn with_config(rules: R, countries: C, config: EngineConfig) -> Self {
        Self {
            rules,
            countries,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    pub fn countries(&self) -> &C {
        &self.countries
    }

    /// Price `request` and return the itemized result.
    ///
    /// Validation, currency and repository errors abort. A country that
    /// cannot be priced or would push the total out of range, or a rule
    /// that fails, ends up in the model's `diagnostics` instead, unless
    /// [`EngineConfig::fail_on_unknown_country`] is set.
    pub fn calculate(
        &self,
        request: &CalculationRequest,
    ) -> Result<CalculationModel, CalculationError> {
        self.calculate_with_aggregate(request).map(|(_, model)| model)
    }

    /// Like [`calculate`](Self::calculate), also returning the finalized
    /// [`Calculation`] with its unrounded amounts.
    #[tracing::instrument(
        name = "calculate",
        skip(self, request),
        fields(user = %request.user_id, countries = request.country_codes.len())
    )]
    pub fn calculate_with_aggregate(
        &self,
        request: &CalculationRequest,
    ) -> Result<(Calculation, CalculationModel), CalculationError> {
        let errors = validate_request(request);
        if !errors.is_empty() {
            return Err(join_validation_errors(&errors));
        }
        self.config.validate()?;
        let request = normalize_request(request.clone());

        let tier = self.config.tier(request.service_type).ok_or_else(|| {
            CalculationError::Validation(format!(
                "no service tier configured for {}",
                request.service_type
            ))
        })?;
        let as_of = request
            .calculation_date
            .unwrap_or_else(|| chrono::Utc::now().date_naive());
        let currency = self.resolve_currency(&request)?;

        let mut calculation = Calculation::new(
            request.user_id.clone(),
            tier.service_id.clone(),
            request.transaction_volume,
            request.frequency,
            currency.as_str(),
            as_of,
        )?;

        let input = PricingInput {
            request: &request,
            currency: currency.clone(),
            base_price: tier.base_price,
            as_of,
        };

        let mut pricings = Vec::with_capacity(request.country_codes.len());
        let mut diagnostics = Vec::new();
        for (code, result) in request.country_codes.iter().zip(self.price_countries(&input)) {
            let folded = result.and_then(|pricing| {
                calculation.add_country_with_rules(
                    pricing.country.code(),
                    pricing.total_cost.clone(),
                    pricing.applied_rules.clone(),
                )?;
                Ok(pricing)
            });
            match folded {
                Ok(pricing) => {
                    diagnostics.extend(pricing.diagnostics.iter().cloned());
                    pricings.push(pricing);
                }
                Err(e) if e.is_fatal() || self.config.fail_on_unknown_country => return Err(e),
                Err(e) => {
                    warn!(country = %code, error = %e, "country not priced");
                    diagnostics.push(e);
                }
            }
        }

        if calculation.countries().is_empty() {
            let reasons: Vec<String> = diagnostics.iter().map(|d| d.to_string()).collect();
            return Err(CalculationError::InvalidOperation(format!(
                "none of the requested countries could be priced: {}",
                reasons.join("; ")
            )));
        }

        for policy in &self.config.discount_policies {
            if policy.criterion.matches(&request) {
                let applied = calculation.add_discount(&policy.name, policy.percentage)?;
                debug!(
                    discount = %applied.name,
                    amount = %applied.discount_amount.amount(),
                    "discount applied"
                );
            }
        }

        calculation.finalize()?;

        let dp = minor_units(currency.as_str()).unwrap_or(self.config.rounding_dp);
        let model = CalculationModel::from_calculation(
            &calculation,
            request.service_type,
            &pricings,
            &request.additional_services,
            diagnostics,
            dp,
        )?;
        info!(
            calculation_id = %model.calculation_id,
            total = %model.total_cost,
            currency = %model.currency_code,
            diagnostics = model.diagnostics.len(),
            "calculation finished"
        );
        Ok((calculation, model))
    }

    /// The request's currency; otherwise the native currency shared by all
    /// requested countries; otherwise the configured default.
    fn resolve_currency(
        &self,
        request: &CalculationRequest,
    ) -> Result<CurrencyCode, CalculationError> {
        if let Some(code) = &request.currency_code {
            return CurrencyCode::parse(code);
        }
        let mut native: Option<CurrencyCode> = None;
        for code in &request.country_codes {
            let Some(country) = self.countries.get_by_code(code)? else {
                continue;
            };
            if !country.is_active() {
                continue;
            }
            match &native {
                None => native = Some(country.currency().clone()),
                Some(c) if c != country.currency() => {
                    return CurrencyCode::parse(&self.config.currency_code);
                }
                Some(_) => {}
            }
        }
        match native {
            Some(currency) => Ok(currency),
            None => CurrencyCode::parse(&self.config.currency_code),
        }
    }

    /// One result per requested country, in request order.
    fn price_countries(
        &self,
        input: &PricingInput<'_>,
    ) -> Vec<Result<CountryPricing, CalculationError>> {
        let calculator = CountryCostCalculator::new(&self.rules, &self.countries);

        #[cfg(feature = "parallel")]
        {
            if self.config.parallel {
                use rayon::prelude::*;
                return input
                    .request
                    .country_codes
                    .par_iter()
                    .map(|code| calculator.price_country(code, input))
                    .collect();
            }
        }

        input
            .request
            .country_codes
            .iter()
            .map(|code| calculator.price_country(code, input))
            .collect()
    }
}
