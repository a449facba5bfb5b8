//! The calculation result handed to callers.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::calculation::Calculation;
use super::country::CountryPricing;
use crate::core::{CalculationError, FilingFrequency, ServiceType, round_half_up};

/// Cost detail for one priced country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryBreakdown {
    pub country_code: String,
    pub country_name: String,
    pub base_cost: Decimal,
    pub additional_cost: Decimal,
    pub total_cost: Decimal,
    pub applied_rules: Vec<String>,
}

/// One applied discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountLine {
    pub name: String,
    pub percentage: Decimal,
    /// Amount taken off the running total.
    pub amount: Decimal,
}

/// Itemized result of [`PricingEngine::calculate`](super::PricingEngine::calculate).
///
/// Only leaf amounts are rounded half-up: each country's base cost and
/// total cost, and each discount taken off the rounded running total.
/// Everything else is derived from those, so `base_cost + additional_cost
/// == total_cost` holds per country and `subtotal` minus the discount lines
/// is `total_cost`. The unrounded values live on the [`Calculation`] the
/// model was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationModel {
    pub calculation_id: String,
    pub user_id: String,
    pub service_id: String,
    pub service_type: ServiceType,
    pub transaction_volume: u32,
    pub frequency: FilingFrequency,
    pub currency_code: String,
    pub calculation_date: NaiveDate,
    /// Sum of the country totals before discounts.
    pub subtotal: Decimal,
    pub total_cost: Decimal,
    pub country_breakdowns: Vec<CountryBreakdown>,
    /// Discount name to its latest percentage.
    pub discounts: BTreeMap<String, Decimal>,
    /// Every discount application in order; a re-added name appears once
    /// per application.
    pub discount_lines: Vec<DiscountLine>,
    pub additional_services: Vec<String>,
    /// Per-rule and per-country problems that did not abort the
    /// calculation.
    pub diagnostics: Vec<CalculationError>,
}

impl CalculationModel {
    /// Assemble the model from a finished calculation and the country
    /// results it was built from, rounding amounts to `dp` places.
    pub fn from_calculation(
        calculation: &Calculation,
        service_type: ServiceType,
        pricings: &[CountryPricing],
        additional_services: &[String],
        diagnostics: Vec<CalculationError>,
        dp: u32,
    ) -> Result<Self, CalculationError> {
        let mut subtotal = Decimal::ZERO;
        let mut country_breakdowns = Vec::with_capacity(pricings.len());
        for p in pricings {
            let total_cost = present(p.total_cost.amount(), dp);
            let base_cost = present(p.base_cost.amount(), dp);
            let additional_cost = total_cost
                .checked_sub(base_cost)
                .ok_or_else(|| out_of_range(p.country.code()))?;
            subtotal = subtotal
                .checked_add(total_cost)
                .ok_or_else(|| out_of_range("subtotal"))?;
            country_breakdowns.push(CountryBreakdown {
                country_code: p.country.code().to_string(),
                country_name: p.country.name().to_string(),
                base_cost,
                additional_cost,
                total_cost,
                applied_rules: p.applied_rules.clone(),
            });
        }
        let subtotal = present(subtotal, dp);

        let mut total_cost = subtotal;
        let mut discount_lines = Vec::with_capacity(calculation.applied_discounts().len());
        for d in calculation.applied_discounts() {
            let amount = total_cost
                .checked_mul(d.percentage / dec!(100))
                .map(|amount| present(amount, dp))
                .ok_or_else(|| out_of_range(&d.name))?;
            total_cost = total_cost
                .checked_sub(amount)
                .ok_or_else(|| out_of_range("total"))?;
            discount_lines.push(DiscountLine {
                name: d.name.clone(),
                percentage: d.percentage,
                amount,
            });
        }

        Ok(Self {
            calculation_id: calculation.calculation_id().to_string(),
            user_id: calculation.user_id().to_string(),
            service_id: calculation.service_id().to_string(),
            service_type,
            transaction_volume: calculation.transaction_volume(),
            frequency: calculation.filing_frequency(),
            currency_code: calculation.currency_code().to_string(),
            calculation_date: calculation.calculation_date(),
            subtotal,
            total_cost,
            country_breakdowns,
            discounts: calculation.discounts().iter().cloned().collect(),
            discount_lines,
            additional_services: additional_services.to_vec(),
            diagnostics,
        })
    }

    /// Whether some country or rule could not be priced.
    pub fn is_partial(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn breakdown(&self, country_code: &str) -> Option<&CountryBreakdown> {
        self.country_breakdowns
            .iter()
            .find(|b| b.country_code.eq_ignore_ascii_case(country_code))
    }
}

fn out_of_range(item: &str) -> CalculationError {
    CalculationError::Overflow(format!("rounded {item} in the breakdown"))
}

fn present(value: Decimal, dp: u32) -> Decimal {
    let mut rounded = round_half_up(value, dp);
    rounded.rescale(dp);
    rounded
}

/// Plain-text summary. The calculation id is left out so the output is
/// stable across runs.
impl fmt::Display for CalculationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} filing for {} ({}, {} transactions)",
            self.service_type, self.user_id, self.frequency, self.transaction_volume
        )?;
        writeln!(f, "Date: {}", self.calculation_date)?;
        writeln!(f, "Currency: {}", self.currency_code)?;
        for b in &self.country_breakdowns {
            writeln!(
                f,
                "{} {}: base {} + additional {} = {} [{}]",
                b.country_code,
                b.country_name,
                b.base_cost,
                b.additional_cost,
                b.total_cost,
                b.applied_rules.join(", ")
            )?;
        }
        if !self.additional_services.is_empty() {
            writeln!(f, "Additional services: {}", self.additional_services.join(", "))?;
        }
        writeln!(f, "Subtotal: {}", self.subtotal)?;
        for d in &self.discount_lines {
            writeln!(f, "Discount {} ({}%): -{}", d.name, d.percentage, d.amount)?;
        }
        writeln!(f, "Total: {}", self.total_cost)?;
        for d in &self.diagnostics {
            writeln!(f, "Warning: {d}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::core::{Country, FilingFrequency, Money};

    fn eur(amount: Decimal) -> Money {
        Money::new(amount, "EUR").unwrap()
    }

    fn pricing(code: &str, name: &str, base: Decimal, additional: Decimal) -> CountryPricing {
        CountryPricing {
            country: Country::new(code, name, "EUR").unwrap(),
            base_cost: eur(base),
            additional_cost: eur(additional),
            total_cost: eur(base + additional),
            applied_rules: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn model(pricings: &[CountryPricing], discounts: &[(&str, Decimal)]) -> CalculationModel {
        let mut calc = Calculation::new(
            "user-1",
            "standard",
            10,
            FilingFrequency::Monthly,
            "EUR",
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        )
        .unwrap();
        for p in pricings {
            calc.add_country(p.country.code(), p.total_cost.clone()).unwrap();
        }
        for (name, pct) in discounts {
            calc.add_discount(name, *pct).unwrap();
        }
        CalculationModel::from_calculation(&calc, ServiceType::Standard, pricings, &[], Vec::new(), 2)
            .unwrap()
    }

    fn assert_reconciles(model: &CalculationModel) {
        let mut subtotal = Decimal::ZERO;
        for b in &model.country_breakdowns {
            assert_eq!(b.base_cost + b.additional_cost, b.total_cost, "{}", b.country_code);
            subtotal += b.total_cost;
        }
        assert_eq!(subtotal, model.subtotal);
        let discounted: Decimal = model.discount_lines.iter().map(|d| d.amount).sum();
        assert_eq!(model.subtotal - discounted, model.total_cost);
    }

    #[test]
    fn split_reconciles_after_rounding() {
        let model = model(&[pricing("GB", "United Kingdom", dec!(0.005), dec!(0.005))], &[]);
        let gb = model.breakdown("GB").unwrap();
        assert_eq!(gb.total_cost, dec!(0.01));
        assert_eq!(gb.base_cost, dec!(0.01));
        assert_eq!(gb.additional_cost.to_string(), "0.00");
        assert_reconciles(&model);
    }

    #[test]
    fn discount_lines_reconcile_with_subtotal() {
        let model = model(
            &[
                pricing("GB", "United Kingdom", dec!(0.125), Decimal::ZERO),
                pricing("DE", "Germany", dec!(0.125), Decimal::ZERO),
            ],
            &[("Volume", dec!(10))],
        );
        assert_eq!(model.subtotal, dec!(0.26));
        assert_eq!(model.discount_lines[0].amount, dec!(0.03));
        assert_eq!(model.total_cost, dec!(0.23));
        assert_reconciles(&model);
    }

    #[test]
    fn full_discount_leaves_nothing() {
        let model = model(
            &[pricing("GB", "United Kingdom", dec!(0.125), dec!(0.125))],
            &[("Free", dec!(100))],
        );
        assert_eq!(model.total_cost.to_string(), "0.00");
        assert_reconciles(&model);
    }

    #[test]
    fn ledger_keeps_latest_percentage_per_name() {
        let model = model(
            &[pricing("GB", "United Kingdom", dec!(1000), Decimal::ZERO)],
            &[("Promo", dec!(10)), ("Loyalty", dec!(5)), ("Promo", dec!(20))],
        );
        assert_eq!(model.discounts.len(), 2);
        assert_eq!(model.discounts["Promo"], dec!(20));
        assert_eq!(model.discounts["Loyalty"], dec!(5));
        let names: Vec<_> = model.discount_lines.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["Promo", "Loyalty", "Promo"]);
        // 1000 - 100 - 45 - 171
        assert_eq!(model.total_cost, dec!(684.00));
        assert_reconciles(&model);
    }

    #[test]
    fn presentation_rounding() {
        assert_eq!(present(dec!(1500), 2).to_string(), "1500.00");
        assert_eq!(present(dec!(2.345), 2).to_string(), "2.35");
        assert_eq!(present(dec!(2.344), 2).to_string(), "2.34");
        assert_eq!(present(dec!(1234.5), 0).to_string(), "1235");
    }
}
