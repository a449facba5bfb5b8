//! The `Calculation` aggregate: per-country costs, the discount ledger and
//! the running total that ties them together.
//!
//! The total is maintained incrementally by every mutating operation and
//! can always be re-derived with [`Calculation::recalculate_total_cost`];
//! both paths perform the same decimal operations in the same order and
//! therefore agree exactly.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use super::discount::{DiscountApplication, apply_discount, apply_discounts};
use crate::core::countries::normalize_country_code;
use crate::core::{CalculationError, CurrencyCode, FilingFrequency, Money};

/// Lifecycle state of a [`Calculation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CalculationStatus {
    /// Countries and discounts are still being added.
    Draft,
    /// Total computed and verified; no further changes.
    Finalized,
}

/// Cost of one country inside a calculation. Only created by, and owned
/// by, its parent [`Calculation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalculationCountry {
    calculation_id: String,
    country_code: String,
    country_cost: Money,
    applied_rules: Vec<String>,
}

impl CalculationCountry {
    pub fn calculation_id(&self) -> &str {
        &self.calculation_id
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    pub fn country_cost(&self) -> &Money {
        &self.country_cost
    }

    /// Ids of the rules that changed this country's price, in evaluation
    /// order.
    pub fn applied_rules(&self) -> &[String] {
        &self.applied_rules
    }
}

/// A multi-country cost calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Calculation {
    calculation_id: String,
    user_id: String,
    service_id: String,
    transaction_volume: u32,
    filing_frequency: FilingFrequency,
    currency: CurrencyCode,
    calculation_date: NaiveDate,
    total_cost: Money,
    countries: Vec<CalculationCountry>,
    /// Discount name → latest percentage, in first-insertion order.
    discounts: Vec<(String, Decimal)>,
    /// Every discount application, in the order it happened.
    applied_discounts: Vec<DiscountApplication>,
    status: CalculationStatus,
    is_archived: bool,
}

impl Calculation {
    /// Start a draft calculation with a fresh id and a zero total.
    pub fn new(
        user_id: impl Into<String>,
        service_id: impl Into<String>,
        transaction_volume: u32,
        filing_frequency: FilingFrequency,
        currency_code: &str,
        calculation_date: NaiveDate,
    ) -> Result<Self, CalculationError> {
        let user_id = user_id.into();
        let service_id = service_id.into();
        if user_id.trim().is_empty() {
            return Err(CalculationError::Validation(
                "user id must not be empty".into(),
            ));
        }
        if service_id.trim().is_empty() {
            return Err(CalculationError::Validation(
                "service id must not be empty".into(),
            ));
        }
        if transaction_volume == 0 {
            return Err(CalculationError::Validation(
                "transaction volume must be positive".into(),
            ));
        }
        let currency = CurrencyCode::parse(currency_code)?;
        Ok(Self {
            calculation_id: uuid::Uuid::new_v4().to_string(),
            user_id,
            service_id,
            transaction_volume,
            filing_frequency,
            total_cost: Money::zero(currency.clone()),
            currency,
            calculation_date,
            countries: Vec::new(),
            discounts: Vec::new(),
            applied_discounts: Vec::new(),
            status: CalculationStatus::Draft,
            is_archived: false,
        })
    }

    pub fn calculation_id(&self) -> &str {
        &self.calculation_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn transaction_volume(&self) -> u32 {
        self.transaction_volume
    }

    pub fn filing_frequency(&self) -> FilingFrequency {
        self.filing_frequency
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn currency_code(&self) -> &str {
        self.currency.as_str()
    }

    pub fn calculation_date(&self) -> NaiveDate {
        self.calculation_date
    }

    pub fn total_cost(&self) -> &Money {
        &self.total_cost
    }

    pub fn countries(&self) -> &[CalculationCountry] {
        &self.countries
    }

    pub fn country(&self, country_code: &str) -> Option<&CalculationCountry> {
        self.countries
            .iter()
            .find(|c| c.country_code.eq_ignore_ascii_case(country_code))
    }

    /// Recorded discounts (name → percentage) in insertion order.
    pub fn discounts(&self) -> &[(String, Decimal)] {
        &self.discounts
    }

    pub fn discount(&self, name: &str) -> Option<Decimal> {
        self.discounts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, pct)| *pct)
    }

    /// Every discount application in order, including re-applications of
    /// the same name.
    pub fn applied_discounts(&self) -> &[DiscountApplication] {
        &self.applied_discounts
    }

    /// Sum of the country costs before any discount.
    pub fn subtotal(&self) -> Result<Money, CalculationError> {
        self.countries
            .iter()
            .try_fold(Money::zero(self.currency.clone()), |sum, c| {
                sum.add(&c.country_cost)
            })
            .map_err(Into::into)
    }

    pub fn status(&self) -> CalculationStatus {
        self.status
    }

    pub fn is_archived(&self) -> bool {
        self.is_archived
    }

    fn ensure_mutable(&self) -> Result<(), CalculationError> {
        if self.is_archived {
            return Err(CalculationError::InvalidOperation(
                "calculation is archived".into(),
            ));
        }
        if self.status == CalculationStatus::Finalized {
            return Err(CalculationError::InvalidOperation(
                "calculation is finalized".into(),
            ));
        }
        Ok(())
    }

    fn ensure_countries_open(&self) -> Result<(), CalculationError> {
        if !self.applied_discounts.is_empty() {
            return Err(CalculationError::InvalidOperation(
                "countries cannot change once discounts have been applied".into(),
            ));
        }
        Ok(())
    }

    /// Add a country without rule trace.
    pub fn add_country(&mut self, country_code: &str, cost: Money) -> Result<(), CalculationError> {
        self.add_country_with_rules(country_code, cost, Vec::new())
    }

    /// Add a priced country and fold its cost into the total.
    pub fn add_country_with_rules(
        &mut self,
        country_code: &str,
        cost: Money,
        applied_rules: Vec<String>,
    ) -> Result<(), CalculationError> {
        self.ensure_mutable()?;
        let country_code = normalize_country_code(country_code)?;
        self.total_cost.ensure_same_currency(&cost)?;
        if cost.is_negative() {
            return Err(CalculationError::Validation(format!(
                "cost for {country_code} must not be negative ({cost})"
            )));
        }
        if self.country(&country_code).is_some() {
            return Err(CalculationError::InvalidOperation(format!(
                "country {country_code} is already part of the calculation"
            )));
        }
        self.ensure_countries_open()?;

        let total = self.total_cost.add(&cost)?;
        self.countries.push(CalculationCountry {
            calculation_id: self.calculation_id.clone(),
            country_code,
            country_cost: cost,
            applied_rules,
        });
        self.total_cost = total;
        Ok(())
    }

    /// Remove a country and subtract its cost from the total.
    pub fn remove_country(
        &mut self,
        country_code: &str,
    ) -> Result<CalculationCountry, CalculationError> {
        self.ensure_mutable()?;
        let country_code = normalize_country_code(country_code)?;
        let Some(index) = self
            .countries
            .iter()
            .position(|c| c.country_code == country_code)
        else {
            return Err(CalculationError::InvalidOperation(format!(
                "country {country_code} is not part of the calculation"
            )));
        };
        self.ensure_countries_open()?;

        let total = self
            .total_cost
            .subtract(&self.countries[index].country_cost)?;
        let removed = self.countries.remove(index);
        self.total_cost = total;
        Ok(removed)
    }

    /// Discount the current total by `percentage` percent.
    ///
    /// Re-adding an existing name overwrites its recorded percentage and
    /// compounds again on the current total; earlier applications are not
    /// reprocessed.
    pub fn add_discount(
        &mut self,
        name: &str,
        percentage: Decimal,
    ) -> Result<DiscountApplication, CalculationError> {
        self.ensure_mutable()?;
        let application = apply_discount(&self.total_cost, name, percentage)?;

        match self
            .discounts
            .iter_mut()
            .find(|(n, _)| *n == application.name)
        {
            Some(entry) => entry.1 = percentage,
            None => self.discounts.push((application.name.clone(), percentage)),
        }
        self.total_cost = application.discounted_total.clone();
        self.applied_discounts.push(application.clone());
        Ok(application)
    }

    /// Re-derive the total from scratch: zero, plus every country cost,
    /// then every discount application in order.
    pub fn recalculate_total_cost(&self) -> Result<Money, CalculationError> {
        let (total, _) = apply_discounts(
            &self.subtotal()?,
            self.applied_discounts
                .iter()
                .map(|d| (d.name.as_str(), d.percentage)),
        )?;
        Ok(total)
    }

    /// Whether the maintained total matches a fresh recalculation.
    pub fn is_consistent(&self) -> bool {
        self.recalculate_total_cost()
            .is_ok_and(|total| total == self.total_cost)
    }

    /// Verify the total and freeze the calculation.
    pub fn finalize(&mut self) -> Result<(), CalculationError> {
        self.ensure_mutable()?;
        if self.countries.is_empty() {
            return Err(CalculationError::InvalidOperation(
                "cannot finalize a calculation without countries".into(),
            ));
        }
        let recalculated = self.recalculate_total_cost()?;
        if recalculated != self.total_cost {
            return Err(CalculationError::InvalidOperation(format!(
                "total {} does not match recalculated {recalculated}",
                self.total_cost
            )));
        }
        self.status = CalculationStatus::Finalized;
        Ok(())
    }

    pub fn archive(&mut self) -> Result<(), CalculationError> {
        if self.is_archived {
            return Err(CalculationError::InvalidOperation(
                "calculation is already archived".into(),
            ));
        }
        self.is_archived = true;
        Ok(())
    }

    pub fn unarchive(&mut self) -> Result<(), CalculationError> {
        if !self.is_archived {
            return Err(CalculationError::InvalidOperation(
                "calculation is not archived".into(),
            ));
        }
        self.is_archived = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn eur(amount: Decimal) -> Money {
        Money::new(amount, "EUR").unwrap()
    }

    fn calculation() -> Calculation {
        Calculation::new(
            "user-1",
            "standard",
            100,
            FilingFrequency::Quarterly,
            "EUR",
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn factory_validates() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let monthly = FilingFrequency::Monthly;
        assert!(Calculation::new("", "s", 1, monthly, "EUR", date).is_err());
        assert!(Calculation::new("u", " ", 1, monthly, "EUR", date).is_err());
        assert!(Calculation::new("u", "s", 0, monthly, "EUR", date).is_err());
        assert!(Calculation::new("u", "s", 1, monthly, "EURO", date).is_err());
        let calc = Calculation::new("u", "s", 1, monthly, "eur", date).unwrap();
        assert_eq!(calc.currency_code(), "EUR");
        assert!(calc.total_cost().is_zero());
        assert_eq!(calc.status(), CalculationStatus::Draft);
    }

    #[test]
    fn countries_accumulate_and_remove() {
        let mut calc = calculation();
        calc.add_country("gb", eur(dec!(1500))).unwrap();
        calc.add_country_with_rules("DE", eur(dec!(1250)), vec!["DE-1".into()])
            .unwrap();
        assert_eq!(calc.total_cost(), &eur(dec!(2750)));
        assert_eq!(calc.country("GB").unwrap().calculation_id(), calc.calculation_id());
        assert_eq!(calc.country("DE").unwrap().applied_rules(), ["DE-1"]);

        let removed = calc.remove_country("GB").unwrap();
        assert_eq!(removed.country_cost(), &eur(dec!(1500)));
        assert_eq!(calc.total_cost(), &eur(dec!(1250)));
        assert!(calc.is_consistent());

        assert!(matches!(
            calc.remove_country("GB"),
            Err(CalculationError::InvalidOperation(_))
        ));
    }

    #[test]
    fn duplicate_country_leaves_total_unchanged() {
        let mut calc = calculation();
        calc.add_country("GB", eur(dec!(200))).unwrap();
        let err = calc.add_country("gb", eur(dec!(300))).unwrap_err();
        assert!(matches!(err, CalculationError::InvalidOperation(_)));
        assert_eq!(calc.total_cost(), &eur(dec!(200)));
        assert_eq!(calc.countries().len(), 1);
    }

    #[test]
    fn currency_mismatch_is_rejected_before_mutation() {
        let mut calc = calculation();
        let err = calc
            .add_country("GB", Money::new(dec!(10), "GBP").unwrap())
            .unwrap_err();
        assert_eq!(
            err,
            CalculationError::CurrencyMismatch {
                expected: "EUR".into(),
                found: "GBP".into()
            }
        );
        assert!(calc.countries().is_empty());
        assert!(calc.total_cost().is_zero());
    }

    #[test]
    fn overflowing_country_leaves_total_unchanged() {
        let mut calc = calculation();
        calc.add_country("GB", eur(Decimal::MAX)).unwrap();
        let err = calc.add_country("DE", eur(Decimal::MAX)).unwrap_err();
        assert!(matches!(err, CalculationError::Overflow(_)));
        assert_eq!(calc.countries().len(), 1);
        assert_eq!(calc.total_cost(), &eur(Decimal::MAX));
        assert_eq!(calc.subtotal().unwrap(), eur(Decimal::MAX));
        assert!(calc.is_consistent());
    }

    #[test]
    fn negative_cost_rejected() {
        let mut calc = calculation();
        assert!(calc.add_country("GB", eur(dec!(-1))).is_err());
        assert!(calc.countries().is_empty());
    }

    #[test]
    fn discounts_compound_and_recalculate() {
        let mut calc = calculation();
        calc.add_country("GB", eur(dec!(1000))).unwrap();
        calc.add_discount("First", dec!(10)).unwrap();
        calc.add_discount("Second", dec!(10)).unwrap();
        assert_eq!(calc.total_cost(), &eur(dec!(810)));
        assert_eq!(calc.recalculate_total_cost().unwrap(), eur(dec!(810)));
        assert_eq!(
            calc.recalculate_total_cost().unwrap(),
            calc.recalculate_total_cost().unwrap()
        );
    }

    #[test]
    fn re_adding_discount_overwrites_percentage_and_compounds() {
        let mut calc = calculation();
        calc.add_country("GB", eur(dec!(1000))).unwrap();
        calc.add_discount("Promo", dec!(10)).unwrap();
        calc.add_discount("Other", dec!(50)).unwrap();
        calc.add_discount("Promo", dec!(20)).unwrap();

        assert_eq!(
            calc.discounts(),
            [
                ("Promo".to_string(), dec!(20)),
                ("Other".to_string(), dec!(50))
            ]
        );
        assert_eq!(calc.applied_discounts().len(), 3);
        // 1000 * 0.9 * 0.5 * 0.8
        assert_eq!(calc.total_cost(), &eur(dec!(360)));
        assert!(calc.is_consistent());
    }

    #[test]
    fn failed_discount_changes_nothing() {
        let mut calc = calculation();
        calc.add_country("GB", eur(dec!(1000))).unwrap();
        assert!(calc.add_discount("Huge", dec!(101)).is_err());
        assert!(calc.add_discount("", dec!(5)).is_err());
        assert!(calc.discounts().is_empty());
        assert_eq!(calc.total_cost(), &eur(dec!(1000)));
    }

    #[test]
    fn countries_frozen_after_discount() {
        let mut calc = calculation();
        calc.add_country("GB", eur(dec!(1000))).unwrap();
        calc.add_discount("Promo", dec!(10)).unwrap();
        assert!(calc.add_country("DE", eur(dec!(5))).is_err());
        assert!(calc.remove_country("GB").is_err());
        assert_eq!(calc.total_cost(), &eur(dec!(900)));
    }

    #[test]
    fn finalize_and_archive() {
        let mut calc = calculation();
        assert!(calc.finalize().is_err());
        calc.add_country("GB", eur(dec!(100))).unwrap();
        calc.finalize().unwrap();
        assert_eq!(calc.status(), CalculationStatus::Finalized);
        assert!(calc.add_country("DE", eur(dec!(1))).is_err());
        assert!(calc.add_discount("Late", dec!(1)).is_err());

        calc.archive().unwrap();
        assert!(calc.is_archived());
        assert!(calc.archive().is_err());
        assert_eq!(calc.total_cost(), &eur(dec!(100)));
        calc.unarchive().unwrap();
        assert!(calc.unarchive().is_err());
    }

    #[test]
    fn archived_draft_is_read_only() {
        let mut calc = calculation();
        calc.add_country("GB", eur(dec!(100))).unwrap();
        calc.archive().unwrap();
        assert!(calc.add_country("DE", eur(dec!(1))).is_err());
        assert!(calc.remove_country("GB").is_err());
        assert!(calc.add_discount("X", dec!(1)).is_err());
        calc.unarchive().unwrap();
        calc.add_country("DE", eur(dec!(1))).unwrap();
        assert_eq!(calc.total_cost(), &eur(dec!(101)));
    }
}
