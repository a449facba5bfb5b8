//! Percentage discounts applied to a running total.
//!
//! Discounts compound: each one is computed against the total left over
//! by the previous one, in the order they are applied.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::core::{CalculationError, Money};

/// Outcome of applying one discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountApplication {
    pub name: String,
    /// Percentage in `0..=100`.
    pub percentage: Decimal,
    /// Amount taken off the total.
    pub discount_amount: Money,
    /// Total after the discount.
    pub discounted_total: Money,
}

/// Check a discount's name and percentage without applying it.
pub fn validate_discount(name: &str, percentage: Decimal) -> Result<(), CalculationError> {
    if name.trim().is_empty() {
        return Err(CalculationError::InvalidOperation(
            "discount name must not be empty".into(),
        ));
    }
    if percentage < Decimal::ZERO || percentage > dec!(100) {
        return Err(CalculationError::InvalidOperation(format!(
            "discount '{name}' percentage {percentage} is outside 0..=100"
        )));
    }
    Ok(())
}

/// Apply `percentage` percent off `total`.
///
/// ```
/// use rust_decimal_macros::dec;
/// use vatcost::core::Money;
/// use vatcost::pricing::apply_discount;
///
/// let total = Money::new(dec!(2750), "EUR").unwrap();
/// let applied = apply_discount(&total, "Volume Discount", dec!(10)).unwrap();
/// assert_eq!(applied.discount_amount.amount(), dec!(275));
/// assert_eq!(applied.discounted_total.amount(), dec!(2475));
/// ```
pub fn apply_discount(
    total: &Money,
    name: &str,
    percentage: Decimal,
) -> Result<DiscountApplication, CalculationError> {
    validate_discount(name, percentage)?;
    if total.is_negative() {
        return Err(CalculationError::InvalidOperation(format!(
            "cannot discount a negative total ({total})"
        )));
    }
    let discount_amount = total.multiply(percentage / dec!(100))?;
    let discounted_total = total.subtract(&discount_amount)?;
    Ok(DiscountApplication {
        name: name.trim().to_string(),
        percentage,
        discount_amount,
        discounted_total,
    })
}

/// Apply several discounts in order, each against the already discounted
/// total. Returns the final total and one application per discount.
pub fn apply_discounts<'a, I>(
    total: &Money,
    discounts: I,
) -> Result<(Money, Vec<DiscountApplication>), CalculationError>
where
    I: IntoIterator<Item = (&'a str, Decimal)>,
{
    let mut running = total.clone();
    let mut applied = Vec::new();
    for (name, percentage) in discounts {
        let application = apply_discount(&running, name, percentage)?;
        running = application.discounted_total.clone();
        applied.push(application);
    }
    Ok((running, applied))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eur(amount: Decimal) -> Money {
        Money::new(amount, "EUR").unwrap()
    }

    #[test]
    fn single_discount() {
        let applied = apply_discount(&eur(dec!(1000)), "Loyalty", dec!(15)).unwrap();
        assert_eq!(applied.discount_amount, eur(dec!(150)));
        assert_eq!(applied.discounted_total, eur(dec!(850)));
        assert_eq!(applied.name, "Loyalty");
    }

    #[test]
    fn discounts_compound() {
        let (total, applied) = apply_discounts(
            &eur(dec!(1000)),
            [("First", dec!(10)), ("Second", dec!(10))],
        )
        .unwrap();
        assert_eq!(total, eur(dec!(810)));
        assert_ne!(total, eur(dec!(800)));
        assert_eq!(applied[1].discount_amount, eur(dec!(90)));
    }

    #[test]
    fn boundaries() {
        assert_eq!(
            apply_discount(&eur(dec!(80)), "Free", dec!(100))
                .unwrap()
                .discounted_total,
            eur(dec!(0))
        );
        assert_eq!(
            apply_discount(&eur(dec!(80)), "None", dec!(0))
                .unwrap()
                .discounted_total,
            eur(dec!(80))
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            apply_discount(&eur(dec!(100)), "Too much", dec!(100.01)),
            Err(CalculationError::InvalidOperation(_))
        ));
        assert!(apply_discount(&eur(dec!(100)), "Negative", dec!(-1)).is_err());
        assert!(apply_discount(&eur(dec!(100)), "  ", dec!(5)).is_err());
        assert!(apply_discount(&eur(dec!(-100)), "Neg total", dec!(5)).is_err());
    }
}
