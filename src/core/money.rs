//! Currency-tagged decimal amounts.

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::error::{CalculationError, CurrencyMismatch, MoneyError};

/// ISO 4217 style currency code: exactly three ASCII letters, uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Validate and normalize a currency code.
    pub fn parse(code: &str) -> Result<Self, CalculationError> {
        let trimmed = code.trim();
        if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CalculationError::Validation(format!(
                "currency code '{code}' must be exactly 3 letters"
            )));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = CalculationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable monetary amount tagged with its currency.
///
/// Arithmetic between two values is only defined for equal currencies;
/// mixing currencies returns [`MoneyError::CurrencyMismatch`]. Results that
/// leave the `Decimal` range return [`MoneyError::Overflow`].
///
/// ```
/// use vatcost::core::Money;
/// use rust_decimal_macros::dec;
///
/// let net = Money::new(dec!(1000), "gbp").unwrap();
/// let vat = net.multiply(dec!(0.20)).unwrap();
/// assert_eq!(vat.amount(), dec!(200));
/// assert_eq!(vat.currency_code(), "GBP");
/// assert!(net.add(&Money::new(dec!(1), "EUR").unwrap()).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: CurrencyCode,
}

impl Money {
    /// Create a money value, validating the currency code.
    pub fn new(amount: Decimal, currency_code: &str) -> Result<Self, CalculationError> {
        Ok(Self {
            amount,
            currency: CurrencyCode::parse(currency_code)?,
        })
    }

    /// Create a money value from an already validated currency.
    pub fn of(amount: Decimal, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: CurrencyCode) -> Self {
        Self::of(Decimal::ZERO, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn currency_code(&self) -> &str {
        self.currency.as_str()
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    /// Fails unless `other` carries the same currency.
    pub fn ensure_same_currency(&self, other: &Money) -> Result<(), CurrencyMismatch> {
        if self.currency != other.currency {
            return Err(CurrencyMismatch {
                expected: self.currency.to_string(),
                found: other.currency.to_string(),
            });
        }
        Ok(())
    }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        self.amount
            .checked_add(other.amount)
            .map(|amount| Self::of(amount, self.currency.clone()))
            .ok_or_else(|| MoneyError::Overflow(format!("{self} + {other}")))
    }

    pub fn subtract(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        self.amount
            .checked_sub(other.amount)
            .map(|amount| Self::of(amount, self.currency.clone()))
            .ok_or_else(|| MoneyError::Overflow(format!("{self} - {other}")))
    }

    /// Scale by a dimensionless factor (a rate or a discount fraction).
    pub fn multiply(&self, factor: Decimal) -> Result<Money, MoneyError> {
        self.amount
            .checked_mul(factor)
            .map(|amount| Self::of(amount, self.currency.clone()))
            .ok_or_else(|| MoneyError::Overflow(format!("{self} * {factor}")))
    }

    /// Round to `dp` decimal places using half-up (commercial rounding).
    pub fn round_half_up(&self, dp: u32) -> Money {
        Self::of(round_half_up(self.amount, dp), self.currency.clone())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}", self.currency, self.amount)
    }
}

/// Round a Decimal to `dp` decimal places using half-up (commercial rounding).
pub fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}
