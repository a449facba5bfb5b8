//! Engine configuration: service tiers, discount policies and behaviour
//! switches.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::core::{CalculationError, CalculationRequest, FilingFrequency, ServiceType};

/// Price list entry for one service tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTier {
    pub service_type: ServiceType,
    /// Identifier stored on the calculation.
    pub service_id: String,
    /// Starting value of `basePrice` for every country.
    pub base_price: Decimal,
}

impl ServiceTier {
    pub fn new(service_type: ServiceType, service_id: impl Into<String>, base_price: Decimal) -> Self {
        Self {
            service_type,
            service_id: service_id.into(),
            base_price,
        }
    }
}

/// When a [`DiscountPolicy`] applies to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum DiscountCriterion {
    /// At least this many countries were requested.
    MinCountries(usize),
    /// Transaction volume is at least this value.
    MinTransactionVolume(u32),
    Frequency(FilingFrequency),
    ServiceType(ServiceType),
    /// The additional service was requested (case-insensitive).
    AdditionalService(String),
}

impl DiscountCriterion {
    pub fn matches(&self, request: &CalculationRequest) -> bool {
        match self {
            Self::MinCountries(n) => request.country_codes.len() >= *n,
            Self::MinTransactionVolume(v) => request.transaction_volume >= *v,
            Self::Frequency(f) => request.frequency == *f,
            Self::ServiceType(t) => request.service_type == *t,
            Self::AdditionalService(id) => request
                .additional_services
                .iter()
                .any(|s| s.trim().eq_ignore_ascii_case(id.trim())),
        }
    }
}

/// A named discount the engine applies automatically when its criterion
/// matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountPolicy {
    pub name: String,
    pub percentage: Decimal,
    pub criterion: DiscountCriterion,
}

impl DiscountPolicy {
    pub fn new(name: impl Into<String>, percentage: Decimal, criterion: DiscountCriterion) -> Self {
        Self {
            name: name.into(),
            percentage,
            criterion,
        }
    }
}

/// Settings for a [`PricingEngine`](super::PricingEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Currency used when neither the request nor the requested countries
    /// determine one.
    pub currency_code: String,
    pub service_tiers: Vec<ServiceTier>,
    /// Applied in order after all countries are priced.
    pub discount_policies: Vec<DiscountPolicy>,
    /// Abort the whole calculation when any country cannot be priced.
    pub fail_on_unknown_country: bool,
    /// Price countries on the rayon pool. Only honoured with the
    /// `parallel` feature.
    pub parallel: bool,
    /// Decimal places for amounts in the output model, used when the
    /// currency's minor units are unknown.
    pub rounding_dp: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            currency_code: "EUR".to_string(),
            service_tiers: vec![
                ServiceTier::new(ServiceType::Standard, "standard", dec!(1000)),
                ServiceTier::new(ServiceType::Complex, "complex", dec!(1500)),
                ServiceTier::new(ServiceType::Priority, "priority", dec!(2000)),
            ],
            discount_policies: Vec::new(),
            fail_on_unknown_country: false,
            parallel: false,
            rounding_dp: 2,
        }
    }
}

impl EngineConfig {
    pub fn tier(&self, service_type: ServiceType) -> Option<&ServiceTier> {
        self.service_tiers
            .iter()
            .find(|t| t.service_type == service_type)
    }

    pub fn with_discount_policy(mut self, policy: DiscountPolicy) -> Self {
        self.discount_policies.push(policy);
        self
    }

    pub fn with_service_tier(mut self, tier: ServiceTier) -> Self {
        self.service_tiers.retain(|t| t.service_type != tier.service_type);
        self.service_tiers.push(tier);
        self
    }

    /// Check the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<(), CalculationError> {
        crate::core::CurrencyCode::parse(&self.currency_code)?;
        for tier in &self.service_tiers {
            if tier.service_id.trim().is_empty() {
                return Err(CalculationError::Validation(format!(
                    "service tier {} has an empty service id",
                    tier.service_type
                )));
            }
            if tier.base_price.is_sign_negative() {
                return Err(CalculationError::Validation(format!(
                    "service tier {} has a negative base price",
                    tier.service_type
                )));
            }
        }
        for policy in &self.discount_policies {
            super::discount::validate_discount(&policy.name, policy.percentage)
                .map_err(|e| CalculationError::Validation(e.to_string()))?;
        }
        Ok(())
    }

    /// Parse a configuration from JSON; missing fields take their defaults.
    #[cfg(feature = "json")]
    pub fn from_json(json: &str) -> Result<Self, CalculationError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CalculationError::Validation(format!("invalid engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}
