//! # vatcost
//!
//! Cost estimation for VAT-filing services across several jurisdictions.
//! A [`CalculationRequest`](core::CalculationRequest) names a service tier,
//! a transaction volume, a filing frequency and the countries to file in;
//! the pricing engine evaluates each country's pricing rules, sums the
//! country costs and applies compounding discounts.
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating point.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use rust_decimal_macros::dec;
//! use vatcost::core::*;
//! use vatcost::pricing::{DiscountCriterion, DiscountPolicy, EngineConfig, PricingEngine};
//! use vatcost::rules::{InMemoryRuleRepository, RuleBuilder, RuleType};
//!
//! let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let rules = InMemoryRuleRepository::new()
//!     .with_rule(RuleBuilder::new("GB", RuleType::VatRate, "UK", "basePrice * 1.5", from).build().unwrap())
//!     .with_rule(RuleBuilder::new("DE", RuleType::VatRate, "DE", "basePrice * 1.25", from).build().unwrap());
//! let config = EngineConfig::default().with_discount_policy(DiscountPolicy::new(
//!     "Volume Discount",
//!     dec!(10),
//!     DiscountCriterion::MinCountries(2),
//! ));
//! let engine = PricingEngine::with_config(rules, InMemoryCountryRepository::european(), config);
//!
//! let request = CalculationRequest::builder(ServiceType::Standard, 250, FilingFrequency::Quarterly)
//!     .countries(["GB", "DE"])
//!     .currency("EUR")
//!     .calculation_date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
//!     .build()
//!     .unwrap();
//!
//! let model = engine.calculate(&request).unwrap();
//! assert_eq!(model.subtotal, dec!(2750));
//! assert_eq!(model.total_cost, dec!(2475));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` | Money, countries, request types and validation |
//! | `rules` | Pricing rules, expression language, rule evaluator |
//! | `pricing` (default) | Country pricing, discounts, calculation aggregate, engine |
//! | `parallel` | Price countries on the rayon thread pool |
//! | `json` | Load rule sets and engine configuration from JSON |
//! | `all` | Everything |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "rules")]
pub mod rules;

#[cfg(feature = "pricing")]
pub mod pricing;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
