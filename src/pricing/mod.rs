//! Country pricing, discounts and the calculation aggregate.
//!
//! [`PricingEngine::calculate`] is the entry point. The building blocks are
//! public as well: [`CountryCostCalculator`] prices one country,
//! [`apply_discount`] applies one compounding discount, and [`Calculation`]
//! keeps the running total consistent while countries and discounts are
//! added.

mod calculation;
mod config;
mod country;
mod discount;
mod engine;
mod model;

pub use calculation::{Calculation, CalculationCountry, CalculationStatus};
pub use config::{DiscountCriterion, DiscountPolicy, EngineConfig, ServiceTier};
pub use country::{CountryCostCalculator, CountryPricing, PricingInput};
pub use discount::{DiscountApplication, apply_discount, apply_discounts, validate_discount};
pub use engine::PricingEngine;
pub use model::{CalculationModel, CountryBreakdown, DiscountLine};
