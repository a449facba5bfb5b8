//! Core value types: money, countries, request types and validation.
//!
//! Everything here is free of pricing logic; the `rules` and `pricing`
//! modules build on these types.

mod builder;
pub mod countries;
pub mod currencies;
mod error;
mod money;
mod types;
mod validation;

pub use builder::*;
pub use countries::{Country, CountryRepository, InMemoryCountryRepository};
pub use error::*;
pub use money::*;
pub use types::*;
pub use validation::{MAX_ADDITIONAL_SERVICES, MAX_COUNTRIES, is_identifier, validate_request};
pub(crate) use error::join_validation_errors;
pub(crate) use validation::normalize_request;
