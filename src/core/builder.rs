use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::error::{CalculationError, join_validation_errors};
use super::types::*;
use super::validation;

/// Builder for calculation requests.
///
/// ```
/// use vatcost::core::*;
///
/// let request = CalculationRequestBuilder::new(ServiceType::Standard, 250, FilingFrequency::Quarterly)
///     .user("user-42")
///     .country("GB")
///     .country("DE")
///     .additional_service("fiscal-representation")
///     .currency("EUR")
///     .build()
///     .unwrap();
/// assert_eq!(request.country_codes, vec!["GB", "DE"]);
/// ```
pub struct CalculationRequestBuilder {
    user_id: String,
    service_type: ServiceType,
    transaction_volume: u32,
    frequency: FilingFrequency,
    country_codes: Vec<String>,
    additional_services: Vec<String>,
    currency_code: Option<String>,
    calculation_date: Option<NaiveDate>,
    parameters: BTreeMap<String, String>,
}

impl CalculationRequestBuilder {
    pub fn new(
        service_type: ServiceType,
        transaction_volume: u32,
        frequency: FilingFrequency,
    ) -> Self {
        Self {
            user_id: "anonymous".to_string(),
            service_type,
            transaction_volume,
            frequency,
            country_codes: Vec::new(),
            additional_services: Vec::new(),
            currency_code: None,
            calculation_date: None,
            parameters: BTreeMap::new(),
        }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn country(mut self, code: impl Into<String>) -> Self {
        self.country_codes.push(code.into());
        self
    }

    pub fn countries<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.country_codes.extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn additional_service(mut self, service: impl Into<String>) -> Self {
        self.additional_services.push(service.into());
        self
    }

    pub fn currency(mut self, code: impl Into<String>) -> Self {
        self.currency_code = Some(code.into());
        self
    }

    pub fn calculation_date(mut self, date: NaiveDate) -> Self {
        self.calculation_date = Some(date);
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Build the request, normalizing country and currency codes and
    /// reporting every validation problem at once.
    pub fn build(self) -> Result<CalculationRequest, CalculationError> {
        let request = self.build_unchecked();
        let errors = validation::validate_request(&request);
        if !errors.is_empty() {
            return Err(join_validation_errors(&errors));
        }
        Ok(validation::normalize_request(request))
    }

    /// Build without validation, e.g. to exercise the engine's own checks.
    pub fn build_unchecked(self) -> CalculationRequest {
        CalculationRequest {
            user_id: self.user_id,
            service_type: self.service_type,
            transaction_volume: self.transaction_volume,
            frequency: self.frequency,
            country_codes: self.country_codes,
            additional_services: self.additional_services,
            currency_code: self.currency_code,
            calculation_date: self.calculation_date,
            parameters: self.parameters,
        }
    }
}
