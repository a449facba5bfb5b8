use std::collections::HashSet;

use super::countries::normalize_country_code;
use super::currencies::is_known_currency_code;
use super::error::ValidationError;
use super::money::CurrencyCode;
use super::types::CalculationRequest;

/// Upper bound on countries in one request.
pub const MAX_COUNTRIES: usize = 250;

/// Upper bound on additional services in one request.
pub const MAX_ADDITIONAL_SERVICES: usize = 100;

/// Whether `name` matches `[A-Za-z][A-Za-z0-9_]*`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Validate a calculation request.
/// Returns all validation errors found (not just the first).
pub fn validate_request(request: &CalculationRequest) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if request.user_id.trim().is_empty() {
        errors.push(ValidationError::new("user_id", "user id must not be empty"));
    }

    if request.transaction_volume == 0 {
        errors.push(ValidationError::new(
            "transaction_volume",
            "transaction volume must be positive",
        ));
    }

    if request.country_codes.is_empty() {
        errors.push(ValidationError::new(
            "country_codes",
            "at least one country code is required",
        ));
    } else if request.country_codes.len() > MAX_COUNTRIES {
        errors.push(ValidationError::new(
            "country_codes",
            format!("cannot price more than {MAX_COUNTRIES} countries at once"),
        ));
    }

    let mut seen = HashSet::new();
    for (i, code) in request.country_codes.iter().enumerate() {
        match normalize_country_code(code) {
            Ok(normalized) => {
                if !seen.insert(normalized.clone()) {
                    errors.push(ValidationError::new(
                        format!("country_codes[{i}]"),
                        format!("duplicate country code '{normalized}'"),
                    ));
                }
            }
            Err(_) => errors.push(ValidationError::new(
                format!("country_codes[{i}]"),
                format!("'{code}' is not a 2-letter country code"),
            )),
        }
    }

    if let Some(currency) = &request.currency_code {
        match CurrencyCode::parse(currency) {
            Ok(code) if !is_known_currency_code(code.as_str()) => {
                errors.push(ValidationError::new(
                    "currency_code",
                    format!("currency code '{code}' is not a known ISO 4217 code"),
                ));
            }
            Ok(_) => {}
            Err(_) => errors.push(ValidationError::new(
                "currency_code",
                "currency code must be 3 letters (ISO 4217)",
            )),
        }
    }

    if request.additional_services.len() > MAX_ADDITIONAL_SERVICES {
        errors.push(ValidationError::new(
            "additional_services",
            format!("cannot request more than {MAX_ADDITIONAL_SERVICES} additional services"),
        ));
    }
    for (i, service) in request.additional_services.iter().enumerate() {
        if service.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("additional_services[{i}]"),
                "service identifier must not be empty",
            ));
        }
    }

    for name in request.parameters.keys() {
        if !is_identifier(name) {
            errors.push(ValidationError::new(
                format!("parameters.{name}"),
                "parameter names must match [A-Za-z][A-Za-z0-9_]*",
            ));
        }
    }

    errors
}

/// Normalize codes in a request that already passed [`validate_request`].
pub(crate) fn normalize_request(mut request: CalculationRequest) -> CalculationRequest {
    request.user_id = request.user_id.trim().to_string();
    request.country_codes = request
        .country_codes
        .iter()
        .map(|c| c.trim().to_ascii_uppercase())
        .collect();
    request.currency_code = request
        .currency_code
        .map(|c| c.trim().to_ascii_uppercase());
    request.additional_services = request
        .additional_services
        .iter()
        .map(|s| s.trim().to_string())
        .collect();
    request
}
