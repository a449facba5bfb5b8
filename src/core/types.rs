use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::CalculationError;

/// Service tier ordered by the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    /// Routine filings with standard turnaround.
    Standard,
    /// Filings with complex transaction mixes (e.g. distance sales, OSS).
    Complex,
    /// Expedited handling.
    Priority,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "Standard",
            Self::Complex => "Complex",
            Self::Priority => "Priority",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = CalculationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "complex" => Ok(Self::Complex),
            "priority" => Ok(Self::Priority),
            other => Err(CalculationError::Validation(format!(
                "unknown service type '{other}'"
            ))),
        }
    }
}

/// How often VAT returns are filed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilingFrequency {
    Monthly,
    Quarterly,
    Annually,
}

impl FilingFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "Monthly",
            Self::Quarterly => "Quarterly",
            Self::Annually => "Annually",
        }
    }

    /// Number of returns per calendar year.
    pub fn filings_per_year(&self) -> u32 {
        match self {
            Self::Monthly => 12,
            Self::Quarterly => 4,
            Self::Annually => 1,
        }
    }
}

impl fmt::Display for FilingFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilingFrequency {
    type Err = CalculationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "annually" | "annual" | "yearly" => Ok(Self::Annually),
            other => Err(CalculationError::Validation(format!(
                "unknown filing frequency '{other}'"
            ))),
        }
    }
}

/// Input to a cost calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationRequest {
    /// Identifier of the requesting user.
    pub user_id: String,
    pub service_type: ServiceType,
    /// Expected number of transactions per filing period.
    pub transaction_volume: u32,
    pub frequency: FilingFrequency,
    /// Countries to price, as ISO 3166-1 alpha-2 codes.
    pub country_codes: Vec<String>,
    /// Free-text identifiers of extra services (e.g. "fiscal-representation").
    pub additional_services: Vec<String>,
    /// Calculation currency; the engine default applies when absent.
    pub currency_code: Option<String>,
    /// Date rules are evaluated against; today when absent.
    pub calculation_date: Option<NaiveDate>,
    /// Values for rule-declared parameters, keyed by parameter name.
    pub parameters: BTreeMap<String, String>,
}

impl CalculationRequest {
    pub fn builder(
        service_type: ServiceType,
        transaction_volume: u32,
        frequency: FilingFrequency,
    ) -> super::CalculationRequestBuilder {
        super::CalculationRequestBuilder::new(service_type, transaction_volume, frequency)
    }
}
