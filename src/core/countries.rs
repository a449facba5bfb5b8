//! Country lookup: ISO 3166-1 alpha-2 validation and the country
//! repository collaborator that supplies display names and default
//! currencies.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::CalculationError;
use super::money::CurrencyCode;

/// Check whether `code` is an assigned ISO 3166-1 alpha-2 country code.
pub fn is_known_country_code(code: &str) -> bool {
    COUNTRY_CODES.binary_search(&code).is_ok()
}

/// Normalize a request-supplied country code: trims and uppercases, and
/// checks that the result is two ASCII letters.
pub fn normalize_country_code(code: &str) -> Result<String, CalculationError> {
    let trimmed = code.trim();
    if trimmed.len() != 2 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(CalculationError::Validation(format!(
            "country code '{code}' must be exactly 2 letters"
        )));
    }
    Ok(trimmed.to_ascii_uppercase())
}

/// A jurisdiction the service can file in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    code: String,
    name: String,
    currency: CurrencyCode,
    is_active: bool,
}

impl Country {
    /// Create an active country. The code must be an assigned ISO 3166-1
    /// alpha-2 code.
    pub fn new(
        code: &str,
        name: impl Into<String>,
        currency_code: &str,
    ) -> Result<Self, CalculationError> {
        let code = normalize_country_code(code)?;
        if !is_known_country_code(&code) {
            return Err(CalculationError::Validation(format!(
                "'{code}' is not an ISO 3166-1 alpha-2 code"
            )));
        }
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CalculationError::Validation(format!(
                "country {code} must have a name"
            )));
        }
        Ok(Self {
            code,
            name,
            currency: CurrencyCode::parse(currency_code)?,
            is_active: true,
        })
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }
}

/// Source of country master data.
pub trait CountryRepository: Send + Sync {
    /// Look up a country by its (normalized) alpha-2 code.
    fn get_by_code(&self, code: &str) -> Result<Option<Country>, CalculationError>;
}

/// Country repository backed by an in-memory table.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCountryRepository {
    countries: BTreeMap<String, Country>,
}

impl InMemoryCountryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a country.
    pub fn insert(&mut self, country: Country) {
        self.countries.insert(country.code.clone(), country);
    }

    pub fn with_country(mut self, country: Country) -> Self {
        self.insert(country);
        self
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }

    /// EU member states plus the UK, Switzerland and Norway.
    pub fn european() -> Self {
        let mut repo = Self::new();
        for (code, name, currency) in EUROPEAN_COUNTRIES {
            if let Ok(country) = Country::new(code, *name, currency) {
                repo.insert(country);
            }
        }
        repo
    }
}

impl CountryRepository for InMemoryCountryRepository {
    fn get_by_code(&self, code: &str) -> Result<Option<Country>, CalculationError> {
        Ok(self.countries.get(code).cloned())
    }
}

static EUROPEAN_COUNTRIES: &[(&str, &str, &str)] = &[
    ("AT", "Austria", "EUR"),
    ("BE", "Belgium", "EUR"),
    ("BG", "Bulgaria", "BGN"),
    ("CH", "Switzerland", "CHF"),
    ("CY", "Cyprus", "EUR"),
    ("CZ", "Czech Republic", "CZK"),
    ("DE", "Germany", "EUR"),
    ("DK", "Denmark", "DKK"),
    ("EE", "Estonia", "EUR"),
    ("ES", "Spain", "EUR"),
    ("FI", "Finland", "EUR"),
    ("FR", "France", "EUR"),
    ("GB", "United Kingdom", "GBP"),
    ("GR", "Greece", "EUR"),
    ("HR", "Croatia", "EUR"),
    ("HU", "Hungary", "HUF"),
    ("IE", "Ireland", "EUR"),
    ("IT", "Italy", "EUR"),
    ("LT", "Lithuania", "EUR"),
    ("LU", "Luxembourg", "EUR"),
    ("LV", "Latvia", "EUR"),
    ("MT", "Malta", "EUR"),
    ("NL", "Netherlands", "EUR"),
    ("NO", "Norway", "NOK"),
    ("PL", "Poland", "PLN"),
    ("PT", "Portugal", "EUR"),
    ("RO", "Romania", "RON"),
    ("SE", "Sweden", "SEK"),
    ("SI", "Slovenia", "EUR"),
    ("SK", "Slovakia", "EUR"),
];

/// Currently assigned ISO 3166-1 alpha-2 codes (249 entries), sorted for
/// binary search.
static COUNTRY_CODES: &[&str] = &[
    "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AO", "AQ", "AR", "AS", "AT", "AU", "AW", "AX", "AZ",
    "BA", "BB", "BD", "BE", "BF", "BG", "BH", "BI", "BJ", "BL", "BM", "BN", "BO", "BQ", "BR", "BS",
    "BT", "BV", "BW", "BY", "BZ", "CA", "CC", "CD", "CF", "CG", "CH", "CI", "CK", "CL", "CM", "CN",
    "CO", "CR", "CU", "CV", "CW", "CX", "CY", "CZ", "DE", "DJ", "DK", "DM", "DO", "DZ", "EC", "EE",
    "EG", "EH", "ER", "ES", "ET", "FI", "FJ", "FK", "FM", "FO", "FR", "GA", "GB", "GD", "GE", "GF",
    "GG", "GH", "GI", "GL", "GM", "GN", "GP", "GQ", "GR", "GS", "GT", "GU", "GW", "GY", "HK", "HM",
    "HN", "HR", "HT", "HU", "ID", "IE", "IL", "IM", "IN", "IO", "IQ", "IR", "IS", "IT", "JE", "JM",
    "JO", "JP", "KE", "KG", "KH", "KI", "KM", "KN", "KP", "KR", "KW", "KY", "KZ", "LA", "LB", "LC",
    "LI", "LK", "LR", "LS", "LT", "LU", "LV", "LY", "MA", "MC", "MD", "ME", "MF", "MG", "MH", "MK",
    "ML", "MM", "MN", "MO", "MP", "MQ", "MR", "MS", "MT", "MU", "MV", "MW", "MX", "MY", "MZ", "NA",
    "NC", "NE", "NF", "NG", "NI", "NL", "NO", "NP", "NR", "NU", "NZ", "OM", "PA", "PE", "PF", "PG",
    "PH", "PK", "PL", "PM", "PN", "PR", "PS", "PT", "PW", "PY", "QA", "RE", "RO", "RS", "RU", "RW",
    "SA", "SB", "SC", "SD", "SE", "SG", "SH", "SI", "SJ", "SK", "SL", "SM", "SN", "SO", "SR", "SS",
    "ST", "SV", "SX", "SY", "SZ", "TC", "TD", "TF", "TG", "TH", "TJ", "TK", "TL", "TM", "TN", "TO",
    "TR", "TT", "TV", "TW", "TZ", "UA", "UG", "UM", "US", "UY", "UZ", "VA", "VC", "VE", "VG", "VI",
    "VN", "VU", "WF", "WS", "YE", "YT", "ZA", "ZM", "ZW",
];
