//! Identity and customer data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RequestError;

use super::normalize::normalize_text;

/// Supported onboarding countries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Country {
    Denmark,
    Sweden,
    Norway,
    Finland,
}

impl Country {
    pub const ALL: [Country; 4] = [Self::Denmark, Self::Sweden, Self::Norway, Self::Finland];

    /// ISO 3166-1 alpha-2 code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Denmark => "DK",
            Self::Sweden => "SE",
            Self::Norway => "NO",
            Self::Finland => "FI",
        }
    }

    /// Name of the national registry source, as reported by verification.
    pub fn registry_name(&self) -> &'static str {
        match self {
            Self::Denmark => "denmark",
            Self::Sweden => "sweden",
            Self::Norway => "norway",
            Self::Finland => "finland",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Self::Denmark => 0,
            Self::Sweden => 1,
            Self::Norway => 2,
            Self::Finland => 3,
        }
    }
}

impl std::fmt::Display for Country {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Country {
    type Err = RequestError;

    /// Accepts the code or the English/local country name, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_text(s).as_str() {
            "dk" | "danmark" | "denmark" => Ok(Self::Denmark),
            "se" | "sweden" | "sverige" => Ok(Self::Sweden),
            "no" | "norway" | "norge" => Ok(Self::Norway),
            "fi" | "finland" | "suomi" => Ok(Self::Finland),
            _ => Err(RequestError::UnsupportedCountry(s.to_string())),
        }
    }
}

impl TryFrom<String> for Country {
    type Error = RequestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Country> for String {
    fn from(country: Country) -> Self {
        country.code().to_string()
    }
}

/// Correlation token for one onboarding attempt. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    const MAX_LEN: usize = 128;

    pub fn parse(raw: &str) -> Result<Self, RequestError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RequestError::InvalidSession("empty".to_string()));
        }
        if raw.len() > Self::MAX_LEN {
            return Err(RequestError::InvalidSession(format!(
                "longer than {} characters",
                Self::MAX_LEN
            )));
        }
        // Session ids become object key segments.
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(RequestError::InvalidSession(format!(
                "{raw:?} contains characters outside [A-Za-z0-9_-]"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = RequestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

/// Structured identity read from an uploaded document.
///
/// Fields are optional because extraction may only recover part of the
/// document. Blank strings count as missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    pub country: Country,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,
}

impl IdentityRecord {
    /// An empty record for the given country.
    pub fn empty(country: Country) -> Self {
        Self {
            country,
            first_name: None,
            last_name: None,
            date_of_birth: None,
            national_id: None,
        }
    }

    /// Names of the fields that are absent or blank, in canonical order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("firstName", &self.first_name),
            ("lastName", &self.last_name),
            ("dateOfBirth", &self.date_of_birth),
            ("nationalId", &self.national_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().is_none_or(|v| v.trim().is_empty()))
        .map(|(name, _)| name)
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

/// How the national id was located in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// The id field matched the country format exactly.
    Exact,
    /// A valid id was recovered from inside a noisy id field.
    Recovered,
    /// The id was found by scanning the free text of the document.
    TextScan,
    /// No id could be located.
    None,
}

impl ExtractionMethod {
    /// Base confidence of the id read, before completeness and quality.
    pub fn base_confidence(&self) -> f32 {
        match self {
            Self::Exact => 0.92,
            Self::Recovered => 0.88,
            Self::TextScan => 0.75,
            Self::None => 0.0,
        }
    }
}

/// Output of the extraction step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedIdentity {
    pub record: IdentityRecord,
    /// Confidence in [0, 1].
    pub confidence: f32,
    pub method: ExtractionMethod,
}

/// Fixed sort key marking the customer profile row.
pub const PROFILE_SORT_KEY: &str = "PROFILE";

/// Partition key of a customer row: `"<country>#<nationalId>"`.
///
/// Country codes are exactly two letters and never contain `#`, so the
/// mapping from (country, national id) is injective.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeKey(String);

impl CompositeKey {
    pub fn new(country: Country, national_id: &str) -> Self {
        Self(format!("{}#{}", country.code(), national_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split a key back into its parts.
    pub fn parts(&self) -> Option<(Country, &str)> {
        let (code, national_id) = self.0.split_once('#')?;
        let country = Country::ALL.into_iter().find(|c| c.code() == code)?;
        Some((country, national_id))
    }
}

impl std::fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a persisted customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustomerStatus {
    Registered,
}

impl CustomerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "REGISTERED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "REGISTERED" => Some(Self::Registered),
            _ => None,
        }
    }
}

/// A registered customer, one per (country, national id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRecord {
    pub customer_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub national_id: String,
    pub country: Country,
    /// Registry the identity was verified against.
    pub source: String,
    pub status: CustomerStatus,
    pub created_at: DateTime<Utc>,
}

impl CustomerRecord {
    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(self.country, &self.national_id)
    }
}

/// The last four characters of a national id (fewer if it is shorter).
pub fn last4(national_id: &str) -> String {
    let skip = national_id.chars().count().saturating_sub(4);
    national_id.chars().skip(skip).collect()
}

/// Mask a national id for logs and agent prompts, keeping the last four characters.
pub fn masked_id(national_id: &str) -> String {
    format!("***{}", last4(national_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_parses_codes_and_names() {
        assert_eq!("SE".parse::<Country>().unwrap(), Country::Sweden);
        assert_eq!("sverige".parse::<Country>().unwrap(), Country::Sweden);
        assert_eq!(" Danmark ".parse::<Country>().unwrap(), Country::Denmark);
        assert_eq!("Norge".parse::<Country>().unwrap(), Country::Norway);
        assert_eq!("suomi".parse::<Country>().unwrap(), Country::Finland);
    }

    #[test]
    fn unknown_country_is_rejected_not_defaulted() {
        assert!(matches!(
            "DE".parse::<Country>(),
            Err(RequestError::UnsupportedCountry(_))
        ));
        assert!("".parse::<Country>().is_err());
    }

    #[test]
    fn country_serializes_as_code() {
        assert_eq!(serde_json::to_string(&Country::Finland).unwrap(), "\"FI\"");
        let parsed: Country = serde_json::from_str("\"no\"").unwrap();
        assert_eq!(parsed, Country::Norway);
        assert!(serde_json::from_str::<Country>("\"XX\"").is_err());
    }

    #[test]
    fn session_id_validation() {
        assert!(SessionId::parse("3f2a-b9_01").is_ok());
        assert!(SessionId::parse("  ").is_err());
        assert!(SessionId::parse("../etc").is_err());
        assert!(SessionId::parse(&"a".repeat(129)).is_err());
    }

    #[test]
    fn missing_fields_treats_blank_as_missing() {
        let record = IdentityRecord {
            country: Country::Sweden,
            first_name: Some("Anna".into()),
            last_name: Some("  ".into()),
            date_of_birth: None,
            national_id: Some("19800101-1230".into()),
        };
        assert_eq!(record.missing_fields(), vec!["lastName", "dateOfBirth"]);
        assert!(!record.is_complete());
        assert_eq!(IdentityRecord::empty(Country::Denmark).missing_fields().len(), 4);
    }

    #[test]
    fn identity_record_uses_camel_case() {
        let json = serde_json::json!({
            "country": "SE",
            "firstName": "Anna",
            "lastName": "Svensson",
            "dateOfBirth": "1980-01-01",
            "nationalId": "19800101-1230"
        });
        let record: IdentityRecord = serde_json::from_value(json).unwrap();
        assert!(record.is_complete());
        assert_eq!(record.national_id.as_deref(), Some("19800101-1230"));
    }

    #[test]
    fn composite_key_format_and_parts() {
        let key = CompositeKey::new(Country::Sweden, "19800101-1230");
        assert_eq!(key.as_str(), "SE#19800101-1230");
        assert_eq!(key.parts(), Some((Country::Sweden, "19800101-1230")));
    }

    #[test]
    fn masked_id_keeps_last_four() {
        assert_eq!(masked_id("19800101-1230"), "***1230");
        assert_eq!(masked_id("12"), "***12");
    }

    #[test]
    fn last4_counts_characters_not_bytes() {
        assert_eq!(last4("120394-123X"), "123X");
        assert_eq!(last4("åäöü-ÆØÅ1"), "ÆØÅ1");
        assert_eq!(last4(""), "");
    }

    #[test]
    fn customer_status_round_trips_through_str() {
        let status = CustomerStatus::Registered;
        assert_eq!(CustomerStatus::parse(status.as_str()), Some(status));
        assert_eq!(CustomerStatus::parse("DELETED"), None);
    }
}
