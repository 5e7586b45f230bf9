//! Verification step: checks an extracted identity against the national registry.
//!
//! First failing check wins: completeness, then id format, then the
//! registry lookup and field comparison. The step never writes and never
//! returns an error; lookup failures become [`VerificationStatus::Error`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RegistryError;
use crate::identity::{
    CompositeKey, Country, IdentityRecord, is_valid_national_id, masked_id, normalize_national_id,
    normalize_text,
};
use crate::registry::{RegistryLookup, RegistryRecord};

/// Reason reported when fields are absent.
pub const REASON_INCOMPLETE: &str = "incomplete";
/// Reason reported when the national id has the wrong shape.
pub const REASON_FORMAT: &str = "format";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Verified,
    Mismatch,
    NotFound,
    Unverified,
    Error,
}

impl VerificationStatus {
    /// Whether a retry may produce a different result.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Verified => "VERIFIED",
            Self::Mismatch => "MISMATCH",
            Self::NotFound => "NOT_FOUND",
            Self::Unverified => "UNVERIFIED",
            Self::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

/// Verdict of the verification step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub status: VerificationStatus,
    /// Present only when `status` is `VERIFIED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_record: Option<RegistryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Registry consulted, e.g. `"sweden"`.
    pub source: String,
    /// Fields that were missing, malformed or mismatched.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

impl VerificationResult {
    fn verdict(
        status: VerificationStatus,
        country: Country,
        reason: Option<String>,
        fields: Vec<String>,
    ) -> Self {
        Self {
            status,
            matched_record: None,
            reason,
            source: country.registry_name().to_string(),
            fields,
        }
    }

    fn verified(country: Country, record: RegistryRecord) -> Self {
        Self {
            matched_record: Some(record),
            ..Self::verdict(VerificationStatus::Verified, country, None, Vec::new())
        }
    }

    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }
}

/// Proof that an identity passed verification.
///
/// Only obtainable from a `VERIFIED` result, so registration cannot be
/// reached with anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    country: Country,
    national_id: String,
    registry: RegistryRecord,
    source: String,
}

impl VerifiedIdentity {
    /// Pair an identity with its verdict. `None` unless the verdict is `VERIFIED`.
    pub fn from_result(identity: &IdentityRecord, result: &VerificationResult) -> Option<Self> {
        if !result.is_verified() {
            return None;
        }
        let registry = result.matched_record.clone()?;
        let national_id = normalize_national_id(identity.national_id.as_deref()?);
        if national_id != normalize_national_id(&registry.national_id) {
            return None;
        }
        Some(Self {
            country: identity.country,
            national_id,
            registry,
            source: result.source.clone(),
        })
    }

    pub fn country(&self) -> Country {
        self.country
    }

    pub fn national_id(&self) -> &str {
        &self.national_id
    }

    /// The registry's view of the person; authoritative for names and birth date.
    pub fn registry_record(&self) -> &RegistryRecord {
        &self.registry
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(self.country, &self.national_id)
    }
}

/// The verification step as seen by the orchestrator.
#[async_trait]
pub trait VerificationStep: Send + Sync {
    async fn verify(&self, identity: &IdentityRecord) -> VerificationResult;
}

/// Registry-backed verifier.
pub struct Verifier {
    registry: Arc<dyn RegistryLookup>,
    call_timeout: Duration,
}

impl Verifier {
    pub fn new(registry: Arc<dyn RegistryLookup>, call_timeout: Duration) -> Self {
        Self {
            registry,
            call_timeout,
        }
    }
}

#[async_trait]
impl VerificationStep for Verifier {
    async fn verify(&self, identity: &IdentityRecord) -> VerificationResult {
        let country = identity.country;

        let missing = identity.missing_fields();
        if !missing.is_empty() {
            return VerificationResult::verdict(
                VerificationStatus::Unverified,
                country,
                Some(REASON_INCOMPLETE.to_string()),
                missing.into_iter().map(str::to_string).collect(),
            );
        }

        let national_id = normalize_national_id(identity.national_id.as_deref().unwrap_or_default());
        if !is_valid_national_id(country, &national_id) {
            return VerificationResult::verdict(
                VerificationStatus::Unverified,
                country,
                Some(REASON_FORMAT.to_string()),
                vec!["nationalId".to_string()],
            );
        }

        let lookup = self.registry.lookup(country, &national_id);
        let person = match tokio::time::timeout(self.call_timeout, lookup).await {
            Ok(Ok(Some(person))) => person,
            Ok(Ok(None)) => {
                debug!(country = %country, national_id = %masked_id(&national_id), "Not in registry");
                return VerificationResult::verdict(
                    VerificationStatus::NotFound,
                    country,
                    Some(format!(
                        "ID {national_id} not found in {} registry",
                        country.registry_name()
                    )),
                    Vec::new(),
                );
            }
            Ok(Err(e)) => {
                warn!(country = %country, error = %e, "Registry lookup failed");
                return VerificationResult::verdict(
                    VerificationStatus::Error,
                    country,
                    Some(e.to_string()),
                    Vec::new(),
                );
            }
            Err(_) => {
                warn!(country = %country, timeout = ?self.call_timeout, "Registry lookup timed out");
                return VerificationResult::verdict(
                    VerificationStatus::Error,
                    country,
                    Some(RegistryError::Timeout(self.call_timeout).to_string()),
                    Vec::new(),
                );
            }
        };

        let mismatched = mismatched_fields(identity, &person);
        if !mismatched.is_empty() {
            return VerificationResult::verdict(
                VerificationStatus::Mismatch,
                country,
                Some(format!("mismatched fields: {}", mismatched.join(", "))),
                mismatched.into_iter().map(str::to_string).collect(),
            );
        }

        debug!(country = %country, national_id = %masked_id(&national_id), "Identity verified");
        VerificationResult::verified(country, person)
    }
}

/// Fields of `identity` that disagree with the registry, in canonical order.
fn mismatched_fields(identity: &IdentityRecord, person: &RegistryRecord) -> Vec<&'static str> {
    let mut out = Vec::new();
    if !names_match(identity.first_name.as_deref(), &person.first_name) {
        out.push("firstName");
    }
    if !names_match(identity.last_name.as_deref(), &person.last_name) {
        out.push("lastName");
    }
    if !dates_match(identity.date_of_birth.as_deref(), &person.date_of_birth) {
        out.push("dateOfBirth");
    }
    out
}

fn names_match(read: Option<&str>, registered: &str) -> bool {
    read.is_some_and(|r| normalize_text(r) == normalize_text(registered))
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Calendar comparison when both sides parse, exact text otherwise.
fn dates_match(read: Option<&str>, registered: &str) -> bool {
    let Some(read) = read else {
        return false;
    };
    match (parse_date(read), parse_date(registered)) {
        (Some(a), Some(b)) => a == b,
        _ => read.trim() == registered.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use crate::registry::RegistrySimulator;

    fn verifier() -> Verifier {
        Verifier::new(
            Arc::new(RegistrySimulator::with_seed_data()),
            Duration::from_secs(1),
        )
    }

    fn anna() -> IdentityRecord {
        IdentityRecord {
            country: Country::Sweden,
            first_name: Some("Anna".into()),
            last_name: Some("Svensson".into()),
            date_of_birth: Some("1980-01-01".into()),
            national_id: Some("19800101-1230".into()),
        }
    }

    #[tokio::test]
    async fn matching_identity_is_verified() {
        let result = verifier().verify(&anna()).await;
        assert_eq!(result.status, VerificationStatus::Verified);
        assert_eq!(result.source, "sweden");
        assert_eq!(
            result.matched_record.as_ref().map(|r| r.last_name.as_str()),
            Some("Svensson")
        );
        assert!(result.reason.is_none());
    }

    #[tokio::test]
    async fn incomplete_identity_wins_over_format() {
        let mut identity = anna();
        identity.last_name = None;
        identity.national_id = Some("bogus".into());
        let result = verifier().verify(&identity).await;
        assert_eq!(result.status, VerificationStatus::Unverified);
        assert_eq!(result.reason.as_deref(), Some(REASON_INCOMPLETE));
        assert_eq!(result.fields, vec!["lastName"]);
    }

    #[tokio::test]
    async fn malformed_id_is_format_failure() {
        let mut identity = anna();
        identity.national_id = Some("1980-01-01".into());
        let result = verifier().verify(&identity).await;
        assert_eq!(result.status, VerificationStatus::Unverified);
        assert_eq!(result.reason.as_deref(), Some(REASON_FORMAT));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let mut identity = anna();
        identity.national_id = Some("19700101-0000".into());
        let result = verifier().verify(&identity).await;
        assert_eq!(result.status, VerificationStatus::NotFound);
        assert_eq!(
            result.reason.as_deref(),
            Some("ID 19700101-0000 not found in sweden registry")
        );
        assert!(result.matched_record.is_none());
    }

    #[tokio::test]
    async fn mismatch_names_every_disagreeing_field() {
        let mut identity = anna();
        identity.first_name = Some("Annika".into());
        identity.date_of_birth = Some("1980-01-02".into());
        let result = verifier().verify(&identity).await;
        assert_eq!(result.status, VerificationStatus::Mismatch);
        assert_eq!(
            result.reason.as_deref(),
            Some("mismatched fields: firstName, dateOfBirth")
        );
        assert_eq!(result.fields, vec!["firstName", "dateOfBirth"]);
        assert!(result.matched_record.is_none());
    }

    #[tokio::test]
    async fn comparison_ignores_case_and_diacritics() {
        let identity = IdentityRecord {
            country: Country::Sweden,
            first_name: Some("JUAN PABLO RAFAEL".into()),
            last_name: Some("Zuniga Hidalgo".into()),
            date_of_birth: Some(" 1986-07-14".into()),
            national_id: Some("860714-1556".into()),
        };
        let result = verifier().verify(&identity).await;
        assert_eq!(result.status, VerificationStatus::Verified);
    }

    #[tokio::test]
    async fn verify_is_repeatable() {
        let v = verifier();
        let mut identity = anna();
        identity.first_name = Some("Eve".into());
        assert_eq!(v.verify(&identity).await, v.verify(&identity).await);
        assert_eq!(v.verify(&anna()).await, v.verify(&anna()).await);
    }

    struct BrokenRegistry;

    #[async_trait]
    impl RegistryLookup for BrokenRegistry {
        async fn lookup(
            &self,
            country: Country,
            _: &str,
        ) -> Result<Option<RegistryRecord>, RegistryError> {
            Err(RegistryError::Unavailable {
                source_name: country.registry_name().into(),
                reason: "connection reset".into(),
            })
        }
    }

    #[tokio::test]
    async fn lookup_failure_is_error_status() {
        let v = Verifier::new(Arc::new(BrokenRegistry), Duration::from_secs(1));
        let result = v.verify(&anna()).await;
        assert_eq!(result.status, VerificationStatus::Error);
        assert!(result.status.is_transient());
        assert!(result.reason.unwrap().contains("connection reset"));
    }

    struct HangingRegistry;

    #[async_trait]
    impl RegistryLookup for HangingRegistry {
        async fn lookup(
            &self,
            _: Country,
            _: &str,
        ) -> Result<Option<RegistryRecord>, RegistryError> {
            std::future::pending::<Result<Option<RegistryRecord>, RegistryError>>().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_timeout_is_error_status() {
        let v = Verifier::new(Arc::new(HangingRegistry), Duration::from_millis(100));
        let result = v.verify(&anna()).await;
        assert_eq!(result.status, VerificationStatus::Error);
        assert!(result.reason.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn verified_identity_only_from_verified_result() {
        let v = verifier();
        let identity = anna();
        let ok = v.verify(&identity).await;
        let proof = VerifiedIdentity::from_result(&identity, &ok).unwrap();
        assert_eq!(proof.key().as_str(), "SE#19800101-1230");
        assert_eq!(proof.source(), "sweden");

        let mut other = anna();
        other.national_id = Some("19700101-0000".into());
        let not_found = v.verify(&other).await;
        assert!(VerifiedIdentity::from_result(&other, &not_found).is_none());
    }

    #[test]
    fn status_display_matches_serde() {
        use VerificationStatus::*;
        for status in [Verified, Mismatch, NotFound, Unverified, Error] {
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{status}\"")
            );
        }
    }
}
