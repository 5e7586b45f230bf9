//! Shared types for the onboarding pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RequestError;
use crate::identity::{CompositeKey, Country, SessionId};
use crate::store::ObjectLocation;

// ── Request ─────────────────────────────────────────────────────────

/// Caller input, as received on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingRequest {
    pub session_id: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_location: Option<String>,
}

/// A request whose fields have all been checked. Only this form reaches the steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub session: SessionId,
    pub country: Country,
    pub location: ObjectLocation,
}

impl OnboardingRequest {
    /// Reject malformed input before any step runs.
    pub fn validate(&self) -> Result<ValidatedRequest, RequestError> {
        let session = SessionId::parse(&self.session_id)?;
        let country: Country = self.country.parse()?;
        let raw_location = self
            .object_location
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(RequestError::MissingObjectLocation)?;
        let location = ObjectLocation::parse(raw_location)
            .map_err(|e| RequestError::InvalidObjectLocation(e.to_string()))?;
        Ok(ValidatedRequest {
            session,
            country,
            location,
        })
    }
}

// ── Stages ──────────────────────────────────────────────────────────

/// Where one onboarding run currently is.
///
/// Progresses Start → Extracting → Verifying → Registering → Done, with
/// early exits to Done from every working stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Extracting,
    Verifying,
    Registering,
    Done,
}

impl Stage {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: Stage) -> bool {
        use Stage::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, target),
            (Start, Extracting)
                | (Extracting, Verifying)
                | (Extracting, Done)
                | (Verifying, Registering)
                | (Verifying, Done)
                | (Registering, Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Extracting => "extracting",
            Self::Verifying => "verifying",
            Self::Registering => "registering",
            Self::Done => "done",
        };
        write!(f, "{s}")
    }
}

// ── Outcome ─────────────────────────────────────────────────────────

/// The single structured result of an onboarding run.
///
/// Serialized as `{ "outcome": "<name>", "detail": { ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "outcome",
    content = "detail",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum OnboardingOutcome {
    /// The document was readable but not trustworthy enough.
    Reupload { confidence: f32, threshold: f32 },
    Registered {
        customer_id: Uuid,
        email: String,
        key: CompositeKey,
        country: Country,
        national_id: String,
    },
    AlreadyRegistered {
        key: CompositeKey,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        customer_id: Option<Uuid>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },
    Unverified { reason: String, fields: Vec<String> },
    NotFound { reason: String, source: String },
    Mismatch { reason: String, fields: Vec<String> },
    /// Content or infrastructure failure at `stage`.
    Error { stage: Stage, reason: String },
}

impl OnboardingOutcome {
    /// Wire name of the outcome.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reupload { .. } => "reupload",
            Self::Registered { .. } => "registered",
            Self::AlreadyRegistered { .. } => "already_registered",
            Self::Unverified { .. } => "unverified",
            Self::NotFound { .. } => "not_found",
            Self::Mismatch { .. } => "mismatch",
            Self::Error { .. } => "error",
        }
    }

    /// Whether the customer exists in the record store after this run.
    pub fn is_registered(&self) -> bool {
        matches!(
            self,
            Self::Registered { .. } | Self::AlreadyRegistered { .. }
        )
    }
}
