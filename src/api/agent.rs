//! Conversational agent action envelope.
//!
//! The agent calls functions by name with a flat list of string parameters
//! and a bag of session attributes. Missing `country`/`sessionId` fall back
//! to the session attributes, and a missing `objectLocation` resolves to the
//! latest upload of the session. Responses echo the updated attributes so
//! the agent can track progress without seeing raw national ids.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::RequestError;
use crate::identity::{
    CompositeKey, Country, IdentityRecord, SessionId, last4, normalize_national_id,
};
use crate::pipeline::{
    OnboardingOutcome, OnboardingRequest, Stage, VerificationStatus, VerificationStep,
};
use crate::store::{RecordStore, latest_upload};

use super::AppState;

/// Functions exposed to the agent.
pub const KNOWN_FUNCTIONS: [&str; 3] = ["onboard_identity", "verify_identity", "lookup_customer"];

/// Session attribute tracking how far the user got.
pub const ATTR_VERIFICATION_STATUS: &str = "verificationStatus";
/// Session attribute holding the last four characters of a verified id.
pub const ATTR_VERIFIED_LAST4: &str = "verifiedLast4";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionParameter {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Inbound agent call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_group: Option<String>,
    /// Function name, optionally prefixed `"<group>__"`.
    pub function: String,
    #[serde(default)]
    pub parameters: Vec<ActionParameter>,
    #[serde(default)]
    pub session_attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseState {
    /// Ask the user again; the call was malformed or unknown.
    Reprompt,
    /// A backing store failed; the agent should not blame the user's input.
    Failure,
}

/// Reply to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_group: Option<String>,
    pub function: String,
    pub body: Value,
    pub session_attributes: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_state: Option<ResponseState>,
}

/// Progress marker stored in the session attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationProgress {
    Uploaded,
    Verified,
    Registered,
}

impl VerificationProgress {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "UPLOADED",
            Self::Verified => "VERIFIED",
            Self::Registered => "REGISTERED",
        }
    }
}

/// Strip an action-group prefix: `"group__verify_identity"` becomes `"verify_identity"`.
pub fn base_function(name: &str) -> &str {
    name.rsplit("__").next().unwrap_or(name)
}

/// Why a call produced no result body.
#[derive(Debug)]
enum CallError {
    /// Missing or malformed input.
    Input(String),
    /// A store the call depends on failed.
    Unavailable(String),
}

impl From<String> for CallError {
    fn from(detail: String) -> Self {
        Self::Input(detail)
    }
}

impl CallError {
    fn unavailable(e: impl std::fmt::Display) -> Self {
        Self::Unavailable(e.to_string())
    }
}

struct Call {
    params: HashMap<String, String>,
    session: HashMap<String, String>,
}

impl Call {
    fn new(request: &ActionRequest) -> Self {
        let params = request
            .parameters
            .iter()
            .filter(|p| !p.value.trim().is_empty())
            .map(|p| (p.name.clone(), p.value.trim().to_string()))
            .collect();
        Self {
            params,
            session: request.session_attributes.clone(),
        }
    }

    fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Parameter, else the session attribute of the same name.
    fn param_or_session(&self, name: &str) -> Option<&str> {
        self.param(name)
            .or_else(|| self.session.get(name).map(String::as_str))
            .filter(|s| !s.trim().is_empty())
    }

    fn required(&self, name: &str) -> Result<&str, String> {
        self.param(name)
            .ok_or_else(|| format!("missing parameter {name:?}"))
    }

    fn country(&self) -> Result<Country, String> {
        self.param_or_session("country")
            .ok_or_else(|| "missing parameter \"country\"".to_string())?
            .parse()
            .map_err(|e: RequestError| e.to_string())
    }

    fn set_progress(&mut self, progress: VerificationProgress) {
        self.session.insert(
            ATTR_VERIFICATION_STATUS.to_string(),
            progress.as_str().to_string(),
        );
    }

    fn set_verified(&mut self, progress: VerificationProgress, national_id: &str) {
        self.set_progress(progress);
        self.session
            .insert(ATTR_VERIFIED_LAST4.to_string(), last4(national_id));
    }

    /// Progress without a confirmed id in this call; drops any earlier last-4.
    fn reset_progress(&mut self, progress: VerificationProgress) {
        self.set_progress(progress);
        self.session.remove(ATTR_VERIFIED_LAST4);
    }
}

/// Dispatch one agent call.
pub async fn handle_action(state: &AppState, request: ActionRequest) -> ActionResponse {
    let function = base_function(&request.function);
    let mut call = Call::new(&request);

    let result = match function {
        "onboard_identity" => onboard_identity(state, &mut call).await,
        "verify_identity" => verify_identity(state, &mut call).await,
        "lookup_customer" => lookup_customer(state, &call).await,
        _ => {
            warn!(function = %request.function, "Unknown agent function");
            return ActionResponse {
                action_group: request.action_group,
                function: request.function.clone(),
                body: json!({
                    "error": "UNKNOWN_FUNCTION",
                    "function": request.function,
                    "known": KNOWN_FUNCTIONS,
                }),
                session_attributes: call.session,
                response_state: Some(ResponseState::Reprompt),
            };
        }
    };

    let (body, response_state) = match result {
        Ok(body) => (body, None),
        Err(CallError::Input(detail)) => {
            debug!(function, %detail, "Agent call rejected");
            (
                json!({ "error": "INVALID_INPUT", "detail": detail }),
                Some(ResponseState::Reprompt),
            )
        }
        Err(CallError::Unavailable(detail)) => {
            warn!(function, %detail, "Agent call failed downstream");
            (
                json!({ "error": "UNAVAILABLE", "detail": detail }),
                Some(ResponseState::Failure),
            )
        }
    };

    ActionResponse {
        action_group: request.action_group,
        function: request.function,
        body,
        session_attributes: call.session,
        response_state,
    }
}

async fn onboard_identity(state: &AppState, call: &mut Call) -> Result<Value, CallError> {
    let country = call.country()?;
    let session_raw = call
        .param_or_session("sessionId")
        .ok_or_else(|| "missing parameter \"sessionId\"".to_string())?
        .to_string();

    let object_location = match call.param("objectLocation") {
        Some(location) => location.to_string(),
        None => {
            let session = SessionId::parse(&session_raw).map_err(|e| e.to_string())?;
            let today = Utc::now().date_naive();
            latest_upload(state.objects.as_ref(), country, &session, today)
                .await
                .map_err(CallError::unavailable)?
                .ok_or_else(|| format!("no upload found for session {session}"))?
                .to_string()
        }
    };

    let request = OnboardingRequest {
        session_id: session_raw,
        country: country.code().to_string(),
        object_location: Some(object_location),
    };
    let outcome = state
        .orchestrator
        .handle(&request)
        .await
        .map_err(|e| e.to_string())?;

    match &outcome {
        OnboardingOutcome::Registered { national_id, .. } => {
            call.set_verified(VerificationProgress::Registered, national_id);
        }
        OnboardingOutcome::AlreadyRegistered { key, .. } => {
            let national_id = key.parts().map(|(_, id)| id).unwrap_or_default();
            call.set_verified(VerificationProgress::Registered, national_id);
        }
        OnboardingOutcome::Error {
            stage: Stage::Registering,
            ..
        } => call.reset_progress(VerificationProgress::Verified),
        _ => call.reset_progress(VerificationProgress::Uploaded),
    }

    serde_json::to_value(&outcome).map_err(CallError::unavailable)
}

async fn verify_identity(state: &AppState, call: &mut Call) -> Result<Value, CallError> {
    let identity = IdentityRecord {
        country: call.country()?,
        first_name: call.param("firstName").map(str::to_string),
        last_name: call.param("lastName").map(str::to_string),
        date_of_birth: call.param("dateOfBirth").map(str::to_string),
        national_id: call.param("nationalId").map(normalize_national_id),
    };
    let result = state.verifier.verify(&identity).await;
    if result.status == VerificationStatus::Verified {
        let national_id = identity.national_id.clone().unwrap_or_default();
        call.set_verified(VerificationProgress::Verified, &national_id);
    }
    serde_json::to_value(&result).map_err(CallError::unavailable)
}

async fn lookup_customer(state: &AppState, call: &Call) -> Result<Value, CallError> {
    let country = call.country()?;
    let national_id = normalize_national_id(call.required("nationalId")?);
    let key = CompositeKey::new(country, &national_id);
    let customer = state
        .records
        .get_by_key(&key)
        .await
        .map_err(CallError::unavailable)?;
    Ok(match customer {
        Some(customer) => json!({ "found": true, "customer": customer }),
        None => json!({ "found": false, "key": key }),
    })
}
