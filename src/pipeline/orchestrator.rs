//! Orchestrator: runs extraction, verification and registration for one session.
//!
//! An explicit state machine with one transition function per stage. Each
//! transition consumes the current state and returns the next one; the
//! loop stops at `Done`, which carries the outcome returned to the caller.
//! Transient failures are retried under [`PipelinePolicy`]; everything
//! else is terminal.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::PipelinePolicy;
use crate::error::{ExtractionError, RegistrationError, RequestError};
use crate::identity::{Country, ExtractedIdentity, IdentityRecord};
use crate::registry::RegistryLookup;
use crate::store::{ObjectLocation, ObjectStore, RecordStore};

use super::extract::{ExtractionStep, Extractor, IdReader};
use super::register::{Registrar, RegistrationOutcome, RegistrationStep};
use super::types::{OnboardingOutcome, OnboardingRequest, Stage, ValidatedRequest};
use super::verify::{
    VerificationResult, VerificationStatus, VerificationStep, VerifiedIdentity, Verifier,
};

/// Pipeline state, carrying what the next stage needs.
enum PipelineState {
    Start,
    Extracting(ObjectLocation),
    Verifying(IdentityRecord),
    Registering(VerifiedIdentity),
    Done(OnboardingOutcome),
}

impl PipelineState {
    fn stage(&self) -> Stage {
        match self {
            Self::Start => Stage::Start,
            Self::Extracting(_) => Stage::Extracting,
            Self::Verifying(_) => Stage::Verifying,
            Self::Registering(_) => Stage::Registering,
            Self::Done(_) => Stage::Done,
        }
    }
}

/// Sequences the three steps for one onboarding session.
///
/// Holds no per-session state; one instance serves concurrent sessions.
pub struct Orchestrator {
    extractor: Arc<dyn ExtractionStep>,
    verifier: Arc<dyn VerificationStep>,
    registrar: Arc<dyn RegistrationStep>,
    policy: PipelinePolicy,
}

impl Orchestrator {
    pub fn new(
        extractor: Arc<dyn ExtractionStep>,
        verifier: Arc<dyn VerificationStep>,
        registrar: Arc<dyn RegistrationStep>,
        policy: PipelinePolicy,
    ) -> Self {
        Self {
            extractor,
            verifier,
            registrar,
            policy,
        }
    }

    /// Wire the standard steps over the given collaborators.
    pub fn from_collaborators(
        objects: Arc<dyn ObjectStore>,
        reader: Arc<dyn IdReader>,
        registry: Arc<dyn RegistryLookup>,
        records: Arc<dyn RecordStore>,
        email_domain: &str,
        policy: PipelinePolicy,
    ) -> Self {
        let timeout = policy.call_timeout;
        Self::new(
            Arc::new(Extractor::new(objects, reader, timeout)),
            Arc::new(Verifier::new(registry, timeout)),
            Arc::new(Registrar::new(records, email_domain, timeout)),
            policy,
        )
    }

    /// The verification step, for callers that verify without onboarding.
    pub fn verifier(&self) -> Arc<dyn VerificationStep> {
        Arc::clone(&self.verifier)
    }

    /// Validate a raw request and run it. Input errors are returned before any step runs.
    pub async fn handle(
        &self,
        request: &OnboardingRequest,
    ) -> Result<OnboardingOutcome, RequestError> {
        let validated = request.validate()?;
        Ok(self.run(&validated).await)
    }

    /// Run the pipeline to completion.
    pub async fn run(&self, request: &ValidatedRequest) -> OnboardingOutcome {
        info!(session = %request.session, country = %request.country, "Onboarding started");

        let mut state = PipelineState::Start;
        loop {
            let from = state.stage();
            let next = match state {
                PipelineState::Start => self.start(request),
                PipelineState::Extracting(location) => {
                    self.extracting(&location, request.country).await
                }
                PipelineState::Verifying(identity) => self.verifying(&identity).await,
                PipelineState::Registering(identity) => self.registering(&identity).await,
                PipelineState::Done(outcome) => {
                    info!(
                        session = %request.session,
                        outcome = outcome.name(),
                        "Onboarding finished"
                    );
                    return outcome;
                }
            };
            let to = next.stage();
            debug_assert!(from.can_transition_to(to), "illegal transition {from} -> {to}");
            debug!(session = %request.session, from = %from, to = %to, "Stage transition");
            state = next;
        }
    }

    // ── Transitions ─────────────────────────────────────────────────

    fn start(&self, request: &ValidatedRequest) -> PipelineState {
        PipelineState::Extracting(request.location.clone())
    }

    async fn extracting(&self, location: &ObjectLocation, country: Country) -> PipelineState {
        let extractor = &self.extractor;
        let result = self
            .with_retries(
                Stage::Extracting,
                move || extractor.extract(location, country),
                |r: &Result<ExtractedIdentity, ExtractionError>| {
                    r.as_ref().is_err_and(ExtractionError::is_transient)
                },
            )
            .await;

        match result {
            Ok(extracted) if extracted.confidence >= self.policy.confidence_threshold => {
                PipelineState::Verifying(extracted.record)
            }
            Ok(extracted) => {
                info!(
                    confidence = extracted.confidence,
                    threshold = self.policy.confidence_threshold,
                    "Confidence below threshold, requesting re-upload"
                );
                PipelineState::Done(OnboardingOutcome::Reupload {
                    confidence: extracted.confidence,
                    threshold: self.policy.confidence_threshold,
                })
            }
            Err(e) => PipelineState::Done(OnboardingOutcome::Error {
                stage: Stage::Extracting,
                reason: e.to_string(),
            }),
        }
    }

    async fn verifying(&self, identity: &IdentityRecord) -> PipelineState {
        let verifier = &self.verifier;
        let result = self
            .with_retries(
                Stage::Verifying,
                move || verifier.verify(identity),
                |r: &VerificationResult| r.status.is_transient(),
            )
            .await;

        let reason = result.reason.clone().unwrap_or_default();
        match result.status {
            VerificationStatus::Verified => match VerifiedIdentity::from_result(identity, &result)
            {
                Some(verified) => PipelineState::Registering(verified),
                None => PipelineState::Done(OnboardingOutcome::Error {
                    stage: Stage::Verifying,
                    reason: "verified result without a matching registry record".to_string(),
                }),
            },
            VerificationStatus::Unverified => PipelineState::Done(OnboardingOutcome::Unverified {
                reason,
                fields: result.fields,
            }),
            VerificationStatus::NotFound => PipelineState::Done(OnboardingOutcome::NotFound {
                reason,
                source: result.source,
            }),
            VerificationStatus::Mismatch => PipelineState::Done(OnboardingOutcome::Mismatch {
                reason,
                fields: result.fields,
            }),
            VerificationStatus::Error => PipelineState::Done(OnboardingOutcome::Error {
                stage: Stage::Verifying,
                reason,
            }),
        }
    }

    async fn registering(&self, identity: &VerifiedIdentity) -> PipelineState {
        let registrar = &self.registrar;
        let result = self
            .with_retries(
                Stage::Registering,
                move || registrar.register(identity),
                |r: &Result<RegistrationOutcome, RegistrationError>| {
                    matches!(r, Err(RegistrationError::StoreUnavailable(_)))
                },
            )
            .await;

        let outcome = match result {
            Ok(RegistrationOutcome::Created(customer)) => OnboardingOutcome::Registered {
                key: customer.key(),
                customer_id: customer.customer_id,
                email: customer.email,
                country: customer.country,
                national_id: customer.national_id,
            },
            Ok(RegistrationOutcome::AlreadyExists { key, existing }) => {
                OnboardingOutcome::AlreadyRegistered {
                    key,
                    customer_id: existing.as_ref().map(|c| c.customer_id),
                    email: existing.map(|c| c.email),
                }
            }
            Err(e) => OnboardingOutcome::Error {
                stage: Stage::Registering,
                reason: e.to_string(),
            },
        };
        PipelineState::Done(outcome)
    }

    /// Call `op` until it succeeds, fails terminally, or the retry budget is spent.
    async fn with_retries<T, F, Fut>(
        &self,
        stage: Stage,
        mut op: F,
        should_retry: impl Fn(&T) -> bool,
    ) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut attempt: u32 = 0;
        loop {
            let result = op().await;
            if attempt >= self.policy.max_retries || !should_retry(&result) {
                return result;
            }
            attempt += 1;
            warn!(
                stage = %stage,
                attempt,
                max_retries = self.policy.max_retries,
                "Transient failure, retrying"
            );
            tokio::time::sleep(self.policy.retry_backoff * attempt).await;
        }
    }
}
