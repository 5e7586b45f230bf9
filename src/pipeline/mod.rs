//! Onboarding pipeline.
//!
//! Every session flows through:
//! 1. `ExtractionStep::extract()`: uploaded document to identity + confidence
//! 2. `VerificationStep::verify()`: format checks and registry comparison
//! 3. `RegistrationStep::register()`: exactly-once customer creation
//!
//! The `Orchestrator` sequences the steps and maps their tagged results
//! into one `OnboardingOutcome`. Registration is unreachable without a
//! `VerifiedIdentity`.

pub mod extract;
pub mod orchestrator;
pub mod register;
pub mod types;
pub mod verify;

pub use extract::{ExtractionStep, Extractor, IdReader, SimulatedIdReader};
pub use orchestrator::Orchestrator;
pub use register::{Registrar, RegistrationOutcome, RegistrationStep};
pub use types::{OnboardingOutcome, OnboardingRequest, Stage, ValidatedRequest};
pub use verify::{
    VerificationResult, VerificationStatus, VerificationStep, VerifiedIdentity, Verifier,
};
