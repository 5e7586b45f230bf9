//! HTTP surface: caller-facing JSON endpoints and the agent action envelope.

pub mod agent;
pub mod routes;

use std::sync::Arc;

use tracing::info;

use crate::config::{OnboardConfig, PipelinePolicy};
use crate::error::Result;
use crate::pipeline::{IdReader, Orchestrator, SimulatedIdReader, VerificationStep};
use crate::registry::{RegistryLookup, RegistrySimulator};
use crate::store::{FsObjectStore, LibSqlRecordStore, ObjectStore, RecordStore};

pub use routes::router;

/// Shared state for all API routes.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub verifier: Arc<dyn VerificationStep>,
    pub objects: Arc<dyn ObjectStore>,
    pub records: Arc<dyn RecordStore>,
}

impl AppState {
    /// Open the configured stores and registry and wire the pipeline over them.
    pub async fn from_config(config: &OnboardConfig) -> Result<Self> {
        let records = LibSqlRecordStore::open(&config.db_path).await?;
        let objects = FsObjectStore::open(config.object_root.clone()).await?;
        let registry = match &config.registry_path {
            Some(path) => RegistrySimulator::from_json_file(path).await?,
            None => RegistrySimulator::with_seed_data(),
        };
        info!(
            db = %config.db_path,
            uploads = %config.object_root.display(),
            registry_entries = registry.len(),
            "Collaborators ready"
        );

        Ok(Self::new(
            Arc::new(objects),
            Arc::new(SimulatedIdReader::new()),
            Arc::new(registry),
            Arc::new(records),
            &config.email_domain,
            config.policy.clone(),
        ))
    }

    /// Wire the pipeline over the given collaborators.
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        reader: Arc<dyn IdReader>,
        registry: Arc<dyn RegistryLookup>,
        records: Arc<dyn RecordStore>,
        email_domain: &str,
        policy: PipelinePolicy,
    ) -> Self {
        let orchestrator = Orchestrator::from_collaborators(
            Arc::clone(&objects),
            reader,
            registry,
            Arc::clone(&records),
            email_domain,
            policy,
        );
        Self {
            verifier: orchestrator.verifier(),
            orchestrator: Arc::new(orchestrator),
            objects,
            records,
        }
    }
}
