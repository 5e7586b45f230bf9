//! National identity registries.
//!
//! Verification only needs `lookup(country, national_id)`. The simulator
//! stands in for the real per-country authorities.

pub mod simulator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::identity::Country;

pub use simulator::RegistrySimulator;

/// A person as recorded by a national registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryRecord {
    pub national_id: String,
    pub first_name: String,
    pub last_name: String,
    /// ISO date, `YYYY-MM-DD`.
    pub date_of_birth: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marital_status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citizenship: Vec<String>,
}

/// Read-only lookup against a national registry.
#[async_trait]
pub trait RegistryLookup: Send + Sync {
    /// Look up a person. `Ok(None)` means the registry has no such id.
    async fn lookup(
        &self,
        country: Country,
        national_id: &str,
    ) -> Result<Option<RegistryRecord>, RegistryError>;
}
