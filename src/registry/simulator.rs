//! In-process registry simulator with the demo population.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::identity::{Country, masked_id, normalize_national_id};

use super::{RegistryLookup, RegistryRecord};

/// Mock per-country registry (DK CPR, SE SPAR, NO Folkeregister, FI DVV).
#[derive(Debug, Clone, Default)]
pub struct RegistrySimulator {
    records: HashMap<(Country, String), RegistryRecord>,
}

impl RegistrySimulator {
    /// A registry with nobody in it.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in demo population.
    pub fn with_seed_data() -> Self {
        let mut registry = Self::empty();
        for (country, record) in seed_records() {
            registry.insert(country, record);
        }
        registry
    }

    /// Load entries from a JSON file shaped `{ "SE": [record, ...], ... }`.
    pub async fn from_json_file(path: &Path) -> Result<Self, RegistryError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RegistryError::Load(format!("{}: {e}", path.display())))?;
        let registry = Self::from_json(&raw)?;
        info!(path = %path.display(), entries = registry.len(), "Registry data loaded");
        Ok(registry)
    }

    pub fn from_json(raw: &str) -> Result<Self, RegistryError> {
        let parsed: HashMap<Country, Vec<RegistryRecord>> =
            serde_json::from_str(raw).map_err(|e| RegistryError::Load(e.to_string()))?;
        let mut registry = Self::empty();
        for (country, records) in parsed {
            for record in records {
                registry.insert(country, record);
            }
        }
        Ok(registry)
    }

    /// Add or replace a person.
    pub fn insert(&mut self, country: Country, mut record: RegistryRecord) {
        record.national_id = normalize_national_id(&record.national_id);
        self.records
            .insert((country, record.national_id.clone()), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RegistryLookup for RegistrySimulator {
    async fn lookup(
        &self,
        country: Country,
        national_id: &str,
    ) -> Result<Option<RegistryRecord>, RegistryError> {
        let national_id = normalize_national_id(national_id);
        let found = self.records.get(&(country, national_id.clone())).cloned();
        debug!(
            country = %country,
            national_id = %masked_id(&national_id),
            found = found.is_some(),
            "Registry lookup"
        );
        Ok(found)
    }
}

#[allow(clippy::too_many_arguments)]
fn person(
    national_id: &str,
    first_name: &str,
    last_name: &str,
    date_of_birth: &str,
    gender: &str,
    address: &str,
    marital_status: &str,
    citizenship: &str,
) -> RegistryRecord {
    RegistryRecord {
        national_id: national_id.to_string(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        date_of_birth: date_of_birth.to_string(),
        gender: Some(gender.to_string()),
        address: Some(address.to_string()),
        marital_status: Some(marital_status.to_string()),
        citizenship: vec![citizenship.to_string()],
    }
}

#[rustfmt::skip]
fn seed_records() -> Vec<(Country, RegistryRecord)> {
    use Country::*;
    vec![
        (Denmark, person("123456-7890", "John", "Doe", "1985-04-12", "male", "POC Street 1, 2100 Copenhagen", "married", "Denmark")),
        (Denmark, person("160778-1234", "Maria", "Larsen", "1978-07-16", "female", "Hovedgaden 10, 8000 Aarhus", "single", "Denmark")),
        (Sweden, person("19800101-1230", "Anna", "Svensson", "1980-01-01", "female", "Storgatan 1, 111 22 Stockholm", "married", "Sweden")),
        (Sweden, person("19950715-8899", "Erik", "Johansson", "1995-07-15", "male", "Västra Hamngatan 5, 411 17 Göteborg", "single", "Sweden")),
        (Sweden, person("860714-1556", "Juan Pablo Rafael", "Zúñiga Hidalgo", "1986-07-14", "male", "Molnvadersgatan 8", "single", "Sweden")),
        (Norway, person("47010112345", "Ola", "Nordmann", "2001-01-01", "male", "Karl Johans gate 1, 0154 Oslo", "single", "Norway")),
        (Norway, person("47020254321", "Kari", "Nordmann", "2002-02-02", "female", "Bygdøy allé 20, 0262 Oslo", "married", "Norway")),
        (Finland, person("120394-123X", "Matti", "Korhonen", "1994-03-12", "male", "Mannerheimintie 10, 00100 Helsinki", "married", "Finland")),
        (Finland, person("010180-999Y", "Liisa", "Virtanen", "1980-01-01", "female", "Hämeenkatu 5, 33100 Tampere", "single", "Finland")),
    ]
}
