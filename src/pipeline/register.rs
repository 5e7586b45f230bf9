//! Registration step: exactly-once creation of a customer record.
//!
//! A pre-read answers repeat registrations without writing. The write
//! itself is the store's atomic conditional insert, so racing sessions
//! still produce one row.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::{DatabaseError, RegistrationError};
use crate::identity::{CompositeKey, CustomerRecord, CustomerStatus, derive_email, masked_id};
use crate::store::{PutOutcome, RecordStore};

use super::verify::VerifiedIdentity;

/// Result of a registration attempt. A duplicate is a normal outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Created(CustomerRecord),
    AlreadyExists {
        key: CompositeKey,
        /// The stored row, when it could be read back.
        existing: Option<CustomerRecord>,
    },
}

/// The registration step as seen by the orchestrator.
#[async_trait]
pub trait RegistrationStep: Send + Sync {
    async fn register(
        &self,
        identity: &VerifiedIdentity,
    ) -> Result<RegistrationOutcome, RegistrationError>;
}

/// Record-store backed registrar.
pub struct Registrar {
    store: Arc<dyn RecordStore>,
    email_domain: String,
    call_timeout: Duration,
}

impl Registrar {
    pub fn new(
        store: Arc<dyn RecordStore>,
        email_domain: impl Into<String>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            email_domain: email_domain.into(),
            call_timeout,
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, DatabaseError>>,
    ) -> Result<T, DatabaseError> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| DatabaseError::Timeout(self.call_timeout))?
    }

    fn new_customer(&self, identity: &VerifiedIdentity) -> CustomerRecord {
        let person = identity.registry_record();
        CustomerRecord {
            customer_id: Uuid::new_v4(),
            email: derive_email(&person.first_name, &person.last_name, &self.email_domain),
            first_name: person.first_name.clone(),
            last_name: person.last_name.clone(),
            date_of_birth: person.date_of_birth.clone(),
            national_id: identity.national_id().to_string(),
            country: identity.country(),
            source: identity.source().to_string(),
            status: CustomerStatus::Registered,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
impl RegistrationStep for Registrar {
    async fn register(
        &self,
        identity: &VerifiedIdentity,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let key = identity.key();

        if let Some(existing) = self.bounded(self.store.get_by_key(&key)).await? {
            info!(key = %masked_id(key.as_str()), "Customer already registered");
            return Ok(RegistrationOutcome::AlreadyExists {
                key,
                existing: Some(existing),
            });
        }

        let record = self.new_customer(identity);
        match self.bounded(self.store.put_if_absent(&key, &record)).await? {
            PutOutcome::Created => {
                info!(
                    key = %masked_id(key.as_str()),
                    customer_id = %record.customer_id,
                    "Customer registered"
                );
                Ok(RegistrationOutcome::Created(record))
            }
            PutOutcome::Conflict => {
                info!(key = %masked_id(key.as_str()), "Lost registration race");
                // Best effort: the row exists either way.
                let existing = self
                    .bounded(self.store.get_by_key(&key))
                    .await
                    .ok()
                    .flatten();
                Ok(RegistrationOutcome::AlreadyExists { key, existing })
            }
        }
    }
}
