//! libSQL backend: async `RecordStore` implementation.
//!
//! Supports local file and in-memory databases. The conditional insert is a
//! single `INSERT ... ON CONFLICT DO NOTHING` statement; the affected-row
//! count decides between `Created` and `Conflict`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::identity::{
    CompositeKey, Country, CustomerRecord, CustomerStatus, PROFILE_SORT_KEY, masked_id,
};
use crate::store::migrations;
use crate::store::records::{PutOutcome, RecordStore};

/// libSQL record store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlRecordStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlRecordStore {
    /// Open a store from a path, treating `:memory:` as an in-memory database.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        if path == ":memory:" {
            Self::new_memory().await
        } else {
            Self::new_local(Path::new(path)).await
        }
    }

    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&store.conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&store.conn).await?;
        Ok(store)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 string written by this backend.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Serialization(format!("bad created_at {s:?}: {e}")))
}

fn row_to_customer(row: &libsql::Row) -> Result<CustomerRecord, DatabaseError> {
    let text = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Serialization(format!("column {idx}: {e}")))
    };

    let customer_id = Uuid::parse_str(&text(0)?)
        .map_err(|e| DatabaseError::Serialization(format!("bad customer_id: {e}")))?;
    let country: Country = text(6)?
        .parse()
        .map_err(|e| DatabaseError::Serialization(format!("bad country: {e}")))?;
    let status_raw = text(8)?;
    let status = CustomerStatus::parse(&status_raw)
        .ok_or_else(|| DatabaseError::Serialization(format!("bad status {status_raw:?}")))?;

    Ok(CustomerRecord {
        customer_id,
        email: text(1)?,
        first_name: text(2)?,
        last_name: text(3)?,
        date_of_birth: text(4)?,
        national_id: text(5)?,
        country,
        source: text(7)?,
        status,
        created_at: parse_datetime(&text(9)?)?,
    })
}

#[async_trait]
impl RecordStore for LibSqlRecordStore {
    async fn get_by_key(
        &self,
        key: &CompositeKey,
    ) -> Result<Option<CustomerRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT customer_id, email, first_name, last_name, date_of_birth, national_id,
                        country, source, status, created_at
                 FROM customers WHERE pk = ?1 AND sk = ?2",
                params![key.as_str(), PROFILE_SORT_KEY],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_by_key: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_customer(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_by_key: {e}"))),
        }
    }

    async fn put_if_absent(
        &self,
        key: &CompositeKey,
        record: &CustomerRecord,
    ) -> Result<PutOutcome, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "INSERT INTO customers (pk, sk, customer_id, email, first_name, last_name,
                                        date_of_birth, national_id, country, source, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT (pk, sk) DO NOTHING",
                params![
                    key.as_str(),
                    PROFILE_SORT_KEY,
                    record.customer_id.to_string(),
                    record.email.as_str(),
                    record.first_name.as_str(),
                    record.last_name.as_str(),
                    record.date_of_birth.as_str(),
                    record.national_id.as_str(),
                    record.country.code(),
                    record.source.as_str(),
                    record.status.as_str(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("put_if_absent: {e}")))?;

        let outcome = if affected == 1 {
            PutOutcome::Created
        } else {
            PutOutcome::Conflict
        };
        debug!(
            country = %record.country,
            national_id = %masked_id(&record.national_id),
            ?outcome,
            "Conditional customer insert"
        );
        Ok(outcome)
    }

    async fn count(&self) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM customers WHERE sk = ?1",
                params![PROFILE_SORT_KEY],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("count: {e}")))?;
        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
                Ok(count as usize)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count: {e}"))),
        }
    }
}
