//! Persistence layer for uploaded documents and registered customers.

pub mod libsql_backend;
pub mod migrations;
pub mod objects;
pub mod records;

pub use libsql_backend::LibSqlRecordStore;
pub use objects::{
    DEFAULT_UPLOAD_FILE, FsObjectStore, MemoryObjectStore, ObjectLocation, ObjectMeta,
    ObjectStore, latest_upload, session_prefix,
};
pub use records::{MemoryRecordStore, PutOutcome, RecordStore};
