//! Object storage for uploaded identity documents.
//!
//! Keys follow `onboard/<COUNTRY>/<YYYY>/<MM>/<DD>/<sessionId>/<file>`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ObjectStoreError, RequestError};
use crate::identity::{Country, SessionId};

/// Root prefix for onboarding uploads.
pub const UPLOAD_PREFIX: &str = "onboard";

/// Default file name for the front of an ID document.
pub const DEFAULT_UPLOAD_FILE: &str = "id_front.jpg";

/// A validated, relative object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectLocation(String);

impl ObjectLocation {
    pub fn parse(raw: &str) -> Result<Self, ObjectStoreError> {
        let raw = raw.trim();
        let invalid = |reason: &str| ObjectStoreError::InvalidLocation {
            location: raw.to_string(),
            reason: reason.to_string(),
        };
        if raw.is_empty() {
            return Err(invalid("empty"));
        }
        if raw.starts_with('/') || raw.contains('\\') {
            return Err(invalid("must be a relative key"));
        }
        if raw
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return Err(invalid("empty or relative path segment"));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the document uploaded for `session` on `date`.
    pub fn for_upload(
        country: Country,
        date: NaiveDate,
        session: &SessionId,
        file_name: &str,
    ) -> Result<Self, RequestError> {
        let file_ok = !file_name.is_empty()
            && !file_name.starts_with('.')
            && file_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if !file_ok {
            return Err(RequestError::InvalidObjectLocation(format!(
                "bad file name {file_name:?}"
            )));
        }
        Ok(Self(format!(
            "{}{}",
            session_prefix(country, date, session),
            file_name
        )))
    }
}

impl std::fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ObjectLocation {
    type Error = ObjectStoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ObjectLocation> for String {
    fn from(loc: ObjectLocation) -> Self {
        loc.0
    }
}

/// Prefix under which all uploads of one session on one day live.
pub fn session_prefix(country: Country, date: NaiveDate, session: &SessionId) -> String {
    format!(
        "{UPLOAD_PREFIX}/{}/{}/{}/",
        country.code(),
        date.format("%Y/%m/%d"),
        session
    )
}

/// Listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub location: ObjectLocation,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Blob storage capability consumed by the pipeline.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the bytes at `location`.
    async fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, ObjectStoreError>;

    /// Store `bytes` at `location`, replacing any previous object.
    async fn put(&self, location: &ObjectLocation, bytes: Vec<u8>) -> Result<(), ObjectStoreError>;

    /// List objects whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, ObjectStoreError>;
}

/// Most recent upload for a session on the given day, if any.
pub async fn latest_upload(
    store: &dyn ObjectStore,
    country: Country,
    session: &SessionId,
    date: NaiveDate,
) -> Result<Option<ObjectLocation>, ObjectStoreError> {
    let prefix = session_prefix(country, date, session);
    let objects = store.list(&prefix).await?;
    Ok(objects
        .into_iter()
        .max_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.location.cmp(&b.location))
        })
        .map(|meta| meta.location))
}

// ── Filesystem backend ──────────────────────────────────────────────

/// Object store backed by a directory tree.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, ObjectStoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        info!(root = %root.display(), "Object store opened");
        Ok(Self { root })
    }

    fn path_for(&self, location: &ObjectLocation) -> PathBuf {
        self.root.join(location.as_str())
    }

    fn location_for(&self, path: &Path) -> Option<ObjectLocation> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let key = rel
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?
            .join("/");
        ObjectLocation::parse(&key).ok()
    }
}

/// Prefix of in-flight writes; never listed.
const TEMP_PREFIX: &str = ".tmp-";

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{TEMP_PREFIX}{}-{name}", Uuid::new_v4()))
}

fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(TEMP_PREFIX))
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, ObjectStoreError> {
        match tokio::fs::read(self.path_for(location)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ObjectStoreError::NotFound {
                location: location.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, location: &ObjectLocation, bytes: Vec<u8>) -> Result<(), ObjectStoreError> {
        let path = self.path_for(location);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Readers only ever see a complete object: write aside, then rename over.
        let tmp = temp_sibling(&path);
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(e.into());
        }
        debug!(location = %location, size = bytes.len(), "Object stored");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, ObjectStoreError> {
        // Walk from the deepest directory fully named by the prefix.
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let start = self.root.join(dir_part);
        let mut out = Vec::new();
        let mut stack = vec![start];

        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let meta = entry.metadata().await?;
                let path = entry.path();
                if meta.is_dir() {
                    stack.push(path);
                    continue;
                }
                if is_temp_file(&path) {
                    continue;
                }
                let Some(location) = self.location_for(&path) else {
                    continue;
                };
                if !location.as_str().starts_with(prefix) {
                    continue;
                }
                let last_modified = meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                out.push(ObjectMeta {
                    location,
                    size: meta.len(),
                    last_modified,
                });
            }
        }

        out.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(out)
    }
}

// ── In-memory backend ───────────────────────────────────────────────

/// In-memory object store (tests and demos).
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<ObjectLocation, (Vec<u8>, DateTime<Utc>)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object with an explicit modification time.
    pub async fn put_at(&self, location: ObjectLocation, bytes: Vec<u8>, at: DateTime<Utc>) {
        self.objects.write().await.insert(location, (bytes, at));
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, ObjectStoreError> {
        self.objects
            .read()
            .await
            .get(location)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| ObjectStoreError::NotFound {
                location: location.to_string(),
            })
    }

    async fn put(&self, location: &ObjectLocation, bytes: Vec<u8>) -> Result<(), ObjectStoreError> {
        self.put_at(location.clone(), bytes, Utc::now()).await;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, ObjectStoreError> {
        Ok(self
            .objects
            .read()
            .await
            .iter()
            .filter(|(loc, _)| loc.as_str().starts_with(prefix))
            .map(|(loc, (bytes, at))| ObjectMeta {
                location: loc.clone(),
                size: bytes.len() as u64,
                last_modified: *at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn session() -> SessionId {
        SessionId::parse("sess-1").unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn location_rejects_traversal_and_absolute_paths() {
        assert!(ObjectLocation::parse("onboard/SE/a.jpg").is_ok());
        assert!(ObjectLocation::parse("").is_err());
        assert!(ObjectLocation::parse("/etc/passwd").is_err());
        assert!(ObjectLocation::parse("onboard/../secret").is_err());
        assert!(ObjectLocation::parse("onboard//a.jpg").is_err());
        assert!(ObjectLocation::parse("onboard\\a.jpg").is_err());
    }

    #[test]
    fn upload_key_layout() {
        let loc =
            ObjectLocation::for_upload(Country::Sweden, day(), &session(), DEFAULT_UPLOAD_FILE)
                .unwrap();
        assert_eq!(loc.as_str(), "onboard/SE/2026/10/16/sess-1/id_front.jpg");
    }

    #[test]
    fn upload_key_rejects_bad_file_names() {
        for bad in ["", "../x.jpg", "a/b.jpg", ".hidden"] {
            assert!(
                ObjectLocation::for_upload(Country::Sweden, day(), &session(), bad).is_err(),
                "{bad:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn memory_store_get_missing_is_not_found() {
        let store = MemoryObjectStore::new();
        let loc = ObjectLocation::parse("onboard/none.jpg").unwrap();
        assert!(matches!(
            store.get(&loc).await,
            Err(ObjectStoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn latest_upload_picks_newest_object() {
        let store = MemoryObjectStore::new();
        let older =
            ObjectLocation::for_upload(Country::Sweden, day(), &session(), "a.jpg").unwrap();
        let newer =
            ObjectLocation::for_upload(Country::Sweden, day(), &session(), "b.jpg").unwrap();
        store
            .put_at(newer.clone(), b"new".to_vec(), Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap())
            .await;
        store
            .put_at(older, b"old".to_vec(), Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap())
            .await;

        let found = latest_upload(&store, Country::Sweden, &session(), day())
            .await
            .unwrap();
        assert_eq!(found, Some(newer));
    }

    #[tokio::test]
    async fn latest_upload_ignores_other_sessions() {
        let store = MemoryObjectStore::new();
        let other = SessionId::parse("sess-2").unwrap();
        let loc = ObjectLocation::for_upload(Country::Sweden, day(), &other, "a.jpg").unwrap();
        store.put(&loc, b"x".to_vec()).await.unwrap();

        let found = latest_upload(&store, Country::Sweden, &session(), day())
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn fs_store_put_get_list() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(tmp.path()).await.unwrap();
        let loc =
            ObjectLocation::for_upload(Country::Norway, day(), &session(), DEFAULT_UPLOAD_FILE)
                .unwrap();

        store.put(&loc, b"scan".to_vec()).await.unwrap();
        assert_eq!(store.get(&loc).await.unwrap(), b"scan");

        let listed = store
            .list(&session_prefix(Country::Norway, day(), &session()))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].location, loc);
        assert_eq!(listed[0].size, 4);

        let latest = latest_upload(&store, Country::Norway, &session(), day())
            .await
            .unwrap();
        assert_eq!(latest, Some(loc));
    }

    #[tokio::test]
    async fn fs_store_missing_object_and_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(tmp.path()).await.unwrap();
        let loc = ObjectLocation::parse("onboard/SE/missing.jpg").unwrap();
        assert!(matches!(
            store.get(&loc).await,
            Err(ObjectStoreError::NotFound { .. })
        ));
        assert!(store.list("onboard/SE/2026/").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn fs_store_readers_never_see_partial_objects() {
        let tmp = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FsObjectStore::open(tmp.path()).await.unwrap());
        let loc =
            ObjectLocation::for_upload(Country::Sweden, day(), &session(), "id_front.json")
                .unwrap();
        const SIZE: usize = 512 * 1024;
        store.put(&loc, vec![b'a'; SIZE]).await.unwrap();

        let writer = {
            let store = store.clone();
            let loc = loc.clone();
            tokio::spawn(async move {
                for i in 0..20 {
                    let fill = if i % 2 == 0 { b'b' } else { b'a' };
                    store.put(&loc, vec![fill; SIZE]).await.unwrap();
                }
            })
        };
        for _ in 0..40 {
            let bytes = store.get(&loc).await.unwrap();
            assert_eq!(bytes.len(), SIZE);
            assert!(bytes.iter().all(|b| *b == bytes[0]));
        }
        writer.await.unwrap();

        let dir = tmp.path().join(session_prefix(Country::Sweden, day(), &session()));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);

        // In-flight files are not listed.
        tokio::fs::write(dir.join(format!("{TEMP_PREFIX}partial")), b"x")
            .await
            .unwrap();
        let listed = store
            .list(&session_prefix(Country::Sweden, day(), &session()))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].location, loc);
    }
}
