//! Object Store Abstraction
//!
//! Trait-based abstraction over the buckets that hold queued items and
//! processed outputs. Everything the pipeline does to a bucket goes through
//! this trait, so tests and simulations can swap the backend.
//!
//! Implementations:
//! - `InMemoryObjectStore`: For unit tests and DST
//! - `LocalFsObjectStore`: For development (one directory per bucket)
//! - `S3ObjectStore`: For production (feature-gated)

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Metadata for a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object key (path)
    pub key: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Creation timestamp (Unix ms)
    pub created_at_ms: u64,
    /// ETag or content hash (optional)
    pub etag: Option<String>,
}

/// Result of a list operation
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    /// Objects matching the prefix
    pub objects: Vec<ObjectMeta>,
    /// Continuation token for pagination (if more results exist)
    pub continuation_token: Option<String>,
}

/// Access control applied to newly written objects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessPolicy {
    #[default]
    Private,
    PublicRead,
}

impl AccessPolicy {
    /// Canned ACL name as understood by S3
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessPolicy::Private => "private",
            AccessPolicy::PublicRead => "public-read",
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, AccessPolicy::PublicRead)
    }
}

impl std::fmt::Display for AccessPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccessPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(AccessPolicy::Private),
            "public-read" => Ok(AccessPolicy::PublicRead),
            other => Err(format!("unknown access policy '{}'", other)),
        }
    }
}

/// Options for a put
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    pub access: AccessPolicy,
}

impl PutOptions {
    pub fn with_access(access: AccessPolicy) -> Self {
        PutOptions { access }
    }
}

/// Options for URL generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlOptions {
    /// How long the URL stays valid; `None` for URLs that never expire
    pub expires_in: Option<Duration>,
}

/// Object store abstraction trait
///
/// Methods return boxed futures so the trait stays object safe and can be
/// shared as `Arc<dyn ObjectStore>`.
pub trait ObjectStore: Send + Sync + 'static {
    /// Put an object (create or overwrite)
    fn put<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
        options: PutOptions,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>>;

    /// Get an object's contents
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<Vec<u8>>> + Send + 'a>>;

    /// Check if an object exists
    fn exists<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<bool>> + Send + 'a>>;

    /// Delete an object. Deleting a missing key succeeds.
    fn delete<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>>;

    /// List objects with a prefix, in ascending key order
    fn list<'a>(
        &'a self,
        prefix: &'a str,
        continuation_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = IoResult<ListResult>> + Send + 'a>>;

    /// Rename/move an object. Fails with `NotFound` if `from` is missing.
    fn rename<'a>(
        &'a self,
        from: &'a str,
        to: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>>;

    /// Get object metadata without downloading content
    fn head<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<ObjectMeta>> + Send + 'a>>;

    /// Build a URL through which the object can be fetched
    fn url_for<'a>(
        &'a self,
        key: &'a str,
        options: UrlOptions,
    ) -> Pin<Box<dyn Future<Output = IoResult<String>> + Send + 'a>>;
}

/// Collect every page of a listing
pub async fn list_all(store: &dyn ObjectStore, prefix: &str) -> IoResult<Vec<ObjectMeta>> {
    let mut objects = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = store.list(prefix, token.as_deref()).await?;
        objects.extend(page.objects);
        match page.continuation_token {
            Some(next) => token = Some(next),
            None => return Ok(objects),
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ============================================================================
// InMemoryObjectStore - For tests and DST
// ============================================================================

/// Page size for in-memory listings; small enough that tests cross pages
const IN_MEMORY_PAGE_SIZE: usize = 100;

/// In-memory object store for unit tests and deterministic simulation
#[derive(Debug)]
pub struct InMemoryObjectStore {
    name: String,
    data: Arc<RwLock<BTreeMap<String, StoredObject>>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    created_at_ms: u64,
    access: AccessPolicy,
}

impl InMemoryObjectStore {
    /// Create a new in-memory object store
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Create a store whose URLs carry the given bucket name
    pub fn named(name: impl Into<String>) -> Self {
        InMemoryObjectStore {
            name: name.into(),
            data: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Get the number of stored objects (for testing)
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if empty (for testing)
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// All keys in ascending order (for testing)
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    /// Access policy an object was stored with (for testing)
    pub fn access_of(&self, key: &str) -> Option<AccessPolicy> {
        self.data.read().get(key).map(|obj| obj.access)
    }

    fn meta(key: &str, obj: &StoredObject) -> ObjectMeta {
        ObjectMeta {
            key: key.to_string(),
            size_bytes: obj.data.len() as u64,
            created_at_ms: obj.created_at_ms,
            etag: None,
        }
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InMemoryObjectStore {
    fn clone(&self) -> Self {
        InMemoryObjectStore {
            name: self.name.clone(),
            data: Arc::clone(&self.data),
        }
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
        options: PutOptions,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let obj = StoredObject {
                data: data.to_vec(),
                created_at_ms: now_ms(),
                access: options.access,
            };
            self.data.write().insert(key.to_string(), obj);
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<Vec<u8>>> + Send + 'a>> {
        Box::pin(async move {
            self.data
                .read()
                .get(key)
                .map(|obj| obj.data.clone())
                .ok_or_else(|| IoError::new(ErrorKind::NotFound, format!("Key not found: {}", key)))
        })
    }

    fn exists<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<bool>> + Send + 'a>> {
        Box::pin(async move { Ok(self.data.read().contains_key(key)) })
    }

    fn delete<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.data.write().remove(key);
            Ok(())
        })
    }

    fn list<'a>(
        &'a self,
        prefix: &'a str,
        continuation_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = IoResult<ListResult>> + Send + 'a>> {
        Box::pin(async move {
            let offset: usize = match continuation_token {
                Some(token) => token.parse().map_err(|_| {
                    IoError::new(
                        ErrorKind::InvalidInput,
                        format!("Invalid continuation token: {}", token),
                    )
                })?,
                None => 0,
            };

            let data = self.data.read();
            let mut matching = data
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .skip(offset);

            let objects: Vec<ObjectMeta> = matching
                .by_ref()
                .take(IN_MEMORY_PAGE_SIZE)
                .map(|(k, v)| Self::meta(k, v))
                .collect();

            let continuation_token = if matching.next().is_some() {
                Some((offset + IN_MEMORY_PAGE_SIZE).to_string())
            } else {
                None
            };

            Ok(ListResult {
                objects,
                continuation_token,
            })
        })
    }

    fn rename<'a>(
        &'a self,
        from: &'a str,
        to: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut data = self.data.write();
            if let Some(obj) = data.remove(from) {
                data.insert(to.to_string(), obj);
                Ok(())
            } else {
                Err(IoError::new(
                    ErrorKind::NotFound,
                    format!("Source key not found: {}", from),
                ))
            }
        })
    }

    fn head<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<ObjectMeta>> + Send + 'a>> {
        Box::pin(async move {
            self.data
                .read()
                .get(key)
                .map(|obj| Self::meta(key, obj))
                .ok_or_else(|| IoError::new(ErrorKind::NotFound, format!("Key not found: {}", key)))
        })
    }

    fn url_for<'a>(
        &'a self,
        key: &'a str,
        options: UrlOptions,
    ) -> Pin<Box<dyn Future<Output = IoResult<String>> + Send + 'a>> {
        Box::pin(async move {
            let base = format!("memory://{}/{}", self.name, key.trim_start_matches('/'));
            Ok(match options.expires_in {
                Some(expires_in) => format!("{}?expires_in={}", base, expires_in.as_secs()),
                None => base,
            })
        })
    }
}

// ============================================================================
// LocalFsObjectStore - For development
// ============================================================================

/// Local filesystem object store for development and testing
///
/// Access policies have no meaning on a local disk and are ignored.
#[derive(Debug, Clone)]
pub struct LocalFsObjectStore {
    base_path: PathBuf,
}

impl LocalFsObjectStore {
    /// Create a new local filesystem object store
    pub fn new(base_path: PathBuf) -> Self {
        LocalFsObjectStore { base_path }
    }

    /// Get the full path for a key
    fn full_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key.trim_start_matches('/'))
    }

    /// Ensure parent directories exist
    async fn ensure_parent(path: &Path) -> IoResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Get the base path (for testing)
    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    fn meta_from(key: String, metadata: &std::fs::Metadata) -> ObjectMeta {
        ObjectMeta {
            key,
            size_bytes: metadata.len(),
            created_at_ms: metadata
                .created()
                .or_else(|_| metadata.modified())
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            etag: None,
        }
    }
}

/// Walk `dir` collecting files whose base-relative key starts with `prefix`
///
/// Entries that vanish mid-walk (claimed or deleted by another worker) are
/// skipped.
fn walk_dir(dir: &Path, base: &Path, prefix: &str, objects: &mut Vec<ObjectMeta>) -> IoResult<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        let path = entry.path();

        if path.is_dir() {
            walk_dir(&path, base, prefix, objects)?;
        } else if path.is_file() {
            let Ok(relative) = path.strip_prefix(base) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if key.starts_with(prefix) {
                objects.extend(stat_file(key, &path)?);
            }
        }
    }
    Ok(())
}

/// Metadata for one listed file, `None` if it is already gone
fn stat_file(key: String, path: &Path) -> IoResult<Option<ObjectMeta>> {
    match std::fs::metadata(path) {
        Ok(metadata) => Ok(Some(LocalFsObjectStore::meta_from(key, &metadata))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

impl ObjectStore for LocalFsObjectStore {
    fn put<'a>(
        &'a self,
        key: &'a str,
        data: &'a [u8],
        _options: PutOptions,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.full_path(key);
            Self::ensure_parent(&path).await?;
            tokio::fs::write(&path, data).await
        })
    }

    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<Vec<u8>>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.full_path(key);
            tokio::fs::read(&path).await
        })
    }

    fn exists<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<bool>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.full_path(key);
            tokio::fs::try_exists(&path).await
        })
    }

    fn delete<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.full_path(key);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()), // Already deleted
                Err(e) => Err(e),
            }
        })
    }

    fn list<'a>(
        &'a self,
        prefix: &'a str,
        _continuation_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = IoResult<ListResult>> + Send + 'a>> {
        Box::pin(async move {
            let base = self.base_path.clone();
            let prefix = prefix.trim_start_matches('/').to_string();

            tokio::task::spawn_blocking(move || -> IoResult<ListResult> {
                if !base.exists() {
                    return Ok(ListResult::default());
                }

                let mut objects = Vec::new();
                walk_dir(&base, &base, &prefix, &mut objects)?;
                objects.sort_by(|a, b| a.key.cmp(&b.key));

                Ok(ListResult {
                    objects,
                    continuation_token: None,
                })
            })
            .await
            .map_err(|e| IoError::new(ErrorKind::Other, format!("listing task failed: {}", e)))?
        })
    }

    fn rename<'a>(
        &'a self,
        from: &'a str,
        to: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let from_path = self.full_path(from);
            let to_path = self.full_path(to);
            Self::ensure_parent(&to_path).await?;
            tokio::fs::rename(&from_path, &to_path).await
        })
    }

    fn head<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = IoResult<ObjectMeta>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.full_path(key);
            let metadata = tokio::fs::metadata(&path).await?;
            Ok(Self::meta_from(key.to_string(), &metadata))
        })
    }

    fn url_for<'a>(
        &'a self,
        key: &'a str,
        _options: UrlOptions,
    ) -> Pin<Box<dyn Future<Output = IoResult<String>> + Send + 'a>> {
        Box::pin(async move { Ok(format!("file://{}", self.full_path(key).display())) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inmemory_put_get() {
        let store = InMemoryObjectStore::new();

        store
            .put("test/key1", b"hello world", PutOptions::default())
            .await
            .unwrap();
        let data = store.get("test/key1").await.unwrap();

        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn test_inmemory_put_records_access_policy() {
        let store = InMemoryObjectStore::new();

        store
            .put("public", b"x", PutOptions::with_access(AccessPolicy::PublicRead))
            .await
            .unwrap();
        store.put("private", b"y", PutOptions::default()).await.unwrap();

        assert_eq!(store.access_of("public"), Some(AccessPolicy::PublicRead));
        assert_eq!(store.access_of("private"), Some(AccessPolicy::Private));
    }

    #[tokio::test]
    async fn test_inmemory_delete_is_idempotent() {
        let store = InMemoryObjectStore::new();

        store.put("test/key1", b"data", PutOptions::default()).await.unwrap();
        store.delete("test/key1").await.unwrap();
        store.delete("test/key1").await.unwrap();
        assert!(!store.exists("test/key1").await.unwrap());
    }

    #[tokio::test]
    async fn test_inmemory_list_prefix_in_key_order() {
        let store = InMemoryObjectStore::new();

        store.put("incoming/b", b"2", PutOptions::default()).await.unwrap();
        store.put("incoming/a", b"1", PutOptions::default()).await.unwrap();
        store.put("other/c", b"3", PutOptions::default()).await.unwrap();

        let result = store.list("incoming/", None).await.unwrap();
        let keys: Vec<_> = result.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["incoming/a", "incoming/b"]);
        assert!(result.continuation_token.is_none());
    }

    #[tokio::test]
    async fn test_inmemory_list_paginates() {
        let store = InMemoryObjectStore::new();
        let total = IN_MEMORY_PAGE_SIZE + 7;
        for i in 0..total {
            store
                .put(&format!("q/{:04}", i), b"x", PutOptions::default())
                .await
                .unwrap();
        }

        let first = store.list("q/", None).await.unwrap();
        assert_eq!(first.objects.len(), IN_MEMORY_PAGE_SIZE);
        assert!(first.continuation_token.is_some());

        let all = list_all(&store, "q/").await.unwrap();
        assert_eq!(all.len(), total);
        assert_eq!(all[0].key, "q/0000");
        assert_eq!(all[total - 1].key, format!("q/{:04}", total - 1));
    }

    #[tokio::test]
    async fn test_inmemory_rename() {
        let store = InMemoryObjectStore::new();

        store.put("old/key", b"data", PutOptions::default()).await.unwrap();
        store.rename("old/key", "new/key").await.unwrap();

        assert!(!store.exists("old/key").await.unwrap());
        assert_eq!(store.get("new/key").await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_inmemory_rename_missing_is_not_found() {
        let store = InMemoryObjectStore::new();
        let err = store.rename("missing", "elsewhere").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_inmemory_head() {
        let store = InMemoryObjectStore::new();

        let data = b"hello world";
        store.put("test/key", data, PutOptions::default()).await.unwrap();

        let meta = store.head("test/key").await.unwrap();
        assert_eq!(meta.key, "test/key");
        assert_eq!(meta.size_bytes, data.len() as u64);
    }

    #[tokio::test]
    async fn test_inmemory_url_for() {
        let store = InMemoryObjectStore::named("processed");

        let plain = store.url_for("abc", UrlOptions::default()).await.unwrap();
        assert_eq!(plain, "memory://processed/abc");

        let expiring = store
            .url_for(
                "abc",
                UrlOptions {
                    expires_in: Some(Duration::from_secs(60)),
                },
            )
            .await
            .unwrap();
        assert_eq!(expiring, "memory://processed/abc?expires_in=60");
    }

    #[test]
    fn test_access_policy_parse() {
        assert_eq!("private".parse::<AccessPolicy>(), Ok(AccessPolicy::Private));
        assert_eq!(
            "public-read".parse::<AccessPolicy>(),
            Ok(AccessPolicy::PublicRead)
        );
        assert!("world-writable".parse::<AccessPolicy>().is_err());
        assert_eq!(AccessPolicy::PublicRead.to_string(), "public-read");
    }

    #[tokio::test]
    async fn test_localfs_put_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsObjectStore::new(dir.path().to_path_buf());

        store
            .put("test/key1.txt", b"hello world", PutOptions::default())
            .await
            .unwrap();
        let data = store.get("test/key1.txt").await.unwrap();

        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn test_localfs_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsObjectStore::new(dir.path().to_path_buf());

        store.put("incoming/b.bin", b"2", PutOptions::default()).await.unwrap();
        store.put("incoming/a.bin", b"1", PutOptions::default()).await.unwrap();
        store.put("done/c.bin", b"3", PutOptions::default()).await.unwrap();

        let result = store.list("incoming/", None).await.unwrap();
        let keys: Vec<_> = result.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["incoming/a.bin", "incoming/b.bin"]);
    }

    #[tokio::test]
    async fn test_localfs_list_missing_base_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsObjectStore::new(dir.path().join("not-created-yet"));

        let result = store.list("", None).await.unwrap();
        assert!(result.objects.is_empty());
    }

    #[test]
    fn test_localfs_walk_skips_vanished_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kept"), b"1").unwrap();

        let gone = dir.path().join("claimed-elsewhere");
        assert!(stat_file("claimed-elsewhere".to_string(), &gone)
            .unwrap()
            .is_none());

        let mut objects = Vec::new();
        walk_dir(&dir.path().join("removed-subdir"), dir.path(), "", &mut objects).unwrap();
        assert!(objects.is_empty());

        walk_dir(dir.path(), dir.path(), "", &mut objects).unwrap();
        let keys: Vec<_> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["kept"]);
    }

    #[tokio::test]
    async fn test_localfs_rename_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsObjectStore::new(dir.path().to_path_buf());

        store.put("queue/file", b"data", PutOptions::default()).await.unwrap();
        store.rename("queue/file", "queue/---LOCKED---file").await.unwrap();

        assert!(!store.exists("queue/file").await.unwrap());
        assert!(store.exists("queue/---LOCKED---file").await.unwrap());

        store.delete("queue/---LOCKED---file").await.unwrap();
        store.delete("queue/---LOCKED---file").await.unwrap();
        assert!(!store.exists("queue/---LOCKED---file").await.unwrap());
    }
}
