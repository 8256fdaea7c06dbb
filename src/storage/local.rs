//! src/storage/local.rs
//!
//! LocalStorage: an object storage backend on local disk. Buckets are
//! directories directly beneath `base_path`, keys are relative paths inside
//! them, and content hashes are MD5 hex digests computed while streaming the
//! file, matching what S3-style backends report as the ETag for single-part
//! uploads.
//!
//! Listing has to report a hash for every file, so a cold listing reads the
//! whole bucket. Digests are cached per path together with the file's size and
//! modification time and reused while both are unchanged; a rewrite that keeps
//! both (coarse mtime resolution, or a deliberately reset mtime) is not noticed
//! until the cache entry is dropped. `stat_object` always hashes the file.

use super::{
    ListedObject, ObjectStat, ObjectStorage, StorageError, StorageResult, validate_bucket_name,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use md5::Context;
use std::{
    collections::{HashMap, HashSet},
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
    time::SystemTime,
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const TMP_PREFIX: &str = ".tmp-";
const READ_CHUNK: usize = 64 * 1024;

#[derive(Clone, Debug)]
pub struct LocalStorage {
    /// Directory holding one subdirectory per bucket.
    pub base_path: PathBuf,

    /// Provider name recorded on cataloged buckets.
    pub provider: String,

    digests: Arc<Mutex<HashMap<PathBuf, CachedDigest>>>,
}

#[derive(Clone, Debug)]
struct CachedDigest {
    size: u64,
    modified: SystemTime,
    content_hash: String,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            provider: "local".into(),
            digests: Arc::default(),
        }
    }

    fn digests(&self) -> MutexGuard<'_, HashMap<PathBuf, CachedDigest>> {
        // Entries are plain values; a poisoned map is still consistent.
        self.digests.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Hash of a listed file, reusing the cached digest while the file's size
    /// and modification time match.
    async fn listed_digest(
        &self,
        path: &Path,
        size: u64,
        modified: Option<SystemTime>,
    ) -> StorageResult<(String, i64)> {
        if let Some(modified) = modified {
            let cached = self.digests().get(path).cloned();
            if let Some(cached) = cached.filter(|c| c.size == size && c.modified == modified) {
                return Ok((cached.content_hash, size as i64));
            }
        }

        let (content_hash, hashed) = hash_file(path).await?;
        match modified {
            Some(modified) if hashed as u64 == size => {
                self.digests().insert(
                    path.to_path_buf(),
                    CachedDigest {
                        size,
                        modified,
                        content_hash: content_hash.clone(),
                    },
                );
            }
            _ => {
                self.digests().remove(path);
            }
        }
        Ok((content_hash, hashed))
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Create a bucket directory if it is missing.
    pub async fn create_bucket(&self, bucket: &str) -> StorageResult<()> {
        validate_bucket_name(bucket)?;
        fs::create_dir_all(self.bucket_root(bucket)).await?;
        Ok(())
    }

    /// Reject keys that could escape the bucket directory.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        let invalid = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.contains("..")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(StorageError::InvalidObjectKey(key.to_string()));
        }
        Ok(())
    }

    fn bucket_root(&self, bucket: &str) -> PathBuf {
        self.base_path.join(bucket)
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_root(bucket).join(key)
    }

    /// Resolve an existing bucket directory. Names are validated first so
    /// that no bucket resolves outside `base_path`.
    async fn ensure_bucket(&self, bucket: &str) -> StorageResult<PathBuf> {
        validate_bucket_name(bucket)?;
        let root = self.bucket_root(bucket);
        match fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => Ok(root),
            Ok(_) => Err(StorageError::BucketNotFound(bucket.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StorageError::BucketNotFound(bucket.to_string()))
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    fn not_found(bucket: &str, key: &str, err: io::Error) -> StorageError {
        if err.kind() == ErrorKind::NotFound {
            StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }
        } else {
            StorageError::Io(err)
        }
    }

    /// Collect every regular file under the bucket root whose key starts with
    /// `prefix`, sorted by key.
    async fn walk(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ListedObject>> {
        let root = self.ensure_bucket(bucket).await?;
        let mut pending = vec![root.clone()];
        let mut found = Vec::new();
        let mut seen = HashSet::new();

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }
                if entry.file_name().to_string_lossy().starts_with(TMP_PREFIX) {
                    continue;
                }
                let Some(key) = relative_key(&root, &path) else {
                    continue;
                };
                if !key.starts_with(prefix) {
                    continue;
                }

                let meta = entry.metadata().await?;
                let modified = meta.modified().ok();
                let (content_hash, size) =
                    self.listed_digest(&path, meta.len(), modified).await?;
                let last_modified = modified.map(DateTime::<Utc>::from).unwrap_or_else(Utc::now);
                seen.insert(path);
                found.push(ListedObject {
                    key,
                    content_hash,
                    size,
                    last_modified,
                });
            }
        }

        if prefix.is_empty() {
            self.digests()
                .retain(|path, _| !path.starts_with(&root) || seen.contains(path));
        }

        found.sort_by(|a, b| a.key.cmp(&b.key));
        debug!(bucket, prefix, count = found.len(), "listed local objects");
        Ok(found)
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        match self.ensure_bucket(bucket).await {
            Ok(_) => Ok(true),
            Err(StorageError::BucketNotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
    ) -> BoxStream<'a, StorageResult<ListedObject>> {
        stream::once(self.walk(bucket, prefix))
            .flat_map(|res| match res {
                Ok(items) => stream::iter(items.into_iter().map(Ok)).boxed(),
                Err(err) => stream::iter(vec![Err(err)]).boxed(),
            })
            .boxed()
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        self.ensure_key_safe(key)?;
        self.ensure_bucket(bucket).await?;
        let bytes = fs::read(self.object_path(bucket, key))
            .await
            .map_err(|err| Self::not_found(bucket, key, err))?;
        Ok(Bytes::from(bytes))
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectStat> {
        self.ensure_key_safe(key)?;
        self.ensure_bucket(bucket).await?;
        let path = self.object_path(bucket, key);
        let (content_hash, size) = hash_file(&path)
            .await
            .map_err(|err| Self::not_found(bucket, key, err))?;
        Ok(ObjectStat {
            content_type: super::guess_content_type(key).to_string(),
            size,
            content_hash,
        })
    }

    /// Write to a temp file beside the destination, fsync, then rename into
    /// place so readers never observe a partial object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        _content_type: &str,
    ) -> StorageResult<()> {
        self.ensure_key_safe(key)?;
        self.ensure_bucket(bucket).await?;

        let file_path = self.object_path(bucket, key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!("{}{}", TMP_PREFIX, Uuid::new_v4()));

        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(&body).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &file_path).await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        self.digests().remove(&file_path);

        debug!(bucket, key, size = body.len(), "stored object");
        Ok(())
    }
}

/// Stream a file through MD5, returning the hex digest and byte count.
async fn hash_file(path: &Path) -> io::Result<(String, i64)> {
    let mut file = File::open(path).await?;
    let mut digest = Context::new();
    let mut size: i64 = 0;
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        size += n as i64;
        digest.consume(&buf[..n]);
    }
    Ok((format!("{:x}", digest.compute()), size))
}

/// Key of `path` relative to the bucket root, with `/` separators.
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
