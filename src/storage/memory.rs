//! In-process object storage with call accounting.
//!
//! Objects live in a `BTreeMap` per bucket so listings come back in key order.
//! Every stat and get is counted, which lets callers verify the pipeline's
//! promises about remote calls (one stat per new blob, one fetch per blob).

use super::{ListedObject, ObjectStat, ObjectStorage, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

#[derive(Clone, Debug)]
struct StoredObject {
    body: Bytes,
    content_type: String,
    content_hash: String,
    last_modified: DateTime<Utc>,
}

#[derive(Default, Debug)]
struct Inner {
    buckets: BTreeMap<String, BTreeMap<String, StoredObject>>,
    stat_calls: usize,
    get_calls: HashMap<String, usize>,
    put_calls: usize,
}

/// Counters for remote-style calls made against a [`MemoryStorage`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallStats {
    pub stat_calls: usize,
    pub get_calls: usize,
    pub put_calls: usize,
}

#[derive(Clone, Default, Debug)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned map is still consistent: every mutation is a single insert.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.lock().buckets.entry(bucket.to_string()).or_default();
    }

    /// Store an object directly, bypassing call accounting.
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Bytes>, content_type: &str) {
        let body = body.into();
        let object = StoredObject {
            content_hash: format!("{:x}", md5::compute(&body)),
            body,
            content_type: content_type.to_string(),
            last_modified: Utc::now(),
        };
        self.lock()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), object);
    }

    pub fn remove(&self, bucket: &str, key: &str) -> bool {
        self.lock()
            .buckets
            .get_mut(bucket)
            .and_then(|objects| objects.remove(key))
            .is_some()
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.lock()
            .buckets
            .get(bucket)
            .is_some_and(|objects| objects.contains_key(key))
    }

    pub fn call_stats(&self) -> CallStats {
        let inner = self.lock();
        CallStats {
            stat_calls: inner.stat_calls,
            get_calls: inner.get_calls.values().sum(),
            put_calls: inner.put_calls,
        }
    }

    /// Number of `get_object` calls made for one key.
    pub fn get_calls_for(&self, key: &str) -> usize {
        self.lock().get_calls.get(key).copied().unwrap_or(0)
    }

    pub fn reset_stats(&self) {
        let mut inner = self.lock();
        inner.stat_calls = 0;
        inner.get_calls.clear();
        inner.put_calls = 0;
    }

    fn lookup(&self, inner: &Inner, bucket: &str, key: &str) -> StorageResult<StoredObject> {
        let objects = inner
            .buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    fn provider(&self) -> &str {
        "memory"
    }

    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        Ok(self.lock().buckets.contains_key(bucket))
    }

    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
    ) -> BoxStream<'a, StorageResult<ListedObject>> {
        let listed: StorageResult<Vec<ListedObject>> = {
            let inner = self.lock();
            match inner.buckets.get(bucket) {
                None => Err(StorageError::BucketNotFound(bucket.to_string())),
                Some(objects) => Ok(objects
                    .range(prefix.to_string()..)
                    .take_while(|(key, _)| key.starts_with(prefix))
                    .map(|(key, object)| ListedObject {
                        key: key.clone(),
                        content_hash: object.content_hash.clone(),
                        size: object.body.len() as i64,
                        last_modified: object.last_modified,
                    })
                    .collect()),
            }
        };

        match listed {
            Ok(items) => stream::iter(items.into_iter().map(Ok)).boxed(),
            Err(err) => stream::iter(vec![Err(err)]).boxed(),
        }
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let mut inner = self.lock();
        *inner.get_calls.entry(key.to_string()).or_default() += 1;
        let object = self.lookup(&inner, bucket, key)?;
        Ok(object.body)
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectStat> {
        let mut inner = self.lock();
        inner.stat_calls += 1;
        let object = self.lookup(&inner, bucket, key)?;
        Ok(ObjectStat {
            content_type: object.content_type,
            size: object.body.len() as i64,
            content_hash: object.content_hash,
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        {
            let mut inner = self.lock();
            inner.put_calls += 1;
            if !inner.buckets.contains_key(bucket) {
                return Err(StorageError::BucketNotFound(bucket.to_string()));
            }
        }
        self.insert(bucket, key, body, content_type);
        Ok(())
    }
}
