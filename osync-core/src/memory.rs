//! In-memory reference backend, paginated like a real store so the
//! inventory code exercises continuation tokens in tests.

use crate::store::{CopyRequest, ListPage, ObjectBody, ObjectRecord, ObjectStore, PutRequest};
use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{stream, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

const DEFAULT_PAGE_SIZE: usize = 1000;
const GET_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: u64,
    extras: BTreeMap<String, String>,
}

/// Bucket namespace held in memory. Keys are kept sorted so listings are
/// lexicographic, matching the on-disk backend's contract.
#[derive(Debug)]
pub struct MemoryStore {
    buckets: RwLock<HashMap<String, BTreeMap<String, StoredObject>>>,
    page_size: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// A small page size lets tests drive multi-page listings.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            page_size: page_size.max(1),
        }
    }

    pub fn create_bucket(&self, name: &str) {
        self.buckets
            .write()
            .unwrap()
            .entry(name.to_string())
            .or_default();
    }

    /// Seed an object directly, with an explicit modification time.
    pub fn insert_object(&self, bucket: &str, key: &str, data: impl Into<Bytes>, last_modified: u64) {
        self.buckets
            .write()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    data: data.into(),
                    last_modified,
                    extras: BTreeMap::new(),
                },
            );
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.buckets
            .read()
            .unwrap()
            .get(bucket)
            .map(|objects| objects.contains_key(key))
            .unwrap_or(false)
    }

    pub fn object_data(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.buckets
            .read()
            .unwrap()
            .get(bucket)?
            .get(key)
            .map(|stored| stored.data.clone())
    }

    pub fn object_extras(&self, bucket: &str, key: &str) -> Option<BTreeMap<String, String>> {
        self.buckets
            .read()
            .unwrap()
            .get(bucket)?
            .get(key)
            .map(|stored| stored.extras.clone())
    }

    fn fetch(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        let buckets = self.buckets.read().unwrap();
        let objects = match buckets.get(bucket) {
            Some(objects) => objects,
            None => bail!("bucket `{bucket}` not found"),
        };
        match objects.get(key) {
            Some(stored) => Ok(stored.clone()),
            None => bail!("object `{key}` not found in bucket `{bucket}`"),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        token: Option<&str>,
    ) -> Result<ListPage> {
        let buckets = self.buckets.read().unwrap();
        let objects = match buckets.get(bucket) {
            Some(objects) => objects,
            None => bail!("bucket `{bucket}` not found"),
        };

        let mut page: Vec<ObjectRecord> = objects
            .iter()
            .filter(|(key, _)| prefix.map_or(true, |p| key.starts_with(p)))
            .filter(|(key, _)| token.map_or(true, |t| key.as_str() > t))
            .take(self.page_size + 1)
            .map(|(key, stored)| ObjectRecord {
                key: key.clone(),
                size: stored.data.len() as u64,
                last_modified: stored.last_modified,
            })
            .collect();

        let next_token = if page.len() > self.page_size {
            page.pop();
            page.last().map(|record| record.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects: page,
            next_token,
        })
    }

    async fn put(&self, request: PutRequest, mut body: ObjectBody) -> Result<()> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        let mut buckets = self.buckets.write().unwrap();
        let objects = match buckets.get_mut(&request.bucket) {
            Some(objects) => objects,
            None => bail!("bucket `{}` not found", request.bucket),
        };
        objects.insert(
            request.key,
            StoredObject {
                data: buf.freeze(),
                last_modified: now_millis(),
                extras: request.extras,
            },
        );
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        let stored = self.fetch(bucket, key)?;
        let mut rest = stored.data;
        let mut chunks: Vec<io::Result<Bytes>> = Vec::new();
        while rest.len() > GET_CHUNK_SIZE {
            chunks.push(Ok(rest.split_to(GET_CHUNK_SIZE)));
        }
        chunks.push(Ok(rest));
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn copy(&self, request: CopyRequest) -> Result<()> {
        let source = self.fetch(&request.source_bucket, &request.source_key)?;
        let mut buckets = self.buckets.write().unwrap();
        let objects = match buckets.get_mut(&request.dest.bucket) {
            Some(objects) => objects,
            None => bail!("bucket `{}` not found", request.dest.bucket),
        };
        let mut extras = source.extras;
        extras.extend(request.dest.extras);
        objects.insert(
            request.dest.key,
            StoredObject {
                data: source.data,
                last_modified: now_millis(),
                extras,
            },
        );
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let mut buckets = self.buckets.write().unwrap();
        let objects = match buckets.get_mut(bucket) {
            Some(objects) => objects,
            None => bail!("bucket `{bucket}` not found"),
        };
        objects.remove(key);
        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
