use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;

/// Streaming object payload: bounded chunks, never materialized whole.
pub type ObjectBody = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// One entry of a listing page.
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    pub key: String,
    pub size: u64,
    /// Milliseconds since the epoch.
    pub last_modified: u64,
}

/// One page of a bucket listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectRecord>,
    /// Opaque continuation token; `None` on the last page.
    pub next_token: Option<String>,
}

/// Derived input for a put; `extras` is the backend-interpreted bag
/// (ACLs, content types, user metadata) that per-command overrides land in.
#[derive(Debug, Clone)]
pub struct PutRequest {
    pub bucket: String,
    pub key: String,
    pub extras: BTreeMap<String, String>,
}

impl PutRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            extras: BTreeMap::new(),
        }
    }
}

/// Derived input for a server-side copy.
#[derive(Debug, Clone)]
pub struct CopyRequest {
    pub source_bucket: String,
    pub source_key: String,
    pub dest: PutRequest,
}

/// The opaque store capability the engine runs against. Backends own
/// transport concerns, including retries of transient failures; errors
/// cross this seam as `anyhow::Error`.
///
/// Implementations must be safe to share between concurrent transfers.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// List one page of keys under `prefix`, resuming from `token`.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        token: Option<&str>,
    ) -> Result<ListPage>;

    /// Store an object from a chunk stream.
    async fn put(&self, request: PutRequest, body: ObjectBody) -> Result<()>;

    /// Open an object as a chunk stream.
    async fn get(&self, bucket: &str, key: &str) -> Result<ObjectBody>;

    /// Server-side copy between buckets/keys.
    async fn copy(&self, request: CopyRequest) -> Result<()>;

    /// Delete one object. Deleting a missing key is not an error.
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;
}
