//! Filesystem-backed object store for OSync.
//!
//! Emulates a bucket namespace on local disk: one directory per bucket
//! under a common root, keys stored as nested files. Useful for tests and
//! for syncing against a directory that other tooling treats as a bucket.

mod paths;

use crate::paths::{ensure_key_safe, key_to_path, path_to_key};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use osync_core::{CopyRequest, ListPage, ObjectBody, ObjectRecord, ObjectStore, PutRequest};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;
use walkdir::WalkDir;

const DEFAULT_PAGE_SIZE: usize = 1000;

/// Disk-backed [`ObjectStore`]. Request extras are accepted but not
/// persisted; the filesystem offers no metadata channel for them.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    page_size: usize,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// A small page size lets tests drive multi-page listings.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn create_bucket(&self, name: &str) -> Result<()> {
        fs::create_dir_all(self.bucket_root(name))
            .await
            .with_context(|| format!("create bucket `{name}`"))
    }

    fn bucket_root(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<PathBuf> {
        let root = self.bucket_root(bucket);
        match fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => Ok(root),
            _ => bail!("bucket `{bucket}` not found"),
        }
    }

    /// After a delete, sweep now-empty parent directories so the bucket
    /// tree does not accumulate husks. `remove_dir` refuses populated
    /// directories, so the walk stops at the first ancestor still in use
    /// (or already gone).
    async fn sweep_empty_parents(&self, from: &Path, bucket_root: &Path) {
        for dir in from.ancestors() {
            if dir == bucket_root || !dir.starts_with(bucket_root) {
                break;
            }
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
        }
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        token: Option<&str>,
    ) -> Result<ListPage> {
        let bucket_root = self.ensure_bucket(bucket).await?;

        let mut records = Vec::new();
        for entry in WalkDir::new(&bucket_root).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.starts_with(".tmp-") {
                continue;
            }
            let key = match path_to_key(&bucket_root, entry.path()) {
                Some(key) => key,
                None => continue,
            };
            if let Some(p) = prefix {
                if !key.starts_with(p) {
                    continue;
                }
            }
            if let Some(t) = token {
                if key.as_str() <= t {
                    continue;
                }
            }
            let meta = entry.metadata()?;
            let last_modified = meta
                .modified()
                .ok()
                .and_then(|mtime| mtime.duration_since(UNIX_EPOCH).ok())
                .map(|elapsed| elapsed.as_millis() as u64)
                .unwrap_or(0);
            records.push(ObjectRecord {
                key,
                size: meta.len(),
                last_modified,
            });
        }

        records.sort_by(|a, b| a.key.cmp(&b.key));
        let next_token = if records.len() > self.page_size {
            records.truncate(self.page_size);
            records.last().map(|record| record.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects: records,
            next_token,
        })
    }

    async fn put(&self, request: PutRequest, mut body: ObjectBody) -> Result<()> {
        ensure_key_safe(&request.key)?;
        let bucket_root = self.ensure_bucket(&request.bucket).await?;
        if !request.extras.is_empty() {
            debug!(
                key = %request.key,
                dropped = request.extras.len(),
                "filesystem store has nowhere to record request extras"
            );
        }

        let file_path = key_to_path(&bucket_root, &request.key);
        let parent = match file_path.parent() {
            Some(parent) => parent.to_path_buf(),
            None => bail!("object path `{}` has no parent", file_path.display()),
        };
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(err.into());
                }
            };
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err.into());
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        ensure_key_safe(key)?;
        let bucket_root = self.ensure_bucket(bucket).await?;
        let file = File::open(key_to_path(&bucket_root, key))
            .await
            .with_context(|| format!("object `{key}` not found in bucket `{bucket}`"))?;
        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn copy(&self, request: CopyRequest) -> Result<()> {
        ensure_key_safe(&request.source_key)?;
        ensure_key_safe(&request.dest.key)?;
        let source_root = self.ensure_bucket(&request.source_bucket).await?;
        let dest_root = self.ensure_bucket(&request.dest.bucket).await?;

        let source_path = key_to_path(&source_root, &request.source_key);
        let dest_path = key_to_path(&dest_root, &request.dest.key);
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&source_path, &dest_path).await.with_context(|| {
            format!(
                "copy `{}/{}` -> `{}/{}`",
                request.source_bucket, request.source_key, request.dest.bucket, request.dest.key
            )
        })?;
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        ensure_key_safe(key)?;
        let bucket_root = self.ensure_bucket(bucket).await?;
        let file_path = key_to_path(&bucket_root, key);
        match fs::remove_file(&file_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        }
        if let Some(parent) = file_path.parent() {
            self.sweep_empty_parents(parent, &bucket_root).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;
    use tempfile::TempDir;

    fn body(data: &'static [u8]) -> ObjectBody {
        Box::pin(stream::iter(vec![Ok(Bytes::from_static(data))]))
    }

    async fn read_all(mut body: ObjectBody) -> Vec<u8> {
        let mut data = Vec::new();
        while let Some(chunk) = body.next().await {
            data.extend_from_slice(&chunk.unwrap());
        }
        data
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let root = TempDir::new().unwrap();
        let store = FsStore::new(root.path());
        store.create_bucket("b").await.unwrap();

        store
            .put(PutRequest::new("b", "dir/sub/key.bin"), body(b"payload"))
            .await
            .unwrap();
        let data = read_all(store.get("b", "dir/sub/key.bin").await.unwrap()).await;
        assert_eq!(data, b"payload");
    }

    #[tokio::test]
    async fn put_to_missing_bucket_fails() {
        let root = TempDir::new().unwrap();
        let store = FsStore::new(root.path());
        let err = store
            .put(PutRequest::new("ghost", "k"), body(b"x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn unsafe_keys_are_rejected() {
        let root = TempDir::new().unwrap();
        let store = FsStore::new(root.path());
        store.create_bucket("b").await.unwrap();
        assert!(store
            .put(PutRequest::new("b", "../escape"), body(b"x"))
            .await
            .is_err());
        assert!(store.get("b", "/abs").await.is_err());
        assert!(store.delete("b", "a/../b").await.is_err());
    }

    #[tokio::test]
    async fn pagination_walks_all_keys() {
        let root = TempDir::new().unwrap();
        let store = FsStore::new(root.path()).with_page_size(2);
        store.create_bucket("b").await.unwrap();
        for i in 0..5 {
            store
                .put(
                    PutRequest::new("b", format!("k{i}")),
                    Box::pin(stream::iter(vec![Ok(Bytes::from(vec![0u8; i]))])),
                )
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = store.list_page("b", None, token.as_deref()).await.unwrap();
            assert!(page.objects.len() <= 2);
            seen.extend(page.objects.into_iter().map(|r| r.key));
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        assert_eq!(seen, vec!["k0", "k1", "k2", "k3", "k4"]);
    }

    #[tokio::test]
    async fn prefix_filters_listing() {
        let root = TempDir::new().unwrap();
        let store = FsStore::new(root.path());
        store.create_bucket("b").await.unwrap();
        store
            .put(PutRequest::new("b", "logs/a"), body(b"1"))
            .await
            .unwrap();
        store
            .put(PutRequest::new("b", "data/a"), body(b"2"))
            .await
            .unwrap();

        let page = store.list_page("b", Some("logs/"), None).await.unwrap();
        let keys: Vec<_> = page.objects.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["logs/a"]);
    }

    #[tokio::test]
    async fn delete_prunes_empty_parents() {
        let root = TempDir::new().unwrap();
        let store = FsStore::new(root.path());
        store.create_bucket("b").await.unwrap();
        store
            .put(PutRequest::new("b", "deep/nested/key"), body(b"x"))
            .await
            .unwrap();

        store.delete("b", "deep/nested/key").await.unwrap();
        assert!(!root.path().join("b/deep").exists());
        assert!(root.path().join("b").exists());
        // deleting again is fine
        store.delete("b", "deep/nested/key").await.unwrap();
    }

    #[tokio::test]
    async fn copy_duplicates_content() {
        let root = TempDir::new().unwrap();
        let store = FsStore::new(root.path());
        store.create_bucket("src").await.unwrap();
        store.create_bucket("dst").await.unwrap();
        store
            .put(PutRequest::new("src", "a/key"), body(b"content"))
            .await
            .unwrap();

        store
            .copy(CopyRequest {
                source_bucket: "src".into(),
                source_key: "a/key".into(),
                dest: PutRequest::new("dst", "b/key"),
            })
            .await
            .unwrap();
        let data = read_all(store.get("dst", "b/key").await.unwrap()).await;
        assert_eq!(data, b"content");
    }
}
