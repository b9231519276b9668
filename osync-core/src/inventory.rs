use crate::error::{Result, SyncError};
use crate::object::{Inventory, SyncObject};
use crate::store::ObjectStore;
use crate::utils::as_posix_id;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::warn;
use walkdir::WalkDir;

/// Enumerate a local directory tree into an inventory keyed by the
/// root-relative forward-slash id of each regular file. Symlinks are not
/// followed; unreadable entries are skipped.
pub async fn list_local_objects(dir: impl AsRef<Path>) -> Result<Inventory> {
    let root = dir.as_ref();
    match tokio::fs::metadata(root).await {
        Ok(meta) if meta.is_dir() => {}
        _ => return Err(SyncError::NotADirectory(root.to_path_buf())),
    }

    let mut inventory = Inventory::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(err) => {
                warn!("skipping `{}`: {err}", entry.path().display());
                continue;
            }
        };
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let id = as_posix_id(rel);
        let last_modified = meta
            .modified()
            .ok()
            .and_then(|mtime| mtime.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        inventory.insert(
            id.clone(),
            SyncObject::local(id, meta.len(), last_modified, entry.into_path()),
        );
    }
    Ok(inventory)
}

/// Enumerate a bucket prefix into an inventory by draining the store's
/// paginated listing. Ids are keys as stored; duplicate keys across pages
/// resolve last-write-wins.
pub async fn list_bucket_objects(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: Option<&str>,
) -> Result<Inventory> {
    let mut inventory = Inventory::new();
    let mut token: Option<String> = None;
    loop {
        let page = store
            .list_page(bucket, prefix, token.as_deref())
            .await
            .map_err(|source| SyncError::ListFailed {
                bucket: bucket.to_string(),
                source,
            })?;
        for record in page.objects {
            inventory.insert(
                record.key.clone(),
                SyncObject::remote(
                    record.key.clone(),
                    record.size,
                    record.last_modified,
                    bucket,
                    record.key,
                ),
            );
        }
        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    Ok(inventory)
}
