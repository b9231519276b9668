use crate::diff::{diff, DiffOptions};
use crate::error::{Result, SyncError};
use crate::filter::{KeyFilter, Pattern};
use crate::inventory::{list_bucket_objects, list_local_objects};
use crate::monitor::{SyncMonitor, TransferSnapshot};
use crate::object::{BucketPath, Inventory, ObjectLocation};
use crate::relocate::{relocate, Relocation};
use crate::store::ObjectStore;
use crate::transfer::{CommandInput, DeleteTarget, TransferCommand, TransferManager};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_MAX_CONCURRENT_TRANSFERS: usize = 10;

/// Options shared by the three sync operations.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Execute the diff's `deleted` commands instead of dropping them.
    pub del: bool,
    /// Compute and return the command lists without transferring anything.
    pub dry_run: bool,
    /// Diff on sizes only, ignoring modification times.
    pub size_only: bool,
    /// Upper bound on in-flight transfers.
    pub max_concurrent_transfers: usize,
    /// Ordered relocation rules; the first matching rule applies.
    pub relocations: Vec<Relocation>,
    pub include: Vec<Pattern>,
    pub exclude: Vec<Pattern>,
    /// Per-command store request overrides.
    pub command_input: CommandInput,
    /// Download only: write just the basename of each relocated id, with
    /// collisions being fatal.
    pub flatten: bool,
    /// Progress events out, abort in. Events are dropped when absent.
    pub monitor: Option<Arc<SyncMonitor>>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            del: false,
            dry_run: false,
            size_only: false,
            max_concurrent_transfers: DEFAULT_MAX_CONCURRENT_TRANSFERS,
            relocations: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            command_input: CommandInput::default(),
            flatten: false,
            monitor: None,
        }
    }
}

/// Outcome of one sync: the derived command list (all of it under
/// `dry_run`) and the terminal progress snapshot.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub commands: Vec<TransferCommand>,
    pub snapshot: TransferSnapshot,
}

/// Entry point composing inventories, diff, relocation and transfer over an
/// opaque store client. Each call builds its own inventories and status;
/// nothing is shared between invocations.
pub struct SyncClient {
    store: Arc<dyn ObjectStore>,
}

impl SyncClient {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Mirror a local tree into `bucket[/prefix]`.
    pub async fn bucket_with_local(
        &self,
        local_dir: impl AsRef<Path>,
        dest: &str,
        options: SyncOptions,
    ) -> Result<SyncReport> {
        let dest = BucketPath::parse(dest)?;
        let root = local_dir.as_ref();
        info!(source = %root.display(), target = %dest, "sync bucket with local");

        let mut source = list_local_objects(root).await?;
        let mut target = self
            .list_bucket_objects(&dest.bucket, dest.prefix.as_deref())
            .await?;
        apply_filters(&options, &mut source, &mut target);

        let rules = with_implicit_rule(
            &options.relocations,
            Relocation::new("", dest.prefix_str()),
        );
        let source = project(source, &rules);

        let changes = diff(&source, &target, &diff_options(&options));
        let mut commands = Vec::new();
        for object in changes.created.into_iter().chain(changes.updated) {
            let path = match &object.location {
                ObjectLocation::Local { path } => path.clone(),
                ObjectLocation::Remote { .. } => continue,
            };
            commands.push(TransferCommand::Upload {
                path,
                bucket: dest.bucket.clone(),
                key: object.id,
                size: object.size,
            });
        }
        if options.del {
            for object in changes.deleted {
                if let ObjectLocation::Remote { bucket, key } = object.location {
                    commands.push(TransferCommand::Delete {
                        target: DeleteTarget::Bucket { bucket, key },
                        size: object.size,
                    });
                }
            }
        }
        self.finish(commands, options).await
    }

    /// Mirror `bucket[/prefix]` into a local tree. The target directory is
    /// created when missing.
    pub async fn local_with_bucket(
        &self,
        source: &str,
        local_dir: impl AsRef<Path>,
        options: SyncOptions,
    ) -> Result<SyncReport> {
        let src = BucketPath::parse(source)?;
        let root = local_dir.as_ref();
        info!(source = %src, target = %root.display(), "sync local with bucket");
        let _ = tokio::fs::create_dir_all(root).await;

        let mut source_inv = self
            .list_bucket_objects(&src.bucket, src.prefix.as_deref())
            .await?;
        let mut target_inv = list_local_objects(root).await?;
        apply_filters(&options, &mut source_inv, &mut target_inv);

        let rules = with_implicit_rule(
            &options.relocations,
            Relocation::new(src.prefix_str(), ""),
        );
        let mut source_inv = project(source_inv, &rules);
        if options.flatten {
            source_inv = flatten_ids(source_inv, root)?;
        }

        let changes = diff(&source_inv, &target_inv, &diff_options(&options));
        let mut commands = Vec::new();
        for object in changes.created.into_iter().chain(changes.updated) {
            let (bucket, key) = match &object.location {
                ObjectLocation::Remote { bucket, key } => (bucket.clone(), key.clone()),
                ObjectLocation::Local { .. } => continue,
            };
            commands.push(TransferCommand::Download {
                bucket,
                key,
                path: root.join(&object.id),
                size: object.size,
            });
        }
        if options.del {
            for object in changes.deleted {
                if let ObjectLocation::Local { path } = object.location {
                    commands.push(TransferCommand::Delete {
                        target: DeleteTarget::Local { path },
                        size: object.size,
                    });
                }
            }
        }
        self.finish(commands, options).await
    }

    /// Server-side copy of one bucket prefix into another.
    pub async fn bucket_with_bucket(
        &self,
        source: &str,
        dest: &str,
        options: SyncOptions,
    ) -> Result<SyncReport> {
        let src = BucketPath::parse(source)?;
        let dest = BucketPath::parse(dest)?;
        info!(source = %src, target = %dest, "sync bucket with bucket");

        let mut source_inv = self
            .list_bucket_objects(&src.bucket, src.prefix.as_deref())
            .await?;
        let mut target_inv = self
            .list_bucket_objects(&dest.bucket, dest.prefix.as_deref())
            .await?;
        apply_filters(&options, &mut source_inv, &mut target_inv);

        let rules = with_implicit_rule(
            &options.relocations,
            Relocation::new(src.prefix_str(), dest.prefix_str()),
        );
        let source_inv = project(source_inv, &rules);

        let changes = diff(&source_inv, &target_inv, &diff_options(&options));
        let mut commands = Vec::new();
        for object in changes.created.into_iter().chain(changes.updated) {
            let (source_bucket, source_key) = match &object.location {
                ObjectLocation::Remote { bucket, key } => (bucket.clone(), key.clone()),
                ObjectLocation::Local { .. } => continue,
            };
            commands.push(TransferCommand::Copy {
                source_bucket,
                source_key,
                bucket: dest.bucket.clone(),
                key: object.id,
                size: object.size,
            });
        }
        if options.del {
            for object in changes.deleted {
                if let ObjectLocation::Remote { bucket, key } = object.location {
                    commands.push(TransferCommand::Delete {
                        target: DeleteTarget::Bucket { bucket, key },
                        size: object.size,
                    });
                }
            }
        }
        self.finish(commands, options).await
    }

    /// Delete every object in a bucket.
    pub async fn empty_bucket(&self, bucket: &str) -> Result<()> {
        let inventory = self.list_bucket_objects(bucket, None).await?;
        let mut commands = Vec::new();
        for object in inventory.into_values() {
            if let ObjectLocation::Remote { bucket, key } = object.location {
                commands.push(TransferCommand::Delete {
                    target: DeleteTarget::Bucket { bucket, key },
                    size: object.size,
                });
            }
        }
        info!(bucket, commands = commands.len(), "emptying bucket");
        let manager = TransferManager::new(
            Arc::clone(&self.store),
            SyncMonitor::detached(),
            CommandInput::default(),
            DEFAULT_MAX_CONCURRENT_TRANSFERS,
        );
        manager.execute(commands).await?;
        Ok(())
    }

    /// Inventory of a bucket prefix through this client's store.
    pub async fn list_bucket_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Inventory> {
        list_bucket_objects(self.store.as_ref(), bucket, prefix).await
    }

    async fn finish(&self, commands: Vec<TransferCommand>, options: SyncOptions) -> Result<SyncReport> {
        debug!(commands = commands.len(), dry_run = options.dry_run, "transfer plan ready");
        if options.dry_run {
            return Ok(SyncReport {
                commands,
                snapshot: TransferSnapshot::default(),
            });
        }
        let monitor = options.monitor.unwrap_or_else(SyncMonitor::detached);
        let manager = TransferManager::new(
            Arc::clone(&self.store),
            monitor,
            options.command_input,
            options.max_concurrent_transfers,
        );
        let snapshot = manager.execute(commands.clone()).await?;
        Ok(SyncReport { commands, snapshot })
    }
}

fn diff_options(options: &SyncOptions) -> DiffOptions {
    DiffOptions {
        size_only: options.size_only,
    }
}

fn apply_filters(options: &SyncOptions, source: &mut Inventory, target: &mut Inventory) {
    if options.include.is_empty() && options.exclude.is_empty() {
        return;
    }
    let filter = KeyFilter::new(&options.include, &options.exclude);
    source.retain(|id, _| filter.check(id));
    target.retain(|id, _| filter.check(id));
}

/// User rules first; the mode's implicit projection is the terminal
/// fallback, so an id a user rule already matched is left alone.
fn with_implicit_rule(user: &[Relocation], implicit: Relocation) -> Vec<Relocation> {
    let mut rules = user.to_vec();
    rules.push(implicit);
    rules
}

/// Rewrite every id into the target namespace, keeping read-side
/// coordinates on the object's location.
fn project(inventory: Inventory, rules: &[Relocation]) -> Inventory {
    inventory
        .into_iter()
        .map(|(id, mut object)| {
            let rewritten = relocate(&id, rules);
            object.id = rewritten.clone();
            (rewritten, object)
        })
        .collect()
}

/// Reduce every id to its basename for flattened downloads; two source
/// objects sharing a basename is a fatal collision.
fn flatten_ids(inventory: Inventory, root: &Path) -> Result<Inventory> {
    let mut flat = Inventory::with_capacity(inventory.len());
    let mut seen: HashSet<String> = HashSet::with_capacity(inventory.len());
    for (id, mut object) in inventory {
        let name = id.rsplit('/').next().unwrap_or(&id).to_string();
        if !seen.insert(name.clone()) {
            return Err(SyncError::PathCollision(root.join(name)));
        }
        object.id = name.clone();
        flat.insert(name, object);
    }
    Ok(flat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::SyncObject;

    #[test]
    fn implicit_rule_is_the_fallback() {
        let rules = with_implicit_rule(
            &[Relocation::new("def/jkl", "relocated-bis/folder")],
            Relocation::new("def/jkl", ""),
        );
        assert_eq!(
            relocate("def/jkl/xmoj", &rules),
            "relocated-bis/folder/xmoj"
        );
    }

    #[test]
    fn projection_rekeys_but_keeps_read_side() {
        let mut inventory = Inventory::new();
        inventory.insert(
            "pfx/a".into(),
            SyncObject::remote("pfx/a", 1, 0, "b", "pfx/a"),
        );
        let projected = project(inventory, &[Relocation::new("pfx", "")]);
        let object = &projected["a"];
        assert_eq!(object.id, "a");
        match &object.location {
            ObjectLocation::Remote { bucket, key } => {
                assert_eq!(bucket, "b");
                assert_eq!(key, "pfx/a");
            }
            other => panic!("unexpected location: {other:?}"),
        }
    }

    #[test]
    fn flatten_collision_is_fatal() {
        let mut inventory = Inventory::new();
        inventory.insert("a/x".into(), SyncObject::remote("a/x", 1, 0, "b", "a/x"));
        inventory.insert("b/x".into(), SyncObject::remote("b/x", 1, 0, "b", "b/x"));
        let err = flatten_ids(inventory, Path::new("/dl")).unwrap_err();
        assert!(matches!(err, SyncError::PathCollision(_)));
    }
}
