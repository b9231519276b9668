use crate::error::{Result, SyncError};
use crate::monitor::{SyncMonitor, TransferEvent, TransferSnapshot, TransferStatus};
use crate::store::{CopyRequest, ObjectBody, ObjectStore, PutRequest};
use anyhow::{bail, Context};
use futures::stream::{self, StreamExt};
use futures::TryStreamExt;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

/// A single transfer instruction, carrying the coordinates to read from and
/// write to plus the object size for progress accounting.
#[derive(Debug, Clone)]
pub enum TransferCommand {
    Upload {
        path: PathBuf,
        bucket: String,
        key: String,
        size: u64,
    },
    Download {
        bucket: String,
        key: String,
        path: PathBuf,
        size: u64,
    },
    Copy {
        source_bucket: String,
        source_key: String,
        bucket: String,
        key: String,
        size: u64,
    },
    Delete {
        target: DeleteTarget,
        size: u64,
    },
}

/// Deletion works against whichever side is the sync target.
#[derive(Debug, Clone)]
pub enum DeleteTarget {
    Bucket { bucket: String, key: String },
    Local { path: PathBuf },
}

impl TransferCommand {
    pub fn size(&self) -> u64 {
        match self {
            Self::Upload { size, .. }
            | Self::Download { size, .. }
            | Self::Copy { size, .. }
            | Self::Delete { size, .. } => *size,
        }
    }

    /// Bytes this command contributes to `total_size`; deletes move none.
    fn progress_size(&self) -> u64 {
        match self {
            Self::Delete { .. } => 0,
            other => other.size(),
        }
    }
}

impl fmt::Display for TransferCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload {
                path, bucket, key, ..
            } => write!(f, "upload `{}` -> `{}/{}`", path.display(), bucket, key),
            Self::Download {
                bucket, key, path, ..
            } => write!(f, "download `{}/{}` -> `{}`", bucket, key, path.display()),
            Self::Copy {
                source_bucket,
                source_key,
                bucket,
                key,
                ..
            } => write!(
                f,
                "copy `{}/{}` -> `{}/{}`",
                source_bucket, source_key, bucket, key
            ),
            Self::Delete {
                target: DeleteTarget::Bucket { bucket, key },
                ..
            } => write!(f, "delete `{}/{}`", bucket, key),
            Self::Delete {
                target: DeleteTarget::Local { path },
                ..
            } => write!(f, "delete `{}`", path.display()),
        }
    }
}

/// Per-command override for the low-level store request: a literal value,
/// or a function of the derived request.
#[derive(Clone)]
pub enum InputValue {
    Literal(String),
    Computed(Arc<dyn Fn(&PutRequest) -> String + Send + Sync>),
}

impl fmt::Debug for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Ordered bag of request overrides, merged into the derived input of every
/// object-creating command before dispatch.
#[derive(Debug, Clone, Default)]
pub struct CommandInput {
    entries: Vec<(String, InputValue)>,
}

impl CommandInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn literal(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries
            .push((field.into(), InputValue::Literal(value.into())));
        self
    }

    pub fn computed<F>(mut self, field: impl Into<String>, func: F) -> Self
    where
        F: Fn(&PutRequest) -> String + Send + Sync + 'static,
    {
        self.entries
            .push((field.into(), InputValue::Computed(Arc::new(func))));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn apply(&self, request: &mut PutRequest) {
        for (field, value) in &self.entries {
            let resolved = match value {
                InputValue::Literal(literal) => literal.clone(),
                InputValue::Computed(func) => func(request),
            };
            request.extras.insert(field.clone(), resolved);
        }
    }
}

/// Single-shot executor for one command list: construct, execute, discard.
///
/// At most `max_concurrent` commands are in flight at any instant; when one
/// settles the next pending command starts. The first failure trips the
/// abort token, in-flight commands settle, and that failure surfaces —
/// unless the caller aborted, which takes precedence.
pub struct TransferManager {
    store: Arc<dyn ObjectStore>,
    monitor: Arc<SyncMonitor>,
    status: Arc<TransferStatus>,
    command_input: CommandInput,
    max_concurrent: usize,
}

impl TransferManager {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        monitor: Arc<SyncMonitor>,
        command_input: CommandInput,
        max_concurrent: usize,
    ) -> Self {
        Self {
            store,
            monitor,
            status: Arc::new(TransferStatus::default()),
            command_input,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub async fn execute(&self, commands: Vec<TransferCommand>) -> Result<TransferSnapshot> {
        let total_size: u64 = commands.iter().map(TransferCommand::progress_size).sum();
        let total_count = commands.len() as u64;
        self.status.set_totals(total_size, total_count);
        self.monitor.emit(TransferEvent::Metadata {
            total_size,
            total_count,
        });

        let mut inflight = stream::iter(commands)
            .map(|command| self.run_command(command))
            .buffer_unordered(self.max_concurrent);

        let mut first_error: Option<SyncError> = None;
        while let Some(result) = inflight.next().await {
            if let Err(err) = result {
                if first_error.is_none() {
                    // fail fast: stop issuing work, let the rest settle
                    self.monitor.cancel_token().cancel();
                    first_error = Some(err);
                }
            }
        }
        drop(inflight);

        if self.monitor.is_aborted() {
            return Err(SyncError::Aborted);
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(self.status.snapshot()),
        }
    }

    async fn run_command(&self, command: TransferCommand) -> Result<()> {
        let token = self.monitor.cancel_token();
        if token.is_cancelled() {
            return Err(SyncError::Aborted);
        }
        debug!(command = %command, "dispatching");
        tokio::select! {
            _ = token.cancelled() => Err(SyncError::Aborted),
            result = self.dispatch(&command) => match result {
                Ok(()) => {
                    self.status.add_count();
                    self.monitor
                        .emit(TransferEvent::Progress(self.status.snapshot()));
                    Ok(())
                }
                Err(source) => Err(SyncError::TransferFailed {
                    command: command.to_string(),
                    source,
                }),
            },
        }
    }

    async fn dispatch(&self, command: &TransferCommand) -> anyhow::Result<()> {
        match command {
            TransferCommand::Upload {
                path, bucket, key, ..
            } => {
                let file = fs::File::open(path)
                    .await
                    .with_context(|| format!("open `{}`", path.display()))?;
                let status = Arc::clone(&self.status);
                let monitor = Arc::clone(&self.monitor);
                let body = ReaderStream::new(file).inspect_ok(move |chunk| {
                    status.add_size(chunk.len() as u64);
                    monitor.emit(TransferEvent::Progress(status.snapshot()));
                });
                let mut request = PutRequest::new(bucket.clone(), key.clone());
                self.command_input.apply(&mut request);
                self.store.put(request, Box::pin(body)).await
            }
            TransferCommand::Download {
                bucket, key, path, ..
            } => {
                let parent = match path.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                    _ => bail!("download path `{}` has no parent directory", path.display()),
                };
                fs::create_dir_all(&parent).await?;
                let mut body = self.store.get(bucket, key).await?;
                let tmp = parent.join(format!(".tmp-{}", Uuid::new_v4()));
                if let Err(err) = self.write_body(&mut body, &tmp).await {
                    let _ = fs::remove_file(&tmp).await;
                    return Err(err);
                }
                fs::rename(&tmp, path)
                    .await
                    .with_context(|| format!("finalize `{}`", path.display()))?;
                Ok(())
            }
            TransferCommand::Copy {
                source_bucket,
                source_key,
                bucket,
                key,
                size,
            } => {
                let mut dest = PutRequest::new(bucket.clone(), key.clone());
                self.command_input.apply(&mut dest);
                self.store
                    .copy(CopyRequest {
                        source_bucket: source_bucket.clone(),
                        source_key: source_key.clone(),
                        dest,
                    })
                    .await?;
                self.status.add_size(*size);
                self.monitor
                    .emit(TransferEvent::Progress(self.status.snapshot()));
                Ok(())
            }
            TransferCommand::Delete { target, .. } => match target {
                DeleteTarget::Bucket { bucket, key } => self.store.delete(bucket, key).await,
                DeleteTarget::Local { path } => match fs::remove_file(path).await {
                    Ok(()) => Ok(()),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                    Err(err) => Err(err.into()),
                },
            },
        }
    }

    /// Write a body stream through a temp file; the caller renames it into
    /// place once the sink is flushed and closed.
    async fn write_body(&self, body: &mut ObjectBody, tmp: &Path) -> anyhow::Result<()> {
        let mut file = fs::File::create(tmp).await?;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            self.status.add_size(chunk.len() as u64);
            self.monitor
                .emit(TransferEvent::Progress(self.status.snapshot()));
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn command_input_merges_literals_and_computed() {
        let input = CommandInput::new()
            .literal("acl", "private")
            .computed("source-key", |request| request.key.clone());

        let mut request = PutRequest::new("bucket", "dir/obj");
        input.apply(&mut request);
        assert_eq!(request.extras["acl"], "private");
        assert_eq!(request.extras["source-key"], "dir/obj");
    }

    #[test]
    fn later_entries_overwrite_earlier_fields() {
        let input = CommandInput::new()
            .literal("acl", "private")
            .literal("acl", "public-read");
        let mut request = PutRequest::new("b", "k");
        input.apply(&mut request);
        assert_eq!(request.extras["acl"], "public-read");
    }

    #[tokio::test]
    async fn fail_fast_surfaces_first_error() {
        let store = Arc::new(MemoryStore::new());
        store.create_bucket("b");
        let manager = TransferManager::new(
            store,
            SyncMonitor::detached(),
            CommandInput::default(),
            4,
        );

        let commands = vec![TransferCommand::Upload {
            path: PathBuf::from("/definitely/not/here"),
            bucket: "b".into(),
            key: "k".into(),
            size: 1,
        }];
        let err = manager.execute(commands).await.unwrap_err();
        assert!(matches!(err, SyncError::TransferFailed { .. }));
    }

    #[tokio::test]
    async fn empty_plan_reports_zero_metadata() {
        let store = Arc::new(MemoryStore::new());
        let (monitor, mut events) = SyncMonitor::channel();
        let manager = TransferManager::new(
            store,
            Arc::clone(&monitor),
            CommandInput::default(),
            4,
        );

        let snapshot = manager.execute(Vec::new()).await.unwrap();
        assert_eq!(snapshot, TransferSnapshot::default());
        assert_eq!(
            events.try_recv().unwrap(),
            TransferEvent::Metadata {
                total_size: 0,
                total_count: 0
            }
        );
        assert!(events.try_recv().is_err());
    }
}
