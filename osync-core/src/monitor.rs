use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Events published while a transfer plan runs. `Metadata` is emitted once,
/// before any `Progress`; a `Progress` snapshot follows every counter change
/// and the last one carries the terminal counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    Metadata { total_size: u64, total_count: u64 },
    Progress(TransferSnapshot),
}

/// Plain copy of the four progress counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferSnapshot {
    pub current_size: u64,
    pub current_count: u64,
    pub total_size: u64,
    pub total_count: u64,
}

/// Aggregate counters shared by all in-flight transfers of one sync.
#[derive(Debug, Default)]
pub struct TransferStatus {
    total_size: AtomicU64,
    total_count: AtomicU64,
    current_size: AtomicU64,
    current_count: AtomicU64,
}

impl TransferStatus {
    pub(crate) fn set_totals(&self, total_size: u64, total_count: u64) {
        self.total_size.store(total_size, Ordering::Relaxed);
        self.total_count.store(total_count, Ordering::Relaxed);
    }

    pub(crate) fn add_size(&self, bytes: u64) {
        self.current_size.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn add_count(&self) {
        self.current_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        TransferSnapshot {
            current_size: self.current_size.load(Ordering::Relaxed),
            current_count: self.current_count.load(Ordering::Relaxed),
            total_size: self.total_size.load(Ordering::Relaxed),
            total_count: self.total_count.load(Ordering::Relaxed),
        }
    }
}

/// Caller-facing event bus for one sync invocation: progress flows out over
/// the channel, `abort` trips the cancellation token shared by every
/// in-flight store call.
#[derive(Debug)]
pub struct SyncMonitor {
    events: mpsc::UnboundedSender<TransferEvent>,
    cancel: CancellationToken,
    aborted: AtomicBool,
}

impl SyncMonitor {
    /// Build a monitor together with its event receiver.
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<TransferEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let monitor = Arc::new(Self {
            events,
            cancel: CancellationToken::new(),
            aborted: AtomicBool::new(false),
        });
        (monitor, receiver)
    }

    /// A monitor nobody listens to, for syncs run without a caller monitor.
    pub fn detached() -> Arc<Self> {
        let (monitor, _receiver) = Self::channel();
        monitor
    }

    /// Request cancellation. In-flight transfers terminate with `Aborted`;
    /// queued ones never start.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, event: TransferEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counter_updates() {
        let status = TransferStatus::default();
        status.set_totals(100, 4);
        status.add_size(30);
        status.add_size(12);
        status.add_count();

        let snapshot = status.snapshot();
        assert_eq!(snapshot.current_size, 42);
        assert_eq!(snapshot.current_count, 1);
        assert_eq!(snapshot.total_size, 100);
        assert_eq!(snapshot.total_count, 4);
    }

    #[test]
    fn abort_trips_token_once() {
        let monitor = SyncMonitor::detached();
        assert!(!monitor.is_aborted());
        assert!(!monitor.cancel_token().is_cancelled());
        monitor.abort();
        assert!(monitor.is_aborted());
        assert!(monitor.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn events_arrive_in_emit_order() {
        let (monitor, mut receiver) = SyncMonitor::channel();
        monitor.emit(TransferEvent::Metadata {
            total_size: 10,
            total_count: 1,
        });
        monitor.emit(TransferEvent::Progress(TransferSnapshot {
            current_size: 10,
            current_count: 1,
            total_size: 10,
            total_count: 1,
        }));

        match receiver.recv().await.unwrap() {
            TransferEvent::Metadata {
                total_size,
                total_count,
            } => {
                assert_eq!((total_size, total_count), (10, 1));
            }
            other => panic!("expected metadata first, got {other:?}"),
        }
        assert!(matches!(
            receiver.recv().await.unwrap(),
            TransferEvent::Progress(_)
        ));
    }
}
