//! Fan-out of [`DataChanged`] signals to task list consumers.

use std::sync::Arc;

use parking_lot::Mutex;
use tasklist_proto::{DataChanged, MutationKind, UserId, ViewScope};
use tokio::sync::broadcast;

/// Default number of signals buffered for slow subscribers.
const DEFAULT_CAPACITY: usize = 256;

/// Broadcasts a signal after every successful mutation.
///
/// Cloning shares the channel and the revision counter. The counter is
/// advanced and the signal sent under one lock, so subscribers see
/// revisions in increasing order. Sending with no subscribers is not an
/// error: the signal is an invalidation hint, and a consumer that was not
/// listening re-reads on its next render anyway.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<DataChanged>,
    revision: Arc<Mutex<u64>>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            revision: Arc::new(Mutex::new(0)),
        }
    }

    /// Subscribes to all future signals, for every user.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DataChanged> {
        self.tx.subscribe()
    }

    /// Revision of the most recent signal, `0` before any.
    #[must_use]
    pub fn revision(&self) -> u64 {
        *self.revision.lock()
    }

    /// Emits a task list invalidation for `user_id` and returns it.
    pub fn data_changed(&self, user_id: UserId, kind: MutationKind) -> DataChanged {
        let (signal, receivers) = {
            let mut current = self.revision.lock();
            *current += 1;
            let signal = DataChanged {
                user_id,
                view: ViewScope::TaskList,
                kind,
                revision: *current,
            };
            (signal, self.tx.send(signal).unwrap_or(0))
        };
        let revision = signal.revision;
        tracing::debug!(
            user_id = %user_id,
            kind = %kind,
            revision,
            receivers,
            "data changed"
        );
        signal
    }
}
