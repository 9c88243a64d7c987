//! Mutex-guarded pending list and busy flag.

use super::{Completion, OverflowPolicy, QueueError, QueueOptions, TransmitRequest};
use crate::accessory::AccessoryContext;
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared state of the queue. Only touched while holding the mutex.
#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<TransmitRequest>,
    /// True from the enqueue that wakes the driver until the driver finds
    /// `pending` empty again.
    busy: bool,
    closed: bool,
    transmitted: u64,
    failed: u64,
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    /// Requests waiting behind the one in flight.
    pub pending: usize,
    pub busy: bool,
    pub transmitted: u64,
    pub failed: u64,
}

struct Shared {
    state: Mutex<QueueState>,
    wake: Notify,
    options: QueueOptions,
}

/// Cloneable handle used by producers (accessories) and the driver.
#[derive(Clone)]
pub struct CommandQueue {
    shared: Arc<Shared>,
}

impl CommandQueue {
    pub fn new(options: QueueOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                wake: Notify::new(),
                options,
            }),
        }
    }

    pub fn options(&self) -> QueueOptions {
        self.shared.options
    }

    /// Build a request for `accessory` and enqueue it.
    pub fn submit(
        &self,
        accessory: Arc<AccessoryContext>,
        desired_state: bool,
    ) -> Result<Completion, QueueError> {
        let (request, completion) = TransmitRequest::new(accessory, desired_state);
        self.enqueue(request)?;
        Ok(completion)
    }

    /// Append `request` to the tail of the queue and wake the driver if it is idle.
    ///
    /// When the request is refused its completion is resolved with the same
    /// error that is returned here.
    pub fn enqueue(&self, request: TransmitRequest) -> Result<(), QueueError> {
        let options = self.shared.options;
        let mut evicted = None;

        let mut state = self.shared.state.lock();
        if state.closed {
            drop(state);
            request.complete(Err(QueueError::ShuttingDown));
            return Err(QueueError::ShuttingDown);
        }
        if let Some(capacity) = options.capacity
            && state.pending.len() >= capacity.get()
        {
            match options.overflow {
                OverflowPolicy::Reject => {
                    drop(state);
                    let error = QueueError::Full {
                        capacity: capacity.get(),
                    };
                    warn!(
                        "[Queue] Rejecting {} for {}: queue full",
                        if request.desired_state() { "on" } else { "off" },
                        request.accessory().name()
                    );
                    request.complete(Err(error.clone()));
                    return Err(error);
                }
                OverflowPolicy::DropOldest => evicted = state.pending.pop_front(),
            }
        }

        debug!(
            "[Queue] Enqueued {} for {} ({} waiting)",
            if request.desired_state() { "on" } else { "off" },
            request.accessory().name(),
            state.pending.len()
        );
        state.pending.push_back(request);
        let start = !state.busy;
        state.busy = true;
        drop(state);

        if let Some(evicted) = evicted {
            warn!(
                "[Queue] Dropping oldest request for {} to make room",
                evicted.accessory().name()
            );
            evicted.complete(Err(QueueError::Dropped));
        }
        if start {
            self.shared.wake.notify_one();
        }
        Ok(())
    }

    /// Remove and return the head of the queue.
    ///
    /// An empty queue clears `busy` in the same critical section, so the
    /// next enqueue is guaranteed to wake the driver again.
    pub fn dequeue_next(&self) -> Option<TransmitRequest> {
        let mut state = self.shared.state.lock();
        let next = state.pending.pop_front();
        if next.is_none() {
            state.busy = false;
        }
        next
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.shared.state.lock();
        QueueStatus {
            pending: state.pending.len(),
            busy: state.busy,
            transmitted: state.transmitted,
            failed: state.failed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Wait until an enqueue hands work to an idle driver.
    pub(crate) async fn wait_for_work(&self) {
        self.shared.wake.notified().await;
    }

    pub(crate) fn record_outcome(&self, success: bool) {
        let mut state = self.shared.state.lock();
        if success {
            state.transmitted += 1;
        } else {
            state.failed += 1;
        }
    }

    /// Refuse further requests and hand back everything still waiting.
    pub(crate) fn close(&self) -> Vec<TransmitRequest> {
        let mut state = self.shared.state.lock();
        state.closed = true;
        state.busy = false;
        state.pending.drain(..).collect()
    }
}
