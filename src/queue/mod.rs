//! Serialized command queue for the shared RF transmitter.
//!
//! Any number of accessories may request power-state changes at the same
//! time, but the radio can only emit one signal at once. Requests are
//! appended to a FIFO [`CommandQueue`] and a single [`TransmissionDriver`]
//! task drains it one transmission at a time. Every request carries a
//! single-shot completion that resolves exactly once, whether the
//! transmission succeeded, failed, timed out or was discarded on shutdown.

mod command_queue;
mod driver;

pub use command_queue::{CommandQueue, QueueStatus};
pub use driver::TransmissionDriver;

use crate::accessory::AccessoryContext;
use crate::transmitter::{TransmitError, TransmitParams};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Outcome delivered to whoever submitted a request.
pub type CompletionResult = Result<(), QueueError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("command queue is full ({capacity} requests waiting)")]
    Full { capacity: usize },

    #[error("request dropped to make room for newer commands")]
    Dropped,

    #[error("command queue is shutting down")]
    ShuttingDown,

    #[error("request was abandoned before it completed")]
    Abandoned,

    #[error(transparent)]
    Transmit(#[from] TransmitError),
}

/// What to do when a bounded queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Refuse the new request.
    #[default]
    Reject,
    /// Evict the oldest waiting request. The in-flight one is never evicted.
    DropOldest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    /// Maximum number of waiting requests, `None` for unbounded.
    pub capacity: Option<NonZeroUsize>,
    pub overflow: OverflowPolicy,
    /// Abandon a transmission that takes longer than this.
    pub transmit_timeout: Option<Duration>,
}

/// One queued unit of work: set `accessory` to `desired_state`.
///
/// Radio settings are captured when the request is created so a config
/// reload cannot change a request that is already waiting.
pub struct TransmitRequest {
    accessory: Arc<AccessoryContext>,
    desired_state: bool,
    params_on: TransmitParams,
    params_off: TransmitParams,
    completion: oneshot::Sender<CompletionResult>,
}

impl TransmitRequest {
    pub fn new(accessory: Arc<AccessoryContext>, desired_state: bool) -> (Self, Completion) {
        let (tx, rx) = oneshot::channel();
        let request = Self {
            params_on: accessory.transmit_params(true),
            params_off: accessory.transmit_params(false),
            accessory,
            desired_state,
            completion: tx,
        };
        (request, Completion { rx })
    }

    pub fn accessory(&self) -> &Arc<AccessoryContext> {
        &self.accessory
    }

    pub fn desired_state(&self) -> bool {
        self.desired_state
    }

    /// The code to send: the on code for `true`, the off code for `false`.
    pub fn code(&self) -> u64 {
        self.params().code
    }

    pub fn params(&self) -> TransmitParams {
        if self.desired_state {
            self.params_on
        } else {
            self.params_off
        }
    }

    /// Resolve the caller's completion. Consumes the request, so it can only happen once.
    pub(crate) fn complete(self, result: CompletionResult) {
        if self.completion.send(result).is_err() {
            log::debug!(
                "[Queue] Completion receiver for {} was dropped",
                self.accessory.name()
            );
        }
    }
}

impl std::fmt::Debug for TransmitRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransmitRequest")
            .field("accessory", &self.accessory.serial())
            .field("desired_state", &self.desired_state)
            .field("code", &self.code())
            .finish()
    }
}

/// Future resolving when the request has been transmitted or given up on.
///
/// If the request is destroyed without being completed the future resolves
/// to [`QueueError::Abandoned`] instead of hanging.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<CompletionResult>,
}

impl Future for Completion {
    type Output = CompletionResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(QueueError::Abandoned)))
    }
}
