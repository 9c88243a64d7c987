//! The single consumer that drains the command queue.
//!
//! States: idle (parked in `wait_for_work`) and transmitting (inside the
//! drain loop). Each pass pops the head, awaits the transmitter, records the
//! outcome, resolves the request's completion and pops again, so a failed
//! transmission can never leave the queue stuck.

use super::{CommandQueue, QueueError, TransmitRequest};
use crate::transmitter::{TransmitError, Transmitter};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct TransmissionDriver {
    queue: CommandQueue,
    transmitter: Arc<dyn Transmitter>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl TransmissionDriver {
    pub fn new(
        queue: CommandQueue,
        transmitter: Arc<dyn Transmitter>,
        cancel: CancellationToken,
    ) -> Self {
        let timeout = queue.options().transmit_timeout;
        Self {
            queue,
            transmitter,
            cancel,
            timeout,
        }
    }

    /// Run the driver on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drain the queue until cancelled.
    ///
    /// On cancellation the in-flight transmission is allowed to finish; every
    /// request still waiting resolves with [`QueueError::ShuttingDown`].
    pub async fn run(self) {
        info!("[Queue] Transmission driver started");

        'idle: loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break 'idle,
                _ = self.queue.wait_for_work() => {}
            }

            while let Some(request) = self.queue.dequeue_next() {
                self.process(request).await;
                if self.cancel.is_cancelled() {
                    break 'idle;
                }
            }
        }

        let leftovers = self.queue.close();
        if !leftovers.is_empty() {
            warn!(
                "[Queue] Shutting down with {} request(s) not transmitted",
                leftovers.len()
            );
        }
        for request in leftovers {
            request.complete(Err(QueueError::ShuttingDown));
        }
        info!("[Queue] Transmission driver stopped");
    }

    async fn process(&self, request: TransmitRequest) {
        let accessory = Arc::clone(request.accessory());
        let state = request.desired_state();
        let name = accessory.name();

        match self.transmit(&request).await {
            Ok(()) => {
                info!(
                    "[RF] {} is turned {}",
                    name,
                    if state { "on." } else { "off." }
                );
                accessory.state().set(state);
                self.queue.record_outcome(true);
                request.complete(Ok(()));
            }
            Err(e) => {
                error!(
                    "[RF] Failed to turn {} {}",
                    if state { "on" } else { "off" },
                    name
                );
                error!("[RF] {}", e);
                self.queue.record_outcome(false);
                request.complete(Err(QueueError::Transmit(e)));
            }
        }
    }

    /// Call the transmitter on its own task so a panic or a watchdog abort
    /// is reported as a failed transmission instead of killing the driver.
    async fn transmit(&self, request: &TransmitRequest) -> Result<(), TransmitError> {
        let params = request.params();
        let transmitter = Arc::clone(&self.transmitter);
        let mut task = tokio::spawn(async move { transmitter.transmit(&params).await });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    // Wait for the abort so the radio is released before the next send.
                    let _ = (&mut task).await;
                    return Err(TransmitError::Timeout(limit));
                }
            },
            None => task.await,
        };

        joined.unwrap_or_else(|e| Err(TransmitError::Aborted(e.to_string())))
    }
}
