//! Scripted transmitter for queue and registry tests.

use super::{TransmitError, TransmitParams, Transmitter};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Records every code it is asked to send and flags overlapping calls.
#[derive(Default)]
pub struct ScriptedTransmitter {
    sent: Mutex<Vec<u64>>,
    failing: Mutex<HashSet<u64>>,
    hanging: Mutex<HashSet<u64>>,
    delay: Duration,
    in_flight: AtomicBool,
    overlapped: AtomicBool,
    max_concurrent: AtomicUsize,
    concurrent: AtomicUsize,
}

impl ScriptedTransmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Make every transmission of `code` fail.
    pub fn fail_code(&self, code: u64) {
        self.failing.lock().insert(code);
    }

    /// Make every transmission of `code` never complete.
    pub fn hang_code(&self, code: u64) {
        self.hanging.lock().insert(code);
    }

    pub fn sent(&self) -> Vec<u64> {
        self.sent.lock().clone()
    }

    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transmitter for ScriptedTransmitter {
    async fn transmit(&self, params: &TransmitParams) -> Result<(), TransmitError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
        self.sent.lock().push(params.code);
        let _guard = FlightGuard(self);

        let hang = self.hanging.lock().contains(&params.code);
        if hang {
            std::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        if self.failing.lock().contains(&params.code) {
            Err(TransmitError::Rejected {
                code: params.code,
                reason: "scripted failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// Clears the in-flight markers even when the call is aborted mid-way.
struct FlightGuard<'a>(&'a ScriptedTransmitter);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.concurrent.fetch_sub(1, Ordering::SeqCst);
        self.0.in_flight.store(false, Ordering::SeqCst);
    }
}
