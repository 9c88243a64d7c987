//! Transmitter that only logs, for development machines without a radio.

use super::{TransmitError, TransmitParams, Transmitter};
use async_trait::async_trait;
use log::info;
use std::time::Duration;

pub struct DryRunTransmitter {
    latency: Duration,
}

impl DryRunTransmitter {
    /// `latency` simulates the time the radio spends sending repeats.
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl Transmitter for DryRunTransmitter {
    async fn transmit(&self, params: &TransmitParams) -> Result<(), TransmitError> {
        info!(
            "[RF] (dry-run) code={} gpio={} pulselength={} protocol={} codelength={} repeat={}",
            params.code,
            params.gpio_pin,
            params.pulse_length,
            params.protocol,
            params.code_length,
            params.repeat
        );
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(())
    }
}
