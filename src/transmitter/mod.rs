//! Transmitter binding for the shared RF radio.
//!
//! A [`Transmitter`] physically emits one code on the GPIO-attached 433MHz
//! transmitter and reports whether it succeeded. The radio is a shared,
//! non-reentrant resource: callers must never invoke `transmit` concurrently.
//! The command queue's single-flight driver is the only caller in this crate.

mod command;
mod dry_run;
#[cfg(test)]
pub(crate) mod testing;

pub use command::{CommandTransmitter, DEFAULT_PROGRAM};
pub use dry_run::DryRunTransmitter;

use crate::config::TransmitterConfig;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Sentinel meaning "let the radio driver pick its default".
pub const UNSET: i32 = -1;

/// Parameters of a single transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitParams {
    pub code: u64,
    pub gpio_pin: u32,
    /// Pulse length in microseconds, or [`UNSET`].
    pub pulse_length: i32,
    /// rc-switch protocol number, or [`UNSET`].
    pub protocol: i32,
    /// Code length in bits, or [`UNSET`].
    pub code_length: i32,
    pub repeat: u32,
}

impl TransmitParams {
    pub fn pulse_length(&self) -> Option<i32> {
        explicit(self.pulse_length)
    }

    pub fn protocol(&self) -> Option<i32> {
        explicit(self.protocol)
    }

    pub fn code_length(&self) -> Option<i32> {
        explicit(self.code_length)
    }
}

fn explicit(value: i32) -> Option<i32> {
    (value > 0).then_some(value)
}

/// Failure of a single transmission attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransmitError {
    #[error("failed to start transmitter `{program}`: {reason}")]
    Spawn { program: String, reason: String },

    #[error("transmitter exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },

    #[error("transmission timed out after {0:?}")]
    Timeout(Duration),

    #[error("transmitter rejected code {code}: {reason}")]
    Rejected { code: u64, reason: String },

    #[error("transmitter task aborted: {0}")]
    Aborted(String),
}

/// Hardware-facing binding that emits an RF code.
#[async_trait]
pub trait Transmitter: Send + Sync + 'static {
    /// Emit `params.code` once (with the configured repeats) and report the outcome.
    async fn transmit(&self, params: &TransmitParams) -> Result<(), TransmitError>;
}

/// Build the transmitter selected by configuration.
pub fn from_config(config: &TransmitterConfig) -> Arc<dyn Transmitter> {
    if config.dry_run {
        log::warn!("[RF] Dry-run mode: codes are logged, not transmitted");
        Arc::new(DryRunTransmitter::new(Duration::from_millis(
            config.dry_run_latency_ms,
        )))
    } else {
        Arc::new(CommandTransmitter::new(&config.program))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_not_explicit() {
        let params = TransmitParams {
            code: 100,
            gpio_pin: 17,
            pulse_length: UNSET,
            protocol: 1,
            code_length: 0,
            repeat: 10,
        };
        assert_eq!(params.pulse_length(), None);
        assert_eq!(params.protocol(), Some(1));
        assert_eq!(params.code_length(), None);
    }

    #[test]
    fn test_from_config_dry_run() {
        let config = TransmitterConfig {
            dry_run: true,
            ..TransmitterConfig::default()
        };
        let transmitter = from_config(&config);
        let params = TransmitParams {
            code: 1,
            gpio_pin: 17,
            pulse_length: UNSET,
            protocol: UNSET,
            code_length: UNSET,
            repeat: 10,
        };
        let result = tokio_test::block_on(transmitter.transmit(&params));
        assert_eq!(result, Ok(()));
    }
}
