//! Subprocess-backed transmitter.
//!
//! Drives an `rpi-rf_send` compatible program: one process per transmission,
//! GPIO and timing passed as flags, the code as the final argument. Sentinel
//! parameters are omitted so the program falls back to its own defaults.

use super::{TransmitError, TransmitParams, Transmitter};
use async_trait::async_trait;
use log::debug;
use std::process::Stdio;
use tokio::process::Command;

/// Default program used to key the transmitter.
pub const DEFAULT_PROGRAM: &str = "rpi-rf_send";

pub struct CommandTransmitter {
    program: String,
}

impl CommandTransmitter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Command-line arguments for one transmission.
    pub fn args(params: &TransmitParams) -> Vec<String> {
        let mut args = vec!["-g".to_string(), params.gpio_pin.to_string()];
        if let Some(pulse_length) = params.pulse_length() {
            args.push("-p".to_string());
            args.push(pulse_length.to_string());
        }
        if let Some(protocol) = params.protocol() {
            args.push("-t".to_string());
            args.push(protocol.to_string());
        }
        if let Some(code_length) = params.code_length() {
            args.push("-l".to_string());
            args.push(code_length.to_string());
        }
        args.push("-r".to_string());
        args.push(params.repeat.to_string());
        args.push(params.code.to_string());
        args
    }

    /// Refuse a code that does not fit in the configured code length.
    fn check_code(params: &TransmitParams) -> Result<(), TransmitError> {
        if let Some(bits) = params.code_length()
            && bits < 64
            && params.code >> bits != 0
        {
            return Err(TransmitError::Rejected {
                code: params.code,
                reason: format!("does not fit in {bits} bits"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transmitter for CommandTransmitter {
    async fn transmit(&self, params: &TransmitParams) -> Result<(), TransmitError> {
        Self::check_code(params)?;
        let args = Self::args(params);
        debug!("[RF] {} {}", self.program, args.join(" "));

        // kill_on_drop lets the queue watchdog reclaim the radio from a hung sender
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TransmitError::Spawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(TransmitError::ExitStatus {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transmitter::UNSET;

    fn params() -> TransmitParams {
        TransmitParams {
            code: 5330371,
            gpio_pin: 17,
            pulse_length: UNSET,
            protocol: UNSET,
            code_length: UNSET,
            repeat: 10,
        }
    }

    #[test]
    fn test_args_omit_sentinels() {
        assert_eq!(
            CommandTransmitter::args(&params()),
            vec!["-g", "17", "-r", "10", "5330371"]
        );
    }

    #[test]
    fn test_args_with_explicit_timing() {
        let params = TransmitParams {
            pulse_length: 189,
            protocol: 1,
            code_length: 24,
            gpio_pin: 27,
            ..params()
        };
        assert_eq!(
            CommandTransmitter::args(&params),
            vec![
                "-g", "27", "-p", "189", "-t", "1", "-l", "24", "-r", "10", "5330371"
            ]
        );
    }

    #[tokio::test]
    async fn test_code_wider_than_length_rejected() {
        // Rejected before spawning: the program does not exist.
        let transmitter = CommandTransmitter::new("/nonexistent/rf-switch-bridge-sender");
        let params = TransmitParams {
            code: 256,
            code_length: 8,
            ..params()
        };
        assert_eq!(
            transmitter.transmit(&params).await,
            Err(TransmitError::Rejected {
                code: 256,
                reason: "does not fit in 8 bits".to_string(),
            })
        );
    }

    #[test]
    fn test_code_within_length_accepted() {
        let byte = TransmitParams {
            code: 255,
            code_length: 8,
            ..params()
        };
        assert_eq!(CommandTransmitter::check_code(&byte), Ok(()));
        assert_eq!(CommandTransmitter::check_code(&params()), Ok(()));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let transmitter = CommandTransmitter::new("/nonexistent/rf-switch-bridge-sender");
        let result = transmitter.transmit(&params()).await;
        assert!(matches!(result, Err(TransmitError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_reported() {
        let transmitter = CommandTransmitter::new("false");
        let result = transmitter.transmit(&params()).await;
        assert!(matches!(result, Err(TransmitError::ExitStatus { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_exit() {
        let transmitter = CommandTransmitter::new("true");
        tokio_test::assert_ok!(transmitter.transmit(&params()).await);
    }
}
