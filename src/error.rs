use crate::instance_lock::InstanceLockError;
use crate::queue::QueueError;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum BridgeError {
    #[error("Failed to load configuration from {path}: {reason}")]
    ConfigLoadFailed { path: String, reason: String },

    #[error("Invalid device configuration: {0}")]
    InvalidDevice(String),

    #[error("Unknown accessory: {0}")]
    UnknownAccessory(String),

    #[error("MQTT error: {0}")]
    Mqtt(String),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    InstanceLock(#[from] InstanceLockError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
