//! MQTT surface for smart-home controllers.
//!
//! Controllers publish `ON`/`OFF` to `<base>/<serial>/set`; the bridge queues
//! the transmission and answers on `<base>/<serial>/state` once the radio
//! has sent the code (or with the previous state and an error if it failed).

mod client;
mod integration;
mod topics;

pub use client::{MqttClient, MqttMessage};
pub use integration::MqttIntegration;
pub use topics::{Topics, TopicKind, parse_power_payload};
