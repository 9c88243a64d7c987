//! RF switch bridge library.
//!
//! Exposes radio-controlled (433MHz) power switches to smart-home
//! controllers and serializes every transmission through the single shared
//! GPIO transmitter.

pub mod accessory;
pub mod bridge;
pub mod config;
pub mod error;
pub mod input;
pub mod instance_lock;
pub mod queue;
pub mod transmitter;

pub use bridge::Bridge;
pub use error::{BridgeError, Result};
