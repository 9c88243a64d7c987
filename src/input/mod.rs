//! Controller-facing inputs that drive the accessory registry.

pub mod mqtt;
