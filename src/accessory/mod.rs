//! Switch accessories exposed to the smart-home controller.
//!
//! Each configured RF device becomes an [`AccessoryContext`] identified by
//! its serial (`"<on_code>:<off_code>"`). The [`AccessoryRegistry`] keeps the
//! set in sync with the config file and the on-disk [`AccessoryCache`], and
//! turns controller requests into queued transmissions.

mod cache;
mod context;
mod registry;
mod switch_state;

pub use cache::{AccessoryCache, CacheWriter, CachedAccessory};
pub use context::{AccessoryContext, AccessoryInfo, DeviceSettings};
pub use registry::{AccessoryRegistry, SyncReport};
pub use switch_state::{PowerState, StatePusher, SwitchState};

#[cfg(test)]
pub(crate) use cache::temp_cache_path;
