//! Last confirmed power state of a switch.
//!
//! RF switches give no feedback, so the cached value is the state of the last
//! transmission that succeeded. Only the transmission driver writes it.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use strum::{Display, EnumString};

/// Callback invoked with the new value after a confirmed state change.
pub type StatePusher = Arc<dyn Fn(bool) + Send + Sync>;

/// Power state as exchanged with controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum PowerState {
    #[strum(to_string = "ON", serialize = "true", serialize = "1")]
    On,
    #[strum(to_string = "OFF", serialize = "false", serialize = "0")]
    Off,
}

impl From<bool> for PowerState {
    fn from(on: bool) -> Self {
        if on { PowerState::On } else { PowerState::Off }
    }
}

impl From<PowerState> for bool {
    fn from(state: PowerState) -> Self {
        state == PowerState::On
    }
}

pub struct SwitchState {
    state: AtomicBool,
    version: AtomicU32,
    last_changed: RwLock<Option<DateTime<Utc>>>,
    pusher: RwLock<Option<StatePusher>>,
}

impl SwitchState {
    pub fn new(initial: bool) -> Self {
        Self {
            state: AtomicBool::new(initial),
            version: AtomicU32::new(0),
            last_changed: RwLock::new(None),
            pusher: RwLock::new(None),
        }
    }

    pub fn get(&self) -> bool {
        self.state.load(Ordering::SeqCst)
    }

    pub fn power(&self) -> PowerState {
        self.get().into()
    }

    /// Record a confirmed state. Bumps the version and calls the pusher only
    /// when the value actually changed. Returns whether it changed.
    pub fn set(&self, value: bool) -> bool {
        let old = self.state.swap(value, Ordering::SeqCst);
        if old == value {
            return false;
        }
        self.version.fetch_add(1, Ordering::SeqCst);
        *self.last_changed.write() = Some(Utc::now());
        let pusher = self.pusher.read().clone();
        if let Some(pusher) = pusher {
            pusher(value);
        }
        true
    }

    /// Number of confirmed changes since creation.
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn last_changed(&self) -> Option<DateTime<Utc>> {
        *self.last_changed.read()
    }

    pub fn set_pusher(&self, pusher: StatePusher) {
        *self.pusher.write() = Some(pusher);
    }
}

impl std::fmt::Debug for SwitchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchState")
            .field("state", &self.get())
            .field("version", &self.version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_initial_state() {
        let state = SwitchState::new(true);
        assert!(state.get());
        assert_eq!(state.version(), 0);
        assert!(state.last_changed().is_none());
    }

    #[test]
    fn test_set_only_counts_changes() {
        let state = SwitchState::new(false);
        assert!(state.set(true));
        assert_eq!(state.version(), 1);
        assert!(state.last_changed().is_some());

        assert!(!state.set(true));
        assert_eq!(state.version(), 1);

        assert!(state.set(false));
        assert_eq!(state.version(), 2);
    }

    #[test]
    fn test_pusher_called_on_change() {
        let state = SwitchState::new(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        state.set_pusher(Arc::new(move |value| {
            assert!(value);
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        state.set(true);
        state.set(true);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_power_state_parsing() {
        assert_eq!(PowerState::from_str("ON"), Ok(PowerState::On));
        assert_eq!(PowerState::from_str("off"), Ok(PowerState::Off));
        assert_eq!(PowerState::from_str("true"), Ok(PowerState::On));
        assert_eq!(PowerState::from_str("0"), Ok(PowerState::Off));
        assert!(PowerState::from_str("toggle").is_err());
        assert_eq!(PowerState::On.to_string(), "ON");
        assert_eq!(PowerState::from(false).to_string(), "OFF");
    }
}
