//! Registry of switch accessories and the entry point for power-state requests.

use super::cache::{AccessoryCache, CacheWriter, CachedAccessory};
use super::context::{AccessoryContext, DeviceSettings};
use crate::config::DeviceConfig;
use crate::error::{BridgeError, Result};
use crate::queue::{CommandQueue, Completion};
use log::info;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::{Arc, Weak};

/// Outcome of reconciling the registry with the configured devices.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

pub struct AccessoryRegistry {
    me: Weak<AccessoryRegistry>,
    gpio: u32,
    queue: CommandQueue,
    accessories: RwLock<Vec<Arc<AccessoryContext>>>,
    cache: Option<Arc<AccessoryCache>>,
    writer: Option<CacheWriter>,
}

impl AccessoryRegistry {
    /// Create a registry. With a cache this spawns its writer, so it must
    /// then be called from within a tokio runtime.
    pub fn new(gpio: u32, queue: CommandQueue, cache: Option<Arc<AccessoryCache>>) -> Arc<Self> {
        let writer = cache.clone().map(CacheWriter::spawn);
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            gpio,
            queue,
            accessories: RwLock::new(Vec::new()),
            cache,
            writer,
        })
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Re-register every accessory found in the cache. Returns how many were restored.
    pub fn restore_cached(&self) -> usize {
        let Some(cache) = &self.cache else {
            return 0;
        };
        let cached = cache.load();
        for record in &cached {
            if self.get(&record.serial).is_none() {
                self.configure_accessory(Arc::new(record.to_context()));
            }
        }
        cached.len()
    }

    /// Track an accessory and persist whenever its confirmed state changes.
    /// The pusher runs on the transmission driver and only queues a snapshot.
    pub fn configure_accessory(&self, accessory: Arc<AccessoryContext>) {
        let me = self.me.clone();
        accessory.state().set_pusher(Arc::new(move |_| {
            if let Some(registry) = me.upgrade() {
                registry.persist();
            }
        }));
        self.accessories.write().push(accessory);
    }

    /// Add a configured device, or refresh the settings of the cached
    /// accessory with the same serial. Returns the accessory and whether it is new.
    pub fn add_accessory(&self, device: &DeviceConfig) -> (Arc<AccessoryContext>, bool) {
        info!(
            "[Registry] Initializing platform accessory '{}'...",
            device.name
        );
        let settings = DeviceSettings::from_device(device, self.gpio);

        if let Some(existing) = self.get(&device.serial()) {
            existing.update_settings(settings);
            return (existing, false);
        }

        let accessory = Arc::new(AccessoryContext::with_state(settings, false));
        info!(
            "[Registry] Registered '{}' (serial {}, uuid {})",
            device.name,
            accessory.serial(),
            accessory.uuid()
        );
        self.configure_accessory(accessory.clone());
        (accessory, true)
    }

    /// Drop the accessories with the given serials. Returns their names.
    pub fn remove_accessories(&self, serials: &[String]) -> Vec<String> {
        let mut removed = Vec::new();
        self.accessories.write().retain(|accessory| {
            if serials.iter().any(|s| s == accessory.serial()) {
                info!("[Registry] {} is removed from the bridge.", accessory.name());
                removed.push(accessory.name());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Reconcile with the configured devices: add or refresh every device,
    /// then remove accessories that are no longer configured.
    pub fn sync_with_config(&self, devices: &[DeviceConfig]) -> SyncReport {
        let mut report = SyncReport::default();
        let mut serials = HashSet::new();

        for device in devices {
            let (accessory, added) = self.add_accessory(device);
            serials.insert(accessory.serial().to_string());
            if added {
                report.added.push(device.name.clone());
            } else {
                report.updated.push(device.name.clone());
            }
        }

        let stale: Vec<String> = self
            .accessories()
            .iter()
            .filter(|accessory| !serials.contains(accessory.serial()))
            .map(|accessory| accessory.serial().to_string())
            .collect();
        report.removed = self.remove_accessories(&stale);

        self.persist();
        report
    }

    pub fn get(&self, serial: &str) -> Option<Arc<AccessoryContext>> {
        self.accessories
            .read()
            .iter()
            .find(|accessory| accessory.serial() == serial)
            .cloned()
    }

    /// Look up by serial, falling back to a case-insensitive name match.
    pub fn find(&self, key: &str) -> Option<Arc<AccessoryContext>> {
        self.get(key).or_else(|| {
            self.accessories
                .read()
                .iter()
                .find(|accessory| accessory.name().eq_ignore_ascii_case(key))
                .cloned()
        })
    }

    pub fn accessories(&self) -> Vec<Arc<AccessoryContext>> {
        self.accessories.read().clone()
    }

    pub fn len(&self) -> usize {
        self.accessories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessories.read().is_empty()
    }

    /// Queue a power-state change for the accessory with `serial`.
    pub fn request_state_change(&self, serial: &str, desired_state: bool) -> Result<Completion> {
        let accessory = self
            .get(serial)
            .ok_or_else(|| BridgeError::UnknownAccessory(serial.to_string()))?;
        Ok(self.queue.submit(accessory, desired_state)?)
    }

    /// Switch the accessory matching `key` (serial or name) and wait for the radio.
    pub async fn set_power(&self, key: &str, desired_state: bool) -> Result<()> {
        let accessory = self
            .find(key)
            .ok_or_else(|| BridgeError::UnknownAccessory(key.to_string()))?;
        self.queue.submit(accessory, desired_state)?.await?;
        Ok(())
    }

    pub fn identify(&self, serial: &str) -> Result<()> {
        let accessory = self
            .get(serial)
            .ok_or_else(|| BridgeError::UnknownAccessory(serial.to_string()))?;
        info!("[Registry] {} identify requested!", accessory.name());
        Ok(())
    }

    /// Queue a snapshot of the current accessories for the cache writer.
    pub fn persist(&self) {
        let Some(writer) = &self.writer else {
            return;
        };
        let records: Vec<CachedAccessory> = self
            .accessories()
            .iter()
            .map(|accessory| CachedAccessory::from_context(accessory))
            .collect();
        writer.save(records);
    }

    /// Wait until every queued snapshot has been written.
    pub async fn flush(&self) {
        if let Some(writer) = &self.writer {
            writer.flush().await;
        }
    }
}
