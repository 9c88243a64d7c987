//! On-disk cache of registered accessories.
//!
//! Restores accessories and their last confirmed state after a restart, and
//! lets the registry detect accessories that were removed from the config.

use super::context::{AccessoryContext, DeviceSettings};
use crate::config::{DEFAULT_GPIO_PIN, DEFAULT_REPEAT};
use crate::transmitter::UNSET;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// One persisted accessory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAccessory {
    pub serial: String,
    pub name: String,
    pub uuid: Uuid,
    pub on_code: u64,
    pub off_code: u64,
    pub state: bool,
    #[serde(default)]
    pub last_changed: Option<DateTime<Utc>>,
}

impl CachedAccessory {
    pub fn from_context(accessory: &AccessoryContext) -> Self {
        let settings = accessory.settings();
        Self {
            serial: accessory.serial().to_string(),
            name: settings.name,
            uuid: accessory.uuid(),
            on_code: settings.on_code,
            off_code: settings.off_code,
            state: accessory.state().get(),
            last_changed: accessory.state().last_changed(),
        }
    }

    /// Rebuild a context. Radio timing is unknown until the next config sync.
    pub fn to_context(&self) -> AccessoryContext {
        let settings = DeviceSettings {
            name: self.name.clone(),
            on_code: self.on_code,
            off_code: self.off_code,
            gpio_pin: DEFAULT_GPIO_PIN,
            pulse_length: UNSET,
            protocol: UNSET,
            code_length: UNSET,
            repeat: DEFAULT_REPEAT,
        };
        AccessoryContext::with_state(settings, self.state)
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct CacheFile {
    accessories: Vec<CachedAccessory>,
}

/// JSON file holding the accessory records.
pub struct AccessoryCache {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AccessoryCache {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all records. A missing or unreadable file yields an empty cache.
    pub fn load(&self) -> Vec<CachedAccessory> {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<CacheFile>(&bytes) {
                Ok(file) => {
                    info!(
                        "[Cache] Loaded {} cached accessories from {:?}",
                        file.accessories.len(),
                        self.path
                    );
                    file.accessories
                }
                Err(e) => {
                    warn!("[Cache] Failed to parse accessory cache: {}", e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("[Cache] No accessory cache found (first run)");
                Vec::new()
            }
            Err(e) => {
                error!("[Cache] Failed to read accessory cache: {}", e);
                Vec::new()
            }
        }
    }

    /// Replace the file contents with `accessories`.
    pub fn save(&self, accessories: &[CachedAccessory]) -> Result<(), std::io::Error> {
        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = CacheFile {
            accessories: accessories.to_vec(),
        };
        let data = serde_json::to_vec_pretty(&file)?;
        // Write then rename so a crash never leaves a truncated cache behind.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

enum WriteCommand {
    Save(Vec<CachedAccessory>),
    Flush(oneshot::Sender<()>),
}

/// Background writer for an [`AccessoryCache`].
///
/// Snapshots are handed over without touching the disk. The writer task
/// saves them on the blocking pool, one at a time and in order, skipping
/// snapshots that a newer one has already superseded.
#[derive(Clone)]
pub struct CacheWriter {
    tx: mpsc::UnboundedSender<WriteCommand>,
}

impl CacheWriter {
    /// Spawn the writer task. Must be called from within a tokio runtime.
    /// The task exits once every handle is dropped.
    pub fn spawn(cache: Arc<AccessoryCache>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let mut latest = None;
                let mut flushed = Vec::new();
                let mut next = Some(command);
                while let Some(command) = next {
                    match command {
                        WriteCommand::Save(records) => latest = Some(records),
                        WriteCommand::Flush(done) => flushed.push(done),
                    }
                    next = rx.try_recv().ok();
                }

                if let Some(records) = latest {
                    let cache = cache.clone();
                    match tokio::task::spawn_blocking(move || cache.save(&records)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => error!("[Cache] Failed to save accessory cache: {}", e),
                        Err(e) => error!("[Cache] Cache writer task failed: {}", e),
                    }
                }
                for done in flushed {
                    let _ = done.send(());
                }
            }
        });
        Self { tx }
    }

    /// Queue `records` to replace the file contents.
    pub fn save(&self, records: Vec<CachedAccessory>) {
        if self.tx.send(WriteCommand::Save(records)).is_err() {
            warn!("[Cache] Writer stopped, dropping cache update");
        }
    }

    /// Wait until every snapshot queued before this call is on disk.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(WriteCommand::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

#[cfg(test)]
pub(crate) fn temp_cache_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("rf-switch-bridge-test-{}", Uuid::new_v4()))
        .join("accessories.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;

    #[test]
    fn test_missing_file_is_empty() {
        let cache = AccessoryCache::new(temp_cache_path());
        assert!(cache.load().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_cache_path();
        let cache = AccessoryCache::new(path.clone());
        let lamp = AccessoryContext::from_device(&DeviceConfig::new("Lamp", 100, 101), 17);
        lamp.state().set(true);

        cache.save(&[CachedAccessory::from_context(&lamp)]).unwrap();
        let loaded = cache.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].serial, "100:101");
        assert_eq!(loaded[0].uuid, lamp.uuid());
        assert!(loaded[0].state);

        let restored = loaded[0].to_context();
        assert_eq!(restored.serial(), lamp.serial());
        assert!(restored.state().get());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let path = temp_cache_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{ not json").unwrap();
        assert!(AccessoryCache::new(path.clone()).load().is_empty());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_writer_keeps_latest_snapshot() {
        let path = temp_cache_path();
        let cache = Arc::new(AccessoryCache::new(path.clone()));
        let writer = CacheWriter::spawn(cache.clone());
        let lamp = AccessoryContext::from_device(&DeviceConfig::new("Lamp", 100, 101), 17);
        let fan = AccessoryContext::from_device(&DeviceConfig::new("Fan", 200, 201), 17);

        writer.save(vec![CachedAccessory::from_context(&lamp)]);
        fan.state().set(true);
        writer.save(vec![
            CachedAccessory::from_context(&lamp),
            CachedAccessory::from_context(&fan),
        ]);
        writer.flush().await;

        let loaded = cache.load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].serial, "200:201");
        assert!(loaded[1].state);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_flush_without_pending_writes() {
        let path = temp_cache_path();
        let writer = CacheWriter::spawn(Arc::new(AccessoryCache::new(path.clone())));
        writer.flush().await;
        assert!(!path.exists());
    }
}
