//! Wires the transmitter, command queue and accessory registry together.

use crate::accessory::{AccessoryCache, AccessoryRegistry, SyncReport};
use crate::config::Config;
use crate::error::Result;
use crate::queue::{CommandQueue, QueueStatus, TransmissionDriver};
use crate::transmitter::{self, Transmitter};
use log::{info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running bridge: one transmission driver plus the registry feeding it.
pub struct Bridge {
    registry: Arc<AccessoryRegistry>,
    queue: CommandQueue,
    cancel: CancellationToken,
    driver: JoinHandle<()>,
}

impl Bridge {
    /// Start with the transmitter selected by `config`.
    pub fn start(config: &Config) -> Result<Self> {
        Self::start_with(config, transmitter::from_config(&config.transmitter))
    }

    /// Start with an explicit transmitter binding.
    pub fn start_with(config: &Config, transmitter: Arc<dyn Transmitter>) -> Result<Self> {
        config.validate()?;

        let queue = CommandQueue::new(config.queue.options());
        let cancel = CancellationToken::new();
        let driver = TransmissionDriver::new(queue.clone(), transmitter, cancel.clone()).spawn();

        let cache = Arc::new(AccessoryCache::new(config.cache_path()));
        let registry = AccessoryRegistry::new(config.gpio, queue.clone(), Some(cache));

        let restored = registry.restore_cached();
        let report = registry.sync_with_config(&config.devices);
        log_sync(restored, &report);
        if registry.is_empty() {
            warn!("No devices configured; nothing to switch");
        }

        Ok(Self {
            registry,
            queue,
            cancel,
            driver,
        })
    }

    pub fn registry(&self) -> &Arc<AccessoryRegistry> {
        &self.registry
    }

    pub fn status(&self) -> QueueStatus {
        self.queue.status()
    }

    /// Token that is cancelled when the bridge shuts down.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop accepting requests, let the in-flight transmission finish and
    /// resolve everything still waiting.
    pub async fn shutdown(self) {
        info!("Shutting down bridge");
        self.cancel.cancel();
        if let Err(e) = self.driver.await {
            log::error!("Transmission driver panicked: {}", e);
        }
        self.registry.persist();
        self.registry.flush().await;
    }
}

fn log_sync(restored: usize, report: &SyncReport) {
    info!(
        "Accessories: {} restored from cache, {} added, {} updated, {} removed",
        restored,
        report.added.len(),
        report.updated.len(),
        report.removed.len()
    );
}
