//! Routes controller commands from MQTT into the accessory registry.

use super::client::{MqttClient, MqttMessage};
use super::topics::{TopicKind, Topics, parse_power_payload};
use crate::accessory::{AccessoryContext, AccessoryRegistry, PowerState};
use crate::config::MqttConfig;
use crate::error::BridgeError;
use crate::queue::CompletionResult;
use log::{debug, info, warn};
use rumqttc::{AsyncClient, QoS};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Entry of the retained accessory list.
#[derive(Debug, Serialize)]
struct AccessoryEntry {
    name: String,
    serial: String,
    uuid: String,
    manufacturer: &'static str,
    model: &'static str,
    state: String,
}

pub struct MqttIntegration {
    config: MqttConfig,
    registry: Arc<AccessoryRegistry>,
    topics: Topics,
}

impl MqttIntegration {
    pub fn new(config: MqttConfig, registry: Arc<AccessoryRegistry>) -> Self {
        let topics = Topics::new(&config.base_topic);
        Self {
            config,
            registry,
            topics,
        }
    }

    /// Spawn the integration. It runs until `cancel` fires.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(cancel).await;
        })
    }

    async fn run(self, cancel: CancellationToken) {
        if !self.config.enabled {
            info!("[MQTT] Disabled in configuration, skipping");
            return;
        }

        info!(
            "[MQTT] Connecting to {}:{}",
            self.config.broker_host, self.config.broker_port
        );

        let mqtt_client = MqttClient::new(&self.config, &self.topics.availability());
        let publisher = mqtt_client.client();
        let (msg_tx, mut msg_rx) = mpsc::channel::<MqttMessage>(64);

        let subscriptions = self.topics.subscriptions();
        let mut mqtt_loop = tokio::spawn(async move {
            mqtt_client.run(msg_tx, subscriptions).await;
        });

        // Queued until the connection is up.
        self.publish(&publisher, &self.topics.availability(), "online")
            .await;
        self.publish_accessories(&publisher).await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = msg_rx.recv() => match msg {
                    Some(msg) => self.handle_message(&publisher, msg),
                    None => break,
                },
            }
        }

        let _ = publisher.try_publish(
            self.topics.availability(),
            QoS::AtLeastOnce,
            true,
            "offline",
        );
        let _ = publisher.try_disconnect();
        if tokio::time::timeout(Duration::from_secs(1), &mut mqtt_loop)
            .await
            .is_err()
        {
            mqtt_loop.abort();
        }
        info!("[MQTT] Integration stopped");
    }

    async fn publish(&self, publisher: &AsyncClient, topic: &str, payload: &str) {
        if let Err(e) = publisher
            .publish(topic, QoS::AtLeastOnce, true, payload.as_bytes())
            .await
        {
            warn!("[MQTT] Failed to publish {}: {:?}", topic, e);
        }
    }

    /// Publish the accessory list and every cached state, retained.
    async fn publish_accessories(&self, publisher: &AsyncClient) {
        let accessories = self.registry.accessories();
        let entries: Vec<AccessoryEntry> = accessories
            .iter()
            .map(|accessory| {
                let info = accessory.info();
                AccessoryEntry {
                    name: accessory.name(),
                    serial: accessory.serial().to_string(),
                    uuid: accessory.uuid().to_string(),
                    manufacturer: info.manufacturer,
                    model: info.model,
                    state: accessory.state().power().to_string(),
                }
            })
            .collect();

        match serde_json::to_string(&entries) {
            Ok(json) => {
                self.publish(publisher, &self.topics.accessories(), &json)
                    .await
            }
            Err(e) => warn!("[MQTT] Failed to encode accessory list: {}", e),
        }
        for accessory in &accessories {
            self.publish(
                publisher,
                &self.topics.state(accessory.serial()),
                &accessory.state().power().to_string(),
            )
            .await;
        }
        info!(
            "[MQTT] Published {} accessory(ies) under {}",
            accessories.len(),
            self.config.base_topic
        );
    }

    fn handle_message(&self, publisher: &AsyncClient, msg: MqttMessage) {
        let Some((serial, kind)) = self.topics.parse(&msg.topic) else {
            debug!("[MQTT] Ignoring message on {}", msg.topic);
            return;
        };

        match kind {
            TopicKind::Set => match parse_power_payload(&msg.payload) {
                Some(state) => self.handle_set(publisher, serial, state),
                None => warn!(
                    "[MQTT] Invalid power payload for {}: {}",
                    serial, msg.payload
                ),
            },
            TopicKind::Identify => {
                if let Err(e) = self.registry.identify(&serial) {
                    warn!("[MQTT] {}", e);
                }
            }
        }
    }

    /// Queue the change and report the outcome once the radio is done.
    fn handle_set(&self, publisher: &AsyncClient, serial: String, state: PowerState) {
        let publisher = publisher.clone();
        let topics = self.topics.clone();

        let submitted = self
            .registry
            .get(&serial)
            .ok_or_else(|| BridgeError::UnknownAccessory(serial.clone()))
            .and_then(|accessory| {
                let completion = self.registry.queue().submit(accessory.clone(), state.into())?;
                Ok((accessory, completion))
            });
        let (accessory, completion) = match submitted {
            Ok(submitted) => submitted,
            Err(e) => {
                warn!("[MQTT] Cannot switch {}: {}", serial, e);
                let _ = publisher.try_publish(
                    topics.error(&serial),
                    QoS::AtLeastOnce,
                    false,
                    e.to_string(),
                );
                return;
            }
        };

        tokio::spawn(async move {
            let result = completion.await;
            let (state_payload, error) = completion_payloads(&accessory, &result);
            if let Err(e) = publisher
                .publish(topics.state(&serial), QoS::AtLeastOnce, true, state_payload)
                .await
            {
                warn!("[MQTT] Failed to publish state for {}: {:?}", serial, e);
            }
            if let Some(error) = error
                && let Err(e) = publisher
                    .publish(topics.error(&serial), QoS::AtLeastOnce, false, error)
                    .await
            {
                warn!("[MQTT] Failed to publish error for {}: {:?}", serial, e);
            }
        });
    }
}

/// Retained state and optional error to publish once a request resolved.
///
/// The state is read after completion, so a failure reports whatever the
/// last successful transmission confirmed and the controller reverts to it.
fn completion_payloads(
    accessory: &AccessoryContext,
    result: &CompletionResult,
) -> (String, Option<String>) {
    let state = accessory.state().power().to_string();
    (state, result.as_ref().err().map(ToString::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::queue::QueueError;
    use crate::transmitter::TransmitError;

    fn lamp() -> AccessoryContext {
        AccessoryContext::from_device(&DeviceConfig::new("Lamp", 100, 101), 17)
    }

    #[test]
    fn test_success_publishes_confirmed_state() {
        let lamp = lamp();
        lamp.state().set(true);
        assert_eq!(
            completion_payloads(&lamp, &Ok(())),
            ("ON".to_string(), None)
        );
    }

    #[test]
    fn test_failure_reports_state_at_completion() {
        // OFF, then ON succeeds while an OFF request waits behind it.
        let lamp = lamp();
        lamp.state().set(true);

        let failed: CompletionResult = Err(QueueError::Transmit(TransmitError::Timeout(
            std::time::Duration::from_secs(1),
        )));
        let (state, error) = completion_payloads(&lamp, &failed);
        assert_eq!(state, "ON");
        assert!(error.unwrap().contains("timed out"));
    }

    #[test]
    fn test_failure_without_prior_change_keeps_off() {
        let lamp = lamp();
        let (state, error) = completion_payloads(&lamp, &Err(QueueError::ShuttingDown));
        assert_eq!(state, "OFF");
        assert!(error.is_some());
    }
}
