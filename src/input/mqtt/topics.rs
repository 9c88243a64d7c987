//! Topic layout and payload parsing.

use crate::accessory::PowerState;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    Set,
    Identify,
}

/// Topic names under a common base, e.g. `rf-switch/5330371:5330380/set`.
#[derive(Debug, Clone)]
pub struct Topics {
    base: String,
}

impl Topics {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Subscriptions the bridge needs.
    pub fn subscriptions(&self) -> Vec<String> {
        vec![
            format!("{}/+/set", self.base),
            format!("{}/+/identify", self.base),
        ]
    }

    pub fn state(&self, serial: &str) -> String {
        format!("{}/{}/state", self.base, serial)
    }

    pub fn error(&self, serial: &str) -> String {
        format!("{}/{}/error", self.base, serial)
    }

    pub fn accessories(&self) -> String {
        format!("{}/bridge/accessories", self.base)
    }

    pub fn availability(&self) -> String {
        format!("{}/bridge/availability", self.base)
    }

    /// Split an incoming topic into accessory serial and kind.
    pub fn parse(&self, topic: &str) -> Option<(String, TopicKind)> {
        let rest = topic.strip_prefix(&self.base)?.strip_prefix('/')?;
        let (serial, leaf) = rest.split_once('/')?;
        if serial.is_empty() || serial == "bridge" {
            return None;
        }
        let kind = match leaf {
            "set" => TopicKind::Set,
            "identify" => TopicKind::Identify,
            _ => return None,
        };
        Some((serial.to_string(), kind))
    }
}

/// Accepts `ON`/`OFF`, `true`/`false`, `1`/`0` or `{"state": "ON"}`.
pub fn parse_power_payload(payload: &str) -> Option<PowerState> {
    #[derive(Deserialize)]
    struct SetPayload {
        state: serde_json::Value,
    }

    let payload = payload.trim();
    if payload.starts_with('{') {
        let parsed: SetPayload = serde_json::from_str(payload).ok()?;
        return match parsed.state {
            serde_json::Value::Bool(on) => Some(on.into()),
            serde_json::Value::String(s) => PowerState::from_str(s.trim()).ok(),
            _ => None,
        };
    }
    PowerState::from_str(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topics() {
        let topics = Topics::new("rf-switch/");
        assert_eq!(
            topics.parse("rf-switch/5330371:5330380/set"),
            Some(("5330371:5330380".to_string(), TopicKind::Set))
        );
        assert_eq!(
            topics.parse("rf-switch/1:2/identify"),
            Some(("1:2".to_string(), TopicKind::Identify))
        );
        assert_eq!(topics.parse("rf-switch/1:2/state"), None);
        assert_eq!(topics.parse("rf-switch/bridge/set"), None);
        assert_eq!(topics.parse("other/1:2/set"), None);
        assert_eq!(topics.parse("rf-switchx/1:2/set"), None);
    }

    #[test]
    fn test_topic_names() {
        let topics = Topics::new("home/rf");
        assert_eq!(topics.state("1:2"), "home/rf/1:2/state");
        assert_eq!(topics.error("1:2"), "home/rf/1:2/error");
        assert_eq!(topics.availability(), "home/rf/bridge/availability");
        assert_eq!(
            topics.subscriptions(),
            vec!["home/rf/+/set", "home/rf/+/identify"]
        );
    }

    #[test]
    fn test_parse_power_payload() {
        assert_eq!(parse_power_payload("ON"), Some(PowerState::On));
        assert_eq!(parse_power_payload(" off\n"), Some(PowerState::Off));
        assert_eq!(parse_power_payload("1"), Some(PowerState::On));
        assert_eq!(parse_power_payload(r#"{"state":"OFF"}"#), Some(PowerState::Off));
        assert_eq!(parse_power_payload(r#"{"state":true}"#), Some(PowerState::On));
        assert_eq!(parse_power_payload(r#"{"brightness":10}"#), None);
        assert_eq!(parse_power_payload("TOGGLE"), None);
    }
}
