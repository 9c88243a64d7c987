use crate::error::{BridgeError, Result};
use crate::queue::{OverflowPolicy, QueueOptions};
use crate::transmitter::{DEFAULT_PROGRAM, UNSET};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_GPIO_PIN: u32 = 17;
pub const DEFAULT_REPEAT: u32 = 10;
pub const DEFAULT_TRANSMIT_TIMEOUT_MS: u64 = 10_000;

const APP_DIR: &str = "rf-switch-bridge";
const CONFIG_FILE: &str = "config.json";
const CACHE_FILE: &str = "accessories.json";

/// Load environment variables from a .env file in the working directory.
/// Variables already present in the environment are left untouched.
pub fn load_dotenv() {
    load_dotenv_from(Path::new(".env"));
}

/// Load a dotenv-style file. Values may contain spaces without quoting.
/// Returns the number of variables that were set.
pub fn load_dotenv_from(path: &Path) -> usize {
    let Ok(content) = fs::read_to_string(path) else {
        return 0;
    };

    let mut applied = 0;
    for (key, value) in parse_dotenv(&content) {
        if std::env::var(&key).is_err() {
            // SAFETY: called from main before the tokio runtime spawns worker threads
            unsafe { std::env::set_var(&key, &value) };
            applied += 1;
        }
    }
    applied
}

fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let value = value.trim();
            let unquoted = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            Some((key.trim().to_string(), unquoted.to_string()))
        })
        .collect()
}

/// Bridge configuration: the platform block (GPIO pin and devices) plus
/// transmitter, queue and MQTT settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gpio: u32,
    pub devices: Vec<DeviceConfig>,
    pub transmitter: TransmitterConfig,
    pub queue: QueueConfig,
    pub mqtt: MqttConfig,
    /// Where the accessory cache lives; defaults to the user data dir.
    pub cache_path: Option<PathBuf>,
}

/// One RF switch as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub on_code: u64,
    pub off_code: u64,
    #[serde(default)]
    pub pulselength: Option<i32>,
    #[serde(default)]
    pub protocol: Option<i32>,
    /// Code length in bits.
    #[serde(default)]
    pub length: Option<i32>,
    #[serde(default)]
    pub repeat: Option<i32>,
}

impl DeviceConfig {
    pub fn new(name: impl Into<String>, on_code: u64, off_code: u64) -> Self {
        Self {
            name: name.into(),
            on_code,
            off_code,
            pulselength: None,
            protocol: None,
            length: None,
            repeat: None,
        }
    }

    /// Accessory serial: `"<on_code>:<off_code>"`.
    pub fn serial(&self) -> String {
        format!("{}:{}", self.on_code, self.off_code)
    }

    pub fn pulse_length(&self) -> i32 {
        or_unset(self.pulselength)
    }

    pub fn protocol(&self) -> i32 {
        or_unset(self.protocol)
    }

    pub fn code_length(&self) -> i32 {
        or_unset(self.length)
    }

    pub fn repeat(&self) -> u32 {
        match self.repeat {
            Some(repeat) if repeat > 0 => repeat as u32,
            _ => DEFAULT_REPEAT,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(BridgeError::InvalidDevice(format!(
                "device {} has an empty name",
                self.serial()
            )));
        }
        Ok(())
    }
}

/// Zero or negative timing values mean "use the radio default".
fn or_unset(value: Option<i32>) -> i32 {
    match value {
        Some(v) if v > 0 => v,
        _ => UNSET,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmitterConfig {
    /// `rpi-rf_send` compatible program.
    pub program: String,
    /// Log codes instead of transmitting them.
    pub dry_run: bool,
    pub dry_run_latency_ms: u64,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            dry_run: false,
            dry_run_latency_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of waiting requests; unbounded when absent.
    pub capacity: Option<NonZeroUsize>,
    pub overflow: OverflowPolicy,
    /// Watchdog for a single transmission; `null` disables it.
    pub transmit_timeout_ms: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            overflow: OverflowPolicy::Reject,
            transmit_timeout_ms: Some(DEFAULT_TRANSMIT_TIMEOUT_MS),
        }
    }
}

impl QueueConfig {
    pub fn options(&self) -> QueueOptions {
        QueueOptions {
            capacity: self.capacity,
            overflow: self.overflow,
            transmit_timeout: self.transmit_timeout_ms.map(Duration::from_millis),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub base_topic: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "rf-switch-bridge".to_string(),
            username: None,
            password: None,
            base_topic: "rf-switch".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gpio: DEFAULT_GPIO_PIN,
            devices: Vec::new(),
            transmitter: TransmitterConfig::default(),
            queue: QueueConfig::default(),
            mqtt: MqttConfig::default(),
            cache_path: None,
        }
    }
}

impl Config {
    /// Default config location: `<config_dir>/rf-switch-bridge/config.json`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join(CONFIG_FILE)
    }

    /// Read and validate a JSON config file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| BridgeError::ConfigLoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut config = Self::from_json(&content).map_err(|e| BridgeError::ConfigLoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject unusable devices. A repeated serial is allowed: the registry
    /// refreshes the existing accessory, so the later entry wins.
    pub fn validate(&self) -> Result<()> {
        let mut serials = HashSet::new();
        for device in &self.devices {
            device.validate()?;
            if !serials.insert(device.serial()) {
                warn!(
                    "[Config] Device '{}' reuses serial {}; the later entry wins",
                    device.name,
                    device.serial()
                );
            }
        }
        Ok(())
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(gpio) = lookup("RF_GPIO")
            && let Ok(pin) = gpio.parse()
        {
            self.gpio = pin;
        }
        if let Some(program) = lookup("RF_SEND_PROGRAM") {
            self.transmitter.program = program;
        }
        if let Some(dry_run) = lookup("RF_DRY_RUN") {
            self.transmitter.dry_run = matches!(dry_run.as_str(), "1" | "true" | "yes");
        }

        if let Some(host) = lookup("MQTT_BROKER_HOST") {
            self.mqtt.broker_host = host;
        }
        if let Some(port) = lookup("MQTT_BROKER_PORT")
            && let Ok(p) = port.parse()
        {
            self.mqtt.broker_port = p;
        }
        if let Some(client_id) = lookup("MQTT_CLIENT_ID") {
            self.mqtt.client_id = client_id;
        }
        if let Some(username) = lookup("MQTT_USERNAME") {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = lookup("MQTT_PASSWORD") {
            self.mqtt.password = Some(password);
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join(CACHE_FILE)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"{
        "gpio": 27,
        "devices": [
            { "name": "Lamp", "on_code": 5330371, "off_code": 5330380 },
            { "name": "Fan", "on_code": 1381717, "off_code": 1381716,
              "pulselength": 189, "protocol": 1, "length": 24, "repeat": 5 }
        ]
    }"#;

    #[test]
    fn test_parse_platform_block() {
        let config = Config::from_json(SAMPLE).unwrap();
        assert_eq!(config.gpio, 27);
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[0].serial(), "5330371:5330380");
        assert!(config.mqtt.enabled);
        assert_eq!(config.queue.transmit_timeout_ms, Some(DEFAULT_TRANSMIT_TIMEOUT_MS));
    }

    #[test]
    fn test_missing_timing_uses_sentinels() {
        let config = Config::from_json(SAMPLE).unwrap();
        let lamp = &config.devices[0];
        assert_eq!(lamp.pulse_length(), UNSET);
        assert_eq!(lamp.protocol(), UNSET);
        assert_eq!(lamp.code_length(), UNSET);
        assert_eq!(lamp.repeat(), DEFAULT_REPEAT);

        let fan = &config.devices[1];
        assert_eq!(fan.pulse_length(), 189);
        assert_eq!(fan.protocol(), 1);
        assert_eq!(fan.code_length(), 24);
        assert_eq!(fan.repeat(), 5);
    }

    #[test]
    fn test_zero_values_are_treated_as_missing() {
        let mut device = DeviceConfig::new("Lamp", 1, 2);
        device.pulselength = Some(0);
        device.repeat = Some(0);
        assert_eq!(device.pulse_length(), UNSET);
        assert_eq!(device.repeat(), DEFAULT_REPEAT);
    }

    #[test]
    fn test_defaults_without_file_content() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.gpio, DEFAULT_GPIO_PIN);
        assert!(config.devices.is_empty());
        assert_eq!(config.transmitter.program, DEFAULT_PROGRAM);
        assert!(config.queue.capacity.is_none());
    }

    #[test]
    fn test_duplicate_serial_accepted() {
        let json = r#"{ "devices": [
            { "name": "A", "on_code": 1, "off_code": 2 },
            { "name": "B", "on_code": 1, "off_code": 2 }
        ] }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[1].serial(), "1:2");
    }

    #[test]
    fn test_toggle_remote_with_single_code() {
        let json = r#"{ "devices": [ { "name": "Toggle", "on_code": 7, "off_code": 7 } ] }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(config.devices[0].serial(), "7:7");
    }

    #[test]
    fn test_negative_repeat_uses_default() {
        let json = r#"{ "devices": [ { "name": "Lamp", "on_code": 1, "off_code": 2, "repeat": -1 } ] }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(config.devices[0].repeat, Some(-1));
        assert_eq!(config.devices[0].repeat(), DEFAULT_REPEAT);
    }

    #[test]
    fn test_empty_name_rejected() {
        let json = r#"{ "devices": [ { "name": " ", "on_code": 1, "off_code": 2 } ] }"#;
        assert!(matches!(
            Config::from_json(json),
            Err(BridgeError::InvalidDevice(_))
        ));
    }

    #[test]
    fn test_queue_options() {
        let json = r#"{ "queue": { "capacity": 4, "overflow": "drop_oldest", "transmit_timeout_ms": null } }"#;
        let options = Config::from_json(json).unwrap().queue.options();
        assert_eq!(options.capacity, NonZeroUsize::new(4));
        assert_eq!(options.overflow, OverflowPolicy::DropOldest);
        assert_eq!(options.transmit_timeout, None);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("RF_GPIO", "22"),
            ("RF_DRY_RUN", "true"),
            ("MQTT_BROKER_HOST", "10.0.0.2"),
            ("MQTT_BROKER_PORT", "not-a-port"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.gpio, 22);
        assert!(config.transmitter.dry_run);
        assert_eq!(config.mqtt.broker_host, "10.0.0.2");
        assert_eq!(config.mqtt.broker_port, 1883);
    }

    #[test]
    fn test_parse_dotenv() {
        let parsed = parse_dotenv("# comment\nRF_GPIO=17\nNAME = Living Room\nQUOTED='a b'\n\nBROKEN\n");
        assert_eq!(
            parsed,
            vec![
                ("RF_GPIO".to_string(), "17".to_string()),
                ("NAME".to_string(), "Living Room".to_string()),
                ("QUOTED".to_string(), "a b".to_string()),
            ]
        );
    }
}
