//! Per-accessory context: identity, radio settings and cached state.

use super::switch_state::SwitchState;
use crate::config::DeviceConfig;
use crate::transmitter::TransmitParams;
use parking_lot::RwLock;
use uuid::Uuid;

/// Namespace for accessory UUIDs, so the same serial always maps to the same id.
const ACCESSORY_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_3c2e_8d4b_4f7a_9e21_0b5c_7d3e_a912);

pub const MANUFACTURER: &str = "Sunoo";
pub const MODEL: &str = "rpi-rf";

/// Radio settings of one accessory, refreshed on every config sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSettings {
    pub name: String,
    pub on_code: u64,
    pub off_code: u64,
    pub gpio_pin: u32,
    pub pulse_length: i32,
    pub protocol: i32,
    pub code_length: i32,
    pub repeat: u32,
}

impl DeviceSettings {
    pub fn from_device(device: &DeviceConfig, gpio_pin: u32) -> Self {
        Self {
            name: device.name.clone(),
            on_code: device.on_code,
            off_code: device.off_code,
            gpio_pin,
            pulse_length: device.pulse_length(),
            protocol: device.protocol(),
            code_length: device.code_length(),
            repeat: device.repeat(),
        }
    }
}

/// Accessory information shown by controllers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessoryInfo {
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub serial_number: String,
}

#[derive(Debug)]
pub struct AccessoryContext {
    serial: String,
    uuid: Uuid,
    settings: RwLock<DeviceSettings>,
    state: SwitchState,
}

impl AccessoryContext {
    pub fn from_device(device: &DeviceConfig, gpio_pin: u32) -> Self {
        Self::with_state(DeviceSettings::from_device(device, gpio_pin), false)
    }

    /// Build a context with a known cached state (e.g. restored from disk).
    pub fn with_state(settings: DeviceSettings, state: bool) -> Self {
        let serial = format!("{}:{}", settings.on_code, settings.off_code);
        Self {
            uuid: Self::uuid_for(&serial),
            serial,
            settings: RwLock::new(settings),
            state: SwitchState::new(state),
        }
    }

    pub fn uuid_for(serial: &str) -> Uuid {
        Uuid::new_v5(&ACCESSORY_NAMESPACE, serial.as_bytes())
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> String {
        self.settings.read().name.clone()
    }

    pub fn settings(&self) -> DeviceSettings {
        self.settings.read().clone()
    }

    /// Replace the radio settings. The serial, and therefore the codes, stay the same.
    pub fn update_settings(&self, settings: DeviceSettings) {
        debug_assert_eq!(
            format!("{}:{}", settings.on_code, settings.off_code),
            self.serial
        );
        *self.settings.write() = settings;
    }

    pub fn state(&self) -> &SwitchState {
        &self.state
    }

    pub fn info(&self) -> AccessoryInfo {
        AccessoryInfo {
            manufacturer: MANUFACTURER,
            model: MODEL,
            serial_number: self.serial.clone(),
        }
    }

    /// Transmission parameters for switching this accessory on or off.
    pub fn transmit_params(&self, on: bool) -> TransmitParams {
        let settings = self.settings.read();
        TransmitParams {
            code: if on {
                settings.on_code
            } else {
                settings.off_code
            },
            gpio_pin: settings.gpio_pin,
            pulse_length: settings.pulse_length,
            protocol: settings.protocol,
            code_length: settings.code_length,
            repeat: settings.repeat,
        }
    }
}
