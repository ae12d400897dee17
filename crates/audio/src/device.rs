//! Auswahl der Audio-Geraete ueber cpal

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;
use tracing::debug;

use crate::error::{AudioError, AudioResult};

/// Beschreibung eines Audio-Geraets fuer Logs und Diagnose
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Anzeigename des Geraets
    pub name: String,
    /// Maximale Kanalanzahl
    pub channels: u16,
}

/// Gibt das Standard-Eingabegeraet zurueck, falls vorhanden
pub fn get_default_input() -> Option<AudioDevice> {
    let host = cpal::default_host();
    host.default_input_device().map(|d| describe(&d))
}

/// Gibt das Standard-Ausgabegeraet zurueck, falls vorhanden
pub fn get_default_output() -> Option<AudioDevice> {
    let host = cpal::default_host();
    host.default_output_device().map(|d| describe(&d))
}

/// Laedt das cpal-Eingabegeraet, per Name oder als Standard
pub fn load_input_device(name: Option<&str>) -> AudioResult<Device> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_input_device()
            .ok_or(AudioError::KeinStandardEingabegeraet),
        Some(n) => {
            let devices = host
                .input_devices()
                .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
            find_by_name(devices, n)
        }
    }
}

/// Laedt das cpal-Ausgabegeraet, per Name oder als Standard
pub fn load_output_device(name: Option<&str>) -> AudioResult<Device> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_output_device()
            .ok_or(AudioError::KeinStandardAusgabegeraet),
        Some(n) => {
            let devices = host
                .output_devices()
                .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
            find_by_name(devices, n)
        }
    }
}

fn find_by_name(devices: impl Iterator<Item = Device>, name: &str) -> AudioResult<Device> {
    for device in devices {
        if let Ok(dev_name) = device.name() {
            if dev_name.contains(name) {
                debug!("Audio-Geraet gewaehlt: {}", dev_name);
                return Ok(device);
            }
        }
    }
    Err(AudioError::GeraetNichtGefunden(name.to_string()))
}

fn describe(device: &Device) -> AudioDevice {
    let name = device
        .name()
        .unwrap_or_else(|_| "<unbenannt>".to_string());

    let mut channels = 1u16;
    if let Ok(configs) = device.supported_input_configs() {
        for cfg in configs {
            channels = channels.max(cfg.channels());
        }
    }
    if let Ok(configs) = device.supported_output_configs() {
        for cfg in configs {
            channels = channels.max(cfg.channels());
        }
    }

    AudioDevice { name, channels }
}
