//! Mikrofon-Aufnahme via cpal
//!
//! Oeffnet einen cpal-InputStream auf dem Aufnahmeformat des Dienstes
//! (16 kHz Mono) und schreibt die Samples in einen lock-freien
//! Ring-Buffer. Der Callback aktualisiert nebenbei den Eingangspegel.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use ringbuf::traits::{Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, error, warn};

use tandem_protocol::wire::CAPTURE_SAMPLE_RATE;

use crate::error::{AudioError, AudioResult};
use crate::level::LevelTap;

/// Konfiguration fuer die Mikrofon-Aufnahme
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Kanalanzahl (der Dienst erwartet Mono)
    pub channels: u16,
    /// Ring-Buffer-Kapazitaet in Samples
    pub buffer_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: CAPTURE_SAMPLE_RATE,
            channels: 1,
            buffer_size: CAPTURE_SAMPLE_RATE as usize * 2, // 2 Sekunden Puffer
        }
    }
}

/// Produziert Samples im cpal-Callback
pub type CaptureProducer = HeapProd<f32>;
/// Konsumiert Samples fuer die Frame-Bildung
pub type CaptureConsumer = HeapCons<f32>;

/// Haelt den cpal-Stream am Leben
///
/// Wird der CaptureStream gedroppt, stoppt die Aufnahme automatisch.
pub struct CaptureStream {
    _stream: Stream,
    config: CaptureConfig,
}

impl CaptureStream {
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

// Callback-Seite: Pegel messen, dann in den Ring-Buffer schreiben
fn push_block(producer: &mut CaptureProducer, tap: &LevelTap, samples: &[f32]) {
    tap.update(samples);
    let written = producer.push_slice(samples);
    if written < samples.len() {
        warn!(
            "Aufnahme-Ring-Buffer voll, {} Samples verworfen",
            samples.len() - written
        );
    }
}

/// Oeffnet einen Aufnahme-Stream auf dem gegebenen Geraet
///
/// Gibt den Stream und den Ring-Buffer-Consumer zurueck. Der Producer
/// lebt im cpal-Callback-Thread, der uebergebene [`LevelTap`] wird dort
/// blockweise aktualisiert.
pub fn open_capture_stream(
    device: &Device,
    config: CaptureConfig,
    tap: LevelTap,
) -> AudioResult<(CaptureStream, CaptureConsumer)> {
    let stream_config = StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let rb = HeapRb::<f32>::new(config.buffer_size);
    let (mut producer, consumer) = rb.split();

    let err_fn = |err| error!("Aufnahme-Fehler: {}", err);

    let supported = device
        .supported_input_configs()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?
        .find(|c| {
            c.min_sample_rate().0 <= config.sample_rate
                && c.max_sample_rate().0 >= config.sample_rate
                && c.channels() >= config.channels
        });

    let sample_format = supported
        .map(|c| c.sample_format())
        .unwrap_or(SampleFormat::F32);

    let stream = match sample_format {
        SampleFormat::F32 => device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _| {
                    push_block(&mut producer, &tap, data);
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
        SampleFormat::I16 => device
            .build_input_stream(
                &stream_config,
                move |data: &[i16], _| {
                    let floats: Vec<f32> =
                        data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                    push_block(&mut producer, &tap, &floats);
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
        SampleFormat::U8 => device
            .build_input_stream(
                &stream_config,
                move |data: &[u8], _| {
                    let floats: Vec<f32> =
                        data.iter().map(|&s| (s as f32 - 128.0) / 128.0).collect();
                    push_block(&mut producer, &tap, &floats);
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
        _ => {
            return Err(AudioError::StreamFehler(format!(
                "Nicht unterstuetztes Sample-Format: {:?}",
                sample_format
            )))
        }
    };

    stream
        .play()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    debug!(
        "Aufnahme-Stream geoeffnet: {}Hz {}ch",
        config.sample_rate, config.channels
    );

    Ok((
        CaptureStream {
            _stream: stream,
            config,
        },
        consumer,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::traits::HostTrait;

    #[test]
    fn capture_config_default_ist_dienst_format() {
        let config = CaptureConfig::default();
        assert_eq!(config.sample_rate, 16_000);
        assert_eq!(config.channels, 1);
        assert!(config.buffer_size > 0);
    }

    #[test]
    fn push_block_aktualisiert_pegel() {
        let rb = HeapRb::<f32>::new(16);
        let (mut producer, _consumer) = rb.split();
        let tap = LevelTap::new();
        push_block(&mut producer, &tap, &[0.5, -0.5]);
        assert!((tap.read() - 0.5).abs() < 1e-6);
    }

    #[test]
    #[ignore = "Benoetigt Audio-Hardware"]
    fn aufnahme_stream_oeffnen() {
        let host = cpal::default_host();
        if let Some(device) = host.default_input_device() {
            let result = open_capture_stream(&device, CaptureConfig::default(), LevelTap::new());
            assert!(result.is_ok(), "Aufnahme-Stream sollte oeffenbar sein");
        }
    }
}
