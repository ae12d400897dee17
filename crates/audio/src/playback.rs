//! Audio-Wiedergabe via cpal
//!
//! Der Sink fuehrt eine eigene Sample-Uhr und mischt alle geplanten
//! Fragmente sample-genau im cpal-Callback zusammen. Der Scheduler
//! (siehe [`crate::scheduler`]) plant Fragmente relativ zu dieser Uhr.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use parking_lot::Mutex;
use tracing::{debug, error};

use tandem_protocol::wire::{PLAYBACK_CHANNELS, PLAYBACK_SAMPLE_RATE};

use crate::error::{AudioError, AudioResult};
use crate::level::LevelTap;
use crate::pcm::AudioFragment;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Kontrolle ueber ein einzelnes geplantes Fragment
pub trait PlaybackHandle {
    /// Bricht die Wiedergabe des Fragments ab
    ///
    /// Idempotent; nach natuerlichem Ende ein No-op.
    fn stop(&self);

    /// Ob das Fragment fertig gespielt oder abgebrochen wurde
    fn is_finished(&self) -> bool;
}

/// Ausgabe-Seite der Wiedergabe mit eigener Uhr
pub trait PlaybackSink {
    /// Aktuelle Position der Wiedergabe-Uhr in Sekunden
    fn now(&self) -> f64;

    /// Plant ein Fragment zum Zeitpunkt `start_at` (Sekunden auf der Uhr)
    ///
    /// Liegt `start_at` in der Vergangenheit, beginnt die Wiedergabe sofort.
    fn schedule(&self, fragment: AudioFragment, start_at: f64) -> Box<dyn PlaybackHandle>;
}

// ---------------------------------------------------------------------------
// Mixer-Zustand
// ---------------------------------------------------------------------------

struct ScheduledSource {
    samples: Vec<f32>,
    /// Absoluter Sample-Index auf der Sink-Uhr, ab dem die Quelle spielt
    start_sample: u64,
    cursor: usize,
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

struct SinkShared {
    /// Anzahl der bisher ausgegebenen Samples
    clock_samples: u64,
    sources: Vec<ScheduledSource>,
}

impl SinkShared {
    fn new() -> Self {
        Self {
            clock_samples: 0,
            sources: Vec::new(),
        }
    }

    /// Mischt einen Ausgabe-Block und rueckt die Uhr vor
    fn mix_into(&mut self, out: &mut [f32]) {
        out.fill(0.0);

        for source in &mut self.sources {
            if source.cancelled.load(Ordering::Relaxed) {
                source.finished.store(true, Ordering::Relaxed);
                continue;
            }
            for (i, slot) in out.iter_mut().enumerate() {
                let t = self.clock_samples + i as u64;
                if t < source.start_sample || source.cursor >= source.samples.len() {
                    continue;
                }
                *slot += source.samples[source.cursor];
                source.cursor += 1;
            }
            if source.cursor >= source.samples.len() {
                source.finished.store(true, Ordering::Relaxed);
            }
        }

        self.sources
            .retain(|s| !s.finished.load(Ordering::Relaxed));

        // Weiche Begrenzung gegen Uebersteuerung beim Mischen
        for slot in out.iter_mut() {
            *slot = soft_clip(*slot);
        }

        self.clock_samples += out.len() as u64;
    }
}

/// Weiche Amplituden-Begrenzung ueber tanh
fn soft_clip(v: f32) -> f32 {
    if v.abs() <= 1.0 {
        v
    } else {
        v.tanh()
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

struct SourceHandle {
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl PlaybackHandle for SourceHandle {
    fn stop(&self) {
        if !self.finished.load(Ordering::Relaxed) {
            self.cancelled.store(true, Ordering::Relaxed);
        }
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// CpalPlaybackSink
// ---------------------------------------------------------------------------

/// Wiedergabe-Sink auf einem cpal-Ausgabegeraet
///
/// Haelt den Stream am Leben; Drop beendet die Wiedergabe. Der Callback
/// aktualisiert den Ausgangspegel blockweise.
pub struct CpalPlaybackSink {
    shared: Arc<Mutex<SinkShared>>,
    sample_rate: u32,
    _stream: Stream,
}

impl CpalPlaybackSink {
    /// Oeffnet den Sink auf dem Geraet im Wiedergabe-Format des Dienstes
    pub fn open(device: &Device, tap: LevelTap) -> AudioResult<Self> {
        let stream_config = StreamConfig {
            channels: PLAYBACK_CHANNELS,
            sample_rate: cpal::SampleRate(PLAYBACK_SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let shared = Arc::new(Mutex::new(SinkShared::new()));
        let err_fn = |err| error!("Wiedergabe-Fehler: {}", err);

        let supported = device
            .supported_output_configs()
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?
            .find(|c| {
                c.min_sample_rate().0 <= PLAYBACK_SAMPLE_RATE
                    && c.max_sample_rate().0 >= PLAYBACK_SAMPLE_RATE
                    && c.channels() >= PLAYBACK_CHANNELS
            });

        let sample_format = supported
            .map(|c| c.sample_format())
            .unwrap_or(SampleFormat::F32);

        let callback_shared = Arc::clone(&shared);
        let stream = match sample_format {
            SampleFormat::F32 => device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _| {
                        callback_shared.lock().mix_into(data);
                        tap.update(data);
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
            SampleFormat::I16 => device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [i16], _| {
                        let mut float_buf = vec![0.0f32; data.len()];
                        callback_shared.lock().mix_into(&mut float_buf);
                        tap.update(&float_buf);
                        for (out, s) in data.iter_mut().zip(float_buf.iter()) {
                            *out = (*s * i16::MAX as f32)
                                .clamp(i16::MIN as f32, i16::MAX as f32)
                                as i16;
                        }
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
            "Wiedergabe-Sink geoeffnet: {}Hz {}ch",
            PLAYBACK_SAMPLE_RATE, PLAYBACK_CHANNELS
        );

        Ok(Self {
            shared,
            sample_rate: PLAYBACK_SAMPLE_RATE,
            _stream: stream,
        })
    }
}

impl PlaybackSink for CpalPlaybackSink {
    fn now(&self) -> f64 {
        let shared = self.shared.lock();
        shared.clock_samples as f64 / self.sample_rate as f64
    }

    fn schedule(&self, fragment: AudioFragment, start_at: f64) -> Box<dyn PlaybackHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(fragment.is_empty()));

        let mut shared = self.shared.lock();
        let requested = (start_at.max(0.0) * self.sample_rate as f64).round() as u64;
        let start_sample = requested.max(shared.clock_samples);

        if !fragment.is_empty() {
            shared.sources.push(ScheduledSource {
                samples: fragment.samples,
                start_sample,
                cursor: 0,
                cancelled: Arc::clone(&cancelled),
                finished: Arc::clone(&finished),
            });
        }

        Box::new(SourceHandle {
            cancelled,
            finished,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
