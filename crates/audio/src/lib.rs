//! tandem-audio – Audio-Pipeline fuer Sprachtandem
//!
//! Vollstaendige Audio-Kette des Sprachclients:
//! - Mikrofon-Capture via cpal (16 kHz mono) in einen lock-free Ring-Buffer
//! - Frame-Pumpe: Ring-Buffer -> feste 4096-Sample-Frames -> PCM16 -> Transport
//! - PCM-Codec: f32 <-> i16 little-endian
//! - Wiedergabe-Scheduler: lueckenlose, strikt geordnete Wiedergabe
//!   eingehender Fragmente mit sofortiger Unterbrechung
//! - Pegel-Taps fuer die UI-Visualisierung

pub mod capture;
pub mod device;
pub mod error;
pub mod framer;
pub mod level;
pub mod pcm;
pub mod playback;
pub mod scheduler;

// Bequeme Re-Exporte der wichtigsten Typen
pub use capture::{open_capture_stream, CaptureConfig, CaptureConsumer, CaptureStream};
pub use device::{get_default_input, get_default_output, AudioDevice};
pub use error::{AudioError, AudioResult};
pub use framer::{FramePump, FramePumpStats};
pub use level::{block_level, LevelTap};
pub use pcm::{decode_fragment, encode_pcm16, AudioFragment};
pub use playback::{CpalPlaybackSink, PlaybackHandle, PlaybackSink};
pub use scheduler::PlaybackScheduler;
