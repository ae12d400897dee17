//! tandem-session – Streaming-Session und Lifecycle-Controller
//!
//! Baut die WebSocket-Verbindung zum Sprachdienst auf, fuehrt den
//! Setup-Handshake durch und pumpt Audio in beide Richtungen. Der
//! [`LiveClient`] orchestriert daruber den kompletten Lebenszyklus:
//! Audio-Geraete, Frame-Pumpe, Pegel-Monitor und Session, mit
//! idempotentem Auf- und Abbau.

pub mod client;
pub mod connection;

pub use client::{LiveClient, LiveClientConfig};
pub use connection::{SessionConfig, SessionEvent, SessionState, StreamingSession};
