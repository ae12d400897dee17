//! tandem-protocol – Wire-Kontrakt zum KI-Dienst
//!
//! Definiert die JSON-Nachrichten des bidirektionalen Streams sowie die
//! textsichere Transport-Kodierung fuer binaere Audio-Payloads.

pub mod codec;
pub mod wire;

pub use codec::{transport_decode, transport_encode};
pub use wire::{ClientMessage, ServerContent, ServerMessage, SetupConfig};
