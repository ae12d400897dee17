//! Transport-Kodierung fuer binaere Payloads
//!
//! Der Stream zum Dienst ist textbasiert (JSON ueber WebSocket), binaere
//! PCM-Puffer werden daher Base64-kodiert eingebettet. Die Kodierung ist
//! verlustfrei: `transport_decode(transport_encode(b)) == b` fuer alle
//! Byte-Folgen.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

/// Fehler beim Dekodieren eines Transport-Tokens
#[derive(Debug, Error)]
#[error("Base64-Dekodierung fehlgeschlagen: {0}")]
pub struct TransportDecodeError(#[from] base64::DecodeError);

/// Kodiert einen Byte-Puffer als textsicheres Transport-Token
pub fn transport_encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Dekodiert ein Transport-Token zurueck in die Original-Bytes
pub fn transport_decode(token: &str) -> Result<Vec<u8>, TransportDecodeError> {
    Ok(STANDARD.decode(token)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_round_trip_beliebige_bytes() {
        let eingaben: [&[u8]; 5] = [
            &[],
            &[0],
            &[0xff, 0x00, 0x7f, 0x80],
            b"hallo welt",
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 251, 252, 253, 254, 255],
        ];
        for bytes in eingaben {
            let token = transport_encode(bytes);
            let zurueck = transport_decode(&token).unwrap();
            assert_eq!(zurueck, bytes);
        }
    }

    #[test]
    fn transport_round_trip_pcm_typische_laenge() {
        // 4096 Samples * 2 Bytes wie ein Capture-Frame
        let bytes: Vec<u8> = (0..8192u32).map(|i| (i % 256) as u8).collect();
        let token = transport_encode(&bytes);
        assert_eq!(transport_decode(&token).unwrap(), bytes);
    }

    #[test]
    fn transport_decode_ablehnung_ungueltiges_token() {
        assert!(transport_decode("kein base64 !!!").is_err());
    }
}
