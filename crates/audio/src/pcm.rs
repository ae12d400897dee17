//! PCM-Kodierung: f32-Samples <-> 16-Bit Little-Endian Bytes
//!
//! Das Drahtformat ist rohes PCM16-LE. Ausgehende Frames werden aus den
//! f32-Samples des Mikrofons kodiert, eingehende Audio-Haeppchen werden
//! in f32-Fragmente fuer den Scheduler dekodiert.

use crate::error::{AudioError, AudioResult};

// ---------------------------------------------------------------------------
// Fragment
// ---------------------------------------------------------------------------

/// Ein dekodiertes Stueck Audio, bereit fuer die Wiedergabe
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFragment {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFragment {
    /// Dauer des Fragments in Sekunden
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Kodierung
// ---------------------------------------------------------------------------

/// Kodiert f32-Samples als PCM16-LE-Bytes
///
/// Werte ausserhalb von [-1.0, 1.0] werden hart begrenzt, NaN wird zu Stille.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let v = if sample.is_nan() { 0.0 } else { sample };
        let scaled = (v * 32768.0).clamp(-32768.0, 32767.0) as i16;
        out.extend_from_slice(&scaled.to_le_bytes());
    }
    out
}

/// Dekodiert PCM16-LE-Bytes in ein Wiedergabe-Fragment
///
/// Die Byte-Laenge muss ein Vielfaches der Frame-Groesse (2 Bytes pro
/// Sample mal Kanalzahl) sein, sonst ist der Strom beschaedigt.
pub fn decode_fragment(bytes: &[u8], sample_rate: u32, channels: u16) -> AudioResult<AudioFragment> {
    let frame_bytes = 2 * channels as usize;
    if frame_bytes == 0 {
        return Err(AudioError::DecodeFehler("Kanalzahl ist null".into()));
    }
    if bytes.len() % frame_bytes != 0 {
        return Err(AudioError::DecodeFehler(format!(
            "PCM-Laenge {} ist kein Vielfaches von {}",
            bytes.len(),
            frame_bytes
        )));
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| {
            let s = i16::from_le_bytes([pair[0], pair[1]]);
            s as f32 / 32768.0
        })
        .collect();

    Ok(AudioFragment {
        samples,
        sample_rate,
        channels,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_bleibt_innerhalb_einer_quantisierungsstufe() {
        let original: Vec<f32> = (0..4096)
            .map(|i| ((i as f32) * 0.01).sin() * 0.8)
            .collect();

        let bytes = encode_pcm16(&original);
        let fragment = decode_fragment(&bytes, 16_000, 1).unwrap();

        assert_eq!(fragment.samples.len(), original.len());
        for (a, b) in original.iter().zip(fragment.samples.iter()) {
            assert!((a - b).abs() <= 1.0 / 32768.0, "Abweichung zu gross: {a} vs {b}");
        }
    }

    #[test]
    fn encode_begrenzt_uebersteuerte_samples() {
        let bytes = encode_pcm16(&[2.0, -2.0]);
        assert_eq!(bytes, [0xFF, 0x7F, 0x00, 0x80]);
    }

    #[test]
    fn encode_macht_nan_zu_stille() {
        let bytes = encode_pcm16(&[f32::NAN]);
        assert_eq!(bytes, [0x00, 0x00]);
    }

    #[test]
    fn decode_lehnt_ungerade_laenge_ab() {
        let err = decode_fragment(&[0x00, 0x01, 0x02], 24_000, 1).unwrap_err();
        assert!(matches!(err, AudioError::DecodeFehler(_)));
    }

    #[test]
    fn decode_lehnt_halben_stereo_frame_ab() {
        // 6 Bytes sind 3 Mono-Samples, aber nur 1.5 Stereo-Frames
        let err = decode_fragment(&[0u8; 6], 24_000, 2).unwrap_err();
        assert!(matches!(err, AudioError::DecodeFehler(_)));
    }

    #[test]
    fn fragment_dauer_aus_samples_und_rate() {
        let fragment = AudioFragment {
            samples: vec![0.0; 24_000],
            sample_rate: 24_000,
            channels: 1,
        };
        assert!((fragment.duration() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn leeres_fragment_hat_dauer_null() {
        let fragment = decode_fragment(&[], 24_000, 1).unwrap();
        assert!(fragment.is_empty());
        assert_eq!(fragment.duration(), 0.0);
    }
}
