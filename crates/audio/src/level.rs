//! Pegelmessung fuer Ein- und Ausgabe
//!
//! Die Audio-Callbacks schreiben den zuletzt gemessenen Pegel lock-frei in
//! einen [`LevelTap`]. Ein Monitor-Task liest ihn periodisch aus und reicht
//! ihn an die Oberflaeche weiter, ohne den Echtzeit-Pfad zu beruehren.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// LevelTap
// ---------------------------------------------------------------------------

/// Lock-freier Messpunkt fuer den aktuellen Audio-Pegel
///
/// Der f32-Wert wird als Bitmuster in einem AtomicU32 abgelegt. Schreiben
/// geschieht im Audio-Callback, Lesen im Monitor-Task.
#[derive(Debug, Clone, Default)]
pub struct LevelTap {
    bits: Arc<AtomicU32>,
}

impl LevelTap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aktualisiert den Pegel aus einem Sample-Block (Audio-Callback-Seite)
    pub fn update(&self, samples: &[f32]) {
        let level = block_level(samples);
        self.bits.store(level.to_bits(), Ordering::Relaxed);
    }

    /// Liest den zuletzt gemessenen Pegel (Monitor-Seite)
    pub fn read(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Setzt den Pegel auf Stille zurueck
    pub fn reset(&self) {
        self.bits.store(0.0f32.to_bits(), Ordering::Relaxed);
    }
}

/// Normalisierter Pegel eines Blocks: mittlere Absolut-Amplitude in [0.0, 1.0]
pub fn block_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s.abs()).sum();
    (sum / samples.len() as f32).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stille_ergibt_pegel_null() {
        assert_eq!(block_level(&[0.0; 256]), 0.0);
        assert_eq!(block_level(&[]), 0.0);
    }

    #[test]
    fn vollaussteuerung_ergibt_pegel_eins() {
        assert_eq!(block_level(&[1.0, -1.0, 1.0, -1.0]), 1.0);
    }

    #[test]
    fn pegel_ist_mittlere_absolutamplitude() {
        let level = block_level(&[0.5, -0.5, 0.0, 0.0]);
        assert!((level - 0.25).abs() < 1e-6);
    }

    #[test]
    fn uebersteuerung_wird_auf_eins_begrenzt() {
        assert_eq!(block_level(&[4.0, -4.0]), 1.0);
    }

    #[test]
    fn tap_transportiert_wert_zwischen_klonen() {
        let tap = LevelTap::new();
        let writer = tap.clone();
        writer.update(&[0.5, -0.5]);
        assert!((tap.read() - 0.5).abs() < 1e-6);
        tap.reset();
        assert_eq!(tap.read(), 0.0);
    }
}
