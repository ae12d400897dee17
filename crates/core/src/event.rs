//! Observer-Schnittstelle zur UI-Schicht
//!
//! Der Kern haelt pro Session genau eine Observer-Referenz, injiziert
//! bei der Konstruktion – keine dynamische Listener-Liste. Das haelt
//! die Reihenfolge der Ereignisse trivial nachvollziehbar. Callbacks
//! werden aus Tokio-Tasks aufgerufen und muessen daher Send + Sync sein;
//! sie sollen schnell zurueckkehren (kein Blockieren im Callback).

use crate::types::{ConnectionState, LevelSource, Role};

/// Ereignis-Senke fuer eine Streaming-Session
///
/// Eine Methode pro Ereignisart. Pro Callback-Typ ist hoechstens ein
/// Aufruf gleichzeitig unterwegs.
pub trait SessionObserver: Send + Sync + 'static {
    /// Verbindungszustand hat sich geaendert (einzige autoritative Quelle)
    fn on_state_change(&self, state: ConnectionState);

    /// Neuer Pegel-Messwert (0.0..1.0) fuer die Visualisierung
    fn on_audio_level(&self, level: f32, source: LevelSource);

    /// Transkript-Delta einer Rolle; `is_final` schliesst den Sprechzug ab
    fn on_transcript(&self, text: &str, role: Role, is_final: bool);

    /// Menschlich lesbare, klassifizierte Fehlermeldung
    fn on_error(&self, message: &str);
}

/// Observer der alle Ereignisse verwirft
///
/// Nuetzlich fuer Tests und als Platzhalter.
#[derive(Debug, Default)]
pub struct NullObserver;

impl SessionObserver for NullObserver {
    fn on_state_change(&self, _state: ConnectionState) {}
    fn on_audio_level(&self, _level: f32, _source: LevelSource) {}
    fn on_transcript(&self, _text: &str, _role: Role, _is_final: bool) {}
    fn on_error(&self, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Observer der Ereignisse fuer Assertions mitschreibt
    struct RecordingObserver {
        states: Mutex<Vec<ConnectionState>>,
    }

    impl SessionObserver for RecordingObserver {
        fn on_state_change(&self, state: ConnectionState) {
            self.states.lock().unwrap().push(state);
        }
        fn on_audio_level(&self, _level: f32, _source: LevelSource) {}
        fn on_transcript(&self, _text: &str, _role: Role, _is_final: bool) {}
        fn on_error(&self, _message: &str) {}
    }

    #[test]
    fn observer_als_trait_objekt_nutzbar() {
        let obs: std::sync::Arc<dyn SessionObserver> = std::sync::Arc::new(RecordingObserver {
            states: Mutex::new(Vec::new()),
        });
        obs.on_state_change(ConnectionState::Connecting);
        obs.on_state_change(ConnectionState::Connected);
    }

    #[test]
    fn null_observer_verwirft_alles() {
        let obs = NullObserver;
        obs.on_state_change(ConnectionState::Error);
        obs.on_audio_level(0.5, LevelSource::Output);
        obs.on_transcript("hallo", Role::Model, true);
        obs.on_error("nichts passiert");
    }
}
