//! Gemeinsame Typen fuer Sprachtandem
//!
//! Verbindungszustand, Sprecherrollen, Pegel-Quellen sowie die
//! Verlaufstypen (Nachrichten und Sitzungsprotokolle), die der Kern an
//! die UI-Schicht liefert. Die Persistenz der Verlaufsdaten liegt bei
//! der UI – der Kern befuellt die Typen nur.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Zustand der Verbindung zum KI-Dienst
///
/// Genau eine Instanz pro Prozess, verwaltet vom Lifecycle-Controller.
/// Die UI darf den Status ausschliesslich hieraus ableiten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Sprecherrolle eines Transkript-Fragments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Der uebende Benutzer
    User,
    /// Der synthetische Gespraechspartner
    Model,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
        }
    }
}

/// Quelle eines Pegel-Messwerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelSource {
    /// Mikrofon-Pfad
    Input,
    /// Wiedergabe-Pfad
    Output,
}

// ---------------------------------------------------------------------------
// Verlaufstypen
// ---------------------------------------------------------------------------

/// Eine Nachricht im Gespraechsverlauf
///
/// Transkript-Deltas derselben Rolle werden von der UI-Schicht in die
/// jeweils letzte nicht-finale Nachricht gemergt; `turn_complete` vom
/// Dienst finalisiert sie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Eindeutige Nachrichten-ID
    pub id: Uuid,
    /// Sprecherrolle
    pub role: Role,
    /// Bisheriger Text der Nachricht
    pub text: String,
    /// Zeitpunkt des ersten Fragments
    pub timestamp: DateTime<Utc>,
    /// Ob die Nachricht abgeschlossen ist
    pub is_final: bool,
}

impl ChatMessage {
    /// Beginnt eine neue Nachricht mit dem ersten Text-Fragment
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
            is_final: false,
        }
    }

    /// Haengt ein weiteres Transkript-Delta an
    pub fn append(&mut self, delta: &str) {
        self.text.push_str(delta);
    }
}

/// Protokoll einer abgeschlossenen Uebungssitzung
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Eindeutige Sitzungs-ID
    pub id: Uuid,
    /// Startzeitpunkt der Sitzung
    pub started_at: DateTime<Utc>,
    /// Gewaehlte Uebungssprache (Katalog-ID)
    pub language_id: String,
    /// Gewaehltes Szenario (Katalog-ID)
    pub scenario_id: String,
    /// Gewaehlte Stimme
    pub voice_name: String,
    /// Finalisierte Nachrichten in Reihenfolge
    pub messages: Vec<ChatMessage>,
}

impl SessionRecord {
    /// Beginnt ein neues Sitzungsprotokoll
    pub fn new(
        language_id: impl Into<String>,
        scenario_id: impl Into<String>,
        voice_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            language_id: language_id.into(),
            scenario_id: scenario_id.into(),
            voice_name: voice_name.into(),
            messages: Vec::new(),
        }
    }

    /// Arbeitet ein Transkript-Delta in den Verlauf ein
    ///
    /// Mergt in die letzte nicht-finale Nachricht derselben Rolle oder
    /// beginnt eine neue. `is_final` markiert die Nachricht als
    /// abgeschlossen; das naechste Delta derselben Rolle beginnt dann
    /// eine neue Nachricht.
    pub fn transcript_delta(&mut self, text: &str, role: Role, is_final: bool) {
        match self
            .messages
            .iter_mut()
            .rev()
            .find(|m| m.role == role && !m.is_final)
        {
            Some(msg) => {
                msg.append(text);
                msg.is_final = is_final;
            }
            None => {
                let mut msg = ChatMessage::new(role, text);
                msg.is_final = is_final;
                self.messages.push(msg);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbindungszustand_serde_kompatibel() {
        let json = serde_json::to_string(&ConnectionState::Connecting).unwrap();
        assert_eq!(json, "\"CONNECTING\"");
        let state: ConnectionState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, ConnectionState::Connecting);
    }

    #[test]
    fn rolle_anzeige() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Model.to_string(), "model");
    }

    #[test]
    fn transcript_delta_mergt_in_offene_nachricht() {
        let mut record = SessionRecord::new("es", "coffee_shop", "Kore");
        record.transcript_delta("Hola", Role::Model, false);
        record.transcript_delta(", amigo", Role::Model, true);

        assert_eq!(record.messages.len(), 1);
        assert_eq!(record.messages[0].text, "Hola, amigo");
        assert!(record.messages[0].is_final);
    }

    #[test]
    fn transcript_delta_nach_final_beginnt_neue_nachricht() {
        let mut record = SessionRecord::new("es", "market", "Puck");
        record.transcript_delta("Buenos dias", Role::Model, true);
        record.transcript_delta("Que tal?", Role::Model, false);

        assert_eq!(record.messages.len(), 2);
        assert!(record.messages[0].is_final);
        assert!(!record.messages[1].is_final);
    }

    #[test]
    fn transcript_delta_rollen_getrennt() {
        let mut record = SessionRecord::new("fr", "airport", "Zephyr");
        record.transcript_delta("Bonjour", Role::Model, false);
        record.transcript_delta("Je voudrais", Role::User, false);
        record.transcript_delta(" madame", Role::Model, false);

        assert_eq!(record.messages.len(), 2);
        assert_eq!(record.messages[0].text, "Bonjour madame");
        assert_eq!(record.messages[1].text, "Je voudrais");
    }

    #[test]
    fn session_record_serde_kompatibel() {
        let mut record = SessionRecord::new("de", "interview", "Charon");
        record.transcript_delta("Guten Tag", Role::Model, true);
        let json = serde_json::to_string(&record).unwrap();
        let zurueck: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck.messages.len(), 1);
        assert_eq!(zurueck.voice_name, "Charon");
    }
}
