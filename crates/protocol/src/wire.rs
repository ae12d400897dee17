//! Nachrichtentypen des bidirektionalen Streams
//!
//! JSON-Nachrichten zwischen Client und KI-Dienst. Ausgehend: die
//! Setup-Nachricht des Handshakes und fortlaufende Audio-Eingaben.
//! Eingehend: die Setup-Bestaetigung, Server-Inhalte (Audio, Transkripte,
//! Signale) und Fehler.
//!
//! ## Design
//! - camelCase auf dem Draht, snake_case im Code (serde rename)
//! - Eine eingehende Nachricht kann mehrere Felder gleichzeitig tragen
//!   (Audio + Transkript + turnComplete); der Empfaenger muss alle
//!   vorhandenen Felder verarbeiten, nicht nur das erste.

use serde::{Deserialize, Serialize};

use crate::codec::transport_encode;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Abtastrate der Mikrofon-Frames (Hz)
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Abtastrate der synthetisierten Audio-Fragmente (Hz)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Kanalanzahl der eingehenden Fragmente
pub const PLAYBACK_CHANNELS: u16 = 1;

/// Samples pro ausgehendem Frame (ein Capture-Tick)
pub const FRAME_SAMPLES: usize = 4096;

/// MIME-Typ der ausgehenden PCM-Frames
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

// ---------------------------------------------------------------------------
// Ausgehende Nachrichten
// ---------------------------------------------------------------------------

/// Vom Client gesendete Nachricht
///
/// Extern getaggt: serialisiert zu `{"setup": ...}` bzw.
/// `{"realtimeInput": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
}

impl ClientMessage {
    /// Baut die Setup-Nachricht des Handshakes
    pub fn setup(config: &SetupConfig) -> Self {
        Self::Setup(Setup {
            model: format!("models/{}", config.model),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".into()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: config.voice_name.clone(),
                        },
                    },
                },
            },
            system_instruction: Some(SystemInstruction {
                parts: vec![TextPart {
                    text: config.system_instruction.clone(),
                }],
            }),
            input_audio_transcription: Transcription::default(),
            output_audio_transcription: Transcription::default(),
        })
    }

    /// Verpackt einen PCM16-Frame als Audio-Eingabe-Nachricht
    pub fn realtime_audio(pcm_bytes: &[u8]) -> Self {
        Self::RealtimeInput(RealtimeInput {
            media: MediaBlob {
                data: transport_encode(pcm_bytes),
                mime_type: INPUT_MIME_TYPE.into(),
            },
        })
    }
}

/// Verbindungs-Konfiguration fuer den Handshake
#[derive(Debug, Clone)]
pub struct SetupConfig {
    /// Modellname ohne `models/`-Praefix
    pub model: String,
    /// Gewaehlte Stimme (z.B. "Kore")
    pub voice_name: String,
    /// System-Instruktion des Szenarios
    pub system_instruction: String,
}

/// Setup-Nachricht: Modalitaet, Stimme, Instruktion, Transkription
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
    /// Leeres Objekt = Transkription der Benutzereingabe aktivieren
    pub input_audio_transcription: Transcription,
    /// Leeres Objekt = Transkription der Modellausgabe aktivieren
    pub output_audio_transcription: Transcription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// System-Instruktion als Parts-Liste
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInstruction {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

/// Leeres Konfigurationsobjekt (Anwesenheit aktiviert das Feature)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcription {}

/// Audio-Eingabe waehrend der Session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media: MediaBlob,
}

/// Base64-kodierter Binaer-Blob mit MIME-Typ
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    pub data: String,
    pub mime_type: String,
}

// ---------------------------------------------------------------------------
// Eingehende Nachrichten
// ---------------------------------------------------------------------------

/// Vom Dienst empfangene Nachricht
///
/// Alle Felder sind optional; eine Nachricht kann beliebige Teilmengen
/// tragen. Unbekannte Felder werden ignoriert.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    /// Bestaetigung des Handshakes
    pub setup_complete: Option<serde_json::Value>,
    /// Inhalt eines Sprechzugs (Audio, Transkripte, Signale)
    pub server_content: Option<ServerContent>,
    /// Fehler vom Dienst
    pub error: Option<RemoteError>,
}

impl ServerMessage {
    /// Parst eine rohe Textnachricht des Streams
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Gibt true zurueck wenn die Nachricht den Handshake bestaetigt
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }
}

/// Inhaltsfelder einer Server-Nachricht
///
/// Audio-Payload, Transkript-Deltas beider Richtungen, Zug-Ende und
/// Unterbrechung koennen in einer Nachricht gleichzeitig auftreten.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    /// Der Benutzer hat den Sprecher unterbrochen: Wiedergabe sofort kappen
    pub interrupted: bool,
    /// Der Sprechzug des Modells ist abgeschlossen
    pub turn_complete: bool,
    /// Auch genutzt wenn der Dienst `generationComplete` frueher meldet
    pub generation_complete: bool,
    /// Transkript-Delta der Benutzereingabe
    pub input_transcription: Option<TranscriptionDelta>,
    /// Transkript-Delta der Modellausgabe
    pub output_transcription: Option<TranscriptionDelta>,
}

impl ServerContent {
    /// Sammelt alle Base64-Audio-Payloads dieses Sprechzugs
    pub fn audio_payloads(&self) -> impl Iterator<Item = &str> {
        self.model_turn
            .iter()
            .flat_map(|turn| turn.parts.iter())
            .filter_map(|part| part.inline_data.as_ref())
            .map(|blob| blob.data.as_str())
    }

    /// Gibt true zurueck wenn der Sprechzug abgeschlossen ist
    pub fn is_turn_complete(&self) -> bool {
        self.turn_complete || self.generation_complete
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelTurn {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Part {
    pub inline_data: Option<InlineData>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data: String,
}

/// Transkript-Delta mit Rohtext
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TranscriptionDelta {
    pub text: String,
}

/// Fehlerobjekt des Dienstes
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RemoteError {
    pub code: Option<i64>,
    pub message: String,
}
