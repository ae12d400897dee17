//! Fehlertypen fuer Sprachtandem
//!
//! Zentraler Fehler-Enum samt Klassifizierung der vom KI-Dienst
//! gelieferten Fehlermeldungen. Untermodule koennen eigene Fehler
//! definieren und via `#[from]` konvertieren.

use thiserror::Error;

/// Globaler Result-Alias fuer Sprachtandem
pub type Result<T> = std::result::Result<T, TandemError>;

/// Alle moeglichen Fehler im Sprachtandem-Kern
#[derive(Debug, Error)]
pub enum TandemError {
    // --- Geraete & Berechtigung ---
    #[error("Mikrofon-Zugriff verweigert: {0}")]
    PermissionDenied(String),

    // --- Verbindung & Dienst ---
    #[error("Authentifizierung fehlgeschlagen: {0}")]
    Authentication(String),

    #[error("Dienst nicht verfuegbar: {0}")]
    ServiceUnavailable(String),

    #[error("Netzwerkfehler: {0}")]
    Network(String),

    #[error("Modell nicht gefunden: {0}")]
    ModelUnavailable(String),

    #[error("Handshake-Zeitlimit ueberschritten")]
    HandshakeTimeout,

    // --- Audio ---
    #[error("Audio-Fragment nicht dekodierbar: {0}")]
    Decode(String),

    #[error("Audiofehler: {0}")]
    Audio(String),

    // --- Protokoll ---
    #[error("Ungueltige Nachricht: {0}")]
    InvalidMessage(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Config(String),

    // --- Intern ---
    #[error("Unbekannter Fehler: {0}")]
    Unknown(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl TandemError {
    /// Gibt die Fehlerart fuer die UI-Klassifizierung zurueck
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Authentication(_) => ErrorKind::AuthenticationError,
            Self::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            Self::Network(_) | Self::HandshakeTimeout => ErrorKind::NetworkError,
            Self::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            Self::Decode(_) => ErrorKind::DecodeError,
            _ => ErrorKind::Unknown,
        }
    }

    /// Gibt true zurueck wenn ein spaeterer Verbindungsversuch sinnvoll ist
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable(_) | Self::Network(_) | Self::HandshakeTimeout
        )
    }
}

/// Fehlerarten wie sie der UI gemeldet werden
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PermissionDenied,
    AuthenticationError,
    ServiceUnavailable,
    NetworkError,
    ModelUnavailable,
    DecodeError,
    Unknown,
}

/// Klassifiziert eine rohe Fehlermeldung des Dienstes
///
/// Der Dienst liefert keine strukturierten Fehlercodes, daher wird die
/// Meldung anhand bekannter Muster eingeordnet. Unbekannte Meldungen
/// werden wortgetreu als `Unknown` durchgereicht.
pub fn classify_remote_error(message: &str) -> TandemError {
    let lower = message.to_lowercase();

    if lower.contains("permission denied") || lower.contains("not allowed") {
        TandemError::PermissionDenied(
            "Mikrofon-Berechtigung verweigert. Die App benoetigt Mikrofon-Zugriff.".into(),
        )
    } else if message.contains("401") || message.contains("403") {
        TandemError::Authentication(
            "Authentifizierung fehlgeschlagen. API-Schluessel pruefen.".into(),
        )
    } else if message.contains("503") {
        TandemError::ServiceUnavailable(
            "Dienst ueberlastet (503). Bitte spaeter erneut versuchen.".into(),
        )
    } else if message.contains("Requested entity was not found") {
        TandemError::ModelUnavailable(
            "Modell nicht gefunden oder API-Schluessel ohne Zugriff.".into(),
        )
    } else if lower.contains("network") || lower.contains("fetch") || lower.contains("dns") {
        TandemError::Network("Netzwerkverbindung fehlgeschlagen. Internetzugang pruefen.".into())
    } else {
        TandemError::Unknown(message.to_string())
    }
}
