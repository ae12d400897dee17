//! WebSocket-Streaming-Session zum Sprachdienst
//!
//! `connect` oeffnet die Verbindung, sendet die Setup-Nachricht und
//! wartet auf die Bestaetigung des Dienstes. Danach laufen zwei Tasks:
//! ausgehend werden Mikrofon-Frames als realtimeInput versendet,
//! eingehend werden Server-Nachrichten zerlegt und als Ereignisse an
//! den Lifecycle-Controller gereicht.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};

use tandem_core::error::classify_remote_error;
use tandem_core::{Role, TandemError};
use tandem_protocol::{transport_decode, ClientMessage, ServerContent, ServerMessage, SetupConfig};

/// Maximale Wartezeit auf die Setup-Bestaetigung
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Kapazitaet des Ereignis-Kanals zum Controller
const EVENT_QUEUE_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// Zustand & Ereignisse
// ---------------------------------------------------------------------------

/// Lebenszyklus der Streaming-Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closed,
    Failed,
}

/// Ereignisse die die Session an den Controller liefert
///
/// Eine Server-Nachricht kann mehrere Ereignisse erzeugen; die
/// Reihenfolge innerhalb einer Nachricht bleibt erhalten.
#[derive(Debug)]
pub enum SessionEvent {
    /// Dekodierte PCM16-Bytes eines Audio-Fragments
    Audio(Vec<u8>),
    /// Der Benutzer hat den Sprecher unterbrochen
    Interrupted,
    /// Transkript-Delta einer Rolle
    Transcript {
        text: String,
        role: Role,
        is_final: bool,
    },
    /// Sprechzug des Modells abgeschlossen
    TurnComplete,
    /// Klassifizierter Fehler des Dienstes
    RemoteError(TandemError),
    /// Die Verbindung wurde dienstseitig beendet
    Closed,
}

/// Verbindungsparameter einer Session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Vollstaendige wss-URL inklusive Authentifizierung
    pub endpoint: String,
    /// Inhalt der Setup-Nachricht
    pub setup: SetupConfig,
    /// Zeitlimit fuer den Handshake
    pub handshake_timeout: Duration,
}

impl SessionConfig {
    pub fn new(endpoint: impl Into<String>, setup: SetupConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            setup,
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// StreamingSession
// ---------------------------------------------------------------------------

/// Eine offene Streaming-Verbindung zum Dienst
pub struct StreamingSession {
    state: Arc<Mutex<SessionState>>,
    shutdown: watch::Sender<bool>,
    inbound: tokio::task::JoinHandle<()>,
    outbound: tokio::task::JoinHandle<()>,
    closed: AtomicBool,
}

impl StreamingSession {
    /// Baut die Verbindung auf und fuehrt den Setup-Handshake durch
    ///
    /// `frames` liefert PCM16-kodierte Mikrofon-Frames fuer den Versand.
    /// Gibt die Session und den Ereignis-Empfaenger zurueck.
    pub async fn connect(
        config: SessionConfig,
        mut frames: mpsc::Receiver<Vec<u8>>,
    ) -> tandem_core::Result<(Self, mpsc::Receiver<SessionEvent>)> {
        let state = Arc::new(Mutex::new(SessionState::Connecting));

        let (ws, _response) = connect_async(config.endpoint.as_str()).await.map_err(|e| {
            *state.lock() = SessionState::Failed;
            map_ws_error(e)
        })?;
        let (mut sink, mut stream) = ws.split();

        // Setup senden und auf Bestaetigung warten
        let setup_json = serde_json::to_string(&ClientMessage::setup(&config.setup))
            .map_err(|e| TandemError::InvalidMessage(e.to_string()))?;
        sink.send(Message::Text(setup_json)).await.map_err(|e| {
            *state.lock() = SessionState::Failed;
            map_ws_error(e)
        })?;

        let handshake = timeout(config.handshake_timeout, async {
            loop {
                match stream.next().await {
                    Some(Ok(msg)) => {
                        let Some(raw) = message_text(&msg) else {
                            continue;
                        };
                        let parsed = match ServerMessage::parse(raw) {
                            Ok(p) => p,
                            Err(e) => {
                                warn!("Unlesbare Nachricht im Handshake: {}", e);
                                continue;
                            }
                        };
                        if let Some(err) = parsed.error {
                            return Err(classify_remote_error(&err.message));
                        }
                        if parsed.is_setup_complete() {
                            return Ok(());
                        }
                    }
                    Some(Err(e)) => return Err(map_ws_error(e)),
                    None => {
                        return Err(TandemError::Network(
                            "Verbindung waehrend des Handshakes beendet".into(),
                        ))
                    }
                }
            }
        })
        .await;

        match handshake {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                *state.lock() = SessionState::Failed;
                return Err(e);
            }
            Err(_) => {
                *state.lock() = SessionState::Failed;
                return Err(TandemError::HandshakeTimeout);
            }
        }

        *state.lock() = SessionState::Open;
        info!("Session geoeffnet: {}", config.setup.model);

        // Das Mikrofon laeuft schon waehrend des Handshakes; was sich bis
        // hier angesammelt hat, gehoert nicht in die Sitzung
        let stale = drain_stale_frames(&mut frames);
        if stale > 0 {
            debug!("{} Frames aus der Handshake-Phase verworfen", stale);
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        // Ausgehend: Mikrofon-Frames als realtimeInput
        let outbound = tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = frames.recv() => {
                        let Some(frame) = frame else { break };
                        let msg = ClientMessage::realtime_audio(&frame);
                        let json = match serde_json::to_string(&msg) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Frame nicht serialisierbar: {}", e);
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(json)).await {
                            debug!("Frame-Versand beendet: {}", e);
                            break;
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        // Eingehend: Server-Nachrichten in Ereignisse zerlegen
        let inbound_state = Arc::clone(&state);
        let inbound = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(Message::Close(_)) => {
                        debug!("Dienst hat die Verbindung geschlossen");
                        *inbound_state.lock() = SessionState::Closed;
                        let _ = events_tx.send(SessionEvent::Closed).await;
                        return;
                    }
                    Ok(msg) => {
                        let Some(raw) = message_text(&msg) else {
                            continue;
                        };
                        if !dispatch_raw(raw, &events_tx, &inbound_state).await {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("Empfang abgebrochen: {}", e);
                        *inbound_state.lock() = SessionState::Failed;
                        let _ = events_tx
                            .send(SessionEvent::RemoteError(map_ws_error(e)))
                            .await;
                        return;
                    }
                }
            }
            *inbound_state.lock() = SessionState::Closed;
            let _ = events_tx.send(SessionEvent::Closed).await;
        });

        Ok((
            Self {
                state,
                shutdown: shutdown_tx,
                inbound,
                outbound,
                closed: AtomicBool::new(false),
            },
            events_rx,
        ))
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Beendet die Session
    ///
    /// Idempotent: weitere Aufrufe sind No-ops. Der ausgehende Task
    /// sendet noch einen Close-Frame, der eingehende wird abgebrochen.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut state = self.state.lock();
            if *state == SessionState::Open || *state == SessionState::Connecting {
                *state = SessionState::Closed;
            }
        }
        let _ = self.shutdown.send(true);
        self.inbound.abort();
        debug!("Session geschlossen");
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        self.close();
        self.outbound.abort();
    }
}

#[cfg(test)]
impl StreamingSession {
    /// Bereits geoeffnete Session ohne Netzwerk fuer Controller-Tests
    pub(crate) fn attrappe() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(SessionState::Open)),
            shutdown,
            inbound: tokio::spawn(async {}),
            outbound: tokio::spawn(async {}),
            closed: AtomicBool::new(false),
        }
    }
}

/// Leert die Frame-Warteschlange; liefert die Anzahl verworfener Frames
fn drain_stale_frames(frames: &mut mpsc::Receiver<Vec<u8>>) -> usize {
    let mut n = 0;
    while frames.try_recv().is_ok() {
        n += 1;
    }
    n
}

// ---------------------------------------------------------------------------
// Nachrichten-Zerlegung
// ---------------------------------------------------------------------------

fn message_text(msg: &Message) -> Option<&str> {
    match msg {
        Message::Text(t) => Some(t.as_str()),
        // Der Dienst liefert JSON auch in Binaer-Frames
        Message::Binary(b) => std::str::from_utf8(b).ok(),
        _ => None,
    }
}

/// Verarbeitet eine rohe Nachricht; false beendet den Empfangs-Task
async fn dispatch_raw(
    raw: &str,
    events: &mpsc::Sender<SessionEvent>,
    state: &Mutex<SessionState>,
) -> bool {
    let parsed = match ServerMessage::parse(raw) {
        Ok(p) => p,
        Err(e) => {
            warn!("Unlesbare Server-Nachricht uebersprungen: {}", e);
            return true;
        }
    };

    if let Some(err) = parsed.error {
        *state.lock() = SessionState::Failed;
        let classified = classify_remote_error(&err.message);
        let _ = events.send(SessionEvent::RemoteError(classified)).await;
        return false;
    }

    if let Some(content) = parsed.server_content {
        return emit_content_events(&content, events).await;
    }
    true
}

/// Zerlegt einen serverContent-Block in Ereignisse
///
/// Reihenfolge: Transkripte, dann Audio, dann die Unterbrechung,
/// zuletzt das Zug-Ende. Die Unterbrechung kappt damit auch Audio aus
/// dem eigenen Block. Transkripte im selben Block wie das Zug-Ende
/// sind final.
async fn emit_content_events(
    content: &ServerContent,
    events: &mpsc::Sender<SessionEvent>,
) -> bool {
    let is_final = content.is_turn_complete();

    if let Some(delta) = &content.input_transcription {
        if !delta.text.is_empty() {
            let event = SessionEvent::Transcript {
                text: delta.text.clone(),
                role: Role::User,
                is_final,
            };
            if events.send(event).await.is_err() {
                return false;
            }
        }
    }
    if let Some(delta) = &content.output_transcription {
        if !delta.text.is_empty() {
            let event = SessionEvent::Transcript {
                text: delta.text.clone(),
                role: Role::Model,
                is_final,
            };
            if events.send(event).await.is_err() {
                return false;
            }
        }
    }

    for payload in content.audio_payloads() {
        match transport_decode(payload) {
            Ok(bytes) => {
                if events.send(SessionEvent::Audio(bytes)).await.is_err() {
                    return false;
                }
            }
            Err(e) => warn!("Audio-Payload nicht dekodierbar, uebersprungen: {}", e),
        }
    }

    if content.interrupted {
        if events.send(SessionEvent::Interrupted).await.is_err() {
            return false;
        }
    }

    if is_final {
        if events.send(SessionEvent::TurnComplete).await.is_err() {
            return false;
        }
    }
    true
}

/// Ordnet einen WebSocket-Fehler den Fehlerarten des Kerns zu
fn map_ws_error(err: WsError) -> TandemError {
    match err {
        WsError::Http(response) => {
            let status = response.status();
            match status.as_u16() {
                401 | 403 => TandemError::Authentication(format!(
                    "Dienst lehnt die Verbindung ab (HTTP {})",
                    status
                )),
                503 => TandemError::ServiceUnavailable(format!(
                    "Dienst nicht erreichbar (HTTP {})",
                    status
                )),
                _ => TandemError::Network(format!("HTTP-Fehler {}", status)),
            }
        }
        other => TandemError::Network(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::ErrorKind;
    use tokio_tungstenite::tungstenite::http;

    fn http_error(status: u16) -> WsError {
        let response = http::Response::builder()
            .status(status)
            .body(None)
            .expect("Response baubar");
        WsError::Http(response)
    }

    async fn collect_events(raw: &str) -> Vec<SessionEvent> {
        let (tx, mut rx) = mpsc::channel(16);
        let state = Mutex::new(SessionState::Open);
        dispatch_raw(raw, &tx, &state).await;
        drop(tx);
        let mut out = Vec::new();
        while let Some(e) = rx.recv().await {
            out.push(e);
        }
        out
    }

    #[test]
    fn http_403_wird_als_authentifizierung_eingeordnet() {
        let err = map_ws_error(http_error(403));
        assert_eq!(err.kind(), ErrorKind::AuthenticationError);
    }

    #[test]
    fn http_503_wird_als_dienst_nicht_verfuegbar_eingeordnet() {
        let err = map_ws_error(http_error(503));
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
    }

    #[test]
    fn anderer_http_fehler_ist_netzwerkfehler() {
        let err = map_ws_error(http_error(500));
        assert_eq!(err.kind(), ErrorKind::NetworkError);
    }

    #[tokio::test]
    async fn transkript_delta_ohne_zug_ende_ist_nicht_final() {
        let raw = r#"{"serverContent":{"outputTranscription":{"text":"Hola"}}}"#;
        let events = collect_events(raw).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            SessionEvent::Transcript {
                text,
                role,
                is_final,
            } => {
                assert_eq!(text, "Hola");
                assert_eq!(*role, Role::Model);
                assert!(!is_final);
            }
            other => panic!("Unerwartetes Ereignis: {:?}", other),
        }
    }

    #[tokio::test]
    async fn transkript_im_zug_ende_block_ist_final() {
        let raw = r#"{"serverContent":{"outputTranscription":{"text":", amigo"},"turnComplete":true}}"#;
        let events = collect_events(raw).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            SessionEvent::Transcript { is_final: true, .. }
        ));
        assert!(matches!(events[1], SessionEvent::TurnComplete));
    }

    #[tokio::test]
    async fn unterbrechung_kommt_nach_dem_audio_des_eigenen_blocks() {
        // Audio im selben Block wie interrupted wird geplant und sofort
        // wieder gestoppt, ueberlebt die Unterbrechung also nicht
        let raw = r#"{"serverContent":{"interrupted":true,"modelTurn":{"parts":[{"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AAAA"}}]},"inputTranscription":{"text":"Moment"}}}"#;
        let events = collect_events(raw).await;
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0],
            SessionEvent::Transcript {
                role: Role::User,
                ..
            }
        ));
        assert!(matches!(events[1], SessionEvent::Audio(_)));
        assert!(matches!(events[2], SessionEvent::Interrupted));
    }

    #[tokio::test]
    async fn handshake_frames_werden_vor_dem_versand_verworfen() {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(8);
        for _ in 0..3 {
            tx.send(vec![0u8; 4]).await.expect("Kanal offen");
        }
        assert_eq!(drain_stale_frames(&mut rx), 3);
        assert!(rx.try_recv().is_err());
        // Frames nach dem Leeren bleiben erhalten
        tx.send(vec![1u8; 4]).await.expect("Kanal offen");
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn audio_payloads_werden_dekodiert() {
        // "AAAA" ist Base64 fuer drei Null-Bytes
        let raw = r#"{"serverContent":{"modelTurn":{"parts":[{"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AAAA"}}]}}}"#;
        let events = collect_events(raw).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            SessionEvent::Audio(bytes) => assert_eq!(bytes, &[0u8, 0, 0]),
            other => panic!("Unerwartetes Ereignis: {:?}", other),
        }
    }

    #[tokio::test]
    async fn dienst_fehler_wird_klassifiziert_und_beendet_den_empfang() {
        let (tx, mut rx) = mpsc::channel(4);
        let state = Mutex::new(SessionState::Open);
        let raw = r#"{"error":{"code":503,"message":"503 Service Unavailable"}}"#;
        let weiter = dispatch_raw(raw, &tx, &state).await;
        assert!(!weiter);
        assert_eq!(*state.lock(), SessionState::Failed);
        match rx.recv().await {
            Some(SessionEvent::RemoteError(e)) => {
                assert_eq!(e.kind(), ErrorKind::ServiceUnavailable)
            }
            other => panic!("Unerwartetes Ereignis: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unlesbare_nachricht_wird_uebersprungen() {
        let (tx, _rx) = mpsc::channel(4);
        let state = Mutex::new(SessionState::Open);
        assert!(dispatch_raw("kein json", &tx, &state).await);
        assert_eq!(*state.lock(), SessionState::Open);
    }
}
