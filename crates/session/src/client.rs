//! Lifecycle-Controller fuer eine Live-Sitzung
//!
//! Der [`LiveClient`] besitzt alle Teile einer laufenden Sitzung:
//! Audio-Worker (Geraete, Frame-Pumpe, Wiedergabe-Scheduler),
//! Streaming-Session und Pegel-Monitor. Aufbau und Abbau sind
//! idempotent; ein Generationenzaehler verwirft Ergebnisse von
//! Verbindungsversuchen, die von einem neueren Aufruf ueberholt wurden.
//! Beendet der Dienst die Verbindung, baut die Ereignis-Schleife die
//! Sitzung genauso vollstaendig ab wie ein lokaler `disconnect`.
//!
//! cpal-Streams sind nicht Send, daher lebt die gesamte Audio-Seite auf
//! einem dedizierten Thread und wird ueber einen Kommando-Kanal gesteuert.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tandem_audio::{
    decode_fragment, open_capture_stream, CaptureConfig, CpalPlaybackSink, FramePump, LevelTap,
    PlaybackScheduler,
};
use tandem_core::types::SessionRecord;
use tandem_core::{ConnectionState, LevelSource, Role, SessionObserver, TandemError};
use tandem_protocol::wire::{PLAYBACK_CHANNELS, PLAYBACK_SAMPLE_RATE};
use tandem_protocol::SetupConfig;

use crate::connection::{SessionConfig, SessionEvent, StreamingSession};

/// Kapazitaet der Frame-Warteschlange Richtung Dienst
const FRAME_QUEUE_DEPTH: usize = 32;

/// Abstand der Pegel-Meldungen an den Observer
const LEVEL_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Vollstaendige Parameter einer Live-Sitzung
#[derive(Debug, Clone)]
pub struct LiveClientConfig {
    /// wss-Endpunkt des Dienstes inklusive Authentifizierung
    pub endpoint: String,
    /// Inhalt der Setup-Nachricht (Modell, Stimme, Systemanweisung)
    pub setup: SetupConfig,
    /// Uebungssprache (Katalog-ID), nur fuers Sitzungsprotokoll
    pub language_id: String,
    /// Szenario (Katalog-ID), nur fuers Sitzungsprotokoll
    pub scenario_id: String,
    /// Eingabegeraet per Namensteil, None = Standard
    pub input_device: Option<String>,
    /// Ausgabegeraet per Namensteil, None = Standard
    pub output_device: Option<String>,
}

// ---------------------------------------------------------------------------
// Audio-Worker
// ---------------------------------------------------------------------------

enum AudioCommand {
    /// PCM16-Bytes eines eingehenden Fragments abspielen
    Play(Vec<u8>),
    /// Alles Geplante sofort stoppen
    Interrupt,
    Shutdown,
}

/// Ordnet Fehler der Audio-Schicht den Kern-Fehlerarten zu
///
/// Verweigerter Mikrofon-Zugriff wird als `PermissionDenied` gemeldet,
/// alles andere als allgemeiner Audiofehler.
fn map_audio_error(e: impl std::fmt::Display) -> TandemError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("permission") || lower.contains("not allowed") || lower.contains("denied") {
        TandemError::PermissionDenied(msg)
    } else {
        TandemError::Audio(msg)
    }
}

/// Haelt den Audio-Thread und seinen Kommando-Kanal
struct AudioWorker {
    commands: std::sync::mpsc::Sender<AudioCommand>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl AudioWorker {
    /// Startet den Audio-Thread und wartet auf dessen Initialisierung
    ///
    /// Blockiert bis Geraete und Streams offen sind; deshalb aus einem
    /// Blocking-Kontext aufrufen.
    fn start(
        input_device: Option<String>,
        output_device: Option<String>,
        input_tap: LevelTap,
        output_tap: LevelTap,
        frames_tx: mpsc::Sender<Vec<u8>>,
    ) -> tandem_core::Result<Self> {
        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<AudioCommand>();
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<tandem_core::Result<()>>(1);

        let handle = std::thread::Builder::new()
            .name("audio-worker".into())
            .spawn(move || {
                let init = (|| -> tandem_core::Result<_> {
                    let out_dev = tandem_audio::device::load_output_device(
                        output_device.as_deref(),
                    )
                    .map_err(map_audio_error)?;
                    let sink = CpalPlaybackSink::open(&out_dev, output_tap)
                        .map_err(map_audio_error)?;
                    let scheduler = PlaybackScheduler::new(sink);

                    let in_dev = tandem_audio::device::load_input_device(
                        input_device.as_deref(),
                    )
                    .map_err(map_audio_error)?;
                    let (capture, consumer) =
                        open_capture_stream(&in_dev, CaptureConfig::default(), input_tap)
                            .map_err(map_audio_error)?;
                    let pump = FramePump::spawn(consumer, frames_tx)
                        .map_err(map_audio_error)?;

                    Ok((scheduler, capture, pump))
                })();

                let (mut scheduler, _capture, mut pump) = match init {
                    Ok(parts) => {
                        let _ = ready_tx.send(Ok(()));
                        parts
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while let Ok(cmd) = cmd_rx.recv() {
                    match cmd {
                        AudioCommand::Play(bytes) => {
                            match decode_fragment(&bytes, PLAYBACK_SAMPLE_RATE, PLAYBACK_CHANNELS)
                            {
                                Ok(fragment) => {
                                    scheduler.enqueue(fragment);
                                }
                                Err(e) => warn!("Fragment verworfen: {}", e),
                            }
                        }
                        AudioCommand::Interrupt => scheduler.interrupt(),
                        AudioCommand::Shutdown => break,
                    }
                }
                pump.stop();
                debug!("Audio-Worker beendet");
            })
            .map_err(map_audio_error)?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                commands: cmd_tx,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(TandemError::Audio(
                    "Audio-Worker waehrend der Initialisierung beendet".into(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        let _ = self.commands.send(AudioCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AudioWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// LiveClient
// ---------------------------------------------------------------------------

struct ActiveSession {
    session: StreamingSession,
    worker: AudioWorker,
    monitor: tokio::task::JoinHandle<()>,
    events: tokio::task::JoinHandle<()>,
    record: Arc<Mutex<SessionRecord>>,
}

/// Gemeinsamer Zustand von Controller und Ereignis-Schleife
///
/// Die Schleife haelt nur eine schwache Referenz; lebt der Controller
/// nicht mehr, unterbleibt der Abbau von ihrer Seite.
struct ClientShared {
    observer: Arc<dyn SessionObserver>,
    generation: AtomicU64,
    active: Mutex<Option<ActiveSession>>,
}

impl ClientShared {
    /// Nimmt die aktive Sitzung heraus und baut alle Teile ab
    ///
    /// Erhoeht den Generationenzaehler, damit ein noch laufender
    /// Verbindungsaufbau sein Ergebnis verwirft. Liefert true, wenn
    /// eine Sitzung abgebaut wurde.
    fn teardown(&self) -> bool {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let Some(mut active) = self.active.lock().take() else {
            return false;
        };

        active.monitor.abort();
        active.events.abort();
        active.session.close();
        active.worker.stop();
        true
    }

    /// Hinterlegt die fertig aufgebaute Sitzung
    ///
    /// Die Generationspruefung passiert unter demselben Lock wie die
    /// Installation; ein dazwischen gelandeter `disconnect` (oder ein
    /// neuerer `connect`) kann so nicht verloren gehen. Eine ueberholte
    /// Sitzung geht zum Abbau an den Aufrufer zurueck.
    fn install(&self, generation: u64, session: ActiveSession) -> Option<ActiveSession> {
        let mut slot = self.active.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            return Some(session);
        }
        *slot = Some(session);
        None
    }

    fn fail(&self, error: &TandemError) {
        self.observer.on_error(&error.to_string());
        self.observer.on_state_change(ConnectionState::Error);
    }
}

/// Controller ueber den gesamten Lebenszyklus einer Live-Sitzung
pub struct LiveClient {
    shared: Arc<ClientShared>,
}

impl LiveClient {
    pub fn new(observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            shared: Arc::new(ClientShared {
                observer,
                generation: AtomicU64::new(0),
                active: Mutex::new(None),
            }),
        }
    }

    /// Baut eine komplette Sitzung auf
    ///
    /// Reihenfolge: Pegel-Taps und Pegel-Monitor, Audio-Geraete samt
    /// Frame-Pumpe, Streaming-Session, Ereignis-Schleife. Ein waehrend
    /// des Aufbaus eingetroffener `disconnect` (oder ein neuerer
    /// `connect`) macht diesen Versuch wirkungslos; seine Ergebnisse
    /// werden abgebaut statt uebernommen.
    pub async fn connect(&self, config: LiveClientConfig) -> tandem_core::Result<()> {
        if self.shared.active.lock().is_some() {
            debug!("connect: bestehende Sitzung wird zuerst abgebaut");
            self.disconnect();
        }
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared
            .observer
            .on_state_change(ConnectionState::Connecting);

        let input_tap = LevelTap::new();
        let output_tap = LevelTap::new();
        let (frames_tx, frames_rx) = mpsc::channel::<Vec<u8>>(FRAME_QUEUE_DEPTH);

        // Pegel-Monitor laeuft ab jetzt, noch bevor das Mikrofon
        // angefasst wird
        let monitor = spawn_level_monitor(
            Arc::clone(&self.shared.observer),
            input_tap.clone(),
            output_tap.clone(),
        );

        // Audio-Seite auf ihrem eigenen Thread hochfahren
        let worker_input = config.input_device.clone();
        let worker_output = config.output_device.clone();
        let worker = tokio::task::spawn_blocking(move || {
            AudioWorker::start(
                worker_input,
                worker_output,
                input_tap,
                output_tap,
                frames_tx,
            )
        })
        .await;

        let mut worker = match worker {
            Ok(Ok(w)) => w,
            Ok(Err(e)) => {
                monitor.abort();
                self.shared.fail(&e);
                return Err(e);
            }
            Err(e) => {
                monitor.abort();
                let e = TandemError::Unknown(e.to_string());
                self.shared.fail(&e);
                return Err(e);
            }
        };

        let session_config = SessionConfig::new(config.endpoint.clone(), config.setup.clone());
        let (session, events_rx) = match StreamingSession::connect(session_config, frames_rx).await
        {
            Ok(parts) => parts,
            Err(e) => {
                monitor.abort();
                worker.stop();
                self.shared.fail(&e);
                return Err(e);
            }
        };

        let record = Arc::new(Mutex::new(SessionRecord::new(
            config.language_id.clone(),
            config.scenario_id.clone(),
            config.setup.voice_name.clone(),
        )));

        let events = spawn_event_loop(
            events_rx,
            Arc::downgrade(&self.shared),
            Arc::clone(&self.shared.observer),
            Arc::clone(&record),
            worker.commands.clone(),
        );

        let active = ActiveSession {
            session,
            worker,
            monitor,
            events,
            record,
        };
        if let Some(mut stale) = self.shared.install(generation, active) {
            debug!("Verbindungsaufbau ueberholt, Ergebnis verworfen");
            stale.monitor.abort();
            stale.events.abort();
            stale.session.close();
            stale.worker.stop();
            return Ok(());
        }

        self.shared
            .observer
            .on_state_change(ConnectionState::Connected);
        info!(
            "Sitzung verbunden: Sprache={} Szenario={}",
            config.language_id, config.scenario_id
        );
        Ok(())
    }

    /// Baut die Sitzung vollstaendig ab
    ///
    /// Idempotent: ohne aktive Sitzung ein No-op. Macht zusaetzlich
    /// einen laufenden Verbindungsaufbau wirkungslos.
    pub fn disconnect(&self) {
        if self.shared.teardown() {
            self.shared
                .observer
                .on_state_change(ConnectionState::Disconnected);
            info!("Sitzung getrennt");
        } else {
            debug!("disconnect ignoriert: keine aktive Sitzung");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.active.lock().is_some()
    }

    /// Momentaufnahme des Sitzungsprotokolls fuer die UI
    pub fn session_record(&self) -> Option<SessionRecord> {
        self.shared
            .active
            .lock()
            .as_ref()
            .map(|a| a.record.lock().clone())
    }
}

// ---------------------------------------------------------------------------
// Hintergrund-Tasks
// ---------------------------------------------------------------------------

/// Meldet die Pegel beider Richtungen im festen Takt an den Observer
fn spawn_level_monitor(
    observer: Arc<dyn SessionObserver>,
    input_tap: LevelTap,
    output_tap: LevelTap,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LEVEL_INTERVAL);
        loop {
            ticker.tick().await;
            observer.on_audio_level(input_tap.read(), LevelSource::Input);
            observer.on_audio_level(output_tap.read(), LevelSource::Output);
        }
    })
}

/// Leitet Session-Ereignisse an Observer, Protokoll und Audio-Worker weiter
///
/// Beendet der Dienst die Sitzung (Close oder Fehler), laeuft hier
/// derselbe Abbau wie bei `disconnect`, bevor der Observer den
/// Zustandswechsel sieht. Mikrofon und Pegel-Monitor ueberleben den
/// gemeldeten Endzustand also nicht.
fn spawn_event_loop(
    mut events: mpsc::Receiver<SessionEvent>,
    shared: Weak<ClientShared>,
    observer: Arc<dyn SessionObserver>,
    record: Arc<Mutex<SessionRecord>>,
    audio: std::sync::mpsc::Sender<AudioCommand>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match apply_event(event, observer.as_ref(), &record, &audio) {
                EventOutcome::Continue => {}
                EventOutcome::RemoteClosed => {
                    if let Some(shared) = shared.upgrade() {
                        shared.teardown();
                    }
                    observer.on_state_change(ConnectionState::Disconnected);
                    info!("Sitzung dienstseitig beendet");
                    return;
                }
                EventOutcome::RemoteFailed(e) => {
                    if let Some(shared) = shared.upgrade() {
                        shared.teardown();
                    }
                    observer.on_error(&e.to_string());
                    observer.on_state_change(ConnectionState::Error);
                    return;
                }
            }
        }
        debug!("Ereignis-Kanal geschlossen");
    })
}

/// Folge eines verarbeiteten Session-Ereignisses
enum EventOutcome {
    Continue,
    /// Der Dienst hat die Verbindung geordnet beendet
    RemoteClosed,
    /// Der Dienst hat einen fatalen Fehler gemeldet
    RemoteFailed(TandemError),
}

fn apply_event(
    event: SessionEvent,
    observer: &dyn SessionObserver,
    record: &Mutex<SessionRecord>,
    audio: &std::sync::mpsc::Sender<AudioCommand>,
) -> EventOutcome {
    match event {
        SessionEvent::Audio(bytes) => {
            let _ = audio.send(AudioCommand::Play(bytes));
        }
        SessionEvent::Interrupted => {
            let _ = audio.send(AudioCommand::Interrupt);
        }
        SessionEvent::Transcript {
            text,
            role,
            is_final,
        } => {
            record.lock().transcript_delta(&text, role, is_final);
            observer.on_transcript(&text, role, is_final);
        }
        SessionEvent::TurnComplete => {
            // Offene Modell-Nachricht auch ohne gekoppeltes Delta schliessen
            let mut record = record.lock();
            if let Some(msg) = record
                .messages
                .iter_mut()
                .rev()
                .find(|m| m.role == Role::Model && !m.is_final)
            {
                msg.is_final = true;
            }
        }
        SessionEvent::RemoteError(e) => return EventOutcome::RemoteFailed(e),
        SessionEvent::Closed => return EventOutcome::RemoteClosed,
    }
    EventOutcome::Continue
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
