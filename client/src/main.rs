//! Sprachtandem Referenz-Client – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging, verbindet eine
//! Live-Sitzung und schreibt Transkripte auf die Konsole. Ctrl-C trennt
//! die Sitzung sauber.

mod config;

use std::sync::Arc;

use anyhow::Result;

use tandem_core::{ConnectionState, LevelSource, Role, SessionObserver};
use tandem_session::{LiveClient, LiveClientConfig};

use config::ClientConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad =
        std::env::var("TANDEM_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = ClientConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Sprachtandem Client wird initialisiert"
    );

    let client_config = LiveClientConfig {
        endpoint: config.endpoint()?,
        setup: config.setup()?,
        language_id: config.sitzung.sprache.clone(),
        scenario_id: config.sitzung.szenario.clone(),
        input_device: config.audio.eingabegeraet.clone(),
        output_device: config.audio.ausgabegeraet.clone(),
    };

    let client = LiveClient::new(Arc::new(KonsolenObserver));
    client.connect(client_config).await?;
    println!("Verbunden. Sprich einfach los – Ctrl-C beendet die Sitzung.");

    tokio::signal::ctrl_c().await?;
    println!();

    if let Some(record) = client.session_record() {
        tracing::info!(
            nachrichten = record.messages.len(),
            sprache = %record.language_id,
            szenario = %record.scenario_id,
            "Sitzung beendet"
        );
    }
    client.disconnect();

    Ok(())
}

/// Observer der Transkripte und Fehler auf die Konsole schreibt
struct KonsolenObserver;

impl SessionObserver for KonsolenObserver {
    fn on_state_change(&self, state: ConnectionState) {
        tracing::info!(?state, "Verbindungszustand");
    }

    fn on_audio_level(&self, level: f32, source: LevelSource) {
        tracing::trace!(level, ?source, "Pegel");
    }

    fn on_transcript(&self, text: &str, role: Role, is_final: bool) {
        let marker = if is_final { "*" } else { "" };
        println!("[{role}]{marker} {text}");
    }

    fn on_error(&self, message: &str) {
        eprintln!("Fehler: {message}");
    }
}

/// Initialisiert tracing-subscriber mit dem konfigurierten Level und Format
fn logging_initialisieren(level: &str, format: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}
