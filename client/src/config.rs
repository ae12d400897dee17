//! Client-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte; nur der API-Schluessel muss gesetzt sein
//! (Datei oder Umgebungsvariable `GEMINI_API_KEY`).

use anyhow::Context;
use serde::{Deserialize, Serialize};

use tandem_core::katalog::{builtin_languages, builtin_scenarios, find_scenario};
use tandem_protocol::SetupConfig;

/// Vollstaendige Client-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Zugang zum Sprachdienst
    pub dienst: DienstEinstellungen,
    /// Sitzungs-Vorgaben (Sprache, Szenario, Stimme)
    pub sitzung: SitzungEinstellungen,
    /// Audio-Geraetewahl
    pub audio: AudioEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Zugang zum Sprachdienst
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DienstEinstellungen {
    /// wss-Endpunkt; `{key}` wird durch den API-Schluessel ersetzt
    pub endpoint: String,
    /// API-Schluessel (leer = aus `GEMINI_API_KEY` lesen)
    pub api_key: Option<String>,
    /// Modellname
    pub model: String,
}

impl Default for DienstEinstellungen {
    fn default() -> Self {
        Self {
            endpoint: "wss://generativelanguage.googleapis.com/ws/\
                       google.ai.generativelanguage.v1beta.GenerativeService.\
                       BidiGenerateContent?key={key}"
                .into(),
            api_key: None,
            model: "gemini-2.5-flash-native-audio-preview-09-2025".into(),
        }
    }
}

/// Sitzungs-Vorgaben
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SitzungEinstellungen {
    /// Uebungssprache (Katalog-ID, z.B. "es")
    pub sprache: String,
    /// Szenario (Katalog-ID, z.B. "coffee_shop")
    pub szenario: String,
    /// Stimme des Gespraechspartners
    pub stimme: String,
    /// Sprechtempo: "langsam", "normal" oder "schnell"
    pub tempo: String,
}

impl Default for SitzungEinstellungen {
    fn default() -> Self {
        Self {
            sprache: "es".into(),
            szenario: "coffee_shop".into(),
            stimme: "Kore".into(),
            tempo: "normal".into(),
        }
    }
}

/// Audio-Geraetewahl
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AudioEinstellungen {
    /// Eingabegeraet per Namensteil (leer = Standardgeraet)
    pub eingabegeraet: Option<String>,
    /// Ausgabegeraet per Namensteil (leer = Standardgeraet)
    pub ausgabegeraet: Option<String>,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ClientConfig {
    /// Laedt die Konfiguration; fehlende Datei ergibt Standardwerte
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!("Konfigurationsdatei '{pfad}' nicht gefunden, verwende Standardwerte");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Baut die vollstaendige Endpunkt-URL mit API-Schluessel
    pub fn endpoint(&self) -> anyhow::Result<String> {
        let key = match &self.dienst.api_key {
            Some(k) if !k.is_empty() => k.clone(),
            _ => std::env::var("GEMINI_API_KEY")
                .context("Kein API-Schluessel: weder in der Konfiguration noch in GEMINI_API_KEY")?,
        };
        Ok(self.dienst.endpoint.replace("{key}", &key))
    }

    /// Baut die Setup-Nachricht aus den Sitzungs-Vorgaben
    pub fn setup(&self) -> anyhow::Result<SetupConfig> {
        let sprachen = builtin_languages();
        let sprache = sprachen
            .iter()
            .find(|l| l.id == self.sitzung.sprache)
            .with_context(|| format!("Unbekannte Sprache '{}'", self.sitzung.sprache))?;

        let szenarien = builtin_scenarios();
        let szenario = find_scenario(&szenarien, &self.sitzung.szenario)
            .with_context(|| format!("Unbekanntes Szenario '{}'", self.sitzung.szenario))?;

        Ok(SetupConfig {
            model: self.dienst.model.clone(),
            voice_name: self.sitzung.stimme.clone(),
            system_instruction: system_instruction(
                &sprache.name,
                &szenario.system_prompt,
                &self.sitzung.tempo,
            ),
        })
    }
}

/// Setzt die System-Instruktion aus Sprache, Szenario und Tempo zusammen
fn system_instruction(language: &str, scenario_prompt: &str, tempo: &str) -> String {
    let rate = match tempo {
        "langsam" => {
            "Speaking Rate: SLOW. You MUST speak slowly, enunciate every word \
             clearly, and leave pauses between sentences. This is for a \
             beginner learner."
        }
        "schnell" => {
            "Speaking Rate: FAST. Speak quickly, fluidly, and naturally, like \
             a native speaker in a hurry. Use contractions."
        }
        _ => "Speaking Rate: NORMAL. Speak at a natural, friendly conversational pace.",
    };

    format!(
        "Target Language: {language}.\n\
         Roleplay Scenario: {scenario_prompt}\n\
         {rate}\n\
         NOTE: If the user makes a mistake, gently correct them in \
         {language}, then continue the roleplay."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardwerte_ergeben_gueltiges_setup() {
        let config = ClientConfig::default();
        let setup = config.setup().expect("Setup sollte baubar sein");
        assert_eq!(setup.voice_name, "Kore");
        assert!(setup.system_instruction.contains("Spanisch"));
        assert!(setup.system_instruction.contains("barista"));
    }

    #[test]
    fn unbekanntes_szenario_wird_abgelehnt() {
        let mut config = ClientConfig::default();
        config.sitzung.szenario = "raumstation".into();
        assert!(config.setup().is_err());
    }

    #[test]
    fn endpoint_ersetzt_schluessel_aus_konfiguration() {
        let mut config = ClientConfig::default();
        config.dienst.api_key = Some("test-key".into());
        let url = config.endpoint().expect("URL sollte baubar sein");
        assert!(url.ends_with("?key=test-key"));
        assert!(!url.contains("{key}"));
    }

    #[test]
    fn tempo_steuert_die_instruktion() {
        let langsam = system_instruction("Spanisch", "Prompt", "langsam");
        assert!(langsam.contains("SLOW"));
        let normal = system_instruction("Spanisch", "Prompt", "irgendwas");
        assert!(normal.contains("NORMAL"));
    }

    #[test]
    fn toml_teilkonfiguration_fuellt_standardwerte_auf() {
        let toml = r#"
            [sitzung]
            sprache = "fr"
        "#;
        let config: ClientConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.sitzung.sprache, "fr");
        assert_eq!(config.sitzung.stimme, "Kore");
        assert_eq!(config.logging.level, "info");
    }
}
