//! Eingebaute Kataloge: Sprachen, Stimmen, Szenarien
//!
//! Statische Auswahlisten fuer die UI-Schicht. Eigene Szenarien koennen
//! zur Laufzeit ergaenzt werden (`Scenario { is_custom: true }`); deren
//! Persistenz liegt ausserhalb des Kerns.

use serde::{Deserialize, Serialize};

/// Eine waehlbare Uebungssprache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    /// Kurz-ID (z.B. "es")
    pub id: String,
    /// Anzeigename
    pub name: String,
    /// BCP-47-Code, nur fuer die UI relevant
    pub code: String,
}

/// Eine waehlbare Stimme des Dienstes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
}

/// Ein Gespraechs-Szenario mit System-Instruktion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub title: String,
    pub description: String,
    /// System-Instruktion die beim Verbindungsaufbau mitgesendet wird
    pub system_prompt: String,
    /// Vom Benutzer angelegtes Szenario?
    #[serde(default)]
    pub is_custom: bool,
}

/// Gibt die eingebauten Uebungssprachen zurueck
pub fn builtin_languages() -> Vec<Language> {
    let eintraege = [
        ("es", "Spanisch", "es-ES"),
        ("fr", "Franzoesisch", "fr-FR"),
        ("de", "Deutsch", "de-DE"),
        ("jp", "Japanisch", "ja-JP"),
        ("zh", "Mandarin", "zh-CN"),
        ("en", "Englisch (Fortgeschritten)", "en-US"),
    ];
    eintraege
        .iter()
        .map(|(id, name, code)| Language {
            id: (*id).into(),
            name: (*name).into(),
            code: (*code).into(),
        })
        .collect()
}

/// Gibt die verfuegbaren Stimmen zurueck
pub fn builtin_voices() -> Vec<Voice> {
    ["Puck", "Charon", "Kore", "Fenrir", "Zephyr"]
        .iter()
        .map(|n| Voice {
            id: (*n).into(),
            name: (*n).into(),
        })
        .collect()
}

/// Gibt die eingebauten Szenarien zurueck
pub fn builtin_scenarios() -> Vec<Scenario> {
    let eintraege = [
        (
            "coffee_shop",
            "Cafe",
            "Bestelle ein Getraenk und ein Gebaeck.",
            "You are a barista at a busy coffee shop. The user is a customer. \
             Interact with them to take their order. Be friendly but concise.",
        ),
        (
            "airport",
            "Flughafen Check-in",
            "Checke fuer deinen Flug ein.",
            "You are an airline check-in agent. The user is a traveler. Ask for \
             their passport, check their bags, and give them their boarding pass.",
        ),
        (
            "market",
            "Wochenmarkt",
            "Kaufe Obst und Gemuese.",
            "You are a vendor at a local market selling fresh produce. The user \
             wants to buy ingredients. Negotiate prices slightly.",
        ),
        (
            "interview",
            "Vorstellungsgespraech",
            "Beantworte einfache Interviewfragen.",
            "You are a hiring manager interviewing the user for a junior \
             developer position. Ask about their background and strengths.",
        ),
        (
            "freestyle",
            "Freies Gespraech",
            "Sprich worueber du moechtest.",
            "You are a helpful and patient language tutor. Correct the user's \
             grammar gently if they make mistakes, but prioritize keeping the \
             conversation flowing.",
        ),
    ];
    eintraege
        .iter()
        .map(|(id, title, desc, prompt)| Scenario {
            id: (*id).into(),
            title: (*title).into(),
            description: (*desc).into(),
            system_prompt: (*prompt).into(),
            is_custom: false,
        })
        .collect()
}

/// Sucht ein Szenario in einer Liste (eingebaut + eigene)
pub fn find_scenario<'a>(scenarios: &'a [Scenario], id: &str) -> Option<&'a Scenario> {
    scenarios.iter().find(|s| s.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kataloge_nicht_leer() {
        assert!(!builtin_languages().is_empty());
        assert!(!builtin_voices().is_empty());
        assert!(!builtin_scenarios().is_empty());
    }

    #[test]
    fn szenario_suche() {
        let scenarios = builtin_scenarios();
        assert!(find_scenario(&scenarios, "coffee_shop").is_some());
        assert!(find_scenario(&scenarios, "gibt_es_nicht").is_none());
    }

    #[test]
    fn eingebaute_szenarien_nicht_custom() {
        assert!(builtin_scenarios().iter().all(|s| !s.is_custom));
    }

    #[test]
    fn szenario_serde_kompatibel() {
        let scenarios = builtin_scenarios();
        let json = serde_json::to_string(&scenarios[0]).unwrap();
        let zurueck: Scenario = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck.id, scenarios[0].id);
    }
}
