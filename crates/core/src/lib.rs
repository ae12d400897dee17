//! tandem-core – Gemeinsame Typen, Traits und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Sprachtandem-Crates gemeinsam genutzt werden: der
//! Verbindungszustand, das Observer-Interface zur UI-Schicht, die
//! Fehlerarten samt Klassifizierung sowie Katalog- und Verlaufstypen.

pub mod error;
pub mod event;
pub mod katalog;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{ErrorKind, Result, TandemError};
pub use event::SessionObserver;
pub use types::{ConnectionState, LevelSource, Role};
