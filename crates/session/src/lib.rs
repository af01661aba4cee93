//! agrolink-session – Sitzungsverwaltung der Transportverschluesselung
//!
//! Dieses Crate implementiert:
//! - Sitzungs-Store (Schluessel, TTL, Anfrage-Kontingent, Rotation)
//! - Replay-Schutz per gleitendem Nonce-Fenster
//! - Periodische Bereinigung als Task mit explizitem Lebenszyklus

pub mod bereinigung;
pub mod error;
pub mod replay;
pub mod store;

// Bequeme Re-Exporte
pub use bereinigung::BereinigungsHandle;
pub use error::{SitzungsFehler, SitzungsResult};
pub use replay::{ReplayFenster, STANDARD_FENSTER};
pub use store::{AntwortKontext, SitzungsKonfig, SitzungsStatistik, SitzungsStore};
