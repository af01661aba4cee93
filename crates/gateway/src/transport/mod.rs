//! Transport-Verschluesselung fuer geschuetzte Routen
//!
//! Jede Route traegt in der [`RoutenTabelle`] ein [`Schutz`]-Tag. Nur
//! `Verschluesselt`-Routen laufen durch [`transport_middleware`]:
//!
//! ```text
//! Umschlag aufloesen -> Schluessel (zaehlt Anfrage) -> Nonce pruefen
//!   -> entschluesseln, Body ersetzen -> Handler -> Antwort versiegeln
//! ```

mod gateway;
mod routen;
mod umschlag;

pub use gateway::{transport_middleware, VersiegelteAntwort, MAX_BODY_GROESSE};
pub use routen::{RoutenTabelle, Schutz};
pub use umschlag::{BodyUmschlag, Umschlag};

/// Request-Extension fuer Handler hinter dem Gateway
///
/// ```ignore
/// async fn handler(Extension(kontext): Extension<SitzungsKontext>) { ... }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitzungsKontext {
    pub session_id: String,
    /// Nonce der aktuellen Anfrage
    pub nonce: u64,
}
