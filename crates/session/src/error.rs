//! Fehlertypen fuer den Sitzungs-Store

use thiserror::Error;

/// Alle moeglichen Fehler im Sitzungs-Store
///
/// `NichtVerfuegbar` deckt fehlende, abgelaufene und erschoepfte Sitzungen
/// gleichermassen ab. Der Aufrufer erfaehrt nie, welcher Fall vorlag.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SitzungsFehler {
    #[error("Sitzung ungueltig oder abgelaufen")]
    NichtVerfuegbar,

    #[error("Session-ID bereits vergeben")]
    IdKollision,
}

/// Result-Alias fuer den Sitzungs-Store
pub type SitzungsResult<T> = Result<T, SitzungsFehler>;
