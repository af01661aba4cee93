//! Replay-Schutz per gleitendem Nonce-Fenster
//!
//! Jede Sitzung fuehrt die hoechste akzeptierte Nonce (`letzte_nonce`) und
//! die Menge der zuletzt gesehenen Nonces. Eine Nonce wird abgelehnt, wenn
//! sie bereits gesehen wurde oder mindestens `fenster` hinter
//! `letzte_nonce` liegt. Damit sind begrenzt umsortierte Anfragen erlaubt
//! (parallele Requests desselben Clients), exakte Wiederholungen nicht.
//!
//! Invariante: `gesehen` enthaelt nur Werte in
//! `[letzte_nonce - fenster, letzte_nonce]`.

use std::collections::BTreeSet;

/// Standard-Fenstergroesse
pub const STANDARD_FENSTER: u64 = 50;

/// Nonce-Fenster einer einzelnen Sitzung
#[derive(Debug, Clone)]
pub struct ReplayFenster {
    fenster: u64,
    letzte_nonce: u64,
    gesehen: BTreeSet<u64>,
}

impl Default for ReplayFenster {
    fn default() -> Self {
        Self::neu(STANDARD_FENSTER)
    }
}

impl ReplayFenster {
    pub fn neu(fenster: u64) -> Self {
        Self {
            fenster,
            letzte_nonce: 0,
            gesehen: BTreeSet::new(),
        }
    }

    /// Prueft eine Nonce, ohne sie zu verbrauchen
    pub fn pruefen(&self, nonce: u64) -> bool {
        if self.gesehen.contains(&nonce) {
            return false;
        }

        // Solange letzte_nonce < fenster gibt es keine Untergrenze
        match self.untergrenze() {
            Some(grenze) => nonce > grenze,
            None => true,
        }
    }

    /// Prueft eine Nonce und merkt sie sich bei Erfolg
    pub fn akzeptieren(&mut self, nonce: u64) -> bool {
        if !self.pruefen(nonce) {
            return false;
        }

        self.gesehen.insert(nonce);
        if nonce > self.letzte_nonce {
            self.letzte_nonce = nonce;
            if let Some(grenze) = self.untergrenze() {
                // split_off behaelt alles >= grenze
                self.gesehen = self.gesehen.split_off(&grenze);
            }
        }
        true
    }

    pub fn letzte_nonce(&self) -> u64 {
        self.letzte_nonce
    }

    /// Empfohlene naechste Nonce fuer den Client
    pub fn naechste_nonce(&self) -> u64 {
        self.letzte_nonce.saturating_add(1)
    }

    pub fn anzahl_gesehen(&self) -> usize {
        self.gesehen.len()
    }

    fn untergrenze(&self) -> Option<u64> {
        self.letzte_nonce.checked_sub(self.fenster)
    }
}
