//! Sitzungs-Store fuer die Transportverschluesselung
//!
//! Haelt pro Session-ID den symmetrischen Schluessel, die Lebensdauer, den
//! Anfragezaehler und das Replay-Fenster. Sessions werden ausschliesslich im
//! Speicher gehalten (DashMap, Sperre pro Eintrag). Ein Hintergrund-Task
//! (siehe [`crate::bereinigung`]) entfernt abgelaufene und erschoepfte
//! Sessions periodisch.
//!
//! Alle Mutationen einer Sitzung (Zaehler, Nonce-Fenster, Rotation) laufen
//! unter der Eintragssperre und sind damit gegenueber parallelen Requests
//! auf dieselbe Sitzung atomar.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agrolink_crypto::Sitzungsschluessel;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{SitzungsFehler, SitzungsResult};
use crate::replay::{ReplayFenster, STANDARD_FENSTER};

/// Konfiguration des Sitzungs-Stores
#[derive(Debug, Clone)]
pub struct SitzungsKonfig {
    /// Lebensdauer einer Sitzung ab Handshake bzw. Rotation
    pub ttl: Duration,
    /// Maximale Entschluesselungen pro Schluessel
    pub max_anfragen: u64,
    /// Ab dieser Anzahl wird dem Client eine Rotation empfohlen
    pub rotation_empfohlen_ab: u64,
    /// Groesse des Replay-Fensters
    pub replay_fenster: u64,
    /// Intervall des Bereinigungs-Tasks
    pub bereinigungs_intervall: Duration,
}

impl Default for SitzungsKonfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            max_anfragen: 1000,
            rotation_empfohlen_ab: 500,
            replay_fenster: STANDARD_FENSTER,
            bereinigungs_intervall: Duration::from_secs(60),
        }
    }
}

/// Eine aktive Sitzung
#[derive(Debug)]
struct Sitzung {
    schluessel: Sitzungsschluessel,
    erstellt_am: DateTime<Utc>,
    laeuft_ab_am: DateTime<Utc>,
    anfragen: u64,
    replay: ReplayFenster,
}

impl Sitzung {
    fn abgelaufen(&self, jetzt: DateTime<Utc>) -> bool {
        jetzt >= self.laeuft_ab_am
    }

    /// Nicht abgelaufen und Kontingent nicht ausgeschoepft
    fn nutzbar(&self, jetzt: DateTime<Utc>, max_anfragen: u64) -> bool {
        !self.abgelaufen(jetzt) && self.anfragen < max_anfragen
    }
}

/// Schnappschuss einer Sitzung fuer den Stats-Endpunkt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitzungsStatistik {
    pub session_id: String,
    pub anfragen: u64,
    pub max_anfragen: u64,
    pub alter_ms: i64,
    pub ttl_ms: i64,
    pub letzte_nonce: u64,
    pub rotation_empfohlen: bool,
}

impl SitzungsStatistik {
    pub fn alter_sekunden(&self) -> i64 {
        self.alter_ms / 1000
    }

    pub fn ttl_sekunden(&self) -> i64 {
        self.ttl_ms / 1000
    }
}

/// Alles, was zum Versiegeln der Antwort gebraucht wird
#[derive(Debug, Clone)]
pub struct AntwortKontext {
    pub schluessel: Sitzungsschluessel,
    pub naechste_nonce: u64,
}

/// In-Memory Sitzungs-Store
#[derive(Debug)]
pub struct SitzungsStore {
    konfig: SitzungsKonfig,
    ttl: chrono::Duration,
    /// session_id -> Sitzung
    sitzungen: DashMap<String, Sitzung>,
    bereinigt_gesamt: AtomicU64,
}

impl SitzungsStore {
    /// Erstellt einen neuen leeren Store
    pub fn neu(konfig: SitzungsKonfig) -> Arc<Self> {
        let ttl = dauer_zu_chrono(konfig.ttl);
        Arc::new(Self {
            konfig,
            ttl,
            sitzungen: DashMap::new(),
            bereinigt_gesamt: AtomicU64::new(0),
        })
    }

    pub fn konfig(&self) -> &SitzungsKonfig {
        &self.konfig
    }

    /// Legt eine Sitzung unter einer frischen UUID mit Standard-TTL an
    pub fn neue_sitzung(&self, schluessel: Sitzungsschluessel) -> SitzungsResult<String> {
        let session_id = Uuid::new_v4().to_string();
        self.erstellen(&session_id, schluessel, self.konfig.ttl)?;
        Ok(session_id)
    }

    /// Legt eine Sitzung an. Eine bereits vergebene ID wird nie ueberschrieben.
    pub fn erstellen(
        &self,
        session_id: &str,
        schluessel: Sitzungsschluessel,
        ttl: Duration,
    ) -> SitzungsResult<()> {
        self.erstellen_zu(session_id, schluessel, ttl, Utc::now())
    }

    pub(crate) fn erstellen_zu(
        &self,
        session_id: &str,
        schluessel: Sitzungsschluessel,
        ttl: Duration,
        jetzt: DateTime<Utc>,
    ) -> SitzungsResult<()> {
        match self.sitzungen.entry(session_id.to_string()) {
            Entry::Occupied(_) => {
                tracing::error!(session_id = %session_id, "Session-ID-Kollision");
                Err(SitzungsFehler::IdKollision)
            }
            Entry::Vacant(eintrag) => {
                eintrag.insert(Sitzung {
                    schluessel,
                    erstellt_am: jetzt,
                    laeuft_ab_am: ablauf_ab(jetzt, dauer_zu_chrono(ttl)),
                    anfragen: 0,
                    replay: ReplayFenster::neu(self.konfig.replay_fenster),
                });
                tracing::debug!(session_id = %session_id, "Neue Sitzung erstellt");
                Ok(())
            }
        }
    }

    /// Liefert den Schluessel fuer eine Entschluesselung und zaehlt die Anfrage
    ///
    /// Abgelaufene oder erschoepfte Sitzungen werden dabei entfernt.
    pub fn schluessel_fuer_entschluesselung(
        &self,
        session_id: &str,
    ) -> SitzungsResult<Sitzungsschluessel> {
        self.schluessel_fuer_entschluesselung_zu(session_id, Utc::now())
    }

    pub(crate) fn schluessel_fuer_entschluesselung_zu(
        &self,
        session_id: &str,
        jetzt: DateTime<Utc>,
    ) -> SitzungsResult<Sitzungsschluessel> {
        let max = self.konfig.max_anfragen;
        // Die Eintragssperre muss vor remove_if freigegeben sein
        let schluessel = match self.sitzungen.get_mut(session_id) {
            None => return Err(SitzungsFehler::NichtVerfuegbar),
            Some(mut sitzung) => {
                if sitzung.nutzbar(jetzt, max) {
                    sitzung.anfragen += 1;
                    Some(sitzung.schluessel.clone())
                } else {
                    None
                }
            }
        };

        match schluessel {
            Some(k) => Ok(k),
            None => {
                self.disqualifizierte_entfernen(session_id, jetzt);
                Err(SitzungsFehler::NichtVerfuegbar)
            }
        }
    }

    /// Prueft eine Nonce, ohne sie im Replay-Fenster zu verbrauchen
    ///
    /// Erst nach erfolgreicher Entschluesselung wird die Nonce per
    /// [`Self::nonce_akzeptieren`] festgeschrieben.
    pub fn nonce_pruefen(&self, session_id: &str, nonce: u64) -> SitzungsResult<bool> {
        self.nonce_pruefen_zu(session_id, nonce, Utc::now())
    }

    pub(crate) fn nonce_pruefen_zu(
        &self,
        session_id: &str,
        nonce: u64,
        jetzt: DateTime<Utc>,
    ) -> SitzungsResult<bool> {
        let geprueft = match self.sitzungen.get(session_id) {
            None => return Err(SitzungsFehler::NichtVerfuegbar),
            Some(sitzung) if !sitzung.abgelaufen(jetzt) => Some(sitzung.replay.pruefen(nonce)),
            Some(_) => None,
        };

        match geprueft {
            Some(ok) => {
                if !ok {
                    tracing::warn!(session_id = %session_id, nonce, "Nonce abgelehnt");
                }
                Ok(ok)
            }
            None => {
                self.disqualifizierte_entfernen(session_id, jetzt);
                Err(SitzungsFehler::NichtVerfuegbar)
            }
        }
    }

    /// Prueft eine Nonce gegen das Replay-Fenster der Sitzung und verbraucht sie
    pub fn nonce_akzeptieren(&self, session_id: &str, nonce: u64) -> SitzungsResult<bool> {
        self.nonce_akzeptieren_zu(session_id, nonce, Utc::now())
    }

    pub(crate) fn nonce_akzeptieren_zu(
        &self,
        session_id: &str,
        nonce: u64,
        jetzt: DateTime<Utc>,
    ) -> SitzungsResult<bool> {
        let akzeptiert = match self.sitzungen.get_mut(session_id) {
            None => return Err(SitzungsFehler::NichtVerfuegbar),
            Some(mut sitzung) if !sitzung.abgelaufen(jetzt) => Some(sitzung.replay.akzeptieren(nonce)),
            Some(_) => None,
        };

        match akzeptiert {
            Some(ok) => {
                if !ok {
                    tracing::warn!(session_id = %session_id, nonce, "Nonce abgelehnt");
                }
                Ok(ok)
            }
            None => {
                self.disqualifizierte_entfernen(session_id, jetzt);
                Err(SitzungsFehler::NichtVerfuegbar)
            }
        }
    }

    /// Schluessel und naechste Nonce zum Versiegeln der Antwort
    ///
    /// Zaehlt nicht als Anfrage. Scheitert nur, wenn die Sitzung waehrend
    /// des Requests verschwunden oder abgelaufen ist.
    pub fn schluessel_fuer_antwort(&self, session_id: &str) -> SitzungsResult<AntwortKontext> {
        self.schluessel_fuer_antwort_zu(session_id, Utc::now())
    }

    pub(crate) fn schluessel_fuer_antwort_zu(
        &self,
        session_id: &str,
        jetzt: DateTime<Utc>,
    ) -> SitzungsResult<AntwortKontext> {
        let sitzung = self
            .sitzungen
            .get(session_id)
            .ok_or(SitzungsFehler::NichtVerfuegbar)?;
        if sitzung.abgelaufen(jetzt) {
            return Err(SitzungsFehler::NichtVerfuegbar);
        }
        Ok(AntwortKontext {
            schluessel: sitzung.schluessel.clone(),
            naechste_nonce: sitzung.replay.naechste_nonce(),
        })
    }

    /// Ersetzt den Schluessel einer bestehenden Sitzung
    ///
    /// Nur fuer nutzbare Sitzungen: abgelaufene oder erschoepfte werden
    /// entfernt. Setzt Anfragezaehler und Nonce-Fenster zurueck und startet
    /// die Lebensdauer neu.
    pub fn rotieren(&self, session_id: &str, neuer_schluessel: Sitzungsschluessel) -> SitzungsResult<()> {
        self.rotieren_zu(session_id, neuer_schluessel, Utc::now())
    }

    pub(crate) fn rotieren_zu(
        &self,
        session_id: &str,
        neuer_schluessel: Sitzungsschluessel,
        jetzt: DateTime<Utc>,
    ) -> SitzungsResult<()> {
        let max = self.konfig.max_anfragen;
        let rotiert = match self.sitzungen.get_mut(session_id) {
            None => return Err(SitzungsFehler::NichtVerfuegbar),
            Some(mut sitzung) if sitzung.nutzbar(jetzt, max) => {
                sitzung.schluessel = neuer_schluessel;
                sitzung.anfragen = 0;
                sitzung.replay = ReplayFenster::neu(self.konfig.replay_fenster);
                sitzung.erstellt_am = jetzt;
                sitzung.laeuft_ab_am = ablauf_ab(jetzt, self.ttl);
                true
            }
            Some(_) => false,
        };

        if rotiert {
            tracing::info!(session_id = %session_id, "Sitzungsschluessel rotiert");
            Ok(())
        } else {
            self.disqualifizierte_entfernen(session_id, jetzt);
            Err(SitzungsFehler::NichtVerfuegbar)
        }
    }

    /// Read-only Schnappschuss einer nutzbaren Sitzung
    pub fn statistik(&self, session_id: &str) -> SitzungsResult<SitzungsStatistik> {
        self.statistik_zu(session_id, Utc::now())
    }

    pub(crate) fn statistik_zu(
        &self,
        session_id: &str,
        jetzt: DateTime<Utc>,
    ) -> SitzungsResult<SitzungsStatistik> {
        let max = self.konfig.max_anfragen;
        let statistik = match self.sitzungen.get(session_id) {
            None => return Err(SitzungsFehler::NichtVerfuegbar),
            Some(sitzung) if sitzung.nutzbar(jetzt, max) => Some(SitzungsStatistik {
                session_id: session_id.to_string(),
                anfragen: sitzung.anfragen,
                max_anfragen: max,
                alter_ms: (jetzt - sitzung.erstellt_am).num_milliseconds(),
                ttl_ms: (sitzung.laeuft_ab_am - jetzt).num_milliseconds(),
                letzte_nonce: sitzung.replay.letzte_nonce(),
                rotation_empfohlen: sitzung.anfragen >= self.konfig.rotation_empfohlen_ab,
            }),
            Some(_) => None,
        };

        statistik.ok_or_else(|| {
            self.disqualifizierte_entfernen(session_id, jetzt);
            SitzungsFehler::NichtVerfuegbar
        })
    }

    /// Entfernt eine Sitzung explizit
    pub fn entfernen(&self, session_id: &str) -> bool {
        self.sitzungen.remove(session_id).is_some()
    }

    /// Entfernt alle abgelaufenen und erschoepften Sitzungen
    ///
    /// Gibt die Anzahl der entfernten Sitzungen zurueck.
    pub fn bereinigen(&self) -> usize {
        self.bereinigen_zu(Utc::now())
    }

    pub(crate) fn bereinigen_zu(&self, jetzt: DateTime<Utc>) -> usize {
        let max = self.konfig.max_anfragen;
        let mut entfernt = 0usize;
        self.sitzungen.retain(|_, sitzung| {
            let behalten = sitzung.nutzbar(jetzt, max);
            if !behalten {
                entfernt += 1;
            }
            behalten
        });
        self.bereinigt_gesamt
            .fetch_add(entfernt as u64, Ordering::Relaxed);
        entfernt
    }

    /// Anzahl gespeicherter Sitzungen (inkl. noch nicht bereinigter)
    pub fn anzahl(&self) -> usize {
        self.sitzungen.len()
    }

    /// Anzahl der seit Start per Bereinigung entfernten Sitzungen
    pub fn bereinigt_gesamt(&self) -> u64 {
        self.bereinigt_gesamt.load(Ordering::Relaxed)
    }

    pub fn enthaelt(&self, session_id: &str) -> bool {
        self.sitzungen.contains_key(session_id)
    }

    /// Entfernt die Sitzung nur, wenn sie noch disqualifiziert ist
    ///
    /// Eine zwischenzeitlich rotierte Sitzung bleibt erhalten.
    fn disqualifizierte_entfernen(&self, session_id: &str, jetzt: DateTime<Utc>) {
        let max = self.konfig.max_anfragen;
        if self
            .sitzungen
            .remove_if(session_id, |_, s| !s.nutzbar(jetzt, max))
            .is_some()
        {
            tracing::debug!(session_id = %session_id, "Sitzung verworfen");
        }
    }
}

fn dauer_zu_chrono(dauer: Duration) -> chrono::Duration {
    chrono::Duration::from_std(dauer).unwrap_or_else(|_| chrono::Duration::days(365))
}

/// Ablaufzeitpunkt, gekappt auf den darstellbaren Bereich
fn ablauf_ab(jetzt: DateTime<Utc>, ttl: chrono::Duration) -> DateTime<Utc> {
    jetzt.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
