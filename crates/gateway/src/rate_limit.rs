//! Rate Limiter fuer das Agrolink Gateway
//!
//! Festes Zeitfenster pro Client-IP: die erste Anfrage oeffnet ein Fenster
//! der Laenge `fenster`, darin sind `max_anfragen` Anfragen erlaubt. Nach
//! Ablauf beginnt die naechste Anfrage ein neues Fenster.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Konfiguration fuer den Rate Limiter
#[derive(Debug, Clone)]
pub struct RateLimitKonfig {
    /// Laenge eines Zeitfensters
    pub fenster: Duration,
    /// Maximale Anfragen pro Fenster und IP
    pub max_anfragen: u32,
}

impl Default for RateLimitKonfig {
    fn default() -> Self {
        Self {
            fenster: Duration::from_secs(60),
            max_anfragen: 100,
        }
    }
}

/// Ergebnis einer Pruefung, Grundlage fuer die `X-RateLimit-*` Header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEntscheidung {
    pub erlaubt: bool,
    pub limit: u32,
    pub verbleibend: u32,
    /// Unix-Zeitstempel (Sekunden) an dem das Fenster endet
    pub reset_unix: i64,
    /// Sekunden bis zum Fensterende, aufgerundet
    pub retry_after_secs: u64,
}

#[derive(Debug)]
struct Zeitfenster {
    anzahl: u32,
    endet_am: DateTime<Utc>,
}

/// Rate Limiter mit festem Zeitfenster pro IP
pub struct RateLimiter {
    konfig: RateLimitKonfig,
    fenster_dauer: chrono::Duration,
    ip_fenster: Mutex<HashMap<String, Zeitfenster>>,
}

impl RateLimiter {
    pub fn neu(konfig: RateLimitKonfig) -> Arc<Self> {
        let fenster_dauer =
            chrono::Duration::from_std(konfig.fenster).unwrap_or_else(|_| chrono::Duration::seconds(60));
        Arc::new(Self {
            konfig,
            fenster_dauer,
            ip_fenster: Mutex::new(HashMap::new()),
        })
    }

    pub fn konfig(&self) -> &RateLimitKonfig {
        &self.konfig
    }

    /// Zaehlt eine Anfrage fuer die IP und entscheidet ob sie durch darf
    pub fn pruefe_ip(&self, ip: &str) -> RateLimitEntscheidung {
        self.pruefe_ip_zu(ip, Utc::now())
    }

    pub(crate) fn pruefe_ip_zu(&self, ip: &str, jetzt: DateTime<Utc>) -> RateLimitEntscheidung {
        let limit = self.konfig.max_anfragen;
        let mut fenster = self.ip_fenster.lock();
        let eintrag = fenster.entry(ip.to_string()).or_insert_with(|| Zeitfenster {
            anzahl: 0,
            endet_am: jetzt + self.fenster_dauer,
        });

        if jetzt > eintrag.endet_am {
            eintrag.anzahl = 0;
            eintrag.endet_am = jetzt + self.fenster_dauer;
        }

        eintrag.anzahl = eintrag.anzahl.saturating_add(1);

        let rest_ms = (eintrag.endet_am - jetzt).num_milliseconds().max(0) as u64;
        RateLimitEntscheidung {
            erlaubt: eintrag.anzahl <= limit,
            limit,
            verbleibend: limit.saturating_sub(eintrag.anzahl),
            reset_unix: eintrag.endet_am.timestamp(),
            retry_after_secs: rest_ms.div_ceil(1000),
        }
    }

    /// Anzahl verfolgter IPs
    pub fn anzahl(&self) -> usize {
        self.ip_fenster.lock().len()
    }

    /// Entfernt abgelaufene Fenster (Speicher-Management)
    pub fn cleanup(&self) -> usize {
        self.cleanup_zu(Utc::now())
    }

    pub(crate) fn cleanup_zu(&self, jetzt: DateTime<Utc>) -> usize {
        let mut fenster = self.ip_fenster.lock();
        let vorher = fenster.len();
        fenster.retain(|_, f| jetzt <= f.endet_am);
        let entfernt = vorher - fenster.len();
        if entfernt > 0 {
            tracing::debug!(anzahl = entfernt, "Rate-Limit-Fenster bereinigt");
        }
        entfernt
    }

    /// Startet die periodische Bereinigung als Hintergrund-Task
    pub fn cleanup_starten(self: &Arc<Self>, intervall: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(intervall);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.cleanup();
            }
        })
    }
}
