//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use std::net::SocketAddr;
use std::time::Duration;

use agrolink_crypto::Ableitung;
use agrolink_gateway::{RateLimitKonfig, RestServerKonfig};
use agrolink_observability::logging::{log_format_gueltig, log_level_gueltig};
use agrolink_session::SitzungsKonfig;
use serde::{Deserialize, Serialize};

/// Obergrenze fuer `sitzungen.ttl_sekunden` (30 Tage)
pub const MAX_TTL_SEKUNDEN: u64 = 30 * 24 * 60 * 60;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Sitzungen, Replay-Fenster und Schluesselableitung
    pub sitzungen: SitzungsEinstellungen,
    /// Rate Limiting pro Client-IP
    pub rate_limit: RateLimitEinstellungen,
    /// CORS
    pub cors: CorsEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Agrolink API".into(),
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    pub bind_adresse: String,
    /// Port fuer die HTTP-API
    pub port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

/// Sitzungs-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SitzungsEinstellungen {
    /// Lebensdauer einer Sitzung ab Handshake bzw. Rotation
    pub ttl_sekunden: u64,
    /// Entschluesselungen pro Schluessel, danach Rotation oder neuer Handshake
    pub max_anfragen: u64,
    /// Ab dieser Anfragezahl meldet die Statistik `shouldRotate`
    pub rotation_empfohlen_ab: u64,
    /// Nonces, die hinter der hoechsten gesehenen Nonce liegen duerfen
    pub replay_fenster: u64,
    pub bereinigungs_intervall_sekunden: u64,
    /// "hkdf" (Standard) oder "sha256" fuer Bestandsclients
    pub schluessel_ableitung: Ableitung,
}

impl Default for SitzungsEinstellungen {
    fn default() -> Self {
        Self {
            ttl_sekunden: 30 * 60,
            max_anfragen: 1000,
            rotation_empfohlen_ab: 500,
            replay_fenster: 50,
            bereinigungs_intervall_sekunden: 60,
            schluessel_ableitung: Ableitung::Hkdf,
        }
    }
}

/// Rate-Limit-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitEinstellungen {
    pub fenster_sekunden: u64,
    pub max_anfragen: u32,
    /// Abstand der Bereinigung abgelaufener Fenster
    pub bereinigungs_intervall_sekunden: u64,
}

impl Default for RateLimitEinstellungen {
    fn default() -> Self {
        Self {
            fenster_sekunden: 60,
            max_anfragen: 100,
            bereinigungs_intervall_sekunden: 5 * 60,
        }
    }
}

/// CORS-Einstellungen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsEinstellungen {
    /// Erlaubte Origins (leer = alle erlaubt)
    pub origins: Vec<String>,
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

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert Prometheus-Metriken und `/metrics`
    pub metriken_aktiviert: bool,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            metriken_aktiviert: true,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                config.validieren()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        // Filter-Direktiven wie "agrolink_gateway=debug" prueft erst der EnvFilter
        let level = &self.logging.level;
        if !level.contains('=') && !log_level_gueltig(level) {
            anyhow::bail!("Ungueltiges Log-Level '{level}'");
        }
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Ungueltiges Log-Format '{}'", self.logging.format);
        }
        let ttl = self.sitzungen.ttl_sekunden;
        if ttl == 0 || ttl > MAX_TTL_SEKUNDEN {
            anyhow::bail!("sitzungen.ttl_sekunden muss zwischen 1 und {MAX_TTL_SEKUNDEN} liegen, ist {ttl}");
        }
        if self.sitzungen.max_anfragen == 0 {
            anyhow::bail!("sitzungen.max_anfragen muss groesser als 0 sein");
        }
        if self.sitzungen.replay_fenster == 0 {
            anyhow::bail!("sitzungen.replay_fenster muss groesser als 0 sein");
        }
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse fuer die HTTP-API zurueck
    pub fn bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.port)
    }

    pub fn sitzungs_konfig(&self) -> SitzungsKonfig {
        let s = &self.sitzungen;
        SitzungsKonfig {
            ttl: Duration::from_secs(s.ttl_sekunden),
            max_anfragen: s.max_anfragen,
            rotation_empfohlen_ab: s.rotation_empfohlen_ab,
            replay_fenster: s.replay_fenster,
            bereinigungs_intervall: Duration::from_secs(s.bereinigungs_intervall_sekunden.max(1)),
        }
    }

    pub fn rate_limit_konfig(&self) -> RateLimitKonfig {
        RateLimitKonfig {
            fenster: Duration::from_secs(self.rate_limit.fenster_sekunden),
            max_anfragen: self.rate_limit.max_anfragen,
        }
    }

    pub fn rest_konfig(&self) -> anyhow::Result<RestServerKonfig> {
        let bind_addr: SocketAddr = self
            .bind_adresse()
            .parse()
            .map_err(|e| anyhow::anyhow!("Ungueltige Bind-Adresse '{}': {e}", self.bind_adresse()))?;
        Ok(RestServerKonfig {
            bind_addr,
            cors_origins: self.cors.origins.clone(),
        })
    }
}
