//! Health-Check-Endpunkt fuer Agrolink
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime, Sitzungsanzahl und Bereinigungsstatus

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Server antwortet, aber die periodische Bereinigung laeuft nicht
    Degraded,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_sessions: usize,
    pub sweep_running: bool,
}

type SitzungsZaehler = Arc<dyn Fn() -> usize + Send + Sync>;

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    bereinigung_aktiv: Arc<AtomicBool>,
    sitzungen: SitzungsZaehler,
}

impl HealthState {
    /// `sitzungen` liefert die aktuelle Anzahl Sitzungen im Store
    pub fn neu(sitzungen: impl Fn() -> usize + Send + Sync + 'static) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            bereinigung_aktiv: Arc::new(AtomicBool::new(false)),
            sitzungen: Arc::new(sitzungen),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn bereinigung_laeuft(&self) -> bool {
        self.bereinigung_aktiv.load(Ordering::Relaxed)
    }

    pub fn bereinigung_status_setzen(&self, aktiv: bool) {
        self.bereinigung_aktiv.store(aktiv, Ordering::Relaxed);
    }

    pub fn aktive_sitzungen(&self) -> usize {
        (self.sitzungen)()
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let sweep_running = state.bereinigung_laeuft();
    let status = if sweep_running {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        active_sessions: state.aktive_sitzungen(),
        sweep_running,
    };

    // 200 auch bei degraded (Liveness-Check soll nicht scheitern)
    (StatusCode::OK, Json(response))
}
