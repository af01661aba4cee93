//! Prometheus-kompatible Metriken fuer Agrolink
//!
//! Registrierte Metriken:
//! - `agrolink_handshakes_total` – Counter: Erfolgreiche Handshakes
//! - `agrolink_rotations_total` – Counter: Erfolgreiche Schluesselrotationen
//! - `agrolink_sessions_active` – Gauge: Sitzungen im Store
//! - `agrolink_sessions_swept_total` – Counter: Von der Bereinigung entfernte Sitzungen
//! - `agrolink_rejected_requests_total` – Counter: Abgelehnte Anfragen (grund)
//! - `agrolink_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `agrolink_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Wird vor jedem Export aufgerufen, um Gauges aus externen Quellen zu setzen
pub type MetrikAktualisierung = Arc<dyn Fn(&AgrolinkMetriken) + Send + Sync>;

/// Alle Agrolink-Prometheus-Metriken
#[derive(Clone)]
pub struct AgrolinkMetriken {
    pub registry: Arc<Registry>,

    // Sitzungs-Metriken
    pub handshakes_total: IntCounter,
    pub rotationen_total: IntCounter,
    pub sitzungen_aktiv: IntGauge,
    pub sitzungen_bereinigt_total: IntCounter,
    pub abgelehnt_total: IntCounterVec,

    // HTTP-Metriken
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl AgrolinkMetriken {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Sitzungs-Metriken ---
        let handshakes_total = IntCounter::with_opts(Opts::new(
            "agrolink_handshakes_total",
            "Anzahl erfolgreicher Handshakes",
        ))?;
        registry.register(Box::new(handshakes_total.clone()))?;

        let rotationen_total = IntCounter::with_opts(Opts::new(
            "agrolink_rotations_total",
            "Anzahl erfolgreicher Schluesselrotationen",
        ))?;
        registry.register(Box::new(rotationen_total.clone()))?;

        let sitzungen_aktiv = IntGauge::with_opts(Opts::new(
            "agrolink_sessions_active",
            "Anzahl Sitzungen im Store",
        ))?;
        registry.register(Box::new(sitzungen_aktiv.clone()))?;

        let sitzungen_bereinigt_total = IntCounter::with_opts(Opts::new(
            "agrolink_sessions_swept_total",
            "Von der periodischen Bereinigung entfernte Sitzungen",
        ))?;
        registry.register(Box::new(sitzungen_bereinigt_total.clone()))?;

        let abgelehnt_total = IntCounterVec::new(
            Opts::new(
                "agrolink_rejected_requests_total",
                "Vom Transport-Gateway abgelehnte Anfragen",
            ),
            &["grund"],
        )?;
        registry.register(Box::new(abgelehnt_total.clone()))?;

        // --- HTTP-Metriken ---
        let http_requests_total = IntCounterVec::new(
            Opts::new("agrolink_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "agrolink_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            handshakes_total,
            rotationen_total,
            sitzungen_aktiv,
            sitzungen_bereinigt_total,
            abgelehnt_total,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Zaehlt eine abgelehnte Anfrage unter dem angegebenen Grund
    pub fn ablehnung_zaehlen(&self, grund: &str) {
        self.abgelehnt_total.with_label_values(&[grund]).inc();
    }

    /// Zieht den Bereinigungszaehler auf einen monoton wachsenden Gesamtwert nach
    pub fn bereinigt_nachziehen(&self, gesamt: u64) {
        let bisher = self.sitzungen_bereinigt_total.get();
        if gesamt > bisher {
            self.sitzungen_bereinigt_total.inc_by(gesamt - bisher);
        }
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[derive(Clone)]
struct MetrikZustand {
    metriken: AgrolinkMetriken,
    vor_export: Option<MetrikAktualisierung>,
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(
    metriken: AgrolinkMetriken,
    vor_export: Option<MetrikAktualisierung>,
) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(MetrikZustand {
            metriken,
            vor_export,
        })
}

async fn metrics_handler(State(zustand): State<MetrikZustand>) -> impl IntoResponse {
    if let Some(aktualisieren) = &zustand.vor_export {
        aktualisieren(&zustand.metriken);
    }

    match zustand.metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn metriken_erstellen_erfolgreich() {
        let metriken = AgrolinkMetriken::neu().unwrap();
        assert!(!metriken.registry.gather().is_empty());
    }

    #[test]
    fn ablehnungen_nach_grund() {
        let metriken = AgrolinkMetriken::neu().unwrap();
        metriken.ablehnung_zaehlen("replay");
        metriken.ablehnung_zaehlen("replay");
        metriken.ablehnung_zaehlen("decrypt");
        assert_eq!(
            metriken.abgelehnt_total.with_label_values(&["replay"]).get(),
            2
        );
        assert_eq!(
            metriken.abgelehnt_total.with_label_values(&["decrypt"]).get(),
            1
        );
    }

    #[test]
    fn bereinigt_zaehler_folgt_gesamtwert() {
        let metriken = AgrolinkMetriken::neu().unwrap();
        metriken.bereinigt_nachziehen(3);
        metriken.bereinigt_nachziehen(3);
        assert_eq!(metriken.sitzungen_bereinigt_total.get(), 3);
        metriken.bereinigt_nachziehen(7);
        assert_eq!(metriken.sitzungen_bereinigt_total.get(), 7);
        // Kleinere Werte aendern nichts
        metriken.bereinigt_nachziehen(1);
        assert_eq!(metriken.sitzungen_bereinigt_total.get(), 7);
    }

    #[test]
    fn metriken_export_prometheus_format() {
        let metriken = AgrolinkMetriken::neu().unwrap();
        metriken.sitzungen_aktiv.set(5);
        metriken.handshakes_total.inc();

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("agrolink_sessions_active 5"));
        assert!(output.contains("agrolink_handshakes_total 1"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn alle_metriken_in_registry_registriert() {
        let metriken = AgrolinkMetriken::neu().unwrap();

        // Vec-Metriken erscheinen in gather() erst nach dem ersten Label-Zugriff
        metriken.ablehnung_zaehlen("replay");
        metriken
            .http_requests_total
            .with_label_values(&["GET", "/test", "200"])
            .inc();
        metriken
            .http_request_duration_seconds
            .with_label_values(&["GET", "/test"])
            .observe(0.01);

        let families = metriken.registry.gather();
        let namen: Vec<&str> = families.iter().map(|f| f.get_name()).collect();

        assert!(namen.contains(&"agrolink_handshakes_total"));
        assert!(namen.contains(&"agrolink_rotations_total"));
        assert!(namen.contains(&"agrolink_sessions_active"));
        assert!(namen.contains(&"agrolink_sessions_swept_total"));
        assert!(namen.contains(&"agrolink_rejected_requests_total"));
        assert!(namen.contains(&"agrolink_http_requests_total"));
        assert!(namen.contains(&"agrolink_http_request_duration_seconds"));
    }

    #[tokio::test]
    async fn metrics_endpunkt_ruft_aktualisierung_auf() {
        let metriken = AgrolinkMetriken::neu().unwrap();
        let aktualisieren: MetrikAktualisierung = Arc::new(|m| m.sitzungen_aktiv.set(12));
        let app = metrics_router(metriken, Some(aktualisieren));

        let antwort = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::OK);

        let body = to_bytes(antwort.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("agrolink_sessions_active 12"));
    }
}
