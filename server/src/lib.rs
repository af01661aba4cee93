//! agrolink-server – Bibliotheks-Root
//!
//! Verdrahtet Sitzungs-Store, Transport-Gateway, Rate Limiter und
//! Observability zu einem lauffaehigen Server und stellt den
//! oeffentlichen Einstiegspunkt fuer Integrationstests bereit.

pub mod config;
pub mod demo;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use agrolink_gateway::rest::routes::crypto_routen;
use agrolink_gateway::{GatewayState, RateLimiter, RestServer, RoutenTabelle};
use agrolink_observability::{
    health_router, metrics_router, AgrolinkMetriken, HealthState, MetrikAktualisierung,
};
use agrolink_session::SitzungsStore;
use anyhow::Result;
use axum::Router;
use config::ServerConfig;

/// Laufzeit-Komponenten, die der Router teilt
pub struct Komponenten {
    pub store: Arc<SitzungsStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metriken: Option<AgrolinkMetriken>,
    pub health: HealthState,
}

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Baut den vollstaendigen Router samt Middleware, ohne zu binden
    pub fn app_bauen(&self) -> Result<(Router, Komponenten)> {
        let store = SitzungsStore::neu(self.config.sitzungs_konfig());
        let metriken = if self.config.observability.metriken_aktiviert {
            Some(AgrolinkMetriken::neu()?)
        } else {
            None
        };

        let mut state = GatewayState::neu(
            Arc::clone(&store),
            self.config.sitzungen.schluessel_ableitung,
        );
        if let Some(m) = &metriken {
            state = state.mit_metriken(m.clone());
        }

        let tabelle = demo::demo_routen(crypto_routen(RoutenTabelle::neu(state)));

        let health = HealthState::neu({
            let store = Arc::clone(&store);
            move || store.anzahl()
        });

        let mut router = tabelle.router().merge(health_router(health.clone()));
        if let Some(m) = &metriken {
            let store = Arc::clone(&store);
            let aktualisieren: MetrikAktualisierung = Arc::new(move |m: &AgrolinkMetriken| {
                m.sitzungen_aktiv.set(store.anzahl() as i64);
                m.bereinigt_nachziehen(store.bereinigt_gesamt());
            });
            router = router.merge(metrics_router(m.clone(), Some(aktualisieren)));
        }

        let rate_limiter = RateLimiter::neu(self.config.rate_limit_konfig());
        let app = RestServer::neu(self.config.rest_konfig()?).app(
            router,
            Arc::clone(&rate_limiter),
            metriken.clone(),
        );

        Ok((
            app,
            Komponenten {
                store,
                rate_limiter,
                metriken,
                health,
            },
        ))
    }

    /// Startet den Server und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        self.starten_mit_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Ctrl-C-Handler konnte nicht installiert werden: {e}");
                return;
            }
            tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
        })
        .await
    }

    /// Startet alle Subsysteme und laeuft bis `shutdown` abschliesst
    ///
    /// Reihenfolge:
    /// 1. Router und Komponenten bauen
    /// 2. Sitzungs-Bereinigung und Rate-Limit-Bereinigung starten
    /// 3. HTTP-Server bis zum Shutdown bedienen
    /// 4. Hintergrund-Tasks stoppen
    pub async fn starten_mit_shutdown(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %self.config.bind_adresse(),
            ableitung = ?self.config.sitzungen.schluessel_ableitung,
            "Server startet"
        );

        let (app, komponenten) = self.app_bauen()?;

        let bereinigung = komponenten
            .store
            .bereinigung_starten(self.config.sitzungs_konfig().bereinigungs_intervall);
        komponenten.health.bereinigung_status_setzen(true);

        let rl_intervall =
            Duration::from_secs(self.config.rate_limit.bereinigungs_intervall_sekunden.max(1));
        let rl_bereinigung = komponenten.rate_limiter.cleanup_starten(rl_intervall);

        let ergebnis = RestServer::neu(self.config.rest_konfig()?)
            .starten(app, shutdown)
            .await;

        komponenten.health.bereinigung_status_setzen(false);
        bereinigung.stoppen().await;
        rl_bereinigung.abort();

        tracing::info!(
            verbleibende_sitzungen = komponenten.store.anzahl(),
            "Server beendet"
        );
        ergebnis
    }
}
