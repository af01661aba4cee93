//! REST-Interface des Agrolink Gateways

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

use std::sync::Arc;

use agrolink_crypto::Ableitung;
use agrolink_observability::AgrolinkMetriken;
use agrolink_session::SitzungsStore;

/// Axum-State fuer Gateway-Middleware und Handler
#[derive(Clone)]
pub struct GatewayState {
    pub store: Arc<SitzungsStore>,
    /// Ableitung des Sitzungsschluessels aus dem ECDH-Geheimnis
    pub ableitung: Ableitung,
    pub metriken: Option<AgrolinkMetriken>,
}

impl GatewayState {
    pub fn neu(store: Arc<SitzungsStore>, ableitung: Ableitung) -> Self {
        Self {
            store,
            ableitung,
            metriken: None,
        }
    }

    pub fn mit_metriken(mut self, metriken: AgrolinkMetriken) -> Self {
        self.metriken = Some(metriken);
        self
    }

    /// Zaehlt eine abgelehnte Anfrage in den Metriken
    pub(crate) fn ablehnung_zaehlen(&self, grund: &str) {
        if let Some(m) = &self.metriken {
            m.ablehnung_zaehlen(grund);
        }
    }

    pub(crate) fn sitzungen_aktualisieren(&self) {
        if let Some(m) = &self.metriken {
            m.sitzungen_aktiv.set(self.store.anzahl() as i64);
        }
    }
}

pub use server::{RestServer, RestServerKonfig};
