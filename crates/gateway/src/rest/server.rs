//! Axum HTTP-Server fuer das Gateway

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use agrolink_observability::{request_timing_layer, timing_middleware, AgrolinkMetriken};
use anyhow::Result;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::error::GatewayFehler;
use crate::rate_limit::{RateLimitEntscheidung, RateLimiter};
use crate::rest::middleware::client_ip_aus_request;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// REST-Server-Konfiguration
#[derive(Debug, Clone)]
pub struct RestServerKonfig {
    pub bind_addr: SocketAddr,
    /// Erlaubte CORS-Origins. Leer = alle Origins erlaubt (nur fuer Entwicklung).
    pub cors_origins: Vec<String>,
}

impl Default for RestServerKonfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            cors_origins: vec![],
        }
    }
}

/// Axum-State der den RateLimiter enthaelt (fuer die Middleware)
#[derive(Clone)]
struct RateLimitState {
    limiter: Arc<RateLimiter>,
    metriken: Option<AgrolinkMetriken>,
}

fn rate_limit_header_setzen(headers: &mut HeaderMap, e: &RateLimitEntscheidung) {
    headers.insert(HeaderName::from_static(HEADER_LIMIT), HeaderValue::from(e.limit));
    headers.insert(
        HeaderName::from_static(HEADER_REMAINING),
        HeaderValue::from(e.verbleibend),
    );
    headers.insert(HeaderName::from_static(HEADER_RESET), HeaderValue::from(e.reset_unix));
}

/// Axum-Middleware: Rate Limiting per IP
async fn rate_limit_middleware(
    State(rls): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip_aus_request(&req);
    let entscheidung = rls.limiter.pruefe_ip(&ip);

    let mut antwort = if entscheidung.erlaubt {
        next.run(req).await
    } else {
        tracing::warn!(
            client_ip = %ip,
            retry_after = entscheidung.retry_after_secs,
            "Rate-Limit ueberschritten"
        );
        if let Some(m) = &rls.metriken {
            m.ablehnung_zaehlen("rate_limited");
        }
        GatewayFehler::RateLimitUeberschritten {
            retry_after_secs: entscheidung.retry_after_secs,
        }
        .into_response()
    };

    rate_limit_header_setzen(antwort.headers_mut(), &entscheidung);
    antwort
}

/// CORS: entweder spezifische Origins oder alle
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let erlaubt: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(erlaubt)
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(tower_http::cors::Any)
        .expose_headers([
            HeaderName::from_static(HEADER_LIMIT),
            HeaderName::from_static(HEADER_REMAINING),
            HeaderName::from_static(HEADER_RESET),
        ])
}

/// Axum HTTP-Server fuer das Gateway
pub struct RestServer {
    konfig: RestServerKonfig,
}

impl RestServer {
    pub fn neu(konfig: RestServerKonfig) -> Self {
        Self { konfig }
    }

    /// Legt Rate Limiting, Timing, Trace und CORS um einen fertigen Router
    pub fn app(
        &self,
        router: Router,
        rate_limiter: Arc<RateLimiter>,
        metriken: Option<AgrolinkMetriken>,
    ) -> Router {
        let rls = RateLimitState {
            limiter: rate_limiter,
            metriken: metriken.clone(),
        };

        let mut app = router;
        if let Some(m) = metriken {
            app = app.layer(middleware::from_fn_with_state(m, timing_middleware));
        }

        app
            // Rate Limiter laeuft vor allen Handlern
            .layer(middleware::from_fn_with_state(rls, rate_limit_middleware))
            .layer(request_timing_layer())
            .layer(cors_layer(&self.konfig.cors_origins))
    }

    /// Startet den REST-Server und laeuft bis `shutdown` abschliesst
    pub async fn starten(
        self,
        app: Router,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.konfig.bind_addr).await?;
        tracing::info!(addr = %self.konfig.bind_addr, "Agrolink-Gateway gestartet");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        tracing::info!("Agrolink-Gateway gestoppt");
        Ok(())
    }
}
