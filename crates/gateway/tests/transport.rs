//! Integrationstests: Handshake, verschluesselte Anfragen, Rotation, Statistik

use std::time::Duration;

use agrolink_crypto::{
    peer_schluessel_dekodieren, sitzungsschluessel_ableiten, umschlag_oeffnen, versiegeln,
    Ableitung, EphemeresSchluesselpaar, Sitzungsschluessel, VersiegelterUmschlag,
};
use agrolink_gateway::rest::routes::crypto_routen;
use agrolink_gateway::{GatewayState, RoutenTabelle, SitzungsKontext};
use agrolink_session::{SitzungsKonfig, SitzungsStore};
use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{Request, StatusCode},
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

// ---- Test-Handler ----

async fn ping(Extension(kontext): Extension<SitzungsKontext>, Json(body): Json<Value>) -> Json<Value> {
    Json(json!({ "pong": body, "nonce": kontext.nonce }))
}

async fn status() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn ablehnen() -> (StatusCode, Json<Value>) {
    (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "error": "nope" })))
}

async fn sitzung_loeschen(
    State(state): State<GatewayState>,
    Extension(kontext): Extension<SitzungsKontext>,
) -> Json<Value> {
    state.store.entfernen(&kontext.session_id);
    Json(json!({ "geloescht": true }))
}

async fn sitzung_rotieren(
    State(state): State<GatewayState>,
    Extension(kontext): Extension<SitzungsKontext>,
) -> Json<Value> {
    state
        .store
        .rotieren(&kontext.session_id, Sitzungsschluessel::new([9; 32]))
        .unwrap();
    Json(json!({ "rotiert": true }))
}

async fn mit_headern() -> ([(&'static str, &'static str); 2], Json<Value>) {
    (
        [("x-request-id", "abc-123"), ("cache-control", "no-store")],
        Json(json!({ "ok": true })),
    )
}

fn test_app(konfig: SitzungsKonfig) -> Router {
    let state = GatewayState::neu(SitzungsStore::neu(konfig), Ableitung::Hkdf);
    crypto_routen(RoutenTabelle::neu(state))
        .verschluesselt("/v1/ping", post(ping))
        .verschluesselt("/v1/status", get(status))
        .verschluesselt("/v1/ablehnen", post(ablehnen))
        .verschluesselt("/v1/loeschen", post(sitzung_loeschen))
        .verschluesselt("/v1/rotieren", post(sitzung_rotieren))
        .verschluesselt("/v1/header", post(mit_headern))
        .router()
}

// ---- Client-Seite ----

struct Client {
    session_id: String,
    schluessel: Sitzungsschluessel,
}

async fn senden(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let antwort = app.clone().oneshot(req).await.unwrap();
    let status = antwort.status();
    let bytes = to_bytes(antwort.into_body(), usize::MAX).await.unwrap();
    let wert = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, wert)
}

fn json_post(pfad: &str, body: &Value) -> Request<Body> {
    Request::post(pfad)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn schluessel_aus_antwort(paar: EphemeresSchluesselpaar, server_public_key: &str) -> Sitzungsschluessel {
    let peer = peer_schluessel_dekodieren(server_public_key).unwrap();
    let geheimnis = paar.austauschen(&peer).unwrap();
    sitzungsschluessel_ableiten(&geheimnis, Ableitung::Hkdf).unwrap()
}

async fn handshake(app: &Router) -> (Client, Value) {
    let paar = EphemeresSchluesselpaar::erzeugen();
    let (status, antwort) = senden(
        app,
        json_post(
            "/crypto/handshake",
            &json!({ "clientPublicKey": paar.oeffentlicher_schluessel_base64() }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{antwort}");

    let client = Client {
        session_id: antwort["sessionId"].as_str().unwrap().to_string(),
        schluessel: schluessel_aus_antwort(paar, antwort["serverPublicKey"].as_str().unwrap()),
    };
    (client, antwort)
}

impl Client {
    fn umschlag(&self, payload: &Value, nonce: u64) -> Value {
        let u = versiegeln(&self.schluessel, &serde_json::to_vec(payload).unwrap())
            .unwrap()
            .zu_base64();
        json!({
            "sessionId": self.session_id,
            "cipherText": u.cipher_text,
            "iv": u.iv,
            "tag": u.tag,
            "nonce": nonce,
        })
    }

    fn oeffnen(&self, antwort: &Value) -> Value {
        assert_eq!(antwort["sessionId"], self.session_id.as_str());
        let u = VersiegelterUmschlag::aus_base64(
            antwort["cipherText"].as_str().unwrap(),
            antwort["iv"].as_str().unwrap(),
            antwort["tag"].as_str().unwrap(),
        )
        .unwrap();
        serde_json::from_slice(&umschlag_oeffnen(&self.schluessel, &u).unwrap()).unwrap()
    }

    fn header_anfrage(&self, pfad: &str, nonce: u64) -> Request<Body> {
        Request::get(pfad)
            .header("x-session-id", &self.session_id)
            .header("x-nonce", nonce.to_string())
            .body(Body::empty())
            .unwrap()
    }
}

fn fehler_code(antwort: &Value) -> &str {
    antwort["error"]["code"].as_str().unwrap_or_default()
}

// ---- Tests ----

#[tokio::test]
async fn voller_handshake_und_verschluesselter_ping() {
    let app = test_app(SitzungsKonfig::default());
    let (client, hs) = handshake(&app).await;

    assert_eq!(hs["expiresInMs"], 1_800_000);
    assert_eq!(hs["maxRequests"], 1000);
    assert_eq!(hs["rotateAfter"], 500);
    assert_eq!(
        peer_schluessel_dekodieren(hs["serverPublicKey"].as_str().unwrap())
            .unwrap()
            .len(),
        33
    );

    let (status, antwort) = senden(&app, json_post("/v1/ping", &client.umschlag(&json!({ "ping": 1 }), 1))).await;
    assert_eq!(status, StatusCode::OK, "{antwort}");
    assert_eq!(antwort["nextNonce"], 2);
    assert_eq!(client.oeffnen(&antwort), json!({ "pong": { "ping": 1 }, "nonce": 1 }));
}

#[tokio::test]
async fn replay_wird_abgelehnt_sitzung_bleibt_gueltig() {
    let app = test_app(SitzungsKonfig::default());
    let (client, _) = handshake(&app).await;
    let umschlag = client.umschlag(&json!({ "ping": 1 }), 1);

    let (status, _) = senden(&app, json_post("/v1/ping", &umschlag)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, antwort) = senden(&app, json_post("/v1/ping", &umschlag)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fehler_code(&antwort), "replay_detected");

    let (status, antwort) = senden(&app, json_post("/v1/ping", &client.umschlag(&json!({ "ping": 2 }), 2))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(client.oeffnen(&antwort)["pong"]["ping"], 2);
}

#[tokio::test]
async fn header_umschlag_fuer_get() {
    let app = test_app(SitzungsKonfig::default());
    let (client, _) = handshake(&app).await;

    let (status, antwort) = senden(&app, client.header_anfrage("/v1/status", 5)).await;
    assert_eq!(status, StatusCode::OK, "{antwort}");
    assert_eq!(antwort["nextNonce"], 6);
    assert_eq!(client.oeffnen(&antwort), json!({ "status": "ok" }));

    // Gleiche Nonce im Header ist ebenfalls ein Replay
    let (status, antwort) = senden(&app, client.header_anfrage("/v1/status", 5)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fehler_code(&antwort), "replay_detected");
}

#[tokio::test]
async fn ungueltige_session_header() {
    let app = test_app(SitzungsKonfig::default());
    let req = Request::get("/v1/status")
        .header("x-session-id", "irgendwas")
        .header("x-nonce", "keine-zahl")
        .body(Body::empty())
        .unwrap();
    let (status, antwort) = senden(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fehler_code(&antwort), "invalid_session_headers");
}

#[tokio::test]
async fn klartext_ohne_umschlag_wird_abgelehnt() {
    let app = test_app(SitzungsKonfig::default());
    let (status, antwort) = senden(&app, json_post("/v1/ping", &json!({ "ping": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fehler_code(&antwort), "envelope_missing");
    assert!(antwort["error"]["message"]
        .as_str()
        .unwrap()
        .contains("/crypto/handshake"));
}

#[tokio::test]
async fn unbekannte_sitzung_gibt_401() {
    let app = test_app(SitzungsKonfig::default());
    let (client, _) = handshake(&app).await;
    let fremd = Client {
        session_id: "gibt-es-nicht".into(),
        schluessel: client.schluessel.clone(),
    };

    let (status, antwort) = senden(&app, json_post("/v1/ping", &fremd.umschlag(&json!({}), 1))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(fehler_code(&antwort), "session_unavailable");
}

#[tokio::test]
async fn manipulierter_ciphertext_wird_abgelehnt() {
    let app = test_app(SitzungsKonfig::default());
    let (client, _) = handshake(&app).await;

    let mut umschlag = client.umschlag(&json!({ "ping": 1 }), 1);
    // Anderen Ciphertext gleicher Laenge unterschieben
    let anderer = client.umschlag(&json!({ "pong": 1 }), 1);
    umschlag["cipherText"] = anderer["cipherText"].clone();

    let (status, antwort) = senden(&app, json_post("/v1/ping", &umschlag)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fehler_code(&antwort), "decrypt_failed");

    let mut kaputt = client.umschlag(&json!({ "ping": 1 }), 2);
    kaputt["iv"] = json!("AAAA");
    let (status, antwort) = senden(&app, json_post("/v1/ping", &kaputt)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fehler_code(&antwort), "decrypt_failed");
}

#[tokio::test]
async fn fehlerantwort_des_handlers_bleibt_klartext() {
    let app = test_app(SitzungsKonfig::default());
    let (client, _) = handshake(&app).await;

    let (status, antwort) = senden(&app, json_post("/v1/ablehnen", &client.umschlag(&json!({}), 1))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(antwort, json!({ "error": "nope" }));
}

#[tokio::test]
async fn sitzung_verschwindet_waehrend_des_requests() {
    let app = test_app(SitzungsKonfig::default());
    let (client, _) = handshake(&app).await;

    let (status, antwort) = senden(&app, json_post("/v1/loeschen", &client.umschlag(&json!({}), 1))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(fehler_code(&antwort), "session_expired");
    assert!(antwort.get("cipherText").is_none());
}

#[tokio::test]
async fn kontingent_erschoepft_entfernt_sitzung() {
    let app = test_app(SitzungsKonfig {
        max_anfragen: 2,
        ..SitzungsKonfig::default()
    });
    let (client, _) = handshake(&app).await;

    for nonce in 1..=2 {
        let (status, _) = senden(&app, json_post("/v1/ping", &client.umschlag(&json!({}), nonce))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, antwort) = senden(&app, json_post("/v1/ping", &client.umschlag(&json!({}), 3))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(fehler_code(&antwort), "session_unavailable");

    let (status, _) = senden(
        &app,
        Request::get(format!("/crypto/stats/{}", client.session_id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn abgelaufene_sitzung_gibt_401() {
    let app = test_app(SitzungsKonfig {
        ttl: Duration::from_millis(20),
        ..SitzungsKonfig::default()
    });
    let (client, _) = handshake(&app).await;
    tokio::time::sleep(Duration::from_millis(40)).await;

    let (status, antwort) = senden(&app, json_post("/v1/ping", &client.umschlag(&json!({}), 1))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(fehler_code(&antwort), "session_unavailable");
}

#[tokio::test]
async fn handshake_fehlerfaelle() {
    let app = test_app(SitzungsKonfig::default());

    let (status, antwort) = senden(&app, json_post("/crypto/handshake", &json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fehler_code(&antwort), "handshake_failed");

    let (status, _) = senden(&app, json_post("/crypto/handshake", &json!({ "clientPublicKey": "%%%kein-base64" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Gueltiges Base64, aber kein Kurvenpunkt
    let (status, _) = senden(&app, json_post("/crypto/handshake", &json!({ "clientPublicKey": "AgAAAA==" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = Request::post("/crypto/handshake").body(Body::empty()).unwrap();
    let (status, _) = senden(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rotation_setzt_zaehler_und_nonces_zurueck() {
    let app = test_app(SitzungsKonfig::default());
    let (alt, _) = handshake(&app).await;

    for nonce in 1..=3 {
        let (status, _) = senden(&app, json_post("/v1/ping", &alt.umschlag(&json!({}), nonce))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let paar = EphemeresSchluesselpaar::erzeugen();
    let (status, antwort) = senden(
        &app,
        json_post(
            "/crypto/rotate",
            &json!({ "sessionId": alt.session_id, "clientPublicKey": paar.oeffentlicher_schluessel_base64() }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{antwort}");
    assert_eq!(antwort["rotated"], true);
    assert_eq!(antwort["sessionId"], alt.session_id.as_str());

    let neu = Client {
        session_id: alt.session_id.clone(),
        schluessel: schluessel_aus_antwort(paar, antwort["serverPublicKey"].as_str().unwrap()),
    };

    let (status, stats) = senden(
        &app,
        Request::get(format!("/crypto/stats/{}", neu.session_id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["requestCount"], 0);
    assert_eq!(stats["lastNonce"], 0);

    // Nonce 1 ist nach der Rotation wieder frei, alter Schluessel passt nicht mehr
    let (status, antwort) = senden(&app, json_post("/v1/ping", &alt.umschlag(&json!({}), 1))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fehler_code(&antwort), "decrypt_failed");

    let (status, antwort) = senden(&app, json_post("/v1/ping", &neu.umschlag(&json!({ "ping": 9 }), 2))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(neu.oeffnen(&antwort)["pong"]["ping"], 9);
}

#[tokio::test]
async fn rotation_unbekannter_sitzung() {
    let app = test_app(SitzungsKonfig::default());
    let paar = EphemeresSchluesselpaar::erzeugen();

    let (status, antwort) = senden(
        &app,
        json_post(
            "/crypto/rotate",
            &json!({ "sessionId": "unbekannt", "clientPublicKey": paar.oeffentlicher_schluessel_base64() }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(antwort["error"]["message"], "Invalid or expired session");

    let (status, antwort) = senden(&app, json_post("/crypto/rotate", &json!({ "sessionId": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fehler_code(&antwort), "invalid_request");
}

#[tokio::test]
async fn statistik_und_rotationsempfehlung() {
    let app = test_app(SitzungsKonfig {
        rotation_empfohlen_ab: 2,
        ..SitzungsKonfig::default()
    });
    let (client, _) = handshake(&app).await;
    let stats_anfrage = || {
        Request::get(format!("/crypto/stats/{}", client.session_id))
            .body(Body::empty())
            .unwrap()
    };

    let (status, stats) = senden(&app, stats_anfrage()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["shouldRotate"], false);
    assert_eq!(stats["maxRequests"], 1000);
    let ttl = stats["ttlSeconds"].as_i64().unwrap();
    assert!((1799..=1800).contains(&ttl));

    for nonce in [1, 3] {
        let (status, _) = senden(&app, json_post("/v1/ping", &client.umschlag(&json!({}), nonce))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, stats) = senden(&app, stats_anfrage()).await;
    assert_eq!(stats["requestCount"], 2);
    assert_eq!(stats["lastNonce"], 3);
    assert_eq!(stats["shouldRotate"], true);
    assert_eq!(stats["ageSeconds"], 0);

    // Statistik zaehlt selbst nicht als Anfrage
    let (_, stats) = senden(&app, stats_anfrage()).await;
    assert_eq!(stats["requestCount"], 2);

    let (status, antwort) = senden(
        &app,
        Request::get("/crypto/stats/unbekannt").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(fehler_code(&antwort), "not_found");
}

#[tokio::test]
async fn rotation_waehrend_des_requests_wird_nicht_mit_neuem_schluessel_versiegelt() {
    let app = test_app(SitzungsKonfig::default());
    let (client, _) = handshake(&app).await;

    let (status, antwort) = senden(&app, json_post("/v1/rotieren", &client.umschlag(&json!({}), 1))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(fehler_code(&antwort), "session_expired");
    assert!(antwort.get("cipherText").is_none());
}

#[tokio::test]
async fn handler_header_bleiben_erhalten() {
    let app = test_app(SitzungsKonfig::default());
    let (client, _) = handshake(&app).await;

    let antwort = app
        .clone()
        .oneshot(json_post("/v1/header", &client.umschlag(&json!({}), 1)))
        .await
        .unwrap();
    assert_eq!(antwort.status(), StatusCode::OK);
    assert_eq!(antwort.headers()["x-request-id"], "abc-123");
    assert_eq!(antwort.headers()["cache-control"], "no-store");
    assert_eq!(antwort.headers()["content-type"], "application/json");

    let bytes = to_bytes(antwort.into_body(), usize::MAX).await.unwrap();
    let wert: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(client.oeffnen(&wert), json!({ "ok": true }));
}

#[tokio::test]
async fn muell_ciphertext_verbraucht_keine_nonce() {
    let app = test_app(SitzungsKonfig::default());
    let (client, _) = handshake(&app).await;

    let mut muell = client.umschlag(&json!({}), u64::MAX);
    let anderer = client.umschlag(&json!({ "x": 1 }), u64::MAX);
    muell["cipherText"] = anderer["cipherText"].clone();
    let (status, antwort) = senden(&app, json_post("/v1/ping", &muell)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fehler_code(&antwort), "decrypt_failed");

    // Das Fenster wurde nicht verschoben, regulaere Nonces bleiben gueltig
    let (status, antwort) = senden(&app, json_post("/v1/ping", &client.umschlag(&json!({ "ping": 1 }), 1))).await;
    assert_eq!(status, StatusCode::OK, "{antwort}");
    assert_eq!(antwort["nextNonce"], 2);
}

#[tokio::test]
async fn erschoepfte_sitzung_kann_nicht_rotiert_werden() {
    let app = test_app(SitzungsKonfig {
        max_anfragen: 2,
        ..SitzungsKonfig::default()
    });
    let (client, _) = handshake(&app).await;

    for nonce in 1..=2 {
        let (status, _) = senden(&app, json_post("/v1/ping", &client.umschlag(&json!({}), nonce))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let paar = EphemeresSchluesselpaar::erzeugen();
    let (status, antwort) = senden(
        &app,
        json_post(
            "/crypto/rotate",
            &json!({ "sessionId": client.session_id, "clientPublicKey": paar.oeffentlicher_schluessel_base64() }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(antwort["error"]["message"], "Invalid or expired session");
}
