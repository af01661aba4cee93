//! Routentabelle mit Schutz-Tag pro Route

use axum::{middleware, routing::MethodRouter, Router};

use crate::rest::GatewayState;
use crate::transport::transport_middleware;

/// Ob eine Route durch das Transport-Gateway laeuft
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schutz {
    /// Request und Antwort sind verschluesselt
    Verschluesselt,
    /// Klartext, nur fuer Handshake/Rotation/Statistik und Betriebsendpunkte
    Ausgenommen,
}

struct RoutenEintrag {
    pfad: String,
    schutz: Schutz,
    methoden: MethodRouter<GatewayState>,
}

/// Sammelt Routen mit ihrem Schutz und baut daraus den Axum-Router
pub struct RoutenTabelle {
    state: GatewayState,
    eintraege: Vec<RoutenEintrag>,
}

impl RoutenTabelle {
    pub fn neu(state: GatewayState) -> Self {
        Self {
            state,
            eintraege: Vec::new(),
        }
    }

    pub fn route(
        mut self,
        pfad: &str,
        schutz: Schutz,
        methoden: MethodRouter<GatewayState>,
    ) -> Self {
        self.eintraege.push(RoutenEintrag {
            pfad: pfad.to_string(),
            schutz,
            methoden,
        });
        self
    }

    pub fn verschluesselt(self, pfad: &str, methoden: MethodRouter<GatewayState>) -> Self {
        self.route(pfad, Schutz::Verschluesselt, methoden)
    }

    pub fn ausgenommen(self, pfad: &str, methoden: MethodRouter<GatewayState>) -> Self {
        self.route(pfad, Schutz::Ausgenommen, methoden)
    }

    /// Schutz einer registrierten Route (erster Treffer)
    pub fn schutz_fuer(&self, pfad: &str) -> Option<Schutz> {
        self.eintraege
            .iter()
            .find(|e| e.pfad == pfad)
            .map(|e| e.schutz)
    }

    pub fn state(&self) -> &GatewayState {
        &self.state
    }

    /// Baut den Router; nur verschluesselte Routen bekommen die Middleware
    pub fn router(self) -> Router {
        let mut router = Router::new();
        for eintrag in self.eintraege {
            let methoden = match eintrag.schutz {
                Schutz::Verschluesselt => eintrag.methoden.layer(
                    middleware::from_fn_with_state(self.state.clone(), transport_middleware),
                ),
                Schutz::Ausgenommen => eintrag.methoden,
            };
            router = router.route(&eintrag.pfad, methoden);
        }
        router.with_state(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrolink_crypto::Ableitung;
    use agrolink_session::{SitzungsKonfig, SitzungsStore};
    use axum::routing::get;

    fn tabelle() -> RoutenTabelle {
        let state = GatewayState::neu(SitzungsStore::neu(SitzungsKonfig::default()), Ableitung::Hkdf);
        RoutenTabelle::neu(state)
            .ausgenommen("/offen", get(|| async { "offen" }))
            .verschluesselt("/geheim", get(|| async { "geheim" }))
    }

    #[test]
    fn schutz_wird_pro_route_gefuehrt() {
        let t = tabelle();
        assert_eq!(t.schutz_fuer("/offen"), Some(Schutz::Ausgenommen));
        assert_eq!(t.schutz_fuer("/geheim"), Some(Schutz::Verschluesselt));
        assert_eq!(t.schutz_fuer("/unbekannt"), None);
    }
}
