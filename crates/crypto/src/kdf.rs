//! Ableitung des Sitzungsschluessels aus dem ECDH-Geheimnis
//!
//! Standard ist HKDF-SHA256 mit festem Info-String. Der SHA-256-Modus
//! hasht das rohe Geheimnis und bleibt fuer Bestandsclients verfuegbar.

use hkdf::Hkdf;
use sha2::{Digest, Sha256};

use crate::error::{CryptoError, CryptoResult};
use crate::kex::GeteiltesGeheimnis;
use crate::types::{Ableitung, Sitzungsschluessel, SCHLUESSEL_LAENGE};

/// Info-String fuer die HKDF-Expand-Phase
pub const HKDF_INFO: &[u8] = b"agrolink-transport-v1";

/// Leitet den 256-Bit-Sitzungsschluessel ab
pub fn sitzungsschluessel_ableiten(
    geheimnis: &GeteiltesGeheimnis,
    ableitung: Ableitung,
) -> CryptoResult<Sitzungsschluessel> {
    schluessel_aus_bytes(geheimnis.as_bytes(), ableitung)
}

/// Wie [`sitzungsschluessel_ableiten`], aber auf rohen Bytes (Client-Seite, Tests)
pub fn schluessel_aus_bytes(ikm: &[u8], ableitung: Ableitung) -> CryptoResult<Sitzungsschluessel> {
    match ableitung {
        Ableitung::Hkdf => {
            let hk = Hkdf::<Sha256>::new(None, ikm);
            let mut okm = [0u8; SCHLUESSEL_LAENGE];
            hk.expand(HKDF_INFO, &mut okm)
                .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
            Ok(Sitzungsschluessel::new(okm))
        }
        Ableitung::Sha256 => {
            let digest = Sha256::digest(ikm);
            Sitzungsschluessel::aus_slice(digest.as_slice())
        }
    }
}
