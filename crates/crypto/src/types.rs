//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};

/// Laenge eines Sitzungsschluessels in Bytes (AES-256)
pub const SCHLUESSEL_LAENGE: usize = 32;

/// Symmetrischer Sitzungsschluessel (wird beim Drop genullt)
#[derive(Clone, PartialEq, Eq)]
pub struct Sitzungsschluessel([u8; SCHLUESSEL_LAENGE]);

impl Drop for Sitzungsschluessel {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for Sitzungsschluessel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sitzungsschluessel([REDACTED] {SCHLUESSEL_LAENGE} bytes)")
    }
}

impl Sitzungsschluessel {
    pub fn new(bytes: [u8; SCHLUESSEL_LAENGE]) -> Self {
        Self(bytes)
    }

    /// Erstellt einen Schluessel aus einem Slice beliebiger Herkunft
    pub fn aus_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; SCHLUESSEL_LAENGE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::UngueltigeSchluesselLaenge {
                    erwartet: SCHLUESSEL_LAENGE,
                    erhalten: bytes.len(),
                })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; SCHLUESSEL_LAENGE] {
        &self.0
    }
}

/// Verfahren zur Ableitung des Sitzungsschluessels aus dem ECDH-Geheimnis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Ableitung {
    /// HKDF-SHA256 mit Kontext-Bindung
    #[default]
    Hkdf,
    /// SHA-256 ueber das rohe Geheimnis (kompatibel mit Bestandsclients)
    Sha256,
}
