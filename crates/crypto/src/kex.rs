//! ECDH-P256 Key Exchange
//!
//! Der Server erzeugt pro Handshake und pro Rotation ein frisches ephemeres
//! Schluesselpaar. Oeffentliche Schluessel werden als komprimierter
//! SEC1-Punkt (33 Bytes, Praefix 0x02/0x03) uebertragen.
//!
//! Der private Skalar lebt nur bis zur einen DH-Berechnung:
//! [`EphemeresSchluesselpaar::austauschen`] konsumiert das Paar.

use aes_gcm::aead::OsRng;
use base64::{engine::general_purpose::STANDARD, Engine};
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// Laenge eines komprimierten P-256-Punkts
pub const KOMPRIMIERT_LAENGE: usize = 33;

/// Rohes ECDH-Geheimnis (x-Koordinate, wird beim Drop genullt)
pub struct GeteiltesGeheimnis(Zeroizing<[u8; 32]>);

impl GeteiltesGeheimnis {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for GeteiltesGeheimnis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GeteiltesGeheimnis([REDACTED])")
    }
}

/// Ephemeres P-256-Schluesselpaar fuer genau einen Austausch
pub struct EphemeresSchluesselpaar {
    geheimnis: EphemeralSecret,
    oeffentlich: Vec<u8>,
}

impl EphemeresSchluesselpaar {
    /// Erzeugt ein neues Paar aus dem OS-Zufallsgenerator
    pub fn erzeugen() -> Self {
        let geheimnis = EphemeralSecret::random(&mut OsRng);
        let oeffentlich = geheimnis
            .public_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        Self {
            geheimnis,
            oeffentlich,
        }
    }

    /// Oeffentlicher Schluessel als komprimierter SEC1-Punkt
    pub fn oeffentlicher_schluessel(&self) -> &[u8] {
        &self.oeffentlich
    }

    /// Oeffentlicher Schluessel in der Wire-Form (Base64)
    pub fn oeffentlicher_schluessel_base64(&self) -> String {
        STANDARD.encode(&self.oeffentlich)
    }

    /// Fuehrt den DH-Austausch mit dem Peer-Schluessel durch
    ///
    /// Akzeptiert komprimierte und unkomprimierte SEC1-Kodierung. Punkte
    /// ausserhalb der Kurve oder fehlerhafte Kodierungen schlagen fehl.
    pub fn austauschen(self, peer_schluessel: &[u8]) -> CryptoResult<GeteiltesGeheimnis> {
        let peer = PublicKey::from_sec1_bytes(peer_schluessel).map_err(|_| {
            CryptoError::KeyExchange(format!(
                "Ungueltiger P-256 Public Key ({} Bytes)",
                peer_schluessel.len()
            ))
        })?;

        let dh = self.geheimnis.diffie_hellman(&peer);
        let mut bytes = Zeroizing::new([0u8; 32]);
        bytes.copy_from_slice(dh.raw_secret_bytes().as_slice());
        Ok(GeteiltesGeheimnis(bytes))
    }
}

/// Dekodiert einen Base64-Peer-Schluessel aus dem Handshake-Body
pub fn peer_schluessel_dekodieren(base64_text: &str) -> CryptoResult<Vec<u8>> {
    let bytes = STANDARD.decode(base64_text.trim())?;
    if bytes.is_empty() {
        return Err(CryptoError::KeyExchange("Leerer Public Key".into()));
    }
    Ok(bytes)
}
