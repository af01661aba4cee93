//! AEAD-Umschlag fuer Request- und Response-Payloads
//!
//! AES-256-GCM mit abgetrenntem Tag. Jeder Aufruf von [`versiegeln`] zieht
//! eine frische 96-Bit-IV aus dem OS-Zufallsgenerator, auch bei parallelen
//! Aufrufen unter demselben Schluessel.
//!
//! ## Wire-Format
//! ```text
//! cipherText = base64(ciphertext)   // gleiche Laenge wie der Klartext
//! iv         = base64(iv(12))
//! tag        = base64(tag(16))
//! ```

use aes_gcm::{
    aead::{AeadCore, AeadInPlace, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce, Tag,
};
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{CryptoError, CryptoResult};
use crate::types::Sitzungsschluessel;

/// IV-Laenge in Bytes
pub const IV_LAENGE: usize = 12;
/// Auth-Tag-Laenge in Bytes
pub const TAG_LAENGE: usize = 16;

/// Ergebnis von [`versiegeln`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersiegelterUmschlag {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; IV_LAENGE],
    pub tag: [u8; TAG_LAENGE],
}

/// Base64-Darstellung eines Umschlags fuer JSON
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UmschlagBase64 {
    pub cipher_text: String,
    pub iv: String,
    pub tag: String,
}

impl VersiegelterUmschlag {
    pub fn zu_base64(&self) -> UmschlagBase64 {
        UmschlagBase64 {
            cipher_text: STANDARD.encode(&self.ciphertext),
            iv: STANDARD.encode(self.iv),
            tag: STANDARD.encode(self.tag),
        }
    }

    /// Dekodiert die drei Felder und prueft IV- und Tag-Laenge
    pub fn aus_base64(cipher_text: &str, iv: &str, tag: &str) -> CryptoResult<Self> {
        let ciphertext = STANDARD.decode(cipher_text)?;
        let iv_bytes = STANDARD.decode(iv)?;
        let tag_bytes = STANDARD.decode(tag)?;

        let iv: [u8; IV_LAENGE] =
            iv_bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::UngueltigeIv {
                    erwartet: IV_LAENGE,
                    erhalten: iv_bytes.len(),
                })?;
        let tag: [u8; TAG_LAENGE] =
            tag_bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::UngueltigerTag {
                    erwartet: TAG_LAENGE,
                    erhalten: tag_bytes.len(),
                })?;

        Ok(Self {
            ciphertext,
            iv,
            tag,
        })
    }
}

fn cipher(schluessel: &Sitzungsschluessel) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(schluessel.as_bytes()))
}

/// Verschluesselt einen Klartext mit frischer IV
pub fn versiegeln(
    schluessel: &Sitzungsschluessel,
    klartext: &[u8],
) -> CryptoResult<VersiegelterUmschlag> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let mut puffer = klartext.to_vec();

    let tag = cipher(schluessel)
        .encrypt_in_place_detached(&nonce, b"", &mut puffer)
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;

    let mut iv = [0u8; IV_LAENGE];
    iv.copy_from_slice(nonce.as_slice());
    let mut tag_bytes = [0u8; TAG_LAENGE];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok(VersiegelterUmschlag {
        ciphertext: puffer,
        iv,
        tag: tag_bytes,
    })
}

/// Entschluesselt und verifiziert einen Umschlag
///
/// Bei Tag-Mismatch wird kein Klartext herausgegeben.
pub fn oeffnen(
    schluessel: &Sitzungsschluessel,
    ciphertext: &[u8],
    iv: &[u8],
    tag: &[u8],
) -> CryptoResult<Vec<u8>> {
    if iv.len() != IV_LAENGE {
        return Err(CryptoError::UngueltigeIv {
            erwartet: IV_LAENGE,
            erhalten: iv.len(),
        });
    }
    if tag.len() != TAG_LAENGE {
        return Err(CryptoError::UngueltigerTag {
            erwartet: TAG_LAENGE,
            erhalten: tag.len(),
        });
    }

    let mut puffer = ciphertext.to_vec();
    cipher(schluessel)
        .decrypt_in_place_detached(
            Nonce::from_slice(iv),
            b"",
            &mut puffer,
            Tag::from_slice(tag),
        )
        .map_err(|_| CryptoError::Entschluesselung("Auth-Tag ungueltig".into()))?;
    Ok(puffer)
}

/// Oeffnet einen [`VersiegelterUmschlag`]
pub fn umschlag_oeffnen(
    schluessel: &Sitzungsschluessel,
    umschlag: &VersiegelterUmschlag,
) -> CryptoResult<Vec<u8>> {
    oeffnen(schluessel, &umschlag.ciphertext, &umschlag.iv, &umschlag.tag)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
