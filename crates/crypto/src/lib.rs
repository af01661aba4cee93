//! # agrolink-crypto
//!
//! Kryptografische Bausteine der Agrolink-Transportverschluesselung.
//!
//! ## Module
//! - `kex` - ECDH-P256 mit ephemeren Server-Schluesseln
//! - `kdf` - Ableitung des Sitzungsschluessels (HKDF-SHA256 oder SHA-256)
//! - `umschlag` - AES-256-GCM Umschlag (Ciphertext, IV, Tag)
//! - `types` - Sitzungsschluessel, Ableitungsmodus
//! - `error` - Fehlertypen

pub mod error;
pub mod kdf;
pub mod kex;
pub mod types;
pub mod umschlag;

// Bequeme Re-Exports
pub use error::{CryptoError, CryptoResult};
pub use kdf::{schluessel_aus_bytes, sitzungsschluessel_ableiten};
pub use kex::{peer_schluessel_dekodieren, EphemeresSchluesselpaar, GeteiltesGeheimnis};
pub use types::{Ableitung, Sitzungsschluessel, SCHLUESSEL_LAENGE};
pub use umschlag::{
    oeffnen, umschlag_oeffnen, versiegeln, UmschlagBase64, VersiegelterUmschlag, IV_LAENGE,
    TAG_LAENGE,
};
