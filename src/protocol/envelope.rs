//! Optional RSA body encryption.
//!
//! An [`Envelope`] sits between payload serialization and framing. In the
//! sealed configuration the body is encrypted with the remote side's
//! public key before the checksum is computed, so the checksum always
//! covers the bytes as they travel. Inbound bodies are decrypted with the
//! local private key after checksum verification.

use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::error::{FramewireError, Result};

/// RSA modulus size for generated key pairs.
pub const KEY_BITS: usize = 2048;

/// Key material for a sealed envelope.
///
/// The local private key opens inbound bodies; the remote public key
/// seals outbound ones. Each direction of a connection carries its own
/// pair, exchanged out of band.
#[derive(Clone)]
pub struct EnvelopeKeys {
    pub local_private: RsaPrivateKey,
    pub remote_public: RsaPublicKey,
}

impl std::fmt::Debug for EnvelopeKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.debug_struct("EnvelopeKeys").finish_non_exhaustive()
    }
}

/// Body transformation applied between serialization and framing.
pub enum Envelope {
    /// Bodies travel as serialized.
    Plain,
    /// Bodies are RSA-encrypted on the wire.
    Sealed(Box<EnvelopeKeys>),
}

impl Envelope {
    /// Build a sealed envelope from a key pair.
    pub fn sealed(local_private: RsaPrivateKey, remote_public: RsaPublicKey) -> Self {
        Envelope::Sealed(Box::new(EnvelopeKeys {
            local_private,
            remote_public,
        }))
    }

    /// Build a sealed envelope from prepared key material.
    pub fn from_keys(keys: EnvelopeKeys) -> Self {
        Envelope::Sealed(Box::new(keys))
    }

    /// Whether outbound bodies get encrypted.
    pub fn is_sealed(&self) -> bool {
        matches!(self, Envelope::Sealed(_))
    }

    /// Transform an outbound body for the wire.
    ///
    /// Plain envelopes pass bytes through untouched.
    pub fn seal(&self, body: &[u8]) -> Result<Vec<u8>> {
        match self {
            Envelope::Plain => Ok(body.to_vec()),
            Envelope::Sealed(keys) => {
                let mut rng = rand::thread_rng();
                keys.remote_public
                    .encrypt(&mut rng, Pkcs1v15Encrypt, body)
                    .map_err(|e| FramewireError::Crypto(e.to_string()))
            }
        }
    }

    /// Recover an inbound body from the wire.
    ///
    /// Plain envelopes pass bytes through untouched. A decryption failure
    /// is fatal to the connection: the sides disagree on key material and
    /// every subsequent body would fail the same way.
    pub fn open(&self, body: &[u8]) -> Result<Vec<u8>> {
        match self {
            Envelope::Plain => Ok(body.to_vec()),
            Envelope::Sealed(keys) => keys
                .local_private
                .decrypt(Pkcs1v15Encrypt, body)
                .map_err(|e| FramewireError::Crypto(e.to_string())),
        }
    }
}

/// Generate a fresh RSA key pair for envelope use.
pub fn generate_keys() -> Result<(RsaPrivateKey, RsaPublicKey)> {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, KEY_BITS)
        .map_err(|e| FramewireError::Crypto(e.to_string()))?;
    let public = RsaPublicKey::from(&private);
    Ok((private, public))
}
