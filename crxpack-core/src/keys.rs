use crate::error::{PackError, Result, Stage};
use rand::rngs::OsRng;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::fmt;

/// Modulus size of generated keys.
pub const KEY_BITS: usize = 2048;

/// RSA signing key. The public half is derived on demand.
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("bits", &self.bits()).finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Fresh key from the OS RNG; every call yields an unrelated key.
    pub fn generate() -> Result<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, KEY_BITS)
            .map_err(|e| PackError::crypto(Stage::KeyGeneration, e))?;
        Ok(Self { private })
    }

    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| PackError::crypto(Stage::KeyGeneration, format!("load PKCS#8 key: {e}")))?;
        Ok(Self { private })
    }

    pub fn bits(&self) -> usize {
        self.private.size() * 8
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.private.to_public_key()
    }

    /// DER SubjectPublicKeyInfo, as embedded in the container header.
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        let doc = self
            .public_key()
            .to_public_key_der()
            .map_err(|e| PackError::crypto(Stage::KeyGeneration, format!("encode public key: {e}")))?;
        Ok(doc.as_bytes().to_vec())
    }

    /// PKCS#8 PEM of the private key (LF line endings).
    pub fn to_pkcs8_pem(&self) -> Result<String> {
        let pem = self
            .private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| PackError::crypto(Stage::KeyGeneration, format!("encode private key: {e}")))?;
        Ok(pem.to_string())
    }

    /// RSASSA-PKCS1-v1_5 with SHA-256 over `data`.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signer = SigningKey::<Sha256>::new(self.private.clone());
        let sig = signer.try_sign(data).map_err(|e| PackError::crypto(Stage::Signing, e))?;
        Ok(sig.to_vec())
    }
}

/// Check `signature` over `data` against a DER SubjectPublicKeyInfo.
///
/// A signature that simply does not match yields `Ok(false)`; an undecodable
/// key is an error.
pub fn verify_signature(public_key_der: &[u8], data: &[u8], signature: &[u8]) -> Result<bool> {
    let public = RsaPublicKey::from_public_key_der(public_key_der)
        .map_err(|e| PackError::crypto(Stage::Verify, format!("decode public key: {e}")))?;
    let Ok(sig) = Signature::try_from(signature) else {
        return Ok(false);
    };
    let verifier = VerifyingKey::<Sha256>::new(public);
    Ok(verifier.verify(data, &sig).is_ok())
}

/// Extension ID for a public key: the first 128 bits of its SHA-256, one
/// letter `a`..`p` per nibble.
pub fn extension_id(public_key_der: &[u8]) -> String {
    let digest = Sha256::digest(public_key_der);
    let mut id = String::with_capacity(32);
    for b in &digest[..16] {
        id.push(char::from(b'a' + (b >> 4)));
        id.push(char::from(b'a' + (b & 0x0F)));
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_id_alphabet() {
        let id = extension_id(b"not really a key");
        assert_eq!(id.len(), 32);
        assert!(id.bytes().all(|c| (b'a'..=b'p').contains(&c)));
        assert_eq!(id, extension_id(b"not really a key"));
        assert_ne!(id, extension_id(b"another key"));
    }

    #[test]
    fn extension_id_nibbles() {
        // SHA-256("") = e3b0c442 98fc1c14 ...
        let id = extension_id(b"");
        assert!(id.starts_with("odlameecjipmbmbe"));
    }

    #[test]
    fn garbage_key_is_error() {
        assert!(verify_signature(b"\x30\x03\x02\x01\x00", b"data", &[0u8; 256]).is_err());
    }
}
