//! Crypto dispatch: RSA/Ed25519 sign and verify over the digests produced
//! by [`crate::hash`], RFC 6376 section 3.3 plus RFC 8463 section 3 for
//! Ed25519.
//!
//! `hash::compute_headers_hash` already hashes with the right algorithm
//! (SHA-1 for `rsa-sha1`, SHA-256 for `rsa-sha256` and `ed25519-sha256`),
//! so every function here receives a ready-made digest, never raw data.

use crate::hash::HashAlgo;
use crate::keyrecord::PublicKey;
use crate::DKIMError;
use ed25519_dalek::{Signature as EdSignature, Signer as _, SigningKey, Verifier as _};
use rsa::{pkcs1, pkcs8, Pkcs1v15Sign, RsaPrivateKey};
use sha1::Sha1;
use sha2::Sha256;

/// A signing key: either an RSA private key (PKCS#1 or PKCS#8 PEM/DER) or
/// an Ed25519 signing key (PKCS#8 PEM/DER, RFC 8463).
#[derive(Debug)]
pub enum PrivateKey {
    Rsa(RsaPrivateKey),
    Ed25519(SigningKey),
}

impl PrivateKey {
    /// Matches `a=`'s algorithm family: RSA keys may only pair with
    /// `rsa-sha1`/`rsa-sha256`, Ed25519 keys only with `ed25519-sha256`.
    /// Spec section 4.1: `new_sign` returns `BAD_PRIVKEY` otherwise.
    pub fn compatible_with(&self, algo: HashAlgo) -> bool {
        matches!(
            (self, algo),
            (Self::Rsa(_), HashAlgo::RsaSha1 | HashAlgo::RsaSha256)
                | (Self::Ed25519(_), HashAlgo::Ed25519Sha256)
        )
    }

    /// The one signature algorithm each key family supports when the
    /// caller doesn't specify one explicitly (RSA defaults to SHA-256).
    pub fn default_hash_algo(&self) -> HashAlgo {
        match self {
            Self::Rsa(_) => HashAlgo::RsaSha256,
            Self::Ed25519(_) => HashAlgo::Ed25519Sha256,
        }
    }

    /// Parses an RSA private key, trying PKCS#1 DER/PEM then PKCS#8 DER/PEM
    /// in turn.
    pub fn rsa_from_pem(data: &[u8]) -> Result<Self, DKIMError> {
        let mut errors = vec![];

        if let Ok(key) = pkcs1::DecodeRsaPrivateKey::from_pkcs1_der(data) {
            return Ok(Self::Rsa(key));
        }
        if let Ok(key) = pkcs8::DecodePrivateKey::from_pkcs8_der(data) {
            return Ok(Self::Rsa(key));
        }

        match std::str::from_utf8(data) {
            Ok(s) => {
                match pkcs1::DecodeRsaPrivateKey::from_pkcs1_pem(s) {
                    Ok(key) => return Ok(Self::Rsa(key)),
                    Err(err) => errors.push(format!("from_pkcs1_pem: {err}")),
                }
                match pkcs8::DecodePrivateKey::from_pkcs8_pem(s) {
                    Ok(key) => return Ok(Self::Rsa(key)),
                    Err(err) => errors.push(format!("from_pkcs8_pem: {err}")),
                }
            }
            Err(err) => errors.push(format!("rsa key is not UTF-8: {err}")),
        }

        Err(DKIMError::PrivateKeyLoadError(errors.join(". ")))
    }

    /// Parses a PKCS#8 Ed25519 private key, PEM or DER.
    pub fn ed25519_from_pem(data: &[u8]) -> Result<Self, DKIMError> {
        use ed25519_dalek::pkcs8::DecodePrivateKey;

        if let Ok(key) = SigningKey::from_pkcs8_der(data) {
            return Ok(Self::Ed25519(key));
        }
        match std::str::from_utf8(data).ok().and_then(|s| SigningKey::from_pkcs8_pem(s).ok()) {
            Some(key) => Ok(Self::Ed25519(key)),
            None => Err(DKIMError::PrivateKeyLoadError(
                "not a valid PKCS#8 ed25519 private key".to_string(),
            )),
        }
    }

    /// Tries RSA first, then Ed25519 — convenient when the caller hasn't
    /// told us which key type to expect.
    pub fn from_pem(data: &[u8]) -> Result<Self, DKIMError> {
        Self::rsa_from_pem(data).or_else(|_| Self::ed25519_from_pem(data))
    }
}

/// Signs `digest` (already hashed per `alg`) and returns the raw signature
/// bytes (unencoded; callers base64-encode for `b=`).
pub fn sign(alg: HashAlgo, key: &PrivateKey, digest: &[u8]) -> Result<Vec<u8>, DKIMError> {
    match (alg, key) {
        (HashAlgo::RsaSha1, PrivateKey::Rsa(key)) => key
            .sign(Pkcs1v15Sign::new::<Sha1>(), digest)
            .map_err(|err| DKIMError::FailedToSign(err.to_string())),
        (HashAlgo::RsaSha256, PrivateKey::Rsa(key)) => key
            .sign(Pkcs1v15Sign::new::<Sha256>(), digest)
            .map_err(|err| DKIMError::FailedToSign(err.to_string())),
        (HashAlgo::Ed25519Sha256, PrivateKey::Ed25519(key)) => {
            Ok(key.sign(digest).to_bytes().to_vec())
        }
        (alg, _) => Err(DKIMError::FailedToSign(format!(
            "key type incompatible with {}",
            alg.algo_name()
        ))),
    }
}

/// Verifies `sig` over `digest` against `key`. Distinguishes a malformed
/// signature/key shape (`Err`) from a well-formed signature that simply
/// doesn't match (`Ok(false)`).
pub fn verify(alg: HashAlgo, key: &PublicKey, digest: &[u8], sig: &[u8]) -> Result<bool, DKIMError> {
    match (alg, key) {
        (HashAlgo::RsaSha1, PublicKey::Rsa(key)) => {
            Ok(key.verify(Pkcs1v15Sign::new::<Sha1>(), digest, sig).is_ok())
        }
        (HashAlgo::RsaSha256, PublicKey::Rsa(key)) => Ok(key
            .verify(Pkcs1v15Sign::new::<Sha256>(), digest, sig)
            .is_ok()),
        (HashAlgo::Ed25519Sha256, PublicKey::Ed25519(key)) => {
            let bytes: [u8; 64] = sig.try_into().map_err(|_| {
                DKIMError::SignatureSyntaxError(format!(
                    "ed25519 signatures must be 64 bytes, got {}",
                    sig.len()
                ))
            })?;
            Ok(key.verify(digest, &EdSignature::from_bytes(&bytes)).is_ok())
        }
        (_, _) => Err(DKIMError::KeyMismatch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyrecord::PublicKey as Pub;

    const RSA_PEM: &str = include_str!("../test/keys/2022.private");

    #[test]
    fn test_rsa_round_trip() {
        let private = PrivateKey::rsa_from_pem(RSA_PEM.as_bytes()).unwrap();
        use sha2::Digest;
        let digest = Sha256::digest(b"hello world").to_vec();
        let sig = sign(HashAlgo::RsaSha256, &private, &digest).unwrap();

        let public = match &private {
            PrivateKey::Rsa(key) => Pub::Rsa(key.to_public_key()),
            _ => unreachable!(),
        };
        assert!(verify(HashAlgo::RsaSha256, &public, &digest, &sig).unwrap());
    }

    #[test]
    fn test_ed25519_round_trip() {
        let private = PrivateKey::ed25519_from_pem(include_bytes!("../test/keys/ed.private.pem")).unwrap();
        let digest = [7u8; 32];
        let sig = sign(HashAlgo::Ed25519Sha256, &private, &digest).unwrap();
        let public = match &private {
            PrivateKey::Ed25519(key) => Pub::Ed25519(key.verifying_key()),
            _ => unreachable!(),
        };
        assert!(verify(HashAlgo::Ed25519Sha256, &public, &digest, &sig).unwrap());
    }

    #[test]
    fn test_tampered_signature_fails() {
        let private = PrivateKey::rsa_from_pem(RSA_PEM.as_bytes()).unwrap();
        use sha2::Digest;
        let digest = Sha256::digest(b"hello world").to_vec();
        let mut sig = sign(HashAlgo::RsaSha256, &private, &digest).unwrap();
        sig[0] ^= 0xff;

        let public = match &private {
            PrivateKey::Rsa(key) => Pub::Rsa(key.to_public_key()),
            _ => unreachable!(),
        };
        assert!(!verify(HashAlgo::RsaSha256, &public, &digest, &sig).unwrap());
    }
}
