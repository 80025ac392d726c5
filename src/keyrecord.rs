//! DNS TXT key-record parsing and validation, RFC 6376 section 3.6.1.

use crate::hash::HashAlgo;
use crate::parser;
use crate::DKIMError;
use base64::engine::general_purpose;
use base64::Engine;
use rsa::{pkcs1, pkcs8};

const RSA_KEY_TYPE: &str = "rsa";
const ED25519_KEY_TYPE: &str = "ed25519";

#[derive(Debug, Clone)]
pub enum PublicKey {
    Rsa(rsa::RsaPublicKey),
    Ed25519(ed25519_dalek::VerifyingKey),
}

/// A parsed `_domainkey` TXT record (RFC 6376 section 3.6.1's key tags).
#[derive(Debug, Clone)]
pub struct KeyRecord {
    pub key: PublicKey,
    /// `h=`: hash algorithms this key is restricted to, if any.
    pub hash_algos: Option<Vec<String>>,
    /// `t=`: flags, currently only `y` (testing mode) and `s` (strict) are
    /// defined by RFC 6376; we keep the raw set.
    pub flags: Vec<String>,
    /// `g=` (deprecated by RFC 6376 but kept since ATPS references the
    /// same granting mechanism in spirit).
    pub granularity: Option<String>,
    /// `n=`: human-readable notes, unused except for diagnostics.
    pub notes: Option<String>,
}

impl KeyRecord {
    pub fn is_testing(&self) -> bool {
        self.flags.iter().any(|f| f == "y")
    }

    /// Validates the record against the signature's declared hash
    /// algorithm and a minimum RSA key size.
    pub fn validate(&self, hash_algo: HashAlgo, min_rsa_bits: usize) -> Result<(), DKIMError> {
        if let Some(allowed) = &self.hash_algos {
            let short_name = match hash_algo {
                HashAlgo::RsaSha1 => "sha1",
                HashAlgo::RsaSha256 | HashAlgo::Ed25519Sha256 => "sha256",
            };
            if !allowed.iter().any(|a| a == short_name) {
                return Err(DKIMError::KeyHashMismatch(short_name.to_string()));
            }
        }

        match (&self.key, hash_algo) {
            (PublicKey::Rsa(key), HashAlgo::RsaSha1 | HashAlgo::RsaSha256) => {
                use rsa::traits::PublicKeyParts;
                let bits = key.n().bits();
                if bits < min_rsa_bits {
                    return Err(DKIMError::KeyTooSmall(bits, min_rsa_bits));
                }
            }
            (PublicKey::Ed25519(_), HashAlgo::Ed25519Sha256) => {}
            _ => return Err(DKIMError::KeyMismatch),
        }

        Ok(())
    }
}

/// Builds the `<selector>._domainkey.<domain>` query name, validating each
/// label against RFC 1035's 63-octet limit and the 255-octet limit on the
/// whole name.
pub(crate) fn query_name(selector: &str, domain: &str) -> Result<String, DKIMError> {
    let name = format!("{selector}._domainkey.{domain}");
    for label in name.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(DKIMError::KeySyntaxError(format!(
                "invalid DNS label length in query name: {:?}",
                label
            )));
        }
    }
    if name.len() > 255 {
        return Err(DKIMError::KeySyntaxError(
            "query name exceeds 255 octets".to_string(),
        ));
    }
    Ok(name)
}

/// Parses a single `_domainkey` TXT record value into a [`KeyRecord`].
/// <https://datatracker.ietf.org/doc/html/rfc6376#section-3.6.1>
pub(crate) fn parse_key_record(txt: &str) -> Result<KeyRecord, DKIMError> {
    let (_, tags) = parser::tag_list(txt).map_err(|err| {
        tracing::warn!("key syntax error: {}", err);
        DKIMError::KeySyntaxError(err.to_string())
    })?;

    let mut tags_map = std::collections::HashMap::new();
    for tag in &tags {
        tags_map.insert(tag.name.clone(), tag.clone());
    }

    if let Some(version) = tags_map.get("v") {
        if version.value != "DKIM1" {
            return Err(DKIMError::KeyIncompatibleVersion);
        }
    }

    let key_type = match tags_map.get("k") {
        Some(v) => {
            if v.value != RSA_KEY_TYPE && v.value != ED25519_KEY_TYPE {
                return Err(DKIMError::InappropriateKeyAlgorithm);
            }
            v.value.clone()
        }
        None => RSA_KEY_TYPE.to_string(),
    };

    let p_tag = tags_map.get("p").ok_or(DKIMError::NoKeyForSignature)?;
    if p_tag.value.is_empty() {
        return Err(DKIMError::KeyRevoked);
    }

    let bytes = general_purpose::STANDARD
        .decode(&p_tag.value)
        .map_err(|err| DKIMError::CorruptBase64(format!("p= value: {}", err)))?;

    let key = if key_type == RSA_KEY_TYPE {
        PublicKey::Rsa(
            pkcs8::DecodePublicKey::from_public_key_der(&bytes)
                .or_else(|_| pkcs1::DecodeRsaPublicKey::from_pkcs1_der(&bytes))
                .map_err(|err| DKIMError::KeySyntaxError(format!("failed to parse RSA key: {}", err)))?,
        )
    } else {
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| DKIMError::KeySyntaxError("ed25519 public key must be 32 bytes".into()))?;
        PublicKey::Ed25519(
            ed25519_dalek::VerifyingKey::from_bytes(&array)
                .map_err(|err| DKIMError::KeySyntaxError(format!("failed to parse ed25519 key: {}", err)))?,
        )
    };

    let hash_algos = tags_map
        .get("h")
        .map(|t| t.value.split(':').map(|s| s.to_string()).collect());
    let flags = tags_map
        .get("t")
        .map(|t| t.value.split(':').map(|s| s.to_string()).collect())
        .unwrap_or_default();
    let granularity = tags_map.get("g").map(|t| t.value.clone());
    let notes = tags_map.get("n").map(|t| t.value.clone());

    Ok(KeyRecord {
        key,
        hash_algos,
        flags,
        granularity,
        notes,
    })
}
