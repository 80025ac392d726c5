//! Hash algorithm selection and the header/body hash computations that feed
//! the signature, RFC 6376 section 3.7.

use crate::canonicalization::{self, BodyCanonicalizer};
use crate::header::Header;
use crate::DKIMError;
use base64::engine::general_purpose;
use base64::Engine;
use sha1::{Digest as _, Sha1};
use sha2::Sha256;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgo {
    RsaSha1,
    RsaSha256,
    Ed25519Sha256,
}

impl HashAlgo {
    pub fn algo_name(&self) -> &'static str {
        match self {
            Self::RsaSha1 => "rsa-sha1",
            Self::RsaSha256 => "rsa-sha256",
            Self::Ed25519Sha256 => "ed25519-sha256",
        }
    }
}

/// Wraps a hash implementation with the `l=` byte-length cap: bytes beyond
/// the cap are accepted by callers (a verifier still needs to read past the
/// signed prefix to reach the next header) but simply aren't hashed.
pub(crate) struct LimitHasher {
    pub limit: usize,
    pub hashed: usize,
    pub hasher: HashImpl,
}

impl LimitHasher {
    pub fn hash(&mut self, bytes: &[u8]) {
        let remain = self.limit - self.hashed;
        let len = bytes.len().min(remain);
        self.hasher.hash(&bytes[..len]);
        self.hashed += len;
    }

    pub fn finalize(self) -> String {
        self.hasher.finalize()
    }

    #[cfg(test)]
    pub fn finalize_bytes(self) -> Vec<u8> {
        self.hasher.finalize_bytes()
    }
}

pub(crate) enum HashImpl {
    Sha1(Sha1),
    Sha256(Sha256),
    #[cfg(test)]
    Copy(Vec<u8>),
}

impl HashImpl {
    pub fn from_algo(algo: HashAlgo) -> Self {
        match algo {
            HashAlgo::RsaSha1 => Self::Sha1(Sha1::new()),
            HashAlgo::RsaSha256 | HashAlgo::Ed25519Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    #[cfg(test)]
    pub fn copy_data() -> Self {
        Self::Copy(vec![])
    }

    pub fn hash(&mut self, bytes: &[u8]) {
        match self {
            Self::Sha1(hasher) => hasher.update(bytes),
            Self::Sha256(hasher) => hasher.update(bytes),
            #[cfg(test)]
            Self::Copy(data) => data.extend_from_slice(bytes),
        }
    }

    pub fn finalize(self) -> String {
        match self {
            Self::Sha1(hasher) => general_purpose::STANDARD.encode(hasher.finalize()),
            Self::Sha256(hasher) => general_purpose::STANDARD.encode(hasher.finalize()),
            #[cfg(test)]
            Self::Copy(data) => String::from_utf8_lossy(&data).into(),
        }
    }

    pub fn finalize_bytes(self) -> Vec<u8> {
        match self {
            Self::Sha1(hasher) => hasher.finalize().to_vec(),
            Self::Sha256(hasher) => hasher.finalize().to_vec(),
            #[cfg(test)]
            Self::Copy(data) => data,
        }
    }
}

/// Drives a [`BodyCanonicalizer`] and a [`LimitHasher`] together across an
/// arbitrary sequence of `feed()` calls, so [`crate::context::Context`] can
/// hash the body incrementally as it streams in.
pub(crate) struct BodyHasher {
    canon: BodyCanonicalizer,
    hasher: LimitHasher,
}

impl BodyHasher {
    pub(crate) fn new(ty: canonicalization::Type, hash_algo: HashAlgo, length: Option<usize>) -> Self {
        Self {
            canon: BodyCanonicalizer::new(ty),
            hasher: LimitHasher {
                hasher: HashImpl::from_algo(hash_algo),
                limit: length.unwrap_or(usize::MAX),
                hashed: 0,
            },
        }
    }

    pub(crate) fn feed(&mut self, bytes: &[u8]) {
        self.canon.feed(bytes, &mut self.hasher);
    }

    pub(crate) fn finalize(self) -> String {
        let Self { canon, mut hasher } = self;
        canon.finalize(&mut hasher);
        hasher.finalize()
    }

    /// Like [`Self::finalize`] but also returns the number of canonicalized
    /// bytes actually hashed — needed to fill in `l=` when a signer binds
    /// the signature to the body's true length rather than a caller-chosen
    /// cap.
    pub(crate) fn finalize_with_length(self) -> (String, usize) {
        let Self { canon, mut hasher } = self;
        canon.finalize(&mut hasher);
        let hashed = hasher.hashed;
        (hasher.finalize(), hashed)
    }
}

/// One-shot body hash over a complete, already-available body buffer.
/// Used by tests and by callers that hand the engine a whole message at
/// once rather than streaming it.
pub(crate) fn compute_body_hash(
    canonicalization_type: canonicalization::Type,
    length: Option<&str>,
    hash_algo: HashAlgo,
    body: &[u8],
) -> Result<String, DKIMError> {
    let limit = match length {
        Some(length) => Some(
            length
                .parse::<usize>()
                .map_err(|err| DKIMError::SignatureSyntaxError(format!("invalid length: {}", err)))?,
        ),
        None => None,
    };

    let mut hasher = BodyHasher::new(canonicalization_type, hash_algo, limit);
    hasher.feed(body);
    Ok(hasher.finalize())
}

/// Implements the `h=` binding rule of RFC 6376 section 5.4: each named
/// header (left to right) consumes the next-most-recent not-yet-consumed
/// occurrence of that header name, counting from the bottom of the message.
/// A name with no remaining occurrence contributes nothing (over-signing).
pub(crate) fn select_headers<'a>(
    dkim_header: &str,
    headers: &'a [Header],
) -> Vec<(&'a str, &'a [u8])> {
    let mut signed_headers = vec![];

    let num_headers = headers.len();
    let mut last_index: HashMap<&str, usize> = HashMap::new();

    'outer: for name in dkim_header.split(':').map(|h| h.trim()) {
        let index = *last_index.get(name).unwrap_or(&num_headers);
        for (header_index, header) in headers.iter().enumerate().rev().skip(num_headers - index) {
            if header.name.eq_ignore_ascii_case(name) {
                signed_headers.push((header.name.as_str(), header.value.as_slice()));
                last_index.insert(name, header_index);
                continue 'outer;
            }
        }

        last_index.insert(name, 0);
    }

    signed_headers
}

/// Computes the signed-data hash: the canonicalized selected headers
/// followed by the canonicalized `DKIM-Signature` header itself with `b=`
/// blanked out and its trailing CRLF removed.
pub(crate) fn compute_headers_hash(
    canonicalization_type: canonicalization::Type,
    h_tag: &str,
    hash_algo: HashAlgo,
    dkim_signature_raw: &str,
    b_tag_raw_value: &str,
    headers: &[Header],
) -> Result<Vec<u8>, DKIMError> {
    let mut input = Vec::new();
    let mut hasher = HashImpl::from_algo(hash_algo);

    for (key, value) in select_headers(h_tag, headers) {
        canonicalization_type.canon_header_into(key, value, &mut input);
    }

    {
        let value = dkim_signature_raw.replace(b_tag_raw_value, "");
        let mut canonicalized_value = vec![];
        canonicalization_type.canon_header_into("DKIM-Signature", value.as_bytes(), &mut canonicalized_value);

        // Remove the trailing "\r\n": the signature header is the last
        // header hashed and is never itself CRLF-terminated in the hash
        // input.
        canonicalized_value.truncate(canonicalized_value.len() - 2);

        input.extend_from_slice(&canonicalized_value);
    }
    tracing::debug!(bytes = input.len(), "header hash input assembled");

    hasher.hash(&input);
    Ok(hasher.finalize_bytes())
}
