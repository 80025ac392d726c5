//! Whole-message signing convenience, driving [`crate::context::Context`]
//! end-to-end for callers who already have a complete RFC 5322 message in
//! memory rather than feeding it to the streaming API line by line.

use crate::canonicalization;
use crate::context::Context;
use crate::hash::HashAlgo;
use crate::library::LibraryHandle;
use crate::message;
use crate::DKIMError;
use std::sync::Arc;

/// One signature to produce, the per-signature counterpart of the
/// teacher's `SignerBuilder`. Build with [`SignRequest::new`] then chain the
/// `with_*` setters; everything but key/selector/domain has a sane default.
pub struct SignRequest<'a> {
    pub secret_key_pem: &'a [u8],
    pub selector: &'a str,
    pub domain: &'a str,
    pub auid: Option<String>,
    pub header_canon: canonicalization::Type,
    pub body_canon: canonicalization::Type,
    pub hash_algo: Option<HashAlgo>,
    pub length_cap: Option<i64>,
}

impl<'a> SignRequest<'a> {
    pub fn new(secret_key_pem: &'a [u8], selector: &'a str, domain: &'a str) -> Self {
        Self {
            secret_key_pem,
            selector,
            domain,
            auid: None,
            header_canon: canonicalization::Type::Relaxed,
            body_canon: canonicalization::Type::Relaxed,
            hash_algo: None,
            length_cap: None,
        }
    }

    /// Sets the `i=` identity tag; without this, signing binds only `d=`.
    pub fn with_auid(mut self, auid: impl Into<String>) -> Self {
        self.auid = Some(auid.into());
        self
    }

    pub fn with_canonicalization(
        mut self,
        header: canonicalization::Type,
        body: canonicalization::Type,
    ) -> Self {
        self.header_canon = header;
        self.body_canon = body;
        self
    }

    pub fn with_hash_algo(mut self, algo: HashAlgo) -> Self {
        self.hash_algo = Some(algo);
        self
    }

    /// `None` emits no `l=` tag; `Some(n)` caps the hashed body at `n`
    /// bytes.
    pub fn with_length_cap(mut self, cap: i64) -> Self {
        self.length_cap = Some(cap);
        self
    }
}

/// Signs a complete message, one or more times (e.g. a dual RSA+Ed25519
/// signature), returning each rendered `DKIM-Signature:` header text in the
/// order the requests were supplied — prepend them to the message, in that
/// order, ahead of the existing headers.
pub async fn sign_message(
    lib: Arc<LibraryHandle>,
    job: impl Into<String>,
    message: &[u8],
    requests: &[SignRequest<'_>],
) -> Result<Vec<String>, DKIMError> {
    let Some(first) = requests.first() else {
        return Err(DKIMError::BuilderError(
            "sign_message requires at least one SignRequest",
        ));
    };

    let mut ctx = Context::new_sign(
        Arc::clone(&lib),
        job,
        first.secret_key_pem,
        first.selector,
        first.domain,
        first.auid.clone(),
        first.header_canon,
        first.body_canon,
        first.hash_algo,
        first.length_cap,
    )?;
    for extra in &requests[1..] {
        ctx.add_signature(
            extra.secret_key_pem,
            extra.selector,
            extra.domain,
            extra.auid.clone(),
            extra.header_canon,
            extra.body_canon,
            extra.hash_algo,
            extra.length_cap,
        )?;
    }

    let (header_block, body) = message::split_message(message);
    for header in message::split_headers(header_block) {
        ctx.header(&header)?;
    }
    ctx.eoh().await?;
    ctx.body(body)?;
    ctx.eom().await?;

    Ok(ctx
        .signatures()
        .iter()
        .map(|sig| sig.rendered_header().unwrap_or_default().to_string())
        .collect())
}
