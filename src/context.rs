//! The streaming message state machine: `Init -> Headers -> Eoh -> Body ->
//! Eom -> Done`. Each phase delegates to the per-concern modules
//! (`canonicalization`, `hash`, `header`, `keyrecord`, `crypto`, `dns`)
//! underneath rather than working over an already fully-parsed message.

use crate::atps;
use crate::canonicalization;
use crate::crypto::{self, PrivateKey};
use crate::hash::{self, BodyHasher, HashAlgo};
use crate::header::{DKIMHeaderBuilder, Header, TaggedHeader, DKIM_SIGNATURE_HEADER_NAME};
use crate::keyrecord::{self, KeyRecord};
use crate::library::LibraryHandle;
use crate::parser;
use crate::DKIMError;
use base64::engine::general_purpose;
use base64::Engine;
use bitflags::bitflags;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const MAXHEADER: usize = 4096;
const KEY_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Headers,
    Eoh,
    Body,
    Eom,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sign,
    Verify,
}

bitflags! {
    /// Per-signature processing flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SignatureFlags: u32 {
        const PROCESSED = 1 << 0;
        const IGNORE = 1 << 1;
        const KEYLOADED = 1 << 2;
        const PASSED = 1 << 3;
        const ERROR = 1 << 4;
    }
}

/// Overall outcome of an `eom` call.
#[derive(Debug, Clone)]
pub enum Verdict {
    Pass,
    Fail(DKIMError),
}

/// A signing request registered before `eoh` via `new_sign`/`add_signature`.
struct SignRequest {
    private_key: PrivateKey,
    selector: String,
    domain: String,
    /// `i=` identity tag (RFC 6376 section 3.5), when the caller names one
    /// distinct from the bare `d=` domain.
    auid: Option<String>,
    header_canon: canonicalization::Type,
    body_canon: canonicalization::Type,
    hash_algo: HashAlgo,
    /// `None` disables length binding (`l=n` not emitted); `Some(n)` caps
    /// the hashed body prefix at `n` bytes and is always emitted as `l=n`.
    length_cap: Option<usize>,
    /// Set at `eoh` from `FLAGS::SIGN_LENGTH` when the caller didn't supply
    /// an explicit `length_cap`: binds `l=` to the body's true length,
    /// discovered only once the body has been fully hashed at `eom`.
    bind_full_length: bool,
}

enum SignatureState {
    Verify {
        /// `None` when the `DKIM-Signature` header itself failed to parse;
        /// the Signature is retained with `error` set.
        tagged: Option<TaggedHeader>,
        key_lookup: Option<JoinHandle<Result<KeyRecord, DKIMError>>>,
    },
    Sign {
        request: SignRequest,
        selected_headers: Vec<String>,
        rendered: Option<String>,
    },
}

/// One `DKIM-Signature`, verify- or sign-side.
pub struct Signature {
    pub canon: (canonicalization::Type, canonicalization::Type),
    pub hash_algo: HashAlgo,
    pub flags: SignatureFlags,
    pub error: Option<DKIMError>,
    pub body_hash: Option<String>,
    pub header_hash: Option<Vec<u8>>,
    pub key_record: Option<KeyRecord>,
    pub atps_authorized: Option<bool>,
    body_hasher: Option<BodyHasher>,
    state: SignatureState,
}

impl Signature {
    fn new_verify(
        canon: (canonicalization::Type, canonicalization::Type),
        hash_algo: HashAlgo,
        body_hasher: Option<BodyHasher>,
        tagged: Option<TaggedHeader>,
        key_lookup: Option<JoinHandle<Result<KeyRecord, DKIMError>>>,
        error: Option<DKIMError>,
    ) -> Self {
        let mut flags = SignatureFlags::PROCESSED;
        if error.is_some() {
            flags |= SignatureFlags::ERROR;
        }
        Self {
            canon,
            hash_algo,
            flags,
            error,
            body_hash: None,
            header_hash: None,
            key_record: None,
            atps_authorized: None,
            body_hasher,
            state: SignatureState::Verify { tagged, key_lookup },
        }
    }

    fn new_sign(request: SignRequest, selected_headers: Vec<String>, body_hasher: BodyHasher) -> Self {
        let canon = (request.header_canon, request.body_canon);
        let hash_algo = request.hash_algo;
        Self {
            canon,
            hash_algo,
            flags: SignatureFlags::PROCESSED,
            error: None,
            body_hash: None,
            header_hash: None,
            key_record: None,
            atps_authorized: None,
            body_hasher: Some(body_hasher),
            state: SignatureState::Sign {
                request,
                selected_headers,
                rendered: None,
            },
        }
    }

    /// The final `DKIM-Signature: ...` header text, available after `eom`
    /// in sign mode.
    pub fn rendered_header(&self) -> Option<&str> {
        match &self.state {
            SignatureState::Sign { rendered, .. } => rendered.as_deref(),
            SignatureState::Verify { .. } => None,
        }
    }

    /// `d=` of a verify-mode signature that parsed successfully.
    pub fn signing_domain(&self) -> Option<&str> {
        match &self.state {
            SignatureState::Verify {
                tagged: Some(tagged),
                ..
            } => tagged.get_tag("d"),
            _ => None,
        }
    }

    pub fn is_testing(&self) -> bool {
        self.key_record.as_ref().map(|k| k.is_testing()).unwrap_or(false)
    }
}

/// Pulls the domain out of the `From:` header's address for the ATPS check,
/// RFC 6541 section 3.1. Accepts both `user@domain` and `Name <user@domain>`
/// forms; returns `None` if there's no `From` header or no `@` in it.
fn author_domain(headers: &[Header]) -> Option<String> {
    let from = headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("From"))?;
    let value = String::from_utf8_lossy(&from.value);
    let addr = value.rsplit_once('<').map(|(_, rest)| rest).unwrap_or(&value);
    let addr = addr.trim_end_matches('>').trim();
    let (_, domain) = addr.rsplit_once('@')?;
    Some(domain.trim().trim_end_matches(|c: char| c == ';' || c == ',').to_string())
}

fn fix_bare_lf(pending_cr: &mut bool, bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    for &b in bytes {
        if b == b'\n' && !*pending_cr {
            out.push(b'\r');
        }
        out.push(b);
        *pending_cr = b == b'\r';
    }
    out
}

/// One DKIM processing session. Exclusively owned by its creator between
/// `new_sign`/`new_verify` and drop.
pub struct Context {
    lib: Arc<LibraryHandle>,
    #[allow(dead_code)]
    job: String,
    mode: Mode,
    phase: Phase,
    headers: Vec<Header>,
    signatures: Vec<Signature>,
    sign_requests: Vec<SignRequest>,
    failed: bool,
    fix_crlf: bool,
    pending_cr: bool,
}

impl Context {
    fn new(lib: Arc<LibraryHandle>, job: impl Into<String>, mode: Mode) -> Self {
        let fix_crlf = lib.flags().contains(crate::library::Flags::FIX_CRLF);
        Self {
            lib,
            job: job.into(),
            mode,
            phase: Phase::Init,
            headers: Vec::new(),
            signatures: Vec::new(),
            sign_requests: Vec::new(),
            failed: false,
            fix_crlf,
            pending_cr: false,
        }
    }

    /// Validates the private key and `alg`/key-family compatibility,
    /// returning `PrivateKeyLoadError` otherwise.
    #[allow(clippy::too_many_arguments)]
    pub fn new_sign(
        lib: Arc<LibraryHandle>,
        job: impl Into<String>,
        secret_key_pem: &[u8],
        selector: impl Into<String>,
        domain: impl Into<String>,
        auid: Option<String>,
        header_canon: canonicalization::Type,
        body_canon: canonicalization::Type,
        alg: Option<HashAlgo>,
        length_cap: Option<i64>,
    ) -> Result<Self, DKIMError> {
        let mut ctx = Self::new(lib, job, Mode::Sign);
        ctx.add_signature(
            secret_key_pem,
            selector,
            domain,
            auid,
            header_canon,
            body_canon,
            alg,
            length_cap,
        )?;
        Ok(ctx)
    }

    /// Registers an additional signing request before `eoh`, e.g. to
    /// produce a dual RSA+Ed25519 signature on one message.
    #[allow(clippy::too_many_arguments)]
    pub fn add_signature(
        &mut self,
        secret_key_pem: &[u8],
        selector: impl Into<String>,
        domain: impl Into<String>,
        auid: Option<String>,
        header_canon: canonicalization::Type,
        body_canon: canonicalization::Type,
        alg: Option<HashAlgo>,
        length_cap: Option<i64>,
    ) -> Result<(), DKIMError> {
        if self.mode != Mode::Sign {
            return Err(DKIMError::InvalidState("add_signature is sign-mode only"));
        }
        if !matches!(self.phase, Phase::Init | Phase::Headers) {
            self.failed = true;
            return Err(DKIMError::InvalidState(
                "add_signature must happen before eoh",
            ));
        }

        let private_key = PrivateKey::from_pem(secret_key_pem)?;
        let hash_algo = match alg {
            Some(algo) => {
                if !private_key.compatible_with(algo) {
                    return Err(DKIMError::PrivateKeyLoadError(format!(
                        "key type incompatible with requested algorithm {}",
                        algo.algo_name()
                    )));
                }
                algo
            }
            None => private_key.default_hash_algo(),
        };

        let length_cap = match length_cap {
            Some(n) if n < 0 => None,
            Some(n) => Some(n as usize),
            None => None,
        };

        self.sign_requests.push(SignRequest {
            private_key,
            selector: selector.into(),
            domain: domain.into(),
            auid,
            header_canon,
            body_canon,
            hash_algo,
            length_cap,
            bind_full_length: false,
        });
        Ok(())
    }

    pub fn new_verify(lib: Arc<LibraryHandle>, job: impl Into<String>) -> Self {
        Self::new(lib, job, Mode::Verify)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    fn check_phase(&mut self, allowed: &[Phase]) -> Result<(), DKIMError> {
        if self.failed || !allowed.contains(&self.phase) {
            self.failed = true;
            return Err(DKIMError::InvalidState(
                "operation not valid in the current phase",
            ));
        }
        Ok(())
    }

    /// Feeds one header field; accepted only in `Init`/`Headers`.
    pub fn header(&mut self, bytes: &[u8]) -> Result<(), DKIMError> {
        self.check_phase(&[Phase::Init, Phase::Headers])?;
        self.phase = Phase::Headers;

        if bytes.len() > MAXHEADER {
            self.failed = true;
            return Err(DKIMError::BadHeader(format!(
                "header exceeds MAXHEADER ({MAXHEADER} bytes)"
            )));
        }

        let Some(colon) = bytes.iter().position(|&b| b == b':') else {
            self.failed = true;
            return Err(DKIMError::BadHeader("missing ':' separator".to_string()));
        };

        let name_bytes = &bytes[..colon];
        if name_bytes.is_empty()
            || !name_bytes
                .iter()
                .all(|&b| (0x21..=0x7e).contains(&b))
        {
            self.failed = true;
            return Err(DKIMError::BadHeader(
                "header name contains non-printable-ASCII".to_string(),
            ));
        }
        let name = std::str::from_utf8(name_bytes)
            .map_err(|err| DKIMError::BadHeader(format!("header name is not UTF-8: {err}")))?
            .to_string();

        let mut value = &bytes[colon + 1..];
        if value.first() == Some(&b' ') {
            value = &value[1..];
        }

        self.headers.push(Header {
            name,
            value: value.to_vec(),
            raw: bytes.to_vec(),
        });
        Ok(())
    }

    /// `eoh`. Closes the Signature list: no Signature may be added or
    /// removed after this call returns.
    pub async fn eoh(&mut self) -> Result<(), DKIMError> {
        self.check_phase(&[Phase::Init, Phase::Headers])?;
        self.phase = Phase::Eoh;

        match self.mode {
            Mode::Sign => self.eoh_sign()?,
            Mode::Verify => self.eoh_verify().await?,
        }
        Ok(())
    }

    fn eoh_sign(&mut self) -> Result<(), DKIMError> {
        let sign_hdrs = self.lib.sign_headers();
        let skip_hdrs = self.lib.skip_headers();
        let oversign_hdrs = self.lib.oversign_headers();
        let sign_length_flag = self
            .lib
            .flags()
            .contains(crate::library::Flags::SIGN_LENGTH);

        let requests = std::mem::take(&mut self.sign_requests);
        for mut request in requests {
            let mut names = Vec::new();
            for header in &self.headers {
                if skip_hdrs.iter().any(|s| s.eq_ignore_ascii_case(&header.name)) {
                    continue;
                }
                if sign_hdrs.iter().any(|s| s.eq_ignore_ascii_case(&header.name)) {
                    names.push(header.name.clone());
                }
            }
            for name in &oversign_hdrs {
                names.push(name.clone());
            }

            if !names.iter().any(|n| n.eq_ignore_ascii_case("from")) {
                return Err(DKIMError::MissingFrom);
            }

            request.bind_full_length = sign_length_flag && request.length_cap.is_none();

            let body_hasher = BodyHasher::new(request.body_canon, request.hash_algo, request.length_cap);
            self.signatures
                .push(Signature::new_sign(request, names, body_hasher));
        }
        Ok(())
    }

    async fn eoh_verify(&mut self) -> Result<(), DKIMError> {
        let dns = self.lib.dns()?;

        let dkim_headers: Vec<Header> = self
            .headers
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case(DKIM_SIGNATURE_HEADER_NAME))
            .cloned()
            .collect();

        for header in dkim_headers {
            let value = String::from_utf8_lossy(&header.value).into_owned();
            match crate::header::DKIMHeader::parse(&value)
                .map(|h| (*h).clone())
            {
                Ok(tagged) => {
                    let hash_algo = match parser::parse_hash_algo(tagged.get_required_tag("a")) {
                        Ok(a) => a,
                        Err(err) => {
                            self.signatures.push(Signature::new_verify(
                                (canonicalization::Type::Simple, canonicalization::Type::Simple),
                                HashAlgo::RsaSha256,
                                None,
                                Some(tagged),
                                None,
                                Some(err),
                            ));
                            continue;
                        }
                    };
                    let canon = match parser::parse_canonicalization(tagged.get_tag("c")) {
                        Ok(c) => c,
                        Err(err) => {
                            self.signatures.push(Signature::new_verify(
                                (canonicalization::Type::Simple, canonicalization::Type::Simple),
                                hash_algo,
                                None,
                                Some(tagged),
                                None,
                                Some(err),
                            ));
                            continue;
                        }
                    };
                    let length_cap = tagged.get_tag("l").and_then(|l| l.parse::<usize>().ok());
                    let body_hasher = BodyHasher::new(canon.1, hash_algo, length_cap);

                    let selector = tagged.get_required_tag("s").to_string();
                    let domain = tagged.get_required_tag("d").to_string();
                    let dns = Arc::clone(&dns);
                    let lookup = match keyrecord::query_name(&selector, &domain) {
                        Ok(qname) => {
                            self.lib.note_query_issued();
                            Some(tokio::spawn(async move {
                                let records = dns.lookup_txt(&qname).await?;
                                let record = records
                                    .first()
                                    .ok_or(DKIMError::NoRecord)
                                    .and_then(|txt| crate::keyrecord::parse_key_record(txt))?;
                                Ok(record)
                            }))
                        }
                        Err(err) => {
                            self.signatures.push(Signature::new_verify(
                                canon,
                                hash_algo,
                                None,
                                Some(tagged),
                                None,
                                Some(err),
                            ));
                            continue;
                        }
                    };

                    self.signatures.push(Signature::new_verify(
                        canon,
                        hash_algo,
                        Some(body_hasher),
                        Some(tagged),
                        lookup,
                        None,
                    ));
                }
                Err(err) => {
                    self.signatures.push(Signature::new_verify(
                        (canonicalization::Type::Simple, canonicalization::Type::Simple),
                        HashAlgo::RsaSha256,
                        None,
                        None,
                        None,
                        Some(err),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Feeds body bytes; accepted in `Eoh` or `Body`.
    pub fn body(&mut self, bytes: &[u8]) -> Result<(), DKIMError> {
        self.check_phase(&[Phase::Eoh, Phase::Body])?;
        self.phase = Phase::Body;

        let effective = if self.fix_crlf {
            fix_bare_lf(&mut self.pending_cr, bytes)
        } else {
            bytes.to_vec()
        };

        for sig in &mut self.signatures {
            if let Some(hasher) = sig.body_hasher.as_mut() {
                hasher.feed(&effective);
            }
        }
        Ok(())
    }

    /// Ends the message: finalizes every Signature's `bh`, computes the
    /// header hash, then signs or verifies.
    pub async fn eom(&mut self) -> Result<Verdict, DKIMError> {
        self.check_phase(&[Phase::Eoh, Phase::Body])?;
        self.phase = Phase::Eom;

        let verdict = match self.mode {
            Mode::Sign => self.eom_sign()?,
            Mode::Verify => self.eom_verify().await?,
        };

        self.phase = Phase::Done;
        Ok(verdict)
    }

    fn eom_sign(&mut self) -> Result<Verdict, DKIMError> {
        let now = self.lib.fixed_time().unwrap_or_else(|| {
            chrono::Utc::now().timestamp()
        });
        let time = chrono::DateTime::from_timestamp(now, 0).ok_or(DKIMError::FailedToSign(
            "invalid fixed time".to_string(),
        ))?;

        let headers = self.headers.clone();

        for sig in &mut self.signatures {
            let body_hasher = sig.body_hasher.take().expect("sign signature always has a body hasher");
            let (body_hash, hashed_len) = body_hasher.finalize_with_length();

            let SignatureState::Sign {
                request,
                selected_headers,
                rendered,
            } = &mut sig.state
            else {
                continue;
            };

            let mut builder = DKIMHeaderBuilder::new()
                .add_tag("v", "1")
                .add_tag("a", request.hash_algo.algo_name())
                .add_tag(
                    "c",
                    &format!(
                        "{}/{}",
                        request.header_canon.canon_name(),
                        request.body_canon.canon_name()
                    ),
                )
                .add_tag("d", &request.domain);
            if let Some(auid) = &request.auid {
                builder = builder.add_tag("i", auid);
            }
            builder = builder
                .add_tag("q", "dns/txt")
                .add_tag("s", &request.selector)
                .set_time(time);

            builder = builder.set_signed_headers(selected_headers);

            let length_to_emit = request.length_cap.or(if request.bind_full_length {
                Some(hashed_len)
            } else {
                None
            });
            if let Some(cap) = length_to_emit {
                builder = builder.add_tag("l", &cap.to_string());
            }

            builder = builder.add_tag("bh", &body_hash);

            let blanked = builder.clone().add_tag("b", "").build();
            let h_tag = blanked.get_required_tag("h").to_string();
            let header_hash = hash::compute_headers_hash(
                request.header_canon,
                &h_tag,
                request.hash_algo,
                blanked.raw(),
                "",
                &headers,
            )?;

            let raw_sig = crypto::sign(request.hash_algo, &request.private_key, &header_hash)?;
            let b64 = general_purpose::STANDARD.encode(raw_sig);

            let final_tagged = builder.add_tag("b", &b64).build();
            *rendered = Some(format!(
                "{DKIM_SIGNATURE_HEADER_NAME}: {}",
                final_tagged.raw()
            ));

            sig.header_hash = Some(header_hash);
            sig.body_hash = Some(body_hash);
            sig.flags |= SignatureFlags::PASSED;
        }

        Ok(Verdict::Pass)
    }

    async fn eom_verify(&mut self) -> Result<Verdict, DKIMError> {
        let headers = self.headers.clone();
        let min_key_bits = self.lib.min_key_bits();
        let allow_b64_bleed = self
            .lib
            .flags()
            .contains(crate::library::Flags::ALLOW_B64_BLEED);

        let mut worst: Option<DKIMError> = None;
        let mut any_pass = false;

        for sig in &mut self.signatures {
            if sig.error.is_some() {
                worst = Some(promote(worst, sig.error.clone().unwrap()));
                continue;
            }

            let body_hasher = sig
                .body_hasher
                .take()
                .expect("verify signature always has a body hasher when error is None");
            let body_hash = body_hasher.finalize();
            sig.body_hash = Some(body_hash.clone());

            let tagged = match &sig.state {
                SignatureState::Verify {
                    tagged: Some(t), ..
                } => t.clone(),
                _ => continue,
            };

            let result = verify_one(
                sig,
                &tagged,
                &body_hash,
                &headers,
                min_key_bits,
                allow_b64_bleed,
            )
            .await;

            match result {
                Ok(()) => {
                    sig.flags |= SignatureFlags::PASSED;
                    any_pass = true;

                    if let (Some(signing_domain), Some(author_domain)) =
                        (sig.signing_domain().map(str::to_string), author_domain(&headers))
                    {
                        sig.atps_authorized = match self.lib.dns() {
                            Ok(dns) => match atps::check_authorization(
                                &dns,
                                &signing_domain,
                                &author_domain,
                            )
                            .await
                            {
                                Ok(authorized) => Some(authorized),
                                Err(DKIMError::NoRecord) => Some(false),
                                Err(_) => None,
                            },
                            Err(_) => None,
                        };
                    }
                }
                Err(err) => {
                    sig.flags |= SignatureFlags::ERROR;
                    sig.error = Some(err.clone());
                    worst = Some(promote(worst, err));
                }
            }
        }

        if any_pass {
            Ok(Verdict::Pass)
        } else {
            Ok(Verdict::Fail(worst.unwrap_or(DKIMError::NoKeyForSignature)))
        }
    }
}

async fn verify_one(
    sig: &mut Signature,
    tagged: &TaggedHeader,
    body_hash: &str,
    headers: &[Header],
    min_key_bits: usize,
    allow_b64_bleed: bool,
) -> Result<(), DKIMError> {
    if tagged.get_required_tag("bh") != body_hash {
        return Err(DKIMError::BodyHashDidNotVerify);
    }

    let h_tag = tagged.get_required_tag("h").to_string();
    let b_raw = tagged.get_required_raw_tag("b").to_string();
    let header_hash = hash::compute_headers_hash(
        sig.canon.0,
        &h_tag,
        sig.hash_algo,
        tagged.raw(),
        &b_raw,
        headers,
    )?;
    sig.header_hash = Some(header_hash.clone());

    let key_lookup = match &mut sig.state {
        SignatureState::Verify { key_lookup, .. } => key_lookup.take(),
        _ => None,
    };
    let Some(handle) = key_lookup else {
        return Err(DKIMError::NoKeyForSignature);
    };
    let key_record = tokio::time::timeout(KEY_LOOKUP_TIMEOUT, handle)
        .await
        .map_err(|_| DKIMError::DnsTimeout)?
        .map_err(|err| DKIMError::UnknownInternalError(err.to_string()))??;

    key_record.validate(sig.hash_algo, min_key_bits)?;
    sig.flags |= SignatureFlags::KEYLOADED;
    sig.key_record = Some(key_record.clone());

    let b_value = tagged.get_tag("b").unwrap_or_default();
    let sig_bytes = decode_signature(b_value, allow_b64_bleed)?;

    if !crypto::verify(sig.hash_algo, &key_record.key, &header_hash, &sig_bytes)? {
        return Err(DKIMError::BadSignature);
    }
    Ok(())
}

fn decode_signature(value: &str, allow_b64_bleed: bool) -> Result<Vec<u8>, DKIMError> {
    let decode = |v: &str| {
        general_purpose::STANDARD
            .decode(v)
            .map_err(|err| DKIMError::CorruptBase64(format!("b= value: {err}")))
    };
    match decode(value) {
        Ok(bytes) => Ok(bytes),
        Err(err) if allow_b64_bleed => {
            let mut padded = value.to_string();
            while padded.len() % 4 != 0 {
                padded.push('=');
            }
            decode(&padded).map_err(|_| err)
        }
        Err(err) => Err(err),
    }
}

/// "Worst" error: a tempfail outranks any permfail when combining multiple
/// Signatures' errors into one overall verdict.
fn promote(current: Option<DKIMError>, candidate: DKIMError) -> DKIMError {
    match current {
        None => candidate,
        Some(current) => {
            if current.status().worse(candidate.status()) == current.status() {
                current
            } else {
                candidate
            }
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        for sig in &mut self.signatures {
            if let SignatureState::Verify {
                key_lookup: Some(handle),
                ..
            } = &mut sig.state
            {
                handle.abort();
            }
        }
    }
}
