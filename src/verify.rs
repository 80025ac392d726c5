//! Whole-message verification convenience over [`crate::context::Context`],
//! the counterpart of [`crate::sign::sign_message`].

use crate::context::{Context, SignatureFlags, Verdict};
use crate::library::LibraryHandle;
use crate::message;
use crate::DKIMError;
use std::sync::Arc;

/// Per-signature detail alongside the combined [`Verdict`] — `eom` itself
/// only reports the worst/best outcome across every `DKIM-Signature` on the
/// message, but callers usually also want to know which domain(s) passed.
pub struct SignatureResult {
    pub signing_domain: Option<String>,
    pub passed: bool,
    pub is_testing: bool,
    pub atps_authorized: Option<bool>,
    pub error: Option<DKIMError>,
}

pub struct VerifyOutcome {
    pub verdict: Verdict,
    pub signatures: Vec<SignatureResult>,
}

/// Verifies every `DKIM-Signature` header present on a complete RFC 5322
/// message.
pub async fn verify_message(
    lib: Arc<LibraryHandle>,
    job: impl Into<String>,
    message: &[u8],
) -> Result<VerifyOutcome, DKIMError> {
    let mut ctx = Context::new_verify(lib, job);

    let (header_block, body) = message::split_message(message);
    for header in message::split_headers(header_block) {
        ctx.header(&header)?;
    }
    ctx.eoh().await?;
    ctx.body(body)?;
    let verdict = ctx.eom().await?;

    let signatures = ctx
        .signatures()
        .iter()
        .map(|sig| SignatureResult {
            signing_domain: sig.signing_domain().map(str::to_string),
            passed: sig.flags.contains(SignatureFlags::PASSED),
            is_testing: sig.is_testing(),
            atps_authorized: sig.atps_authorized,
            error: sig.error.clone(),
        })
        .collect();

    Ok(VerifyOutcome { verdict, signatures })
}
