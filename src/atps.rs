//! ATPS, RFC 6541: lets a domain authorize a third party to sign on its
//! behalf without delegating its whole `_domainkey` tree. Given a verified
//! Signature whose `d=` differs from the author's domain, look up
//! `<sha1-hex-of-d>._atps.<author-domain>` and accept a `v=ATPS1` hit as
//! authorization.

use crate::dns::DnsDriver;
use crate::parser;
use crate::DKIMError;
use data_encoding::HEXLOWER;
use sha1::{Digest, Sha1};
use std::sync::Arc;

const ATPS_ZONE: &str = "_atps";

fn query_name(signing_domain: &str, author_domain: &str) -> String {
    let digest = Sha1::digest(signing_domain.to_ascii_lowercase().as_bytes());
    let hex = HEXLOWER.encode(&digest);
    format!("{hex}.{ATPS_ZONE}.{author_domain}")
}

/// Returns `Ok(true)` if `author_domain`'s ATPS records authorize
/// `signing_domain` as a third-party signer, `Ok(false)` if a record was
/// found but didn't name a recognized ATPS version, and `Err(NoRecord)` if
/// no record exists at all (the common, non-error case of a signer that
/// doesn't participate in ATPS).
pub async fn check_authorization(
    dns: &Arc<dyn DnsDriver>,
    signing_domain: &str,
    author_domain: &str,
) -> Result<bool, DKIMError> {
    if signing_domain.eq_ignore_ascii_case(author_domain) {
        // Same-domain signatures need no third-party authorization.
        return Ok(true);
    }

    let name = query_name(signing_domain, author_domain);
    let records = dns.lookup_txt(&name).await?;

    for txt in &records {
        let Ok((_, tags)) = parser::tag_list(txt) else {
            continue;
        };
        if tags.iter().any(|t| t.name == "v" && t.value == "ATPS1") {
            return Ok(true);
        }
    }
    Ok(false)
}
