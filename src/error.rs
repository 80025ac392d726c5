//! Error taxonomy for the DKIM engine.
//!
//! Every error surfaced by this crate carries an implied [`Status`]: whether
//! a conforming verifier should treat it as a transient condition worth
//! retrying (`Tempfail`, e.g. a DNS timeout) or a permanent rejection
//! (`Permfail`, e.g. a malformed signature).

/// DKIM error status, per RFC 6376 section 6.3.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Status {
    Permfail,
    Tempfail,
}

impl Status {
    /// Temporary failures outrank permanent ones when combining the
    /// outcome of several signatures on one message: a verifier must not
    /// let one signature's permfail mask another's unresolved tempfail.
    pub fn worse(self, other: Status) -> Status {
        match (self, other) {
            (Status::Tempfail, _) | (_, Status::Tempfail) => Status::Tempfail,
            _ => Status::Permfail,
        }
    }
}

quick_error! {
    #[derive(Debug, PartialEq, Clone)]
    pub enum DKIMError {
        // -- state machine / API misuse --
        InvalidState(err: &'static str) {
            display("invalid state: {}", err)
        }
        BuilderError(err: &'static str) {
            display("failed to build object: {}", err)
        }

        // -- header / signature syntax --
        BadHeader(err: String) {
            display("malformed header: {}", err)
        }
        SignatureSyntaxError(err: String) {
            display("signature syntax error: {}", err)
        }
        SignatureMissingRequiredTag(name: &'static str) {
            display("signature missing required tag ({})", name)
        }
        MissingFrom {
            display("message has no From header to sign")
        }
        IncompatibleVersion {
            display("incompatible version")
        }
        DomainMismatch {
            display("domain mismatch between i= and d=")
        }
        FromFieldNotSigned {
            display("From field not signed")
        }
        SignatureExpired {
            display("signature expired")
        }
        SignatureNotYetValid {
            display("signature timestamp is in the future")
        }
        UnacceptableSignatureHeader {
            display("unacceptable signature header")
        }
        UnsupportedHashAlgorithm(value: String) {
            display("unsupported hash algorithm: {}", value)
        }
        UnsupportedCanonicalizationType(value: String) {
            display("unsupported canonicalization: {}", value)
        }
        UnsupportedQueryMethod {
            display("unsupported query method")
        }
        CorruptBase64(err: String) {
            display("corrupt base64 value: {}", err)
        }

        // -- key record --
        NoKeyForSignature {
            display("no key for signature")
        }
        NoRecord {
            display("no DNS record found")
        }
        KeySyntaxError(err: String) {
            display("key syntax error: {}", err)
        }
        KeyIncompatibleVersion {
            display("key incompatible version")
        }
        InappropriateKeyAlgorithm {
            display("inappropriate key algorithm")
        }
        KeyRevoked {
            display("key has been revoked (empty p=)")
        }
        KeyMismatch {
            display("key type in record does not match a= algorithm")
        }
        KeyHashMismatch(algo: String) {
            display("key record's h= does not permit hash algorithm {}", algo)
        }
        KeyTooSmall(bits: usize, minimum: usize) {
            display("key is {} bits, smaller than configured minimum of {} bits", bits, minimum)
        }
        PrivateKeyLoadError(err: String) {
            display("failed to load private key: {}", err)
        }

        // -- crypto / verification outcome --
        BadSignature {
            display("signature did not verify")
        }
        BodyHashDidNotVerify {
            display("body hash did not verify")
        }
        MalformedBody {
            display("malformed email body")
        }
        FailedToSign(err: String) {
            display("failed to sign: {}", err)
        }
        HeaderSerializeError(err: String) {
            display("failed to serialize DKIM header: {}", err)
        }

        // -- DNS --
        KeyUnavailable(err: String) {
            display("key unavailable: {}", err)
        }
        DnsTimeout {
            display("DNS query timed out")
        }
        DnsError(err: String) {
            display("DNS error: {}", err)
        }

        // -- resource / internal --
        NoMemory {
            display("allocation failure")
        }
        Io(err: String) {
            display("I/O error: {}", err)
        }
        UnknownInternalError(err: String) {
            display("internal error: {}", err)
        }
    }
}

impl DKIMError {
    pub fn status(&self) -> Status {
        use DKIMError::*;
        match self {
            BadHeader(_)
            | SignatureSyntaxError(_)
            | SignatureMissingRequiredTag(_)
            | MissingFrom
            | IncompatibleVersion
            | DomainMismatch
            | FromFieldNotSigned
            | SignatureExpired
            | SignatureNotYetValid
            | UnacceptableSignatureHeader
            | UnsupportedQueryMethod
            | CorruptBase64(_)
            | NoKeyForSignature
            | NoRecord
            | KeySyntaxError(_)
            | KeyIncompatibleVersion
            | InappropriateKeyAlgorithm
            | KeyRevoked
            | KeyMismatch
            | KeyHashMismatch(_)
            | KeyTooSmall(_, _)
            | BadSignature
            | BodyHashDidNotVerify
            | MalformedBody
            | UnsupportedCanonicalizationType(_)
            | UnsupportedHashAlgorithm(_) => Status::Permfail,

            InvalidState(_)
            | BuilderError(_)
            | PrivateKeyLoadError(_)
            | FailedToSign(_)
            | HeaderSerializeError(_)
            | KeyUnavailable(_)
            | DnsTimeout
            | DnsError(_)
            | NoMemory
            | Io(_)
            | UnknownInternalError(_) => Status::Tempfail,
        }
    }
}
