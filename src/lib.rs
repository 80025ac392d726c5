//! DKIM (RFC 6376), Ed25519 DKIM signatures (RFC 8463), and ATPS (RFC 6541)
//! as a streaming engine: a [`context::Context`] is fed headers and body
//! incrementally through `header`/`eoh`/`body`/`eom`, producing either a
//! rendered `DKIM-Signature` header (Sign mode) or a [`context::Verdict`]
//! (Verify mode). [`sign::sign_message`]/[`verify::verify_message`] wrap
//! the whole thing for callers that already have a complete message.

#[macro_use]
extern crate quick_error;

pub mod atps;
pub mod canonicalization;
pub mod context;
pub mod crypto;
pub mod dns;
mod error;
pub mod hash;
pub mod header;
pub mod keyrecord;
pub mod library;
mod message;
mod parser;
mod properties_test;
pub mod sign;
pub mod verify;

pub use context::{Context, Mode, Phase, Signature, SignatureFlags, Verdict};
pub use crypto::PrivateKey;
pub use error::{DKIMError, Status};
pub use hash::HashAlgo;
pub use header::Header;
pub use keyrecord::{KeyRecord, PublicKey};
pub use library::{ConfigKey, ConfigValue, Flags, LibraryHandle, QueryMethod};
pub use sign::{sign_message, SignRequest};
pub use verify::{verify_message, SignatureResult, VerifyOutcome};
