//! Process-wide configuration shared across [`crate::context::Context`]es:
//! the `LibraryHandle` and the configuration surface it exposes.

use crate::canonicalization;
use crate::dns::{DnsDriver, FileDriver, HickoryDriver};
use crate::DKIMError;
use bitflags::bitflags;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

bitflags! {
    /// Behavioral flags controlling signing and verification.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u32 {
        /// Treat bare LF in the body as CRLF, both when signing and
        /// verifying.
        const FIX_CRLF = 1 << 0;
        /// Emit `l=` on signing, binding the signed body to its exact
        /// length at sign time.
        const SIGN_LENGTH = 1 << 1;
        /// Keep any temporary files the host creates on our behalf
        /// (meaningful only to callers that use file-backed buffering;
        /// this crate itself never writes temp files).
        const KEEP_TEMPFILES = 1 << 2;
        const TMPFILES = 1 << 3;
        /// Tolerate peers who truncate trailing `=` padding from base64
        /// `b=`/`bh=` values, padding them back out before decode instead
        /// of rejecting with `CORRUPT_B64`. Off by default.
        const ALLOW_B64_BLEED = 1 << 4;
    }
}

/// Selects where key and ATPS records are looked up: live DNS or a
/// file-backed stand-in for tests. Paired with `QUERYINFO` (the path, when
/// `File`) rather than carrying the path itself, matching spec section 6's
/// two separate config keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryMethod {
    Dns,
    File,
}

/// Keys accepted by [`LibraryHandle::set`].
#[derive(Debug, Clone)]
pub enum ConfigKey {
    FixedTime,
    Flags,
    QueryMethod,
    QueryInfo,
    MinKeyBits,
    SignHdrs,
    SkipHdrs,
    OversignHdrs,
    SenderHdrs,
    ClockDrift,
}

/// Values paired with a [`ConfigKey`] in [`LibraryHandle::set`].
#[derive(Debug, Clone)]
pub enum ConfigValue {
    Time(i64),
    Flags(Flags),
    QueryMethod(QueryMethod),
    /// Opaque per spec section 6; this crate only ever interprets it as a
    /// filesystem path, used when `QUERYMETHOD` is `File`.
    QueryInfo(PathBuf),
    MinKeyBits(usize),
    HeaderList(Vec<String>),
    Duration(Duration),
}

/// Header names signed by default when a caller doesn't supply its own
/// list. Order here is the order they'll appear in `h=` for headers that
/// are all present.
pub fn default_signed_headers() -> Vec<String> {
    [
        "From",
        "Reply-To",
        "Subject",
        "Date",
        "To",
        "Cc",
        "Message-ID",
        "MIME-Version",
        "Content-Type",
        "Content-Transfer-Encoding",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

struct MutableConfig {
    flags: Flags,
    fixed_time: Option<i64>,
    query_method: QueryMethod,
    query_info: Option<PathBuf>,
    min_key_bits: usize,
    sign_hdrs: Vec<String>,
    skip_hdrs: Vec<String>,
    oversign_hdrs: Vec<String>,
    sender_hdrs: Vec<String>,
    clock_drift: Duration,
}

impl Default for MutableConfig {
    fn default() -> Self {
        Self {
            flags: Flags::empty(),
            fixed_time: None,
            query_method: QueryMethod::Dns,
            query_info: None,
            min_key_bits: 1024,
            sign_hdrs: default_signed_headers(),
            skip_hdrs: Vec::new(),
            oversign_hdrs: Vec::new(),
            sender_hdrs: vec!["From".to_string()],
            clock_drift: Duration::from_secs(0),
        }
    }
}

/// Process-wide configuration: a single `LibraryHandle` is typically
/// constructed once and shared (via `Arc`) across every
/// [`crate::context::Context`] a host creates. Mutable fields are guarded
/// by `parking_lot::RwLock`, the convention this crate's sibling kumomta
/// crates use for shared, read-mostly configuration. These fields may only
/// change while no owned Context is in Body/EOM phase, which is the
/// caller's responsibility to uphold — the handle does not track live
/// Contexts to enforce it.
pub struct LibraryHandle {
    config: RwLock<MutableConfig>,
    dns: Arc<dyn DnsDriver>,
    /// Monotonic counter of queries issued, surfaced for diagnostics.
    queries_issued: AtomicI64,
}

impl LibraryHandle {
    /// Builds a handle around the live system resolver.
    pub fn new() -> Result<Self, DKIMError> {
        crypto_backend_init();
        Ok(Self {
            config: RwLock::new(MutableConfig::default()),
            dns: Arc::new(HickoryDriver::from_system_conf()?),
            queries_issued: AtomicI64::new(0),
        })
    }

    /// Builds a handle around an arbitrary [`DnsDriver`] (e.g. a
    /// [`FileDriver`] for tests).
    pub fn with_dns_driver(dns: Arc<dyn DnsDriver>) -> Self {
        crypto_backend_init();
        Self {
            config: RwLock::new(MutableConfig::default()),
            dns,
            queries_issued: AtomicI64::new(0),
        }
    }

    /// Convenience constructor binding a [`FileDriver`] as the handle's DNS
    /// backend directly (`QUERYMETHOD` stays at its `Dns` default, so
    /// [`Self::dns`] just returns this driver unconditionally). For
    /// switching an already-built `Dns`-backed handle over to a file at
    /// runtime, use `set(ConfigKey::QueryMethod, ConfigValue::QueryMethod(QueryMethod::File))`
    /// together with `ConfigKey::QueryInfo` instead.
    pub fn with_file_driver(driver: FileDriver) -> Self {
        Self::with_dns_driver(Arc::new(driver))
    }

    /// The DNS backend to use for the next lookup, honoring `QUERYMETHOD`/
    /// `QUERYINFO`: the driver bound at construction when `Dns` (live
    /// resolver, or whatever [`Self::with_dns_driver`]/[`Self::with_file_driver`]
    /// supplied), or a fresh [`FileDriver`] loaded from `QUERYINFO`'s path
    /// when `File`.
    pub fn dns(&self) -> Result<Arc<dyn DnsDriver>, DKIMError> {
        let config = self.config.read();
        match config.query_method {
            QueryMethod::Dns => Ok(Arc::clone(&self.dns)),
            QueryMethod::File => {
                let path = config.query_info.clone().ok_or(DKIMError::BuilderError(
                    "QUERYMETHOD=File requires QUERYINFO to name a record file",
                ))?;
                Ok(Arc::new(FileDriver::load(path)?))
            }
        }
    }

    pub fn note_query_issued(&self) {
        self.queries_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn queries_issued(&self) -> i64 {
        self.queries_issued.load(Ordering::Relaxed)
    }

    pub fn flags(&self) -> Flags {
        self.config.read().flags
    }

    pub fn min_key_bits(&self) -> usize {
        self.config.read().min_key_bits
    }

    pub fn fixed_time(&self) -> Option<i64> {
        self.config.read().fixed_time
    }

    pub fn clock_drift(&self) -> Duration {
        self.config.read().clock_drift
    }

    pub fn sign_headers(&self) -> Vec<String> {
        self.config.read().sign_hdrs.clone()
    }

    pub fn skip_headers(&self) -> Vec<String> {
        self.config.read().skip_hdrs.clone()
    }

    pub fn oversign_headers(&self) -> Vec<String> {
        self.config.read().oversign_hdrs.clone()
    }

    pub fn sender_headers(&self) -> Vec<String> {
        self.config.read().sender_hdrs.clone()
    }

    /// Applies one configuration key/value pair.
    pub fn set(&self, key: ConfigKey, value: ConfigValue) -> Result<(), DKIMError> {
        let mut config = self.config.write();
        match (key, value) {
            (ConfigKey::FixedTime, ConfigValue::Time(t)) => config.fixed_time = Some(t),
            (ConfigKey::Flags, ConfigValue::Flags(f)) => config.flags = f,
            (ConfigKey::QueryMethod, ConfigValue::QueryMethod(m)) => config.query_method = m,
            (ConfigKey::QueryInfo, ConfigValue::QueryInfo(p)) => config.query_info = Some(p),
            (ConfigKey::MinKeyBits, ConfigValue::MinKeyBits(n)) => config.min_key_bits = n,
            (ConfigKey::SignHdrs, ConfigValue::HeaderList(l)) => config.sign_hdrs = l,
            (ConfigKey::SkipHdrs, ConfigValue::HeaderList(l)) => config.skip_hdrs = l,
            (ConfigKey::OversignHdrs, ConfigValue::HeaderList(l)) => config.oversign_hdrs = l,
            (ConfigKey::SenderHdrs, ConfigValue::HeaderList(l)) => config.sender_hdrs = l,
            (ConfigKey::ClockDrift, ConfigValue::Duration(d)) => config.clock_drift = d,
            _ => {
                return Err(DKIMError::BuilderError(
                    "config key and value type do not match",
                ))
            }
        }
        Ok(())
    }
}

/// Default header and body canonicalization when a caller's `new_sign`
/// doesn't specify one — `simple/simple` is RFC 6376's own default.
pub fn default_canonicalization() -> (canonicalization::Type, canonicalization::Type) {
    (canonicalization::Type::Simple, canonicalization::Type::Simple)
}

static CRYPTO_BACKEND_INIT: std::sync::OnceLock<()> = std::sync::OnceLock::new();

/// One-shot process-wide crypto backend initialization. Neither `rsa` nor
/// `ed25519-dalek` actually require explicit PRNG seeding before use in
/// this crate (both draw from the OS RNG on demand), so this is a
/// deliberate no-op placeholder kept distinct from per-`LibraryHandle`
/// state so it runs at most once per process regardless of how many
/// handles are created.
fn crypto_backend_init() {
    CRYPTO_BACKEND_INIT.get_or_init(|| ());
}
