//! DNS backend abstraction.
//!
//! OpenDKIM's `dkim_res_*` callback table separates starting a query
//! (`query`) from waiting on it (`waitreply`) so a caller driving its own
//! event loop can poll many outstanding lookups at once. This crate's
//! callers never need that: `Context::eoh_verify` already drives its own
//! concurrency via `tokio::spawn`, one task per `DKIM-Signature`, and
//! `Context::drop` cancels any still-outstanding ones with
//! `JoinHandle::abort` rather than a token passed back into the driver. A
//! [`DnsDriver`] therefore only needs to expose the complete
//! query-and-wait operation as one step, `lookup_txt`; `init`/`close` round
//! out the lifecycle (backend setup, teardown when the owning
//! [`crate::library::LibraryHandle`] is dropped).

use crate::DKIMError;
use futures::future::BoxFuture;
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::TokioAsyncResolver;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// A DNS backend capable of resolving TXT records for key-record lookup.
/// Implementations must be safe to share across the concurrent lookups a
/// [`crate::context::Context`] issues at `eoh`/`eom`.
pub trait DnsDriver: Sync + Send {
    /// One-shot backend initialization (e.g. opening a resolver socket).
    /// The default no-op is correct for backends with no setup cost.
    fn init(&self) -> Result<(), DKIMError> {
        Ok(())
    }

    /// Releases backend resources. Called when the owning library handle
    /// is torn down.
    fn close(&self) {}

    /// Runs a complete TXT lookup for `name` and returns its records.
    fn lookup_txt<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<String>, DKIMError>>;
}

fn to_lookup_error(err: ResolveError) -> DKIMError {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => DKIMError::NoRecord,
        _ => DKIMError::DnsError(err.to_string()),
    }
}

/// Live resolver backed by `hickory-resolver`, following the system
/// resolver configuration (`/etc/resolv.conf` on Unix).
pub struct HickoryDriver {
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl HickoryDriver {
    pub fn from_system_conf() -> Result<Self, DKIMError> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|err| DKIMError::DnsError(err.to_string()))?;
        Ok(Self {
            resolver,
            timeout: Duration::from_secs(10),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl DnsDriver for HickoryDriver {
    fn lookup_txt<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<String>, DKIMError>> {
        Box::pin(async move {
            let fut = self.resolver.txt_lookup(name);
            let result = tokio::time::timeout(self.timeout, fut)
                .await
                .map_err(|_| DKIMError::DnsTimeout)?;
            result
                .map_err(to_lookup_error)?
                .into_iter()
                .map(|txt| {
                    Ok(txt
                        .iter()
                        .map(|data| String::from_utf8_lossy(data))
                        .collect())
                })
                .collect()
        })
    }
}

/// File-backed test driver: a fixed `name -> Vec<TXT value>` map, either
/// constructed in-memory (`FileDriver::with_txt`, the pattern used
/// throughout this crate's own tests) or loaded from a simple two-column
/// text file (`<query name> <tag-value text>`, one record per line) via
/// [`FileDriver::load`]. There is no live network access involved, making
/// it suitable for CI and for the `QUERYMETHOD = File` configuration spec
/// section 6 names.
#[derive(Default)]
pub struct FileDriver {
    records: HashMap<String, Vec<String>>,
}

impl FileDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_txt(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.records
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Loads `name value` pairs from a file, one per line; blank lines and
    /// lines starting with `#` are ignored. `value` is everything after the
    /// first run of whitespace, so tag-value text containing spaces (as TXT
    /// records usually do) is preserved intact.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DKIMError> {
        let contents =
            std::fs::read_to_string(path).map_err(|err| DKIMError::Io(err.to_string()))?;
        let mut driver = Self::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((name, value)) = line.split_once(char::is_whitespace) else {
                continue;
            };
            driver = driver.with_txt(name.to_string(), value.trim_start().to_string());
        }
        Ok(driver)
    }
}

impl DnsDriver for FileDriver {
    fn lookup_txt<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<String>, DKIMError>> {
        Box::pin(async move {
            match self.records.get(name) {
                Some(values) => Ok(values.clone()),
                None => Err(DKIMError::NoRecord),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_driver_hit() {
        let driver = FileDriver::new().with_txt("dkim._domainkey.example.com", "v=DKIM1; p=abc");
        let result = driver
            .lookup_txt("dkim._domainkey.example.com")
            .await
            .unwrap();
        assert_eq!(result, vec!["v=DKIM1; p=abc".to_string()]);
    }

    #[tokio::test]
    async fn test_file_driver_miss() {
        let driver = FileDriver::new();
        let err = driver.lookup_txt("missing").await.unwrap_err();
        assert_eq!(err, DKIMError::NoRecord);
    }

    #[test]
    fn test_file_driver_load() {
        let dir = std::env::temp_dir();
        let path = dir.join("dkimctx_test_records.txt");
        std::fs::write(&path, "dkim._domainkey.example.com v=DKIM1; k=rsa; p=abc\n# comment\n\n")
            .unwrap();
        let driver = FileDriver::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(driver.records.contains_key("dkim._domainkey.example.com"));
    }
}
