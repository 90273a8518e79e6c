//! Secret indirection for configuration values
//!
//! A setting such as `DB_PASSWORD={aws_secret}db_password` does not hold the
//! value itself: the marker is stripped and the remainder is looked up in a
//! secret bundle. The bundle is fetched at most once per resolver.

use crate::error::{Error, Result};
use once_cell::unsync::OnceCell;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// Marker that turns a configuration value into a secret lookup.
pub const SECRET_MARKER: &str = "{aws_secret}";

/// Where the secret bundle comes from.
pub trait SecretSource {
    fn fetch_bundle(&self) -> Result<HashMap<String, String>>;
}

impl<S: SecretSource + ?Sized> SecretSource for Box<S> {
    fn fetch_bundle(&self) -> Result<HashMap<String, String>> {
        (**self).fetch_bundle()
    }
}

/// A bundle stored as a flat JSON object of string values.
#[derive(Debug, Clone)]
pub struct JsonFileSecretSource {
    path: PathBuf,
}

impl JsonFileSecretSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileSecretSource { path: path.into() }
    }
}

impl SecretSource for JsonFileSecretSource {
    fn fetch_bundle(&self) -> Result<HashMap<String, String>> {
        let failed = |reason: String| Error::ExternalService {
            service: "secret bundle",
            reason: format!("{}: {}", self.path.display(), reason),
        };
        let text = std::fs::read_to_string(&self.path).map_err(|e| failed(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| failed(e.to_string()))
    }
}

/// Used when no bundle is configured: every lookup fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSecrets;

impl SecretSource for NoSecrets {
    fn fetch_bundle(&self) -> Result<HashMap<String, String>> {
        Err(Error::ExternalService {
            service: "secret bundle",
            reason: "a secret was requested but no secret bundle is configured".to_string(),
        })
    }
}

/// Resolves configuration values, fetching the bundle lazily and once.
pub struct SecretResolver<S: SecretSource> {
    source: S,
    bundle: OnceCell<HashMap<String, String>>,
}

impl<S: SecretSource> SecretResolver<S> {
    pub fn new(source: S) -> Self {
        SecretResolver {
            source,
            bundle: OnceCell::new(),
        }
    }

    /// Read environment variable `name` and resolve it.
    pub fn resolve(&self, name: &str) -> Result<String> {
        let raw = std::env::var(name)
            .map_err(|_| Error::Config(format!("environment variable {} is not set", name)))?;
        self.resolve_value(&raw)
    }

    /// Return `raw` unchanged unless it carries the secret marker.
    pub fn resolve_value(&self, raw: &str) -> Result<String> {
        if !raw.contains(SECRET_MARKER) {
            return Ok(raw.to_string());
        }

        let key = raw.replace(SECRET_MARKER, "");
        let bundle = self.bundle.get_or_try_init(|| {
            debug!("fetching secret bundle");
            self.source.fetch_bundle()
        })?;

        bundle.get(&key).cloned().ok_or_else(|| Error::ExternalService {
            service: "secret bundle",
            reason: format!("no secret named '{}'", key),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingSource {
        calls: Cell<usize>,
    }

    impl SecretSource for CountingSource {
        fn fetch_bundle(&self) -> Result<HashMap<String, String>> {
            self.calls.set(self.calls.get() + 1);
            Ok(HashMap::from([
                ("db_user".to_string(), "etl".to_string()),
                ("db_password".to_string(), "s3cret".to_string()),
            ]))
        }
    }

    #[test]
    fn test_plain_values_skip_the_bundle() {
        let resolver = SecretResolver::new(CountingSource { calls: Cell::new(0) });
        assert_eq!(resolver.resolve_value("mongodb://host").unwrap(), "mongodb://host");
        assert_eq!(resolver.source.calls.get(), 0);
    }

    #[test]
    fn test_bundle_is_fetched_once() {
        let resolver = SecretResolver::new(CountingSource { calls: Cell::new(0) });
        assert_eq!(resolver.resolve_value("{aws_secret}db_user").unwrap(), "etl");
        assert_eq!(resolver.resolve_value("{aws_secret}db_password").unwrap(), "s3cret");
        assert_eq!(resolver.source.calls.get(), 1);
    }

    #[test]
    fn test_resolve_reads_environment() {
        std::env::set_var("KILN_TEST_PLAIN_SETTING", "mongodb://host");
        std::env::set_var("KILN_TEST_SECRET_SETTING", "{aws_secret}db_password");
        let resolver = SecretResolver::new(CountingSource { calls: Cell::new(0) });

        assert_eq!(resolver.resolve("KILN_TEST_PLAIN_SETTING").unwrap(), "mongodb://host");
        assert_eq!(resolver.resolve("KILN_TEST_SECRET_SETTING").unwrap(), "s3cret");
        assert!(matches!(
            resolver.resolve("KILN_TEST_UNSET_SETTING"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_unknown_secret() {
        let resolver = SecretResolver::new(CountingSource { calls: Cell::new(0) });
        assert!(matches!(
            resolver.resolve_value("{aws_secret}missing"),
            Err(Error::ExternalService { .. })
        ));
    }

    #[test]
    fn test_json_file_source_and_no_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        std::fs::write(&path, r#"{"token": "abc"}"#).unwrap();

        let resolver = SecretResolver::new(JsonFileSecretSource::new(&path));
        assert_eq!(resolver.resolve_value("{aws_secret}token").unwrap(), "abc");

        let resolver = SecretResolver::new(NoSecrets);
        assert!(resolver.resolve_value("{aws_secret}token").is_err());
        assert_eq!(resolver.resolve_value("plain").unwrap(), "plain");
    }
}
