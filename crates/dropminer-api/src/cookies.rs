// Persistent cookie store.
//
// A small JSON file keyed by domain, holding the handful of cookies the
// session relies on (`auth-token`, `persistent`). The HTTP client never
// sees this jar directly; the session flow reads and writes it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;

/// Cookie name carrying the OAuth access token.
pub const AUTH_TOKEN_COOKIE: &str = "auth-token";
/// Cookie name carrying the numeric user id.
pub const PERSISTENT_COOKIE: &str = "persistent";

/// Domain → cookie name → value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CookieStore {
    domains: BTreeMap<String, BTreeMap<String, String>>,
}

impl CookieStore {
    /// Load the store from `path`. A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, Error> {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| Error::Deserialization {
                message: format!("invalid cookie file {}: {e}", path.display()),
                body: raw,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no cookie file, starting empty");
                Ok(Self::default())
            }
            Err(e) => Err(Error::CookieStore(e)),
        }
    }

    /// Write the store to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })?;
        std::fs::write(path, raw)?;
        debug!(path = %path.display(), "cookie file saved");
        Ok(())
    }

    pub fn get(&self, domain: &str, name: &str) -> Option<&str> {
        self.domains.get(domain)?.get(name).map(String::as_str)
    }

    pub fn set(&mut self, domain: &str, name: &str, value: impl Into<String>) {
        self.domains
            .entry(domain.to_owned())
            .or_default()
            .insert(name.to_owned(), value.into());
    }

    /// `true` if the domain holds no cookies at all.
    pub fn is_empty_for(&self, domain: &str) -> bool {
        self.domains.get(domain).is_none_or(BTreeMap::is_empty)
    }

    pub fn clear_domain(&mut self, domain: &str) {
        self.domains.remove(domain);
    }
}

/// A cookie store bound to the file it was loaded from.
#[derive(Debug, Clone)]
pub struct CookieFile {
    path: PathBuf,
    pub store: CookieStore,
}

impl CookieFile {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let store = CookieStore::load(&path)?;
        Ok(Self { path, store })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<(), Error> {
        self.store.save(&self.path)
    }
}
