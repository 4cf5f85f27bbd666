//! KEY=VALUE configuration store.
//!
//! Entries are stored under the [`NAMESPACE`] prefix so they can never be
//! confused with anything else the process carries around. [`ConfigMap::get`]
//! applies the prefix for the caller; code that already holds a prefixed key
//! uses [`ConfigMap::get_namespaced`].
//!
//! A `ConfigMap` is loaded once and then passed by reference. Nothing in the
//! engine reads it from ambient state.

use crate::error::{Result, RunkitError};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Prefix applied to every stored key.
pub const NAMESPACE: &str = "RUNKIT_CFG_";

/// Config file used by the command line when `-c` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "runkit.conf";

/// Contents written by [`seed_default`].
pub const DEFAULT_CONFIG_CONTENTS: &str = "\
# runkit default configuration
HOST=localhost
PORT=8080
DEBUG=false
";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMap {
    entries: HashMap<String, String>,
}

impl ConfigMap {
    /// Load and parse the file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RunkitError::ConfigNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        let map = Self::parse(&content);
        debug!("Loaded {} config entries from {}", map.len(), path.display());
        Ok(map)
    }

    /// Parse `KEY=VALUE` lines.
    ///
    /// Splits on the first `=`. Lines without `=`, with an empty key, or with
    /// a key starting with `#` are skipped. Later keys overwrite earlier ones.
    pub fn parse(content: &str) -> Self {
        let mut entries = HashMap::new();
        for line in content.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() || key.starts_with('#') {
                continue;
            }
            entries.insert(namespaced_key(key), value.to_string());
        }
        Self { entries }
    }

    /// Look up a bare key such as `PORT`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_namespaced(&namespaced_key(key))
    }

    /// Look up a key that already carries the namespace prefix.
    pub fn get_namespaced(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries as bare keys, sorted by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .entries
            .iter()
            .map(|(k, v)| (k.strip_prefix(NAMESPACE).unwrap_or(k), v.as_str()))
            .collect();
        pairs.sort_unstable_by_key(|(k, _)| *k);
        pairs.into_iter()
    }
}

/// The namespaced form of `key`.
pub fn namespaced_key(key: &str) -> String {
    format!("{NAMESPACE}{key}")
}

/// Write the default config to `path` unless something is already there.
///
/// Returns whether a file was written.
pub fn seed_default<P: AsRef<Path>>(path: P) -> Result<bool> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(false);
    }
    fs::write(path, DEFAULT_CONFIG_CONTENTS)?;
    debug!("Seeded default config at {}", path.display());
    Ok(true)
}
