//! Secret lookup from the process environment and an optional `.env` file.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use tracing::debug;

/// Secrets available to the watchdog.
#[derive(Clone, Default)]
pub struct Credentials {
    vars: BTreeMap<String, String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("keys", &self.vars.keys().collect::<Vec<_>>())
            .field("values", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    /// Build credentials from a key-value map.
    pub fn from_map(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }

    /// Snapshot the current process environment.
    pub fn from_env() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Returns a non-empty credential value for a key, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    /// Returns a required credential or an error when missing.
    ///
    /// # Errors
    ///
    /// Returns an error when the key is absent or empty.
    pub fn require(&self, key: &str) -> anyhow::Result<String> {
        self.get(key)
            .map(str::to_owned)
            .ok_or_else(|| anyhow::anyhow!("missing required credential: {key}"))
    }
}

/// Load credentials from the environment, seeded from `env_file` when given.
///
/// Variables already set in the environment win over the file.
///
/// # Errors
///
/// Returns an error if `env_file` is given but cannot be read or parsed.
pub fn load_credentials(env_file: Option<&Path>) -> anyhow::Result<Credentials> {
    let mut vars = BTreeMap::new();

    if let Some(path) = env_file {
        let iter = dotenvy::from_path_iter(path)
            .with_context(|| format!("failed to read env file at {}", path.display()))?;
        for item in iter {
            let (key, value) = item.with_context(|| {
                format!("failed to parse key-value entry in {}", path.display())
            })?;
            vars.insert(key, value);
        }
        debug!(path = %path.display(), count = vars.len(), "loaded env file");
    }

    vars.extend(std::env::vars());
    Ok(Credentials { vars })
}
