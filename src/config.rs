//! Environment configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use assistant_api::url::DEFAULT_BASE_URL;
use assistant_api::ApiConfig;
use credential_store::credential_file_path;

use crate::error::RuntimeError;

pub const BASE_URL_ENV: &str = "ASSISTANT_BASE_URL";
pub const TIMEOUT_SECS_ENV: &str = "ASSISTANT_TIMEOUT_SECS";
pub const POLL_INTERVAL_MS_ENV: &str = "ASSISTANT_POLL_INTERVAL_MS";
pub const CREDENTIALS_PATH_ENV: &str = "ASSISTANT_CREDENTIALS_PATH";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub api: ApiConfig,
    /// `None` keeps the credential in memory only.
    pub credentials_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            credentials_path: dirs::data_dir().map(|dir| credential_file_path(&dir)),
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, RuntimeError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RuntimeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(base_url) = value(BASE_URL_ENV) {
            config.api = config.api.with_base_url(base_url.trim());
        }
        if let Some(raw) = value(TIMEOUT_SECS_ENV) {
            let secs = parse_positive(TIMEOUT_SECS_ENV, &raw)?;
            config.api = config.api.with_timeout(Duration::from_secs(secs));
        }
        if let Some(raw) = value(POLL_INTERVAL_MS_ENV) {
            let millis = parse_positive(POLL_INTERVAL_MS_ENV, &raw)?;
            config.api = config.api.with_poll_interval(Duration::from_millis(millis));
        }
        if let Some(path) = value(CREDENTIALS_PATH_ENV) {
            config.credentials_path = Some(PathBuf::from(path.trim()));
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api = self.api.with_base_url(base_url);
        self
    }

    #[must_use]
    pub fn in_memory(mut self) -> Self {
        self.credentials_path = None;
        self
    }

    pub fn base_url(&self) -> &str {
        if self.api.base_url.trim().is_empty() {
            DEFAULT_BASE_URL
        } else {
            &self.api.base_url
        }
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, RuntimeError> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(RuntimeError::config(key, raw, "must be greater than zero")),
        Ok(value) => Ok(value),
        Err(error) => Err(RuntimeError::config(key, raw, error)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::env;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::{RuntimeConfig, BASE_URL_ENV, CREDENTIALS_PATH_ENV, POLL_INTERVAL_MS_ENV, TIMEOUT_SECS_ENV};
    use crate::error::RuntimeError;

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<RuntimeConfig, RuntimeError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        RuntimeConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn env_values_override_defaults() {
        let _lock = env_lock();
        let _g1 = set_env_guard(BASE_URL_ENV, Some("https://assistant.example.com"));
        let _g2 = set_env_guard(TIMEOUT_SECS_ENV, Some("30"));
        let _g3 = set_env_guard(POLL_INTERVAL_MS_ENV, Some("250"));
        let _g4 = set_env_guard(CREDENTIALS_PATH_ENV, Some("/tmp/assistant/credential.json"));

        let config = RuntimeConfig::from_env().expect("config");
        assert_eq!(config.base_url(), "https://assistant.example.com");
        assert_eq!(config.api.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.api.poll_interval, Duration::from_millis(250));
        assert_eq!(
            config.credentials_path,
            Some(PathBuf::from("/tmp/assistant/credential.json"))
        );
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = from_pairs(&[(BASE_URL_ENV, "  "), (TIMEOUT_SECS_ENV, "")]).expect("config");
        assert_eq!(config.base_url(), "http://localhost:8100");
        assert_eq!(config.api.timeout, None);
    }

    #[test]
    fn unparsable_numbers_are_errors() {
        assert_matches!(
            from_pairs(&[(TIMEOUT_SECS_ENV, "soon")]),
            Err(RuntimeError::Config { key: TIMEOUT_SECS_ENV, .. })
        );
        assert_matches!(
            from_pairs(&[(POLL_INTERVAL_MS_ENV, "0")]),
            Err(RuntimeError::Config { key: POLL_INTERVAL_MS_ENV, .. })
        );
    }
}
