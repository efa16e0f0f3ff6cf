//! Configuration: model selection and retry tuning in a JSON file under
//! the platform config dir, the API key in the environment or the OS
//! keychain. The key is never written to the config file.

use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const KEYRING_SERVICE: &str = "pagepilot";
const KEYRING_USERNAME: &str = "gemini_api_key";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_model")]
    pub model: String,
    /// Switched to once per completion when the primary model is rate
    /// limited.
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry; doubles per retry when
    /// `exponential_backoff` is set.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_true")]
    pub exponential_backoff: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

fn default_model() -> String {
    "gemini-1.5-pro".to_string()
}

fn default_fallback_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_output_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.2
}

fn default_top_p() -> f32 {
    0.9
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            fallback_model: default_fallback_model(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            exponential_backoff: true,
            request_timeout_secs: default_request_timeout_secs(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
        }
    }
}

fn keyring_entry() -> Result<Entry, keyring::Error> {
    Entry::new(KEYRING_SERVICE, KEYRING_USERNAME)
}

fn read_keyring_key() -> Result<Option<String>, keyring::Error> {
    let entry = keyring_entry()?;
    match entry.get_password() {
        Ok(key) => Ok(Some(key)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(err),
    }
}

fn write_keyring_key(key: &str) -> Result<(), keyring::Error> {
    let entry = keyring_entry()?;
    entry.set_password(key)
}

impl Config {
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("pagepilot"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load from disk, or defaults. A corrupt file is moved aside rather
    /// than blocking startup.
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if let Ok(content) = fs::read_to_string(&path) {
                match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(err) => {
                        preserve_corrupt_config(&path, &content);
                        tracing::warn!(
                            %err,
                            "config file was corrupted; backup saved, defaults loaded"
                        );
                    }
                }
            }
        }
        Self::default()
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let dir = Self::config_dir()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;
        fs::create_dir_all(&dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(err) = fs::set_permissions(&dir, fs::Permissions::from_mode(0o700)) {
                tracing::warn!(%err, "failed to set config directory permissions");
            }
        }

        let path = dir.join("config.json");
        let content = serde_json::to_string_pretty(self)?;
        write_config_atomic(&path, &content)
    }

    /// Resolve the API key: environment first, then keychain.
    pub fn get_api_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                return Some(key);
            }
        }
        match read_keyring_key() {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(%err, "failed to read API key from system keychain");
                None
            }
        }
    }

    /// Store the API key in the keychain and verify the write by reading
    /// it back.
    pub fn set_api_key(&self, key: &str) -> anyhow::Result<()> {
        write_keyring_key(key).map_err(|err| {
            anyhow::anyhow!(
                "failed to store API key in system keychain: {}. \
                 You can set the {} environment variable instead.",
                err,
                API_KEY_ENV
            )
        })?;

        match read_keyring_key() {
            Ok(Some(stored)) if stored == key => Ok(()),
            Ok(_) => anyhow::bail!(
                "API key verification failed: key was not persisted to the keychain"
            ),
            Err(err) => anyhow::bail!(
                "API key verification failed: couldn't read back from keychain ({})",
                err
            ),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.get_api_key().is_some()
    }
}

fn preserve_corrupt_config(path: &std::path::Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_config_atomic(path: &std::path::Path, content: &str) -> anyhow::Result<()> {
    let tmp_path = path.with_extension("tmp");

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        if let Err(err) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
            tracing::warn!(%err, "failed to set temp config file permissions");
        }
        file.write_all(content.as_bytes())?;
    }

    #[cfg(not(unix))]
    fs::write(&tmp_path, content)?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}
