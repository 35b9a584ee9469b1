use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `api.token`
pub const TOKEN_ENV_VAR: &str = "SENTIMENT_API_TOKEN";

/// Top-level application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Global hotkey that presses the record button
    pub hotkey: HotkeyConfig,
    /// Capture settings
    pub audio: AudioConfig,
    /// Where finished recordings are written
    pub recording: RecordingConfig,
    /// Sentiment API endpoint and credentials
    pub api: ApiConfig,
    /// Logging destination
    pub telemetry: TelemetryConfig,
}

/// Hotkey bound to the record button
#[derive(Debug, Deserialize, Clone)]
pub struct HotkeyConfig {
    /// Modifier names ("Control", "Option", "Command", "Shift")
    pub modifiers: Vec<String>,
    /// Single letter key
    pub key: String,
}

/// Capture and encoding settings
#[derive(Debug, Deserialize, Clone)]
pub struct AudioConfig {
    /// Sample rate of the written WAV file
    pub sample_rate: u32,
    /// Longest recording kept in the capture ring buffer
    pub max_duration_secs: u32,
    /// Amplitude sampling period while recording
    pub level_interval_ms: u64,
}

/// Recording output location
#[derive(Debug, Deserialize, Clone)]
pub struct RecordingConfig {
    /// Directory for `recording_<millis>.wav` files
    pub directory: String,
}

/// Remote sentiment API
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Full URL receiving the multipart upload
    pub endpoint: String,
    /// Static bearer token (overridden by `SENTIMENT_API_TOKEN`)
    #[serde(default)]
    pub token: String,
    /// Request timeout; transport default when absent
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Logging settings
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    /// Log to file when true, stdout otherwise
    pub enabled: bool,
    /// Log file location
    pub log_path: String,
}

const DEFAULT_CONFIG: &str = r#"[hotkey]
modifiers = ["Control", "Option"]
key = "R"

[audio]
sample_rate = 16000
max_duration_secs = 300
level_interval_ms = 150

[recording]
directory = "~/.sentiment-recorder/recordings"

[api]
endpoint = "https://api.whisper.ai/v1/sentiment"
token = ""
timeout_secs = 30

[telemetry]
enabled = true
log_path = "~/.sentiment-recorder/app.log"
"#;

impl Config {
    /// Load config from ~/.sentiment-recorder.toml, creating it on first run
    ///
    /// # Errors
    /// Returns error if the file cannot be created, read, parsed or validated
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default(&config_path).context("failed to create default config")?;
            tracing::info!(path = %config_path.display(), "wrote default config");
        }

        let contents = fs::read_to_string(&config_path).context("failed to read config file")?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse TOML text without touching the environment
    ///
    /// # Errors
    /// Returns error if the TOML is malformed or a section is missing
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("failed to parse config TOML")
    }

    /// Path of the config file
    ///
    /// # Errors
    /// Returns error if HOME is not set
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".sentiment-recorder.toml"))
    }

    fn create_default(path: &Path) -> Result<()> {
        fs::write(path, DEFAULT_CONFIG).context("failed to write default config")?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            if !token.trim().is_empty() {
                tracing::debug!("api token taken from {}", TOKEN_ENV_VAR);
                self.api.token = token;
            }
        }
    }

    /// Check values the rest of the app relies on
    ///
    /// # Errors
    /// Returns error describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        let endpoint = &self.api.endpoint;
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            bail!("api.endpoint must start with http:// or https://, got: {endpoint}");
        }
        let url = reqwest::Url::parse(endpoint)
            .with_context(|| format!("api.endpoint is not a valid URL: {endpoint}"))?;
        if is_unencrypted_remote(&url) {
            tracing::warn!("api endpoint uses plain HTTP, audio and token are sent unencrypted");
        }
        if self.api.token.trim().is_empty() {
            bail!("api.token is empty (set it in the config or via {TOKEN_ENV_VAR})");
        }
        if self.audio.sample_rate == 0 {
            bail!("audio.sample_rate must be > 0");
        }
        if self.audio.max_duration_secs == 0 {
            bail!("audio.max_duration_secs must be > 0");
        }
        if self.audio.level_interval_ms == 0 {
            bail!("audio.level_interval_ms must be > 0");
        }
        Ok(())
    }

    /// Amplitude sampling period
    pub const fn level_interval(&self) -> Duration {
        Duration::from_millis(self.audio.level_interval_ms)
    }

    /// Expand ~ in paths to home directory
    ///
    /// # Errors
    /// Returns error if the path starts with ~/ and HOME is not set
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(stripped) = path.strip_prefix("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(stripped))
        } else {
            Ok(PathBuf::from(path))
        }
    }
}

/// Plain HTTP to anything other than a loopback host
fn is_unencrypted_remote(url: &reqwest::Url) -> bool {
    let loopback = url.host_str().is_some_and(|host| {
        host.eq_ignore_ascii_case("localhost")
            || host
                .trim_start_matches('[')
                .trim_end_matches(']')
                .parse::<std::net::IpAddr>()
                .is_ok_and(|ip| ip.is_loopback())
    });
    url.scheme() == "http" && !loopback
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::parse(DEFAULT_CONFIG).unwrap();
        config.api.token = "secret".to_owned();
        config
    }

    #[test]
    fn test_default_config_parses() {
        let config = Config::parse(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.hotkey.key, "R");
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.api.timeout_secs, Some(30));
        assert_eq!(config.level_interval(), Duration::from_millis(150));
    }

    #[test]
    fn test_default_config_requires_token() {
        let config = Config::parse(DEFAULT_CONFIG).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("api.token"));
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_http_endpoint() {
        let mut config = valid_config();
        config.api.endpoint = "ftp://example.com/upload".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_allows_plain_http_localhost() {
        let mut config = valid_config();
        config.api.endpoint = "http://localhost:8080/sentiment".to_owned();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_plain_http_warning_checks_host() {
        let unencrypted =
            |endpoint: &str| is_unencrypted_remote(&reqwest::Url::parse(endpoint).unwrap());

        assert!(!unencrypted("http://localhost:8080/sentiment"));
        assert!(!unencrypted("http://127.0.0.1/sentiment"));
        assert!(!unencrypted("http://[::1]:9000/sentiment"));
        assert!(!unencrypted("https://example.com/sentiment"));

        assert!(unencrypted("http://example.com/localhost"));
        assert!(unencrypted("http://example.com/?via=127.0.0.1"));
        assert!(unencrypted("http://localhost.example.com/sentiment"));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let mut config = valid_config();
        config.audio.level_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_and_timeout_are_optional_in_toml() {
        let toml = DEFAULT_CONFIG
            .replace("token = \"\"\n", "")
            .replace("timeout_secs = 30\n", "");
        let config = Config::parse(&toml).unwrap();
        assert!(config.api.token.is_empty());
        assert_eq!(config.api.timeout_secs, None);
    }

    #[test]
    fn test_missing_section_fails() {
        let toml = DEFAULT_CONFIG.replace("[recording]", "[unused]");
        assert!(Config::parse(&toml).is_err());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let home = std::env::var("HOME").unwrap();
        let result = Config::expand_path("~/.sentiment-recorder/recordings").unwrap();
        assert_eq!(result, PathBuf::from(home).join(".sentiment-recorder/recordings"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let result = Config::expand_path("/tmp/recordings").unwrap();
        assert_eq!(result, PathBuf::from("/tmp/recordings"));
    }
}
