use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::PalaverError;

/// Used when neither the config file nor `SESSION_SECRET` provide a secret.
pub const DEV_SESSION_SECRET: &str = "dev-secret-key-change-in-production";

/// Minimum secret length accepted for cookie key derivation.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PalaverConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionBackend {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub backend: SessionBackend,
    pub dir: String,
    pub cookie_name: String,
    pub secure_cookie: bool,
    /// Idle minutes before a stored session is discarded; 0 keeps sessions forever.
    /// Idle time counts from the session's last write, so page views alone do not extend it.
    pub idle_timeout_minutes: u64,
    pub secret: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::File,
            dir: "sessions".to_string(),
            cookie_name: "palaver_session".to_string(),
            secure_cookie: false,
            idle_timeout_minutes: 0,
            secret: None,
        }
    }
}

impl SessionConfig {
    /// Config value, then `$SESSION_SECRET`, then the development default.
    pub fn resolve_secret(&self) -> String {
        self.secret
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| std::env::var("SESSION_SECRET").ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| DEV_SESSION_SECRET.to_string())
    }

    pub fn idle_timeout(&self) -> Option<chrono::Duration> {
        match self.idle_timeout_minutes {
            0 => None,
            m => Some(chrono::Duration::minutes(m as i64)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AiConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_seconds: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Number of most recent messages sent with each completion request.
    pub history_window: usize,
    pub system_prompt: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            timeout_seconds: 60,
            max_tokens: 1000,
            temperature: 0.7,
            history_window: 20,
            system_prompt: "You are a helpful, friendly AI assistant. Answer clearly and \
                            concisely, and keep the conversation context in mind."
                .to_string(),
        }
    }
}

impl PalaverConfig {
    /// Load `path` (optional) layered under `PALAVER__SECTION__KEY` environment variables.
    pub fn load(path: &str) -> Result<Self, PalaverError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("PALAVER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.resolve_secret().len() < MIN_SECRET_LEN {
            return Err(ConfigError::Message(format!(
                "session secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        if self.ai.history_window == 0 {
            return Err(ConfigError::Message(
                "ai.history_window must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PalaverConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.session.backend, SessionBackend::File);
        assert!(config.session.idle_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = PalaverConfig::load("/nonexistent/palaver-config").unwrap();
        assert_eq!(config.ai.model, "gpt-4o");
        assert_eq!(config.session.cookie_name, "palaver_session");
    }

    #[test]
    fn test_load_toml_overrides_sections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nport = 8080\n\n[session]\nbackend = \"memory\"\nidle_timeout_minutes = 30\nsecret = \"{}\"\n\n[ai]\nmodel = \"gpt-4o-mini\"",
            "s".repeat(40)
        )
        .unwrap();

        let config = PalaverConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.session.backend, SessionBackend::Memory);
        assert_eq!(config.session.idle_timeout(), Some(chrono::Duration::minutes(30)));
        assert_eq!(config.ai.model, "gpt-4o-mini");
        assert_eq!(config.ai.history_window, 20);
    }

    #[test]
    fn test_load_reports_invalid_values_as_config_errors() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[ai]\nhistory_window = 0").unwrap();

        let err = PalaverConfig::load(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, PalaverError::Config(_)));
        assert!(err.to_string().contains("history_window"));
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut config = PalaverConfig::default();
        config.session.secret = Some("too-short".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_history_window_rejected() {
        let mut config = PalaverConfig::default();
        config.ai.history_window = 0;
        assert!(config.validate().is_err());
    }
}
