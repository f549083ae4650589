//! # configs
//!
//! Runtime settings for the Trailhead client.
//!
//! Sources, lowest precedence first: built-in defaults, `trailhead.toml` in
//! the working directory (optional), then `TRAILHEAD_*` environment
//! variables with `__` between nested keys, e.g. `TRAILHEAD_API__BASE_URL`.
//! A `.env` file can be loaded into the environment first with
//! [`load_env_file`].

use config::{Config, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "trailhead.toml";
pub const ENV_PREFIX: &str = "TRAILHEAD";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub api: ApiSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    pub log: LogSettings,
}

#[derive(Debug, Deserialize)]
pub struct ApiSettings {
    /// Prefix of every REST path and of relative media paths
    pub base_url: String,
    pub user_agent: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthSettings {
    /// Session token handed over up front; wins over `token_file`.
    pub token: Option<SecretString>,
    pub token_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set
    pub filter: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Loads a dotenv file into the process environment without overriding
/// variables already set. `None` searches for `.env` from the working
/// directory upwards. Returns the file that was read, if any.
///
/// Call before anything reads the environment, including argument parsing.
pub fn load_env_file(path: Option<&Path>) -> Option<PathBuf> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };
    match loaded {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "loaded env file");
            Some(path)
        }
        Err(err) if err.not_found() => None,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring unreadable env file");
            None
        }
    }
}

impl Settings {
    /// Loads the layered sources described in the module docs. The `.env`
    /// file is expected to be loaded already, see [`load_env_file`].
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(
            Path::new(DEFAULT_CONFIG_FILE),
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
    }

    pub fn load_from(file: &Path, env: Environment) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .set_default("api.base_url", "http://localhost:3000")?
            .set_default("api.user_agent", concat!("trailhead/", env!("CARGO_PKG_VERSION")))?
            .set_default("log.filter", "info")?
            .set_default("log.format", "pretty")?
            .add_source(File::from(file).required(false))
            .add_source(env)
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let url = self.api.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "api.base_url must be an http(s) URL, got {url:?}"
            )));
        }
        if self.log.filter.trim().is_empty() {
            return Err(ConfigError::Invalid("log.filter must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .source(Some(map))
    }

    fn no_file() -> PathBuf {
        PathBuf::from("/nonexistent/trailhead.toml")
    }

    #[test]
    fn defaults_apply_without_sources() {
        let settings = Settings::load_from(&no_file(), env(&[])).unwrap();
        assert_eq!(settings.api.base_url, "http://localhost:3000");
        assert!(settings.api.user_agent.starts_with("trailhead/"));
        assert_eq!(settings.log.format, LogFormat::Pretty);
        assert!(settings.auth.token.is_none());
        assert!(settings.auth.token_file.is_none());
    }

    #[test]
    fn file_then_env_precedence() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[api]\nbase_url = \"https://file.example\"\n\n[log]\nformat = \"json\"\n\n[auth]\ntoken_file = \"/var/lib/trailhead/token\""
        )
        .unwrap();

        let settings = Settings::load_from(
            file.path(),
            env(&[
                ("TRAILHEAD_API__BASE_URL", "https://env.example"),
                ("TRAILHEAD_AUTH__TOKEN", "env-token"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.api.base_url, "https://env.example");
        assert_eq!(settings.log.format, LogFormat::Json);
        assert_eq!(
            settings.auth.token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("env-token".to_string())
        );
        assert_eq!(
            settings.auth.token_file,
            Some(PathBuf::from("/var/lib/trailhead/token"))
        );
    }

    #[test]
    fn env_file_feeds_the_environment_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "TRAILHEAD_CONFIGS_TEST__MARKER=from-env-file").unwrap();

        assert_eq!(load_env_file(Some(file.path())), Some(file.path().to_path_buf()));
        assert_eq!(
            std::env::var("TRAILHEAD_CONFIGS_TEST__MARKER").as_deref(),
            Ok("from-env-file")
        );
        assert_eq!(load_env_file(Some(Path::new("/nonexistent/.env"))), None);
    }

    #[test]
    fn rejects_non_http_base_url() {
        let err = Settings::load_from(&no_file(), env(&[("TRAILHEAD_API__BASE_URL", "ftp://x")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_log_format() {
        let err = Settings::load_from(&no_file(), env(&[("TRAILHEAD_LOG__FORMAT", "xml")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
