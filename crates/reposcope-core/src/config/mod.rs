mod env;
mod types;


pub use types::*;

use std::path::{Path, PathBuf};

use crate::secret::Secret;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("OpenAI API key is not configured (set openai_api_key or REPOSCOPE_OPENAI_API_KEY)")]
    MissingApiKey,
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the resulting values fail [`Config::validate`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str::<Self>(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise fail later at construction time.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limiter.max_rate == 0 {
            return Err(ConfigError::Invalid(
                "rate_limiter.max_rate must be greater than zero".into(),
            ));
        }
        let period = self.rate_limiter.time_period;
        if !period.is_finite() || period <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "rate_limiter.time_period must be a positive number of seconds, got {period}"
            )));
        }
        if self.vector_db.embedding_dim == 0 {
            return Err(ConfigError::Invalid(
                "vector_db.embedding_dim must be greater than zero".into(),
            ));
        }
        if self.assistant.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "assistant.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.assistant.max_poll_interval_ms < self.assistant.poll_interval_ms {
            return Err(ConfigError::Invalid(
                "assistant.max_poll_interval_ms must not be below poll_interval_ms".into(),
            ));
        }
        Ok(())
    }

    /// The OpenAI key required by every remote capability.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingApiKey` when no non-empty key is configured.
    pub fn api_key(&self) -> Result<&Secret, ConfigError> {
        self.openai_api_key
            .as_ref()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }
}
