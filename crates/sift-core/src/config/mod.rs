mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make indexing or search misbehave.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        let e = &self.embedding;
        if e.engine.trim().is_empty() {
            bail!("embedding.engine must not be empty");
        }
        if e.batch_size == 0 || e.batch_size > sift_llm::MAX_BATCH_SIZE {
            bail!(
                "embedding.batch_size must be between 1 and {}, got {}",
                sift_llm::MAX_BATCH_SIZE,
                e.batch_size
            );
        }
        if e.concurrency == 0 {
            bail!("embedding.concurrency must be at least 1");
        }
        if e.max_attempts == 0 {
            bail!("embedding.max_attempts must be at least 1");
        }
        if e.base_delay_ms > e.max_delay_ms {
            bail!(
                "embedding.base_delay_ms ({}) exceeds embedding.max_delay_ms ({})",
                e.base_delay_ms,
                e.max_delay_ms
            );
        }
        if self.index.window_tokens == 0 {
            bail!("index.window_tokens must be at least 1");
        }
        if self.search.cache_capacity == 0 {
            bail!("search.cache_capacity must be at least 1");
        }
        if self.search.timeout_secs == 0 {
            bail!("search.timeout_secs must be at least 1");
        }
        if !self.classifier.delta.is_finite() {
            bail!("classifier.delta must be a finite number");
        }
        Ok(())
    }
}
