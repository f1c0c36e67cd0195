mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};
use lectern_index::course::ChunkerConfig;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be greater than 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        if self.index.max_results == 0 {
            bail!("index.max_results must be greater than 0");
        }
        if self.agent.max_tool_rounds == 0 {
            bail!("agent.max_tool_rounds must be greater than 0");
        }
        if self.agent.max_sessions == 0 {
            bail!("agent.max_sessions must be greater than 0");
        }
        if let Some(d) = self.index.course_match_max_distance
            && !(0.0..=2.0).contains(&d)
        {
            bail!("index.course_match_max_distance must be within 0.0..=2.0, got {d}");
        }
        if self.timeouts.llm_seconds == 0 || self.timeouts.search_seconds == 0 {
            bail!("timeouts must be greater than 0 seconds");
        }
        Ok(())
    }

    #[must_use]
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            chunk_size: self.chunking.chunk_size,
            chunk_overlap: self.chunking.chunk_overlap,
        }
    }
}
