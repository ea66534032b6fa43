pub mod compile;
pub mod match_route;
pub mod routes;
pub mod services;

use anyhow::Context;
use prewire::config::{load_dotenv, CompilerConfig};
use prewire::runtime::LoadedArtifacts;
use std::path::PathBuf;

/// Options shared by every command
pub struct Options {
    pub root: PathBuf,
    pub config: Option<PathBuf>,
}

impl Options {
    /// Configuration from `--config` when given, else `<root>/prewire.toml`
    pub fn load_config(&self) -> anyhow::Result<CompilerConfig> {
        let Some(path) = &self.config else {
            return CompilerConfig::load(&self.root).context("Failed to load configuration");
        };

        load_dotenv(&self.root);
        let mut config = CompilerConfig::from_file(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if config.project_root == std::path::Path::new(".") {
            config.project_root = self.root.clone();
        }
        config.apply_env_overrides();
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    pub fn load_artifacts(&self) -> anyhow::Result<LoadedArtifacts> {
        let config = self.load_config()?;
        LoadedArtifacts::load(&config)
            .context("Failed to load compiled artifacts, run `prewire compile` first")
    }
}
