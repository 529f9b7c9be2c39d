use std::path::{Path, PathBuf};

use anyhow::{Result, ensure};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::cache::{CacheConfig, CacheLayout, DEFAULT_MAX_SIZE};
use crate::cli::{Cli, LogFormat};

const DEFAULT_CONFIG_FILE: &str = "pagestash.toml";
const ENV_PREFIX: &str = "PAGESTASH";

fn default_max_size() -> u64 {
    DEFAULT_MAX_SIZE
}

fn default_layout() -> CacheLayout {
    CacheLayout::Combined
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub cache_dir: PathBuf,
    #[serde(default = "default_max_size")]
    pub max_size: u64,
    #[serde(default = "default_layout")]
    pub layout: CacheLayout,
    #[serde(default = "default_log_format")]
    pub log: LogFormat,
}

impl Settings {
    pub fn load(cli: &Cli) -> Result<Self> {
        Self::load_from(resolve_config_path(cli))
    }

    /// Layers the optional config file under `PAGESTASH__*` environment variables.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = &config_path {
            builder = builder.add_source(File::from(path.clone()).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build().map_err(to_anyhow)?;
        let mut settings: Settings = cfg.try_deserialize().map_err(to_anyhow)?;
        if let Some(path) = &config_path {
            settings.apply_base_dir(path);
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(&self.cache_dir)
            .max_size(self.max_size)
            .layout(self.layout)
    }

    fn apply_base_dir(&mut self, config_path: &Path) {
        let base_dir = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        self.cache_dir = absolutize(&self.cache_dir, base_dir);
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.cache_dir.as_os_str().is_empty(),
            "cache_dir must not be empty"
        );
        Ok(())
    }
}

fn to_anyhow(err: ConfigError) -> anyhow::Error {
    anyhow::anyhow!(err)
}

fn resolve_config_path(cli: &Cli) -> Option<PathBuf> {
    if let Some(path) = &cli.config {
        return Some(path.clone());
    }
    let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
    candidate.exists().then_some(candidate)
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
