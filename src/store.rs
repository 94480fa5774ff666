use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::model::{AppConfig, Defaults};

const CONFIG_FILE: &str = "config.json";
const DEFAULTS_FILE: &str = "defaults.json";
const VAULT_FILE: &str = "vault.json";
const LOG_FILE: &str = "stratus.log";

/// Directory holding configuration, defaults and the encrypted vault.
#[derive(Clone, Debug)]
pub struct ConfigStore {
    root: PathBuf,
}

impl ConfigStore {
    /// Resolve the config directory: explicit path, `STRATUS_CONFIG_DIR`, then the
    /// platform config directory.
    pub fn discover(explicit: Option<PathBuf>) -> Result<Self> {
        if let Some(p) = explicit
            && !p.as_os_str().is_empty()
        {
            return Self::open(&p);
        }
        if let Ok(p) = std::env::var("STRATUS_CONFIG_DIR")
            && !p.is_empty()
        {
            return Self::open(Path::new(&p));
        }
        let dirs = directories::ProjectDirs::from("", "stratus", "stratus")
            .ok_or_else(|| anyhow!("could not determine platform config directory"))?;
        Self::open(dirs.config_dir())
    }

    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("create config dir {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn vault_path(&self) -> PathBuf {
        self.root.join(VAULT_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    pub fn read_config(&self) -> Result<AppConfig> {
        let path = self.root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(AppConfig::default());
        }
        let bytes = fs::read(&path).context("read config.json")?;
        let cfg: AppConfig = serde_json::from_slice(&bytes).context("parse config.json")?;
        if cfg.version != crate::model::CONFIG_VERSION {
            anyhow::bail!("unsupported config version {}", cfg.version);
        }
        Ok(cfg)
    }

    pub fn write_config(&self, cfg: &AppConfig) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(cfg).context("serialize config")?;
        write_atomic(&self.root.join(CONFIG_FILE), &bytes).context("write config.json")?;
        Ok(())
    }

    pub fn read_defaults(&self) -> Result<Defaults> {
        let path = self.root.join(DEFAULTS_FILE);
        if !path.exists() {
            return Ok(Defaults {
                version: crate::model::CONFIG_VERSION,
                ..Defaults::default()
            });
        }
        let bytes = fs::read(&path).context("read defaults.json")?;
        let defaults: Defaults = serde_json::from_slice(&bytes).context("parse defaults.json")?;
        Ok(defaults)
    }

    pub fn write_defaults(&self, defaults: &Defaults) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(defaults).context("serialize defaults")?;
        write_atomic(&self.root.join(DEFAULTS_FILE), &bytes).context("write defaults.json")?;
        Ok(())
    }
}

/// Write-temp-then-rename. A failure at any step leaves the previous file intact.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("create parent directories")?;
    }
    let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
    if let Err(err) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(err).with_context(|| format!("write temp file {}", tmp.display()));
    }
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err)
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()));
    }
    Ok(())
}
