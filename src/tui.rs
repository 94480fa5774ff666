use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::cache::{CacheEngine, CacheSettings, RetryPolicy, Workers};
use crate::error::CoreError;
use crate::logging;
use crate::nav::{self, NavConfig, Navigator};
use crate::registry::Registry;
use crate::remote::{GatewayFactory, GatewayProbe};
use crate::session::SessionManager;
use crate::store::ConfigStore;
use crate::vault::Vault;

pub const PASSWORD_ENV: &str = "STRATUS_VAULT_PASSWORD";
const DEFAULT_GATEWAY: &str = "http://127.0.0.1:8750";
const FALLBACK_REGION: &str = "us-east-1";

#[derive(Clone, Debug, Default)]
pub struct TuiRunOptions {
    pub config_dir: Option<PathBuf>,
    /// Context to open at startup instead of the stored default.
    pub context: Option<String>,
    /// Region to open at startup instead of the stored default.
    pub region: Option<String>,
    pub gateway: Option<String>,
    pub log_file: Option<PathBuf>,
}

/// Everything a running dashboard owns. Dropping it stops the workers.
pub struct Runtime {
    pub navigator: Navigator,
    _workers: Workers,
}

pub fn run() -> Result<()> {
    run_with_options(TuiRunOptions::default())
}

pub fn run_with_options(opts: TuiRunOptions) -> Result<()> {
    let store = ConfigStore::discover(opts.config_dir.clone())?;
    logging::init(&logging::resolve_log_file_path(
        opts.log_file.clone(),
        &store.log_path(),
    ))?;
    let vault = unlock_vault(&store)?;
    let rt = bootstrap(store, vault, &opts)?;
    crate::tui_shell::run(rt)
}

/// Password from `STRATUS_VAULT_PASSWORD`, else an interactive prompt. A new
/// vault asks twice.
pub fn read_password(store: &ConfigStore) -> Result<String> {
    if let Ok(p) = std::env::var(PASSWORD_ENV)
        && !p.is_empty()
    {
        return Ok(p);
    }
    let mut prompt = dialoguer::Password::new().with_prompt("Vault password");
    if !store.vault_path().exists() {
        prompt = prompt.with_confirmation("Confirm password", "passwords do not match");
    }
    prompt.interact().context("read vault password")
}

pub fn unlock_vault(store: &ConfigStore) -> Result<Vault> {
    let password = read_password(store)?;
    match Vault::open(&store.vault_path(), &password) {
        Ok(v) => Ok(v),
        Err(CoreError::BadPassword) => Err(anyhow!("wrong vault password")),
        Err(CoreError::CorruptStore(reason)) => Err(anyhow!(
            "vault at {} is unreadable: {}",
            store.vault_path().display(),
            reason
        )),
        Err(err) => Err(err).context("open vault"),
    }
}

/// Wire the engine together around an unlocked vault.
pub fn bootstrap(store: ConfigStore, vault: Vault, opts: &TuiRunOptions) -> Result<Runtime> {
    let config = store.read_config()?;
    let defaults = store.read_defaults()?;

    let gateway = opts
        .gateway
        .clone()
        .or_else(|| config.gateway_url.clone())
        .unwrap_or_else(|| DEFAULT_GATEWAY.to_string());
    let probe = GatewayProbe::new(&gateway).map_err(|e| anyhow!("gateway probe: {}", e))?;
    let factory = Arc::new(GatewayFactory::new(gateway.clone()));

    let workers = Workers::start()?;
    let (tx, rx) = nav::channel();
    let cache = CacheEngine::builder(Registry::builtin(), workers.spawner())
        .settings(CacheSettings::from_config(
            &config.cache,
            RetryPolicy::from_config(&config.retry),
        ))
        .events(nav::cache_sink(tx.clone()))
        .build();

    let fallback = config
        .regions
        .first()
        .cloned()
        .unwrap_or_else(|| FALLBACK_REGION.to_string());
    let sessions = SessionManager::new(vault, defaults, Some(store), factory, fallback)
        .with_startup(opts.context.clone(), opts.region.clone());
    info!(gateway = %gateway, contexts = sessions.vault().len(), "starting");

    let mut navigator = Navigator::new(
        sessions,
        cache,
        Arc::new(probe),
        NavConfig::from_config(&config),
        (tx, rx),
    );
    navigator.start();
    Ok(Runtime {
        navigator,
        _workers: workers,
    })
}
