use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use stratus::logging;
use stratus::remote::GatewayProbe;
use stratus::store::ConfigStore;
use stratus::tui::{self, TuiRunOptions};
use stratus::model::Credentials;
use stratus::vault::{
    CredentialSource, EnvCredentials, ImportCandidate, ImportReport, JsonCredentialsFile,
};

const SECRET_ENV: &str = "STRATUS_SECRET_ACCESS_KEY";

#[derive(Parser)]
#[command(name = "stratus")]
#[command(about = "Terminal dashboard for cloud resources", long_about = None)]
struct Cli {
    /// Configuration directory (defaults to STRATUS_CONFIG_DIR, then the platform config dir)
    #[arg(long, value_name = "PATH", global = true)]
    config_dir: Option<PathBuf>,

    /// Resource gateway base URL (overrides config.json)
    #[arg(long, value_name = "URL", global = true)]
    gateway: Option<String>,

    /// Log file (defaults to STRATUS_LOG_FILE, then stratus.log in the config dir)
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    /// Context to open on start
    #[arg(long)]
    context: Option<String>,

    /// Region to open on start
    #[arg(long)]
    region: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored contexts
    Contexts {
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// Import contexts after validating each one against the gateway
    Import {
        /// JSON credentials file: [{name, access_key_id, secret_access_key, region}]
        #[arg(conflicts_with = "env")]
        file: Option<PathBuf>,
        /// Read STRATUS_ACCESS_KEY_ID / STRATUS_SECRET_ACCESS_KEY instead of a file
        #[arg(long)]
        env: bool,
        /// Context name for --env
        #[arg(long, default_value = "env")]
        name: String,
    },

    /// Add (or replace) one context after validating its keys against the gateway
    Add {
        /// Context name
        name: String,
        /// Access key id
        #[arg(long, value_name = "ID")]
        access_key_id: String,
        /// Default region for this context
        #[arg(long = "default-region", value_name = "REGION")]
        default_region: Option<String>,
    },

    /// Show where configuration, vault and log live
    Paths,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return tui::run_with_options(TuiRunOptions {
            config_dir: cli.config_dir,
            context: cli.context,
            region: cli.region,
            gateway: cli.gateway,
            log_file: cli.log_file,
        });
    };

    let store = ConfigStore::discover(cli.config_dir.clone())?;
    logging::init(&logging::resolve_log_file_path(
        cli.log_file.clone(),
        &store.log_path(),
    ))?;

    match command {
        Commands::Contexts { json } => {
            let vault = tui::unlock_vault(&store)?;
            let defaults = store.read_defaults()?;
            if json {
                let rows: Vec<_> = vault
                    .contexts()
                    .map(|c| {
                        serde_json::json!({
                            "name": c.name,
                            "account": c.account_id,
                            "region": c.default_region,
                            "origin": c.origin,
                            "default": defaults.context.as_deref() == Some(c.name.as_str()),
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&rows).context("serialize contexts json")?
                );
            } else if vault.is_empty() {
                println!("No contexts");
            } else {
                for c in vault.contexts() {
                    let marker = if defaults.context.as_deref() == Some(c.name.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    println!(
                        "{} {} account={} region={}",
                        marker,
                        c.name,
                        c.account_label(),
                        c.default_region.as_deref().unwrap_or("-")
                    );
                }
            }
        }

        Commands::Import { file, env, name } => {
            let source: Box<dyn CredentialSource> = match (file, env) {
                (Some(path), false) => Box::new(JsonCredentialsFile::new(path)),
                (None, true) => Box::new(EnvCredentials::new(name)),
                _ => return Err(anyhow!("pass a credentials file or --env")),
            };
            let candidates = source.candidates()?;
            if candidates.is_empty() {
                println!("Nothing to import from {}", source.label());
                return Ok(());
            }

            let probe = gateway_probe(cli.gateway, &store)?;
            let mut vault = tui::unlock_vault(&store)?;
            let report = vault.import(candidates, &probe).context("import contexts")?;
            print_report(&report);
        }

        Commands::Add {
            name,
            access_key_id,
            default_region,
        } => {
            let secret = read_secret()?;
            let candidate = ImportCandidate {
                name,
                credentials: Credentials::new(access_key_id, secret),
                region: default_region,
            };
            candidate.check_filled()?;
            let probe = gateway_probe(cli.gateway, &store)?;
            let mut vault = tui::unlock_vault(&store)?;
            let context = vault.add_verified(candidate, &probe)?;
            println!("added {} (account {})", context.name, context.account_label());
        }

        Commands::Paths => {
            println!("config: {}", store.root().display());
            println!("vault: {}", store.vault_path().display());
            println!(
                "log: {}",
                logging::resolve_log_file_path(cli.log_file, &store.log_path()).display()
            );
        }
    }

    Ok(())
}

fn gateway_probe(flag: Option<String>, store: &ConfigStore) -> Result<GatewayProbe> {
    let gateway = flag
        .or(store.read_config()?.gateway_url)
        .context("no gateway configured (pass --gateway or set gateway_url in config.json)")?;
    GatewayProbe::new(&gateway).map_err(|e| anyhow!("gateway probe: {}", e))
}

fn read_secret() -> Result<String> {
    if let Ok(s) = std::env::var(SECRET_ENV)
        && !s.is_empty()
    {
        return Ok(s);
    }
    dialoguer::Password::new()
        .with_prompt("Secret access key")
        .interact()
        .context("read secret access key")
}

fn print_report(report: &ImportReport) {
    for name in &report.imported {
        println!("imported {}", name);
    }
    for (name, reason) in &report.skipped {
        println!("skipped {}: {}", name, reason);
    }
}
