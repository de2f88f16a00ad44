//! GateSync CLI
//!
//! Copies one MongoDB database into another through a local scratch
//! directory. Pedantic lints relaxed for CLI ergonomics.

// CLI tool - relax pedantic lints for ergonomics
#![allow(clippy::pedantic)]

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use gatesync::wizard::{redact_uri, Wizard, WizardUI};
use gatesync::{EndpointConfig, MigrationConfig, MigrationOptions, Pipeline, Region, UserRequest};

#[derive(Parser)]
#[command(name = "gatesync")]
#[command(version)]
#[command(about = "Copy every collection of one MongoDB database into another", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Page size override
    #[arg(long, global = true)]
    page_size: Option<usize>,

    /// Scratch directory override
    #[arg(long, value_name = "DIR", global = true)]
    scratch_dir: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,

    #[command(flatten)]
    env: EnvConfig,
}

/// Endpoint and user settings read from flags or `GATESYNC_*` variables.
#[derive(Args)]
struct EnvConfig {
    /// Source connection string
    #[arg(long, env = "GATESYNC_FROM_URI", hide_env_values = true)]
    from_uri: Option<String>,

    /// Source database name
    #[arg(long, env = "GATESYNC_FROM_DB")]
    from_db: Option<String>,

    /// Destination connection string
    #[arg(long, env = "GATESYNC_TO_URI", hide_env_values = true)]
    to_uri: Option<String>,

    /// Destination database name
    #[arg(long, env = "GATESYNC_TO_DB")]
    to_db: Option<String>,

    /// Email of the admin user to create
    #[arg(long, env = "GATESYNC_USER_EMAIL")]
    user_email: Option<String>,

    /// First name of the admin user
    #[arg(long, env = "GATESYNC_USER_FIRST_NAME")]
    user_first_name: Option<String>,

    /// Last name of the admin user
    #[arg(long, env = "GATESYNC_USER_LAST_NAME")]
    user_last_name: Option<String>,

    /// Region of the admin user (east or west)
    #[arg(long, env = "GATESYNC_USER_REGION")]
    user_region: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run migration from config file
    Run {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Validate configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Generate example configuration
    Init {
        /// Output file path
        #[arg(short, long, default_value = "migration.yaml")]
        output: PathBuf,
    },

    /// Build the configuration interactively and run it
    Wizard,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match &cli.command {
        Some(Commands::Run { config }) => {
            let config = MigrationConfig::from_file(config)?;
            run_migration(apply_overrides(config, &cli)).await
        }
        Some(Commands::Validate { config }) => {
            validate_config(config, &cli)?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Init { output }) => {
            generate_config(output)?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Wizard) => run_wizard(&cli).await,
        None => {
            if let Some(path) = &cli.config {
                info!("Loading configuration from {:?}", path);
                let config = MigrationConfig::from_file(path)?;
                return run_migration(apply_overrides(config, &cli)).await;
            }

            if let Some(config) = config_from_env(&cli.env)? {
                info!("Using configuration from GATESYNC_* environment variables");
                return run_migration(apply_overrides(config, &cli)).await;
            }

            if !console::user_attended() {
                eprintln!("Usage: gatesync --config <FILE>, set GATESYNC_FROM_URI/FROM_DB/TO_URI/TO_DB, or run in a terminal");
                eprintln!("Try 'gatesync --help' for more information.");
                return Ok(ExitCode::FAILURE);
            }
            run_wizard(&cli).await
        }
    }
}

fn apply_overrides(mut config: MigrationConfig, cli: &Cli) -> MigrationConfig {
    override_options(&mut config.options, cli);
    config
}

fn override_options(options: &mut MigrationOptions, cli: &Cli) {
    if let Some(page_size) = cli.page_size {
        options.page_size = page_size;
    }
    if let Some(dir) = &cli.scratch_dir {
        options.scratch_dir = dir.clone();
    }
    if cli.no_progress {
        options.show_progress = false;
    }
}

/// Builds a config from endpoint settings, or `None` if none are set.
fn config_from_env(env: &EnvConfig) -> anyhow::Result<Option<MigrationConfig>> {
    let endpoints = [&env.from_uri, &env.from_db, &env.to_uri, &env.to_db];
    if endpoints.iter().all(|v| v.is_none()) {
        return Ok(None);
    }

    let (Some(from_uri), Some(from_db), Some(to_uri), Some(to_db)) =
        (&env.from_uri, &env.from_db, &env.to_uri, &env.to_db)
    else {
        bail!("GATESYNC_FROM_URI, GATESYNC_FROM_DB, GATESYNC_TO_URI and GATESYNC_TO_DB must all be set");
    };

    let mut config = MigrationConfig::new(
        EndpointConfig {
            uri: from_uri.clone(),
            database: from_db.clone(),
        },
        EndpointConfig {
            uri: to_uri.clone(),
            database: to_db.clone(),
        },
    );

    if let Some(email) = &env.user_email {
        let (Some(first_name), Some(last_name), Some(region)) =
            (&env.user_first_name, &env.user_last_name, &env.user_region)
        else {
            bail!("GATESYNC_USER_EMAIL requires GATESYNC_USER_FIRST_NAME, GATESYNC_USER_LAST_NAME and GATESYNC_USER_REGION");
        };
        config.user = Some(UserRequest {
            email: email.clone(),
            first_name: first_name.clone(),
            last_name: last_name.clone(),
            region: region.parse::<Region>()?,
        });
    }

    Ok(Some(config))
}

async fn run_wizard(cli: &Cli) -> anyhow::Result<ExitCode> {
    let mut options = MigrationOptions::default();
    override_options(&mut options, cli);

    match Wizard::new().run(options)? {
        Some(config) => run_migration(config).await,
        None => Ok(ExitCode::SUCCESS),
    }
}

async fn run_migration(config: MigrationConfig) -> anyhow::Result<ExitCode> {
    let ui = WizardUI::new();
    if let Err(e) = config.validate() {
        ui.print_error(&e.to_string());
        return Ok(ExitCode::FAILURE);
    }

    info!(
        "Migrating {}/{} -> {}/{}",
        redact_uri(&config.source.uri),
        config.source.database,
        redact_uri(&config.destination.uri),
        config.destination.database
    );

    let mut pipeline = Pipeline::new(config)?;
    let token = pipeline.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling migration");
            token.cancel();
        }
    });

    let outcome = pipeline.run().await;
    interrupt.abort();

    match outcome {
        Ok(report) => {
            ui.print_success(&report);
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            ui.print_failure(&failure);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn validate_config(config_path: &Path, cli: &Cli) -> anyhow::Result<()> {
    info!("Validating configuration from {:?}", config_path);

    let config = apply_overrides(MigrationConfig::from_file(config_path)?, cli);
    config.validate()?;

    let options = &config.options;
    println!("✅ Configuration is valid!");
    println!(
        "   Source:      {} / {}",
        redact_uri(&config.source.uri),
        config.source.database
    );
    println!(
        "   Destination: {} / {}",
        redact_uri(&config.destination.uri),
        config.destination.database
    );
    println!("   Page size:   {}", options.page_size);
    println!("   Workers:     {}", options.workers);
    println!("   Blacklist:   {}", options.blacklist.join(", "));
    println!("   Scratch:     {}", options.scratch_dir.display());
    if let Some(user) = &config.user {
        println!(
            "   Admin user:  {} ({})",
            user.normalized_email(),
            user.region
        );
    }

    Ok(())
}

fn generate_config(output: &Path) -> anyhow::Result<()> {
    if output.exists() {
        bail!("{} already exists, refusing to overwrite", output.display());
    }

    std::fs::write(output, CONFIG_TEMPLATE)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("✅ Generated configuration: {:?}", output);
    println!("   Edit the file and run: gatesync run --config {:?}", output);

    Ok(())
}

const CONFIG_TEMPLATE: &str = r#"# GateSync Migration Configuration
source:
  uri: mongodb://localhost:27017
  database: app

destination:
  uri: mongodb://localhost:27018
  database: app

# Optional admin user created after the import
# user:
#   email: admin@example.com
#   first_name: Ada
#   last_name: Lovelace
#   region: east  # east or west

options:
  page_size: 1000
  workers: 4
  blacklist:
    - sessions
  scratch_dir: ./tmp
  show_progress: true
"#;
