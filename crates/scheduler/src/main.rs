//! certwarden - certificate lifecycle scheduler

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use certwarden::store::{FileStore, InstanceStore};
use certwarden::{
    collaborators_with_store, Clock, FixedClock, PassScheduler, ScheduleLoop, SchedulerSettings,
    SystemClock,
};
use certwarden_common::{CertName, CertType, Certificate, ExecutionMode, SubjectType};
use certwarden_config::{Config, LogFormat, LoggingConfig};

/// certwarden - certificate lifecycle scheduler
#[derive(Parser, Debug)]
#[command(name = "certwarden")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", env = "CERTWARDEN_CONFIG", global = true)]
    config: Option<String>,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one scheduling pass (default)
    Run {
        /// Log what would be done without changing anything
        #[arg(short = 'n', long = "dry-run")]
        dry_run: bool,

        /// Evaluate as of this RFC 3339 timestamp
        #[arg(long = "at", requires = "dry_run")]
        at: Option<DateTime<Utc>>,
    },
    /// Run scheduling passes periodically until SIGINT or SIGTERM
    Daemon,
    /// Validate configuration file and exit
    Test,
    /// Manage certificate records
    Cert {
        #[command(subcommand)]
        command: CertCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CertCommands {
    /// List certificates and their instances
    List,
    /// Add a certificate
    Add {
        name: String,
        /// Certificate type: local or acme
        #[arg(long = "type", default_value = "acme")]
        cert_type: CertType,
        /// Certificate is a CA, never scheduled
        #[arg(long)]
        ca: bool,
        #[arg(long)]
        disabled: bool,
    },
    /// Stop issuing and distributing a certificate
    Disable { name: String },
    Enable { name: String },
    /// Allow the renewal reminder to be sent again
    ClearReminder { name: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let command = cli.command.unwrap_or(Commands::Run {
        dry_run: false,
        at: None,
    });

    if let Commands::Test = command {
        // Minimal logging for config test
        tracing_subscriber::fmt()
            .with_target(false)
            .with_level(true)
            .init();
    } else {
        init_logging(&config.logging, cli.verbose);
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    runtime.block_on(dispatch(command, config, cli.config.as_deref()))
}

async fn dispatch(command: Commands, config: Config, config_path: Option<&str>) -> Result<()> {
    match command {
        Commands::Run { dry_run, at } => {
            run_pass(&config, ExecutionMode::from_dry_run(dry_run), at).await
        }
        Commands::Daemon => run_daemon(&config).await,
        Commands::Test => test_config(&config, config_path),
        Commands::Cert { command } => manage_certificates(&config, command).await,
    }
}

/// Load configuration with priority: CLI arg / env var > embedded default
fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path).context("Failed to load configuration file"),
        None => Config::default_embedded().context("Failed to load embedded configuration"),
    }
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        logging.level.clone().unwrap_or_else(|| "info".to_string())
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

fn test_config(config: &Config, config_path: Option<&str>) -> Result<()> {
    let warnings = config.validate().context("Configuration validation failed")?;

    info!("Configuration test successful:");
    info!("  - storage: {}", config.storage.path.display());
    info!(
        "  - pre-publish window: {} day(s), reminder lead: {} day(s)",
        config.schedule.pre_publish_window_days, config.schedule.reminder_lead_days
    );
    info!("  - {} warning(s)", warnings.len());

    println!(
        "certwarden: configuration file {} test is successful",
        config_path.unwrap_or("(embedded)")
    );
    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<dyn InstanceStore>> {
    let store = FileStore::open(&config.storage.path).with_context(|| {
        format!(
            "Failed to open certificate store at {}",
            config.storage.path.display()
        )
    })?;
    Ok(Arc::new(store))
}

fn scheduler(config: &Config, clock: Arc<dyn Clock>) -> Result<PassScheduler> {
    config.validate().context("Configuration validation failed")?;
    let collab = collaborators_with_store(config, open_store(config)?, clock);
    Ok(PassScheduler::new(collab, SchedulerSettings::from_config(config)))
}

async fn run_pass(config: &Config, mode: ExecutionMode, at: Option<DateTime<Utc>>) -> Result<()> {
    let clock: Arc<dyn Clock> = match at {
        Some(at) => {
            info!(at = %at, "Evaluating as of a fixed time");
            Arc::new(FixedClock::new(at))
        }
        None => Arc::new(SystemClock),
    };

    let report = scheduler(config, clock)?
        .run(mode)
        .await
        .context("Scheduling pass failed")?;

    for failure in &report.failures {
        warn!(cert = %failure.cert, error = %failure.error, "Certificate not processed");
    }
    println!("{report}");

    if report.is_clean() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Scheduling pass finished with errors"))
    }
}

async fn run_daemon(config: &Config) -> Result<()> {
    let schedule = ScheduleLoop::new(scheduler(config, Arc::new(SystemClock))?)
        .with_interval(config.schedule.check_interval());

    let passes = schedule.run_until(certwarden::daemon::shutdown_signal()).await;
    info!(passes = passes, "certwarden daemon stopped");
    Ok(())
}

async fn manage_certificates(config: &Config, command: CertCommands) -> Result<()> {
    let store = open_store(config)?;

    match command {
        CertCommands::List => {
            for cert in store.certificates().await? {
                println!(
                    "{}\t{}\t{}{}{}",
                    cert.name,
                    cert.cert_type,
                    cert.subject_type,
                    if cert.disabled { "\t[DISABLED]" } else { "" },
                    cert.authorized_until
                        .map(|at| format!("\treminded {}", at.format("%Y-%m-%d")))
                        .unwrap_or_default(),
                );
                for instance in store.instances_of(&cert.name).await? {
                    println!("    {instance}");
                }
            }
        }
        CertCommands::Add {
            name,
            cert_type,
            ca,
            disabled,
        } => {
            let mut cert = Certificate::new(name, cert_type);
            if ca {
                cert.subject_type = SubjectType::Ca;
            }
            cert.disabled = disabled;
            store.add_certificate(cert.clone()).await?;
            info!(cert = %cert.name, cert_type = %cert.cert_type, "Added certificate");
        }
        CertCommands::Disable { name } => {
            store.set_disabled(&CertName::new(name.as_str()), true).await?;
            info!(cert = %name, "Disabled certificate");
        }
        CertCommands::Enable { name } => {
            store.set_disabled(&CertName::new(name.as_str()), false).await?;
            info!(cert = %name, "Enabled certificate");
        }
        CertCommands::ClearReminder { name } => {
            store
                .update_authorized_until(&CertName::new(name.as_str()), None)
                .await?;
            info!(cert = %name, "Cleared renewal reminder");
        }
    }

    Ok(())
}
