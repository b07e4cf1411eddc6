//! Scholar CLI
//!
//! Runs the Scholar school-management API and its database chores.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use scholar_observability::{init_logging_with_config, LoggingConfig};
use std::path::{Path, PathBuf};

mod commands;
mod config;
mod validator;

use commands::{run_migrate, run_seed_admin, run_server};
use config::AppConfig;
use validator::ConfigValidator;

#[derive(Parser)]
#[command(name = "scholar")]
#[command(version)]
#[command(about = "Multi-tenant school management API", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "SCHOLAR_CONFIG",
        default_value = "config/scholar.yaml"
    )]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Database URL (overrides the config file)
        #[arg(short, long)]
        database: Option<String>,

        /// Disable Swagger UI
        #[arg(long)]
        no_swagger: bool,

        /// Validate configuration and exit without starting the server
        #[arg(long)]
        validate_only: bool,
    },

    /// Create or upgrade the database schema
    Migrate,

    /// Create the platform SuperAdmin if none exists
    SeedAdmin {
        /// Account email (overrides the config file)
        #[arg(long)]
        email: Option<String>,
    },

    /// Validate configuration
    Validate,

    /// Show current configuration
    Config {
        /// Show secrets (redacted by default)
        #[arg(long)]
        show_secrets: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(&cli.config)?;
    if cli.verbose && !cli.config.exists() {
        eprintln!(
            "Using default configuration (no config file at {})",
            cli.config.display()
        );
    }

    init_logging(&config, cli.verbose)?;

    match cli.command {
        Commands::Serve {
            port,
            host,
            database,
            no_swagger,
            validate_only,
        } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(database) = database {
                config.database.url = database;
            }
            if no_swagger {
                config.server.enable_swagger = false;
            }
            cmd_serve(config, validate_only).await
        }
        Commands::Migrate => run_migrate(config).await,
        Commands::SeedAdmin { email } => {
            if let Some(email) = email {
                config.auth.admin_email = email;
            }
            run_seed_admin(config).await
        }
        Commands::Validate => cmd_validate(&cli.config, config),
        Commands::Config { show_secrets } => cmd_config(config, show_secrets, cli.format),
    }
}

fn init_logging(config: &AppConfig, verbose: bool) -> Result<()> {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let format = if config.logging.json { "json" } else { "pretty" };

    let logging =
        LoggingConfig::from_settings(level, format).context("Invalid logging configuration")?;
    init_logging_with_config(logging).context("Failed to initialize logging")?;
    Ok(())
}

async fn cmd_serve(config: AppConfig, validate_only: bool) -> Result<()> {
    println!("{}", "Validating configuration...".cyan());

    let validation_result = ConfigValidator::validate(&config);
    validation_result.print();

    if validation_result.has_errors() {
        println!();
        let message = if validate_only {
            "Configuration validation failed. Fix the errors above before starting the server."
        } else {
            "Server startup aborted due to configuration errors. Fix the errors above and try again."
        };
        println!("{}", message.red().bold());
        std::process::exit(1);
    }

    if validate_only {
        println!();
        println!(
            "{}",
            "Configuration is valid. Server can be started."
                .green()
                .bold()
        );
        return Ok(());
    }

    println!();
    run_server(config).await
}

fn cmd_validate(config_path: &Path, config: AppConfig) -> Result<()> {
    println!(
        "Validating configuration: {}",
        config_path.display().to_string().cyan()
    );

    let validation_result = ConfigValidator::validate(&config);
    validation_result.print();

    println!();
    println!("{}", "Configuration Summary".bold());
    println!("─────────────────────");
    println!(
        "  Listen: {}:{}",
        config.server.host, config.server.port
    );
    println!("  Database: {}", config.database.url);
    println!("  SuperAdmin: {}", config.auth.admin_email);
    println!("  Log level: {}", config.logging.level);

    if validation_result.has_errors() {
        println!();
        println!(
            "{}",
            "Configuration validation failed. Fix the errors above."
                .red()
                .bold()
        );
        std::process::exit(1);
    } else if validation_result.has_warnings() {
        println!();
        println!(
            "{}",
            "Configuration is valid with warnings. Review the warnings above."
                .yellow()
                .bold()
        );
    } else {
        println!();
        println!("{}", "Configuration is valid.".green().bold());
    }

    Ok(())
}

fn cmd_config(config: AppConfig, show_secrets: bool, format: OutputFormat) -> Result<()> {
    let display_config = if show_secrets {
        config
    } else {
        config.redact_secrets()
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&display_config)?);
    } else {
        print!("{}", serde_yaml::to_string(&display_config)?);
    }

    Ok(())
}
