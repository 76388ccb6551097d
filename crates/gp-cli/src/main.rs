//! Gatepass CLI
//!
//! Command-line interface for the Gatepass pass-management back office.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod api_client;
mod commands;
mod config;
mod validator;

use api_client::ApiClient;
use commands::{run_server, ServeConfig};
use config::AppConfig;
use validator::ConfigValidator;

#[derive(Parser)]
#[command(name = "gatepass")]
#[command(version)]
#[command(about = "Pass-management back office server and tools", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    /// API server URL for remote commands
    #[arg(long, default_value = "http://localhost:8080")]
    api_url: String,

    /// Bearer token for remote commands (or GATEPASS_TOKEN)
    #[arg(long)]
    token: Option<String>,

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
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Database URL (sqlite:// or postgres://)
        #[arg(short, long)]
        database: Option<String>,

        /// Disable Swagger UI
        #[arg(long)]
        no_swagger: bool,

        /// Validate configuration and exit without starting
        #[arg(long)]
        validate_only: bool,
    },

    /// Validate configuration
    Validate {
        /// Configuration file to validate
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show current configuration
    Config {
        /// Show secrets (redacted by default)
        #[arg(long)]
        show_secrets: bool,
    },

    /// Inspect and operate the service queue on a running server
    Queue {
        #[command(subcommand)]
        action: QueueCommands,
    },

    /// Look up contractors on a running server
    Contractor {
        #[command(subcommand)]
        action: ContractorCommands,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// List queue tokens
    List {
        /// Filter by status (active, closed)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Close an active token
    Close {
        /// Token ID
        id: String,
    },
}

#[derive(Subcommand)]
enum ContractorCommands {
    /// List contractors
    List {
        /// Search by name, passport, or phone
        #[arg(short, long)]
        search: Option<String>,

        /// Maximum rows to show
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    gp_observability::init_logging_with_config(gp_observability::LoggingConfig {
        level: log_level,
        json_format: cli.format == OutputFormat::Json,
        ..Default::default()
    });

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = AppConfig::load(&config_path).unwrap_or_else(|_| {
        if cli.verbose {
            eprintln!("Using default configuration (no config file found)");
        }
        let mut config = AppConfig::default();
        config.apply_env();
        config
    });

    match cli.command {
        Commands::Serve {
            port,
            host,
            database,
            no_swagger,
            validate_only,
        } => {
            let serve = ServeConfig {
                host: host.unwrap_or_else(|| config.server.host.clone()),
                port: port.unwrap_or(config.server.port),
                database_url: database.unwrap_or_else(|| config.database.url.clone()),
                enable_swagger: !no_swagger && config.server.enable_swagger,
                request_timeout_secs: config.server.request_timeout_secs,
            };
            cmd_serve(serve, config, validate_only).await
        }
        Commands::Validate { config: cfg_path } => {
            cmd_validate(cfg_path.unwrap_or(config_path)).await
        }
        Commands::Config { show_secrets } => cmd_config(config, show_secrets, cli.format),
        Commands::Queue { action } => {
            cmd_queue(action, cli.format, &cli.api_url, cli.token.clone()).await
        }
        Commands::Contractor { action } => {
            cmd_contractor(action, cli.format, &cli.api_url, cli.token.clone()).await
        }
    }
}

fn default_config_path() -> PathBuf {
    if let Some(dirs) = directories::ProjectDirs::from("io", "gatepass", "gatepass") {
        dirs.config_dir().join("config.yaml")
    } else {
        PathBuf::from("config/gatepass.yaml")
    }
}

async fn cmd_serve(serve: ServeConfig, config: AppConfig, validate_only: bool) -> Result<()> {
    println!("{}", "Validating configuration...".cyan());

    let result = ConfigValidator::validate(&config);
    result.print();

    if validate_only {
        if result.has_errors() {
            println!();
            println!("{}", "Configuration is invalid.".red().bold());
            std::process::exit(1);
        }
        println!();
        println!("{}", "Configuration is valid.".green().bold());
        return Ok(());
    }

    if result.has_errors() {
        println!();
        println!(
            "{}",
            "Server startup aborted due to configuration errors.".red().bold()
        );
        std::process::exit(1);
    }

    println!();
    run_server(serve, config).await
}

async fn cmd_validate(config_path: PathBuf) -> Result<()> {
    println!(
        "Validating configuration: {}",
        config_path.display().to_string().cyan()
    );

    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("{}: {e:#}", "Configuration file error".red().bold());
            std::process::exit(1);
        }
    };

    let result = ConfigValidator::validate(&config);
    result.print();

    println!();
    println!("{}", "Configuration Summary".bold());
    println!("─────────────────────");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Database: {}", config.redact_secrets().database.url);
    println!("  Token TTL: {} minutes", config.auth.token_ttl_minutes);

    if result.has_errors() {
        println!();
        println!("{}", "Configuration is invalid.".red().bold());
        std::process::exit(1);
    } else if result.has_warnings() {
        println!();
        println!("{}", "Configuration is valid with warnings.".yellow().bold());
    } else {
        println!();
        println!("{}", "Configuration is valid.".green().bold());
    }

    Ok(())
}

fn cmd_config(config: AppConfig, show_secrets: bool, format: OutputFormat) -> Result<()> {
    let display = if show_secrets {
        config
    } else {
        config.redact_secrets()
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&display)?);
    } else {
        println!("{}", "Current Configuration".bold());
        println!("─────────────────────");
        println!("Server: {}:{}", display.server.host, display.server.port);
        println!("Swagger UI: {}", display.server.enable_swagger);
        println!("Database: {}", display.database.url);
        println!("Max connections: {}", display.database.max_connections);
        println!("Token TTL: {} minutes", display.auth.token_ttl_minutes);
        println!("Log level: {}", display.logging.level);
    }

    Ok(())
}

async fn cmd_queue(
    action: QueueCommands,
    format: OutputFormat,
    api_url: &str,
    token: Option<String>,
) -> Result<()> {
    let client = ApiClient::new(api_url, token)?;

    match action {
        QueueCommands::List { status } => match client.list_queue_tokens(status.as_deref()).await {
            Ok(tokens) => {
                if format == OutputFormat::Json {
                    let rows: Vec<serde_json::Value> = tokens
                        .iter()
                        .map(|t| {
                            serde_json::json!({
                                "id": t.id,
                                "number": t.number,
                                "kind": t.kind,
                                "status": t.status,
                                "created_at": t.created_at,
                            })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                } else {
                    println!("{}", "Queue".bold());
                    println!("─────");
                    if tokens.is_empty() {
                        println!("No tokens");
                    }
                    for token in tokens {
                        let status = match token.status.as_str() {
                            "active" => token.status.green(),
                            _ => token.status.white(),
                        };
                        println!(
                            "  #{:<4} [{}] {} - {}",
                            token.number,
                            status,
                            token.kind.cyan(),
                            &token.id.to_string()[..8]
                        );
                    }
                }
            }
            Err(e) => {
                println!("{}: {e:#}", "Error".red());
                println!("Make sure the API server is running (gatepass serve)");
            }
        },
        QueueCommands::Close { id } => match uuid::Uuid::parse_str(&id) {
            Ok(id) => match client.close_queue_token(id).await {
                Ok(token) => {
                    println!(
                        "{} token #{} ({})",
                        "Closed".green().bold(),
                        token.number,
                        token.kind
                    );
                }
                Err(e) => println!("{}: {e:#}", "Error".red()),
            },
            Err(_) => println!("{}: Invalid UUID format", "Error".red()),
        },
    }
    Ok(())
}

async fn cmd_contractor(
    action: ContractorCommands,
    format: OutputFormat,
    api_url: &str,
    token: Option<String>,
) -> Result<()> {
    let client = ApiClient::new(api_url, token)?;

    match action {
        ContractorCommands::List { search, limit } => {
            match client.list_contractors(search.as_deref(), limit).await {
                Ok(page) => {
                    if format == OutputFormat::Json {
                        let rows: Vec<serde_json::Value> = page
                            .data
                            .iter()
                            .map(|c| {
                                serde_json::json!({
                                    "id": c.id,
                                    "full_name": c.full_name,
                                    "passport_number": c.passport_number,
                                    "is_archived": c.is_archived,
                                })
                            })
                            .collect();
                        println!("{}", serde_json::to_string_pretty(&rows)?);
                    } else {
                        println!("{}", "Contractors".bold());
                        println!("───────────");
                        if page.data.is_empty() {
                            println!("No contractors found");
                        }
                        for c in &page.data {
                            println!(
                                "  {} {} [{}]",
                                &c.id.to_string()[..8].cyan(),
                                c.full_name,
                                c.passport_number
                            );
                        }
                        println!();
                        println!(
                            "Page {}/{} ({} total)",
                            page.pagination.page,
                            page.pagination.total_pages,
                            page.pagination.total_items
                        );
                    }
                }
                Err(e) => {
                    println!("{}: {e:#}", "Error".red());
                    println!("Make sure the API server is running (gatepass serve)");
                }
            }
        }
    }
    Ok(())
}
