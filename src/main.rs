//! OLS cPanel - administrative toolkit for OpenLiteSpeed on cPanel/WHM servers
//!
//! Command-line entry point: loads the YAML configuration store, initializes
//! logging from its `logging` section, and dispatches to the config, domain,
//! service and system subcommands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use ols_cpanel::config::ConfigStore;
use ols_cpanel::services::{DomainService, Platform, SslInspector, SystemService, WhmClient};

#[derive(Parser)]
#[command(
    name = "ols-cpanel",
    version,
    about = "Administrative toolkit for OpenLiteSpeed on cPanel/WHM servers"
)]
struct Cli {
    /// Configuration directory (default: /etc/ols-cpanel)
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Emit JSON where the command produces listing data
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and modify the configuration document
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// List and inspect hosted domains
    Domains {
        #[command(subcommand)]
        command: DomainsCommand,
    },
    /// Manage systemd services
    Service {
        #[command(subcommand)]
        command: ServiceCommand,
    },
    /// Host-level information and checks
    System {
        #[command(subcommand)]
        command: SystemCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the whole configuration document
    Show,
    /// Print one value by dotted path
    Get { path: String },
    /// Assign one value by dotted path and persist
    Set { path: String, value: String },
    /// Check the document for known-bad values
    Validate,
    /// Copy the configuration into the backups directory
    Backup,
    /// Overwrite the configuration with a backup file
    Restore { backup: PathBuf },
    /// Deep-merge a named template onto the configuration
    ApplyTemplate {
        name: String,
        /// Extra overrides as dotted-path=value pairs
        #[arg(long = "set", value_name = "PATH=VALUE")]
        overrides: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DomainsCommand {
    /// List hosted domains
    List {
        /// Enrich each domain with SSL, PHP and dependent-name data
        #[arg(long)]
        full: bool,
    },
    /// Show one domain in detail
    Show { domain: String },
    /// Show the SSL certificate of a domain
    Ssl { domain: String },
}

#[derive(Subcommand)]
enum ServiceCommand {
    Status { service: String },
    Start { service: String },
    Stop { service: String },
    Restart { service: String },
}

#[derive(Subcommand)]
enum SystemCommand {
    /// Print platform and host information
    Info,
    /// Validate the host against the platform requirements
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config_dir = cli
        .config_dir
        .clone()
        .or_else(|| std::env::var("OLS_CPANEL_CONFIG_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(ConfigStore::DEFAULT_CONFIG_DIR));

    let mut store = ConfigStore::open(&config_dir).context("Failed to load configuration")?;

    // The guard must stay alive so file-targeted log lines are flushed.
    let _log_guard = init_logging(&store);
    info!(config_dir = ?config_dir, "ols-cpanel starting");

    match cli.command {
        Commands::Config { command } => run_config(command, &mut store, cli.json),
        Commands::Domains { command } => run_domains(command, &store, cli.json).await,
        Commands::Service { command } => run_service(command).await,
        Commands::System { command } => run_system(command, &store, cli.json).await,
    }
}

fn init_logging(store: &ConfigStore) -> Option<WorkerGuard> {
    let level = store.get_str("logging.level", "info").to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let json = std::env::var("OLS_CPANEL_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if let Ok(log_dir) = std::env::var("OLS_CPANEL_LOG_DIR") {
        let appender = tracing_appender::rolling::daily(log_dir, "ols-cpanel.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false);
        if json {
            builder.json().init();
        } else {
            builder.init();
        }
        return Some(guard);
    }

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    None
}

fn run_config(command: ConfigCommand, store: &mut ConfigStore, json: bool) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            if json {
                let value: serde_json::Value =
                    serde_json::to_value(store.document().as_value())?;
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print!("{}", serde_norway::to_string(store.document().as_value())?);
            }
        }
        ConfigCommand::Get { path } => match store.get(&path) {
            Some(value) => print!("{}", serde_norway::to_string(value)?),
            None => println!("(not set)"),
        },
        ConfigCommand::Set { path, value } => {
            let parsed: serde_norway::Value = serde_norway::from_str(&value)
                .with_context(|| format!("invalid value: {value}"))?;
            store.set(&path, parsed);
            store.save()?;
            println!("{path} updated");
        }
        ConfigCommand::Validate => {
            let errors = store.validate();
            if errors.is_empty() {
                println!("configuration is valid");
            } else {
                for error in &errors {
                    eprintln!("error: {error}");
                }
                std::process::exit(1);
            }
        }
        ConfigCommand::Backup => {
            let backup = store.backup()?;
            println!("{}", backup.display());
        }
        ConfigCommand::Restore { backup } => {
            store.restore(&backup)?;
            println!("configuration restored from {}", backup.display());
        }
        ConfigCommand::ApplyTemplate { name, overrides } => {
            let overrides = parse_overrides(&overrides)?;
            store.apply_template(&name, &overrides)?;
            println!("template {name} applied");
        }
    }
    Ok(())
}

fn parse_overrides(pairs: &[String]) -> Result<serde_norway::Value> {
    let mut document = ols_cpanel::ConfigDocument::default();
    for pair in pairs {
        let (path, raw) = pair
            .split_once('=')
            .with_context(|| format!("override must be PATH=VALUE: {pair}"))?;
        let value: serde_norway::Value =
            serde_norway::from_str(raw).with_context(|| format!("invalid value: {raw}"))?;
        document.set(path, value);
    }
    Ok(document.as_value().clone())
}

async fn run_domains(command: DomainsCommand, store: &ConfigStore, json: bool) -> Result<()> {
    let service = DomainService::from_config(WhmClient::new(), store);

    match command {
        DomainsCommand::List { full } => {
            let domains = if full {
                service.inventory().await?
            } else {
                service.list_domains().await?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&domains)?);
            } else {
                for domain in &domains {
                    println!(
                        "{:<40} {:<16} {:<16} {}",
                        domain.domain,
                        domain.user,
                        domain.ip,
                        domain.status().as_str()
                    );
                }
                println!("{} domain(s)", domains.len());
            }
        }
        DomainsCommand::Show { domain } => {
            let Some(record) = service.get_domain(&domain).await? else {
                eprintln!("domain not found: {domain}");
                std::process::exit(1);
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("domain:        {}", record.domain);
                println!("user:          {}", record.user);
                println!("ip:            {}", record.ip);
                println!("owner:         {}", record.owner);
                println!("plan:          {}", record.plan);
                println!("type:          {}", record.domain_type().as_str());
                println!("status:        {}", record.status().as_str());
                println!("document root: {}", record.full_document_root());
                if let Some(setup) = &record.setup_date {
                    println!("setup date:    {setup}");
                }
            }
        }
        DomainsCommand::Ssl { domain } => {
            let Some(mut cert) = service.ssl_info(&domain).await else {
                eprintln!("no SSL certificate installed for {domain}");
                std::process::exit(1);
            };

            // Fill in the fields WHM does not report from the PEM itself.
            let inspector = SslInspector::new();
            if let Err(e) = inspector.enrich(&mut cert).await {
                tracing::warn!(domain, error = %e, "certificate inspection failed");
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&cert)?);
            } else {
                println!("domain:     {}", cert.domain);
                println!("issuer:     {}", cert.issuer);
                println!("kind:       {}", cert.certificate_kind().as_str());
                println!("expires:    {}", cert.formatted_expiration_date());
                if let Some(days) = cert.days_until_expiration() {
                    println!("days left:  {days}");
                }
                println!("status:     {}", cert.expiration_status().as_str());
                if let Some(serial) = &cert.serial_number {
                    println!("serial:     {serial}");
                }
                if let Some(algorithm) = &cert.signature_algorithm {
                    println!("algorithm:  {algorithm}");
                }
                if let Some(key_size) = &cert.key_size {
                    println!("key size:   {key_size}");
                }
                if !cert.subject_alternative_names.is_empty() {
                    println!("SANs:       {}", cert.subject_alternative_names.join(", "));
                }
                println!("{}", cert.renewal_recommendation());
            }
        }
    }
    Ok(())
}

async fn run_service(command: ServiceCommand) -> Result<()> {
    let system = SystemService::new(Platform::detect().await);

    let (service, action) = match command {
        ServiceCommand::Status { service } => {
            let status = system.service_status(&service).await;
            println!("service: {}", status.service);
            println!("active:  {}", status.active);
            println!("enabled: {}", status.enabled);
            return Ok(());
        }
        ServiceCommand::Start { service } => (service, "start"),
        ServiceCommand::Stop { service } => (service, "stop"),
        ServiceCommand::Restart { service } => (service, "restart"),
    };

    if system.manage_service(&service, action).await {
        println!("{service} {action} successful");
        Ok(())
    } else {
        eprintln!("failed to {action} {service}");
        std::process::exit(1);
    }
}

async fn run_system(command: SystemCommand, store: &ConfigStore, json: bool) -> Result<()> {
    let platform = Platform::detect().await;
    let system = SystemService::new(platform);

    match command {
        SystemCommand::Info => {
            if json {
                println!("{}", serde_json::to_string_pretty(system.platform())?);
                return Ok(());
            }
            let platform = system.platform();
            println!("os:              {} {}", platform.os, platform.version);
            println!("architecture:    {}", platform.architecture);
            println!("package manager: {}", platform.package_manager.as_str());
            println!("supported:       {}", platform.supported);
            println!("hostname:        {}", system.hostname());
            println!("kernel:          {}", system.kernel_version());
            println!("uptime:          {}", system.uptime());
            let (one, five, fifteen) = system.load_average();
            println!("load average:    {one:.2}, {five:.2}, {fifteen:.2}");
        }
        SystemCommand::Check => {
            let validation = system.platform().validate_host().await;
            let config_errors = store.validate();

            for warning in &validation.warnings {
                println!("warning: {warning}");
            }
            for error in &validation.errors {
                eprintln!("error: {error}");
            }
            for error in &config_errors {
                eprintln!("config error: {error}");
            }

            if validation.errors.is_empty() && config_errors.is_empty() {
                println!("host checks passed");
            } else {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
