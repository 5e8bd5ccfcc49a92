use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use bulletin_monitor::config::MonitorConfig;
use bulletin_monitor::monitor::{BulletinMonitor, BulletinStatus, LineSeverity};
use bulletin_monitor::server::{ssh_session, Server};
use bulletin_monitor::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "bulletin-monitor")]
#[command(version)]
#[command(about = "Monitor scheduled bulletin jobs on a remote host over SSH")]
#[command(propagate_version = true)]
struct Args {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

// =============================================================================
// Connection Arguments (override the config file)
// =============================================================================

#[derive(Parser, Debug)]
struct ConnectionArgs {
    /// Path to the TOML configuration file
    #[arg(
        long,
        short = 'c',
        global = true,
        env = "BULLETIN_MONITOR_CONFIG",
        default_value = "bulletins.toml"
    )]
    config: PathBuf,

    /// Remote host running the bulletins
    #[arg(long, global = true, env = "BULLETIN_SSH_HOST")]
    host: Option<String>,

    /// SSH port
    #[arg(long = "ssh-port", global = true, env = "BULLETIN_SSH_PORT")]
    ssh_port: Option<u16>,

    /// SSH user
    #[arg(long, global = true, env = "BULLETIN_SSH_USER")]
    user: Option<String>,

    /// Private key used for authentication (preferred over a password)
    #[arg(long, global = true, env = "BULLETIN_SSH_KEY")]
    private_key: Option<PathBuf>,

    /// Password used when no private key is available
    #[arg(long, global = true, env = "BULLETIN_SSH_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the web dashboard
    Serve {
        /// Port for the web dashboard
        #[arg(long, default_value = "5000")]
        port: u16,

        /// Refresh bulletin statuses every N seconds and log changes
        #[arg(long)]
        poll_interval: Option<u64>,
    },

    /// Print the status of every bulletin
    Status {
        /// Output format
        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },

    /// Print a bulletin's log
    Log {
        /// Bulletin ID
        id: String,

        /// Print the whole log with severity markers instead of the tail
        #[arg(long)]
        full: bool,
    },

    /// Run a bulletin's re-run command on the remote host
    Rerun {
        /// Bulletin ID
        id: String,
    },
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    target: &'a str,
    bulletins: &'a [BulletinStatus],
}

// =============================================================================
// Helper Functions
// =============================================================================

fn load_config(args: &ConnectionArgs) -> Result<MonitorConfig, Box<dyn std::error::Error>> {
    let mut config = if args.config.exists() {
        MonitorConfig::load(&args.config)?
    } else {
        tracing::warn!(path = %args.config.display(), "Config file not found, using defaults");
        MonitorConfig::default()
    };

    if let Some(host) = &args.host {
        config.ssh.host = host.clone();
    }
    if let Some(port) = args.ssh_port {
        config.ssh.port = port;
    }
    if let Some(user) = &args.user {
        config.ssh.user = user.clone();
    }
    if let Some(key) = &args.private_key {
        config.ssh.private_key_path = Some(key.clone());
    }
    if let Some(password) = &args.password {
        config.ssh.password = Some(password.clone());
    }

    config.ssh.validate()?;
    Ok(config)
}

fn severity_marker(severity: Option<LineSeverity>) -> &'static str {
    match severity {
        Some(LineSeverity::Critical) => "!!",
        Some(LineSeverity::Error) => "E ",
        Some(LineSeverity::Warning) => "W ",
        None => "  ",
    }
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn run_serve(
    config: MonitorConfig,
    port: u16,
    poll_interval: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = config;
    if poll_interval.is_some() {
        config.settings.poll_interval_secs = poll_interval;
    }
    let dashboard_addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    tracing::info!(
        target_host = %config.ssh.host,
        user = %config.ssh.user,
        bulletins = config.bulletins.len(),
        dashboard_addr = %dashboard_addr,
        poll_interval_secs = ?config.settings.poll_interval_secs,
        "Starting bulletin monitor"
    );

    let shutdown = install_shutdown_handler();
    Server::new(config, dashboard_addr).run(shutdown).await;
    Ok(())
}

async fn handle_status(
    monitor: &BulletinMonitor,
    output_format: &OutputFormat,
) -> Result<bool, Box<dyn std::error::Error>> {
    let statuses = monitor.list_bulletin_statuses().await;
    let any_failure = statuses.iter().any(|s| s.record.status.is_failure());

    match output_format {
        OutputFormat::Json => {
            let output = StatusOutput {
                target: monitor.session().target(),
                bulletins: &statuses,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!(
                "{:<16} {:<28} {:<14} {:<40} PRODUCTS",
                "ID", "NAME", "STATUS", "LAST RUN"
            );
            println!("{}", "-".repeat(110));
            for s in &statuses {
                let status = if s.record.has_warnings {
                    format!("{}*", s.record.status)
                } else {
                    s.record.status.to_string()
                };
                let products = s
                    .record
                    .product_info
                    .iter()
                    .map(|p| format!("{}{}", p.name, if p.available { "" } else { " (missing)" }))
                    .collect::<Vec<_>>()
                    .join(", ");
                println!(
                    "{:<16} {:<28} {:<14} {:<40} {}",
                    s.id, s.name, status, s.record.last_run, products
                );
            }
            if statuses.iter().any(|s| s.record.has_warnings) {
                println!();
                println!("* run completed with warnings");
            }
        }
    }
    Ok(any_failure)
}

async fn handle_log(
    monitor: &BulletinMonitor,
    id: &str,
    full: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if full {
        let log = monitor.get_full_log(id).await?;
        println!("# {} ({})", log.name, log.bulletin_id);
        for line in &log.log.lines {
            println!("{} {}", severity_marker(line.severity), line.text);
        }
        println!(
            "# {} lines: {} critical, {} error, {} warning",
            log.log.lines.len(),
            log.log.count(LineSeverity::Critical),
            log.log.count(LineSeverity::Error),
            log.log.count(LineSeverity::Warning)
        );
    } else {
        let summary = monitor.get_log_summary(id).await?;
        println!(
            "# {} ({}), last {} lines: {}",
            summary.name, summary.bulletin_id, summary.lines, summary.status
        );
        println!("{}", summary.content);
    }
    Ok(())
}

async fn handle_rerun(monitor: &BulletinMonitor, id: &str) -> Result<bool, Box<dyn std::error::Error>> {
    let result = monitor.trigger_rerun(id).await?;
    if result.success {
        println!("Re-run command sent for '{}'.", id);
        if !result.stdout.is_empty() {
            println!("Output:");
            for line in result.stdout.lines() {
                println!("  {}", line);
            }
        }
    } else {
        eprintln!("Error: Re-run command failed for '{}': {}", id, result.stderr);
    }
    Ok(result.success)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args.connection)?;

    let command = match args.command {
        Commands::Serve {
            port,
            poll_interval,
        } => return run_serve(config, port, poll_interval).await,
        other => other,
    };

    let session = ssh_session(&config);
    let monitor = BulletinMonitor::new(config, Arc::clone(&session));

    let outcome = match &command {
        Commands::Status { output } => handle_status(&monitor, output).await.map(|failed| !failed),
        Commands::Log { id, full } => handle_log(&monitor, id, *full).await.map(|()| true),
        Commands::Rerun { id } => handle_rerun(&monitor, id).await,
        Commands::Serve { .. } => Ok(true),
    };
    session.close().await;

    if !outcome? {
        std::process::exit(1);
    }
    Ok(())
}
