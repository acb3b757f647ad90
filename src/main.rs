//! Hostgate - Entry point.
//!
//! `hostgate server` answers DNS queries from the configured hosts, the system
//! hosts file and the upstream servers. `hostgate client` performs a single
//! A or AAAA lookup against upstream servers.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hostgate::config::{Config, DEFAULT_UPSTREAM, ServerOverrides, parse_duration};
use hostgate::dns::{Dispatcher, ResolverContext, UpstreamClient, UpstreamLookup, UpstreamServer};
use hostgate::hosts::QueryType;
use hostgate::server::Server;

#[derive(Debug, Parser)]
#[command(name = "hostgate", version, about = "DNS responder with host pattern overrides")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the DNS server
    Server(ServerArgs),
    /// Query DNS servers for A or AAAA records
    Client(ClientArgs),
}

#[derive(Debug, Clone, Args)]
struct ServerArgs {
    /// Configuration file (YAML, or TOML with a .toml extension)
    #[arg(short, long, env = "HOSTGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(long, env = "HOSTGATE_HOST")]
    host: Option<String>,

    /// Listen port
    #[arg(short, long, env = "HOSTGATE_PORT")]
    port: Option<u16>,

    /// TTL of answers, in seconds
    #[arg(long, env = "HOSTGATE_TTL")]
    ttl: Option<u32>,

    /// Enable DNS-over-TLS
    #[arg(long, env = "HOSTGATE_DOT")]
    dot: bool,

    /// DNS-over-TLS port
    #[arg(long, env = "HOSTGATE_DOT_PORT")]
    dot_port: Option<u16>,

    /// PEM certificate chain for DNS-over-TLS
    #[arg(long, env = "HOSTGATE_TLS_CERT")]
    tls_cert: Option<PathBuf>,

    /// PEM private key for DNS-over-TLS
    #[arg(long, env = "HOSTGATE_TLS_KEY")]
    tls_key: Option<PathBuf>,

    /// Upstream DNS server, repeatable
    #[arg(short, long = "upstream", env = "HOSTGATE_UPSTREAM", value_delimiter = ',')]
    upstreams: Vec<String>,

    /// Do not answer from the system hosts file
    #[arg(long, env = "HOSTGATE_DISABLE_SYSTEM_HOSTS")]
    disable_system_hosts: bool,

    /// System hosts file
    #[arg(long, env = "HOSTGATE_SYSTEM_HOSTS_FILE")]
    system_hosts_file: Option<PathBuf>,
}

impl ServerArgs {
    fn overrides(&self) -> ServerOverrides {
        ServerOverrides {
            host: self.host.clone(),
            port: self.port,
            ttl: self.ttl,
            dot: self.dot,
            dot_port: self.dot_port,
            tls_cert: self.tls_cert.clone(),
            tls_key: self.tls_key.clone(),
            upstreams: self.upstreams.clone(),
            disable_system_hosts: self.disable_system_hosts,
            system_hosts_file: self.system_hosts_file.clone(),
        }
    }

    /// Load the configuration file, if any, and apply the flags on top.
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => Config::default(),
        };
        config
            .apply_overrides(self.overrides())
            .context("Invalid configuration")?;
        Ok(config)
    }
}

#[derive(Debug, Args)]
struct ClientArgs {
    /// DNS server address, repeatable
    #[arg(
        short,
        long = "server",
        env = "HOSTGATE_CLIENT_SERVER",
        value_delimiter = ',',
        default_value = DEFAULT_UPSTREAM
    )]
    servers: Vec<String>,

    /// Domain name to query
    #[arg(short, long)]
    domain: String,

    /// Query type (A, AAAA)
    #[arg(short = 't', long = "type", default_value = "A")]
    query_type: QueryType,

    /// Timeout for the DNS query (e.g. 5s, 1500ms)
    #[arg(long, env = "HOSTGATE_CLIENT_TIMEOUT", default_value = "5s", value_parser = parse_duration)]
    timeout: Duration,

    /// Output only IP addresses, one per line
    #[arg(long, env = "HOSTGATE_CLIENT_PLAIN")]
    plain: bool,
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Ctrl-C received, shutting down..."),
        () = terminate => info!("SIGTERM received, shutting down..."),
    }
}

/// Load the configuration on the blocking pool.
async fn reload_config(args: &ServerArgs) -> Result<Config> {
    let args = args.clone();
    tokio::task::spawn_blocking(move || args.load_config())
        .await
        .context("Configuration reload task failed")?
}

/// Rebuild the host tables on SIGHUP.
///
/// Listeners and upstream servers keep their startup values.
#[cfg(unix)]
fn spawn_reload_task(args: ServerArgs, dispatcher: Arc<Dispatcher<UpstreamClient>>) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to listen for SIGHUP")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reloading hosts");
            match reload_config(&args).await {
                Ok(config) => dispatcher.reload(ResolverContext::load(&config).await),
                Err(err) => error!(error = ?err, "Failed to reload configuration, keeping current hosts"),
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_reload_task(_args: ServerArgs, _dispatcher: Arc<Dispatcher<UpstreamClient>>) -> Result<()> {
    Ok(())
}

async fn run_server(args: ServerArgs) -> Result<()> {
    let config = args.load_config()?;
    init_tracing(config.log.level.as_deref().unwrap_or("info"));

    // Must be done before any metrics are recorded
    hostgate::metrics::init(&config.metrics).context("Failed to initialize metrics")?;
    if config.metrics.enabled {
        info!("Metrics enabled on {}", config.metrics.listen);
    }

    let upstream =
        UpstreamClient::from_settings(&config.upstream).context("Invalid upstream servers")?;
    info!(
        servers = ?config.upstream.servers,
        timeout = ?config.upstream.timeout,
        "Upstream resolvers configured"
    );

    let context = ResolverContext::load(&config).await;
    info!(
        config_hosts = context.hosts.as_ref().map_or(0, |hosts| hosts.len()),
        system_hosts = context.system_hosts.as_ref().map_or(0, |hosts| hosts.len()),
        "Host tables loaded"
    );

    let dispatcher = Arc::new(Dispatcher::new(context, upstream));
    let server = Server::bind(&config, Arc::clone(&dispatcher))
        .await
        .context("Failed to start DNS listeners")?;

    spawn_reload_task(args, dispatcher)?;

    server.run(shutdown_signal()).await?;
    info!("Shutdown complete.");
    Ok(())
}

fn print_addresses<W: Write>(
    out: &mut W,
    domain: &str,
    query_type: QueryType,
    addresses: &[String],
    plain: bool,
) -> io::Result<()> {
    if plain {
        for address in addresses {
            writeln!(out, "{address}")?;
        }
        return Ok(());
    }

    if addresses.is_empty() {
        return writeln!(out, "No {query_type} records found for {domain}");
    }

    writeln!(out, "{query_type} records for {domain}:")?;
    for address in addresses {
        writeln!(out, "  {address}")?;
    }
    Ok(())
}

async fn run_client(args: ClientArgs) -> Result<()> {
    init_tracing("warn");
    anyhow::ensure!(!args.domain.trim().is_empty(), "domain is required");

    let servers = args
        .servers
        .iter()
        .map(|server| UpstreamServer::parse(server))
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid DNS server address")?;
    let client = UpstreamClient::new(servers, args.timeout);

    let addresses = client
        .lookup(&args.domain, args.query_type)
        .await
        .with_context(|| format!("Failed to look up {}", args.domain))?;

    print_addresses(
        &mut io::stdout().lock(),
        &args.domain,
        args.query_type,
        &addresses,
        args.plain,
    )?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Server(args) => run_server(args).await,
        Command::Client(args) => run_client(args).await,
    }
}
