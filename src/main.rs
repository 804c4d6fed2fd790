use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stego_core::config::{parse_socket_addr, Algorithm, Config};
use stego_core::error::ConfigError;

#[derive(Parser)]
#[command(name = "stego", about = "Covert HTTP-over-steganography proxy", version)]
struct Cli {
    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand)]
enum Role {
    /// Runs the browser-facing stego-client.
    Client {
        /// Address to bind to.
        #[arg(long, default_value = "127.0.0.1:8888")]
        host: String,
        /// The stego-server to forward covert requests to.
        #[arg(long)]
        remote: String,
        /// The stego algorithm: null, lsb or exif.
        #[arg(long, default_value = "null")]
        algorithm: String,
        /// Directory of cover images for the chosen algorithm.
        #[arg(long)]
        cover_dir: PathBuf,
        /// DEBUG, INFO, WARNING or ERROR.
        #[arg(long, default_value = "info")]
        log_level: String,
    },
    /// Runs the internet-facing stego-server.
    Server {
        /// Address to bind to.
        #[arg(long, default_value = "127.0.0.1:9999")]
        host: String,
        /// The stego algorithm: null, lsb or exif.
        #[arg(long, default_value = "null")]
        algorithm: String,
        /// Directory of cover images for the chosen algorithm.
        #[arg(long)]
        cover_dir: PathBuf,
        /// Decoy host proxied to for a direct GET with no covert payload.
        #[arg(long)]
        reverse_hostname: String,
        /// DEBUG, INFO, WARNING or ERROR.
        #[arg(long, default_value = "info")]
        log_level: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!(error = %e, "fatal startup error");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let (config, log_level) = match &cli.role {
        Role::Client {
            host,
            remote,
            algorithm,
            cover_dir,
            log_level,
        } => {
            let config = Config {
                listen_addr: resolve_addr(&env_or("STEGOPROXY_LISTEN_ADDR", host))?,
                remote_addr: Some(resolve_addr(&env_or("STEGOPROXY_REMOTE_ADDR", remote))?),
                algorithm: Algorithm::parse(algorithm)?,
                cover_dir: cover_dir.clone(),
                max_content_length: default_max_content_length(),
                reverse_hostname: None,
            };
            (config, env_or("STEGOPROXY_LOG_LEVEL", log_level))
        }
        Role::Server {
            host,
            algorithm,
            cover_dir,
            reverse_hostname,
            log_level,
        } => {
            let config = Config {
                listen_addr: resolve_addr(&env_or("STEGOPROXY_LISTEN_ADDR", host))?,
                remote_addr: None,
                algorithm: Algorithm::parse(algorithm)?,
                cover_dir: cover_dir.clone(),
                max_content_length: default_max_content_length(),
                reverse_hostname: Some(reverse_hostname.clone()),
            };
            (config, env_or("STEGOPROXY_LOG_LEVEL", log_level))
        }
    };

    init_logging(&log_level);
    config.validate()?;

    let covers = Arc::new(stego_codec::loader::load_cover_pool(&config.cover_dir)?);
    stego_codec::loader::ensure_required_covers(&covers, config.algorithm, &config.cover_dir)?;
    let codec: Arc<dyn stego_core::codec::StegoCodec> = Arc::from(stego_codec::codec_for(config.algorithm));
    info!(algorithm = codec.name(), "loaded stego codec");

    let config = Arc::new(config);
    let serve = async {
        match &cli.role {
            Role::Client { .. } => stego_proxy::listener::run_client(config.clone(), codec.clone(), covers.clone()).await,
            Role::Server { .. } => stego_proxy::listener::run_server(config.clone(), codec.clone(), covers.clone()).await,
        }
    };

    tokio::select! {
        result = serve => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    Ok(())
}

/// Environment variables override the host/remote/log-level flags, uppercased
/// and prefixed `STEGOPROXY_` (e.g. `STEGOPROXY_REMOTE_ADDR`).
fn env_or(var: &str, flag_value: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| flag_value.to_string())
}

fn resolve_addr(flag_value: &str) -> Result<SocketAddr, ConfigError> {
    parse_socket_addr(flag_value)
}

fn default_max_content_length() -> usize {
    std::env::var("STEGOPROXY_MAX_CONTENT_LENGTH")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(64 * 1024)
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level.to_ascii_lowercase()).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
