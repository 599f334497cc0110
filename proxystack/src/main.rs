//! ProxyStack - S3-compatible proxy front end
//!
//! Authenticated S3 requests are translated into internal API subrequests
//! served by an in-memory object store.

use clap::Parser;
use proxystack::{build_app, Config};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "proxystack")]
#[command(about = "S3-compatible proxy over an internal object API", long_about = None)]
struct Args {
    /// Configuration file (defaults to an optional proxystack.toml)
    #[arg(short, long, env = "PROXYSTACK_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "PROXYSTACK_PORT")]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "PROXYSTACK_HOST")]
    host: Option<String>,

    /// Enable the S3 translator
    #[arg(long, env = "PROXYSTACK_S3API")]
    s3api: Option<bool>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PROXYSTACK_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(enabled) = self.s3api {
            config.s3api.enabled = enabled;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "proxystack={level},proxystack_proxy={level},proxystack_auth={level},\
                     proxystack_storage={level},proxystack_s3={level},tower_http=debug",
                    level = config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ProxyStack...");
    info!(
        "  S3 API: {}",
        if config.s3api.enabled { "enabled" } else { "disabled" }
    );
    info!("  Credentials: {}", config.credentials.len());

    let app = build_app(&config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
