//! Modgate - main application entry point

use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

use modgate::infrastructure::{spool, tls};
use modgate::presentation::create_app;
use modgate::{init_tracing, Config};

const ABOUT: &str = "\
Go module proxy for private Git forges.

Listens for Go module proxy requests and redirects them to the proper git
project. Used for building against private projects without exposing the
forge itself.

Config file syntax:
| # exact matches replacing a request with a target
| modules:
|   company.com/package-a: gitlab.com/pkg-a
|   company.com/package-b: gitlab.com/pkg-b
|
| # default git credentials
| git-token: AAAAAAAAAABBBBBBBBBBBBBCCCCCCCCCCDDDDDDD
| git-url: https://gitlab.com
| git-provider: gitlab
|
| regexp:
| - match: \"mytest.domain.a/([^/]*)\"
|   repo: \"$1\"
|   git-token: AAAAAAAAAABBBBBBBBBBBBBCCCCCCCCCCDDDDDDD
|   git-url: https://another.domain
|   git-provider: gitlab
| - match: \"github.com.*\"
|   git-token: AAAAAAAAAABBBBBBBBBBBBBCCCCCCCCCCDDDDDDD
|   git-url: https://api.github.com
|   git-provider: github
|   # without rewrite templates the original path is used with the token
|
| # cache upstream tarballs on disk
| local-cache: /var/cache/modgate";

#[derive(Parser, Debug)]
#[command(name = "modgate", version, about = "Go module proxy for private Git forges", long_about = ABOUT)]
struct Args {
    /// Where to listen for incoming connections (example 1.2.3.4:8080)
    #[arg(long, default_value = ":8080")]
    listen: String,

    /// Enforce TLS secure transport on incoming connections
    #[arg(long)]
    tls: bool,

    /// A PEM encoded certificate file
    #[arg(long)]
    cert: Option<PathBuf>,

    /// A PEM encoded private key file, if not in the cert PEM file
    #[arg(long)]
    key: Option<PathBuf>,

    /// A PEM encoded CA bundle for verifying upstream forges
    #[arg(long = "CA")]
    ca: Option<PathBuf>,

    /// Config file for matching and connecting to git forges
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Turn on verbose logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;
    init_tracing(&config.logging, args.verbose)?;
    tracing::info!(config = %args.config.display(), "loaded configuration");
    tracing::debug!(
        modules = config.modules.len(),
        rules = config.rules.len(),
        "routing table"
    );

    let http = tls::build_upstream_http(args.ca.as_deref())?;
    let app = create_app(&config, &http)?;
    let addr = parse_listen_addr(&args.listen)?;

    if args.tls {
        let cert = args.cert.clone().ok_or("--tls requires --cert")?;
        let key = args.key.clone().unwrap_or_else(|| cert.clone());
        let server_config = tls::load_server_config(&cert, &key)?;
        tracing::info!(%addr, "listening with https");
        axum_server::bind_rustls(addr, RustlsConfig::from_config(Arc::new(server_config)))
            .serve(app.into_make_service())
            .await?;
    } else {
        tracing::info!(%addr, "listening with http");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    }

    spool::cleanup_temp_files();
    tracing::info!("server shutdown complete");
    Ok(())
}

/// Accept bare `:port` listen addresses
fn parse_listen_addr(listen: &str) -> Result<SocketAddr, std::net::AddrParseError> {
    if listen.starts_with(':') {
        format!("0.0.0.0{listen}").parse()
    } else {
        listen.parse()
    }
}

/// Handle graceful shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, shutting down");
        },
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        },
    }
}
