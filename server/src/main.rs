use anyhow::Result;
use axum::Router;
use clap::Parser;
use server::{build_app, ServerOptions, DEFAULT_MAX_RETAINED_BATCHES};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};
use wordindex::IndexConfig;

#[derive(Parser)]
struct Args {
    /// Directory that receives one sub-directory per batch
    #[arg(long, default_value = "./batches")]
    output: String,
    /// JSON config file for the map-reduce pipeline
    #[arg(long)]
    config: Option<PathBuf>,
    /// Maximum documents mapped at once, overrides the config file
    #[arg(long)]
    concurrency: Option<usize>,
    /// Accept documents given as http(s) URLs and fetch them server-side
    #[arg(long)]
    allow_urls: bool,
    /// Finished batches kept before the oldest are deleted
    #[arg(long, default_value_t = DEFAULT_MAX_RETAINED_BATCHES)]
    keep_batches: usize,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => IndexConfig::from_json_file(path)?,
        None => IndexConfig::default(),
    };
    if let Some(n) = args.concurrency {
        config.max_concurrent_mappers = n;
    }
    let options = ServerOptions { allow_url_sources: args.allow_urls, max_retained_batches: args.keep_batches };
    let app: Router = build_app(args.output.clone(), config, options)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, output = %args.output, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
