/// digits-server
///
/// Serves the digit classifier over HTTP with a synchronous tiny_http server.
///
/// Run with:
///   cargo run --bin digits-server --release -- --model trained_models/mnist_cnn.json
///
/// Endpoints:
///   GET  /         liveness and model status
///   POST /predict  multipart/form-data upload with an `image` file field

mod routes;
mod handlers;
mod util;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;
use tiny_http::Server;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ferrite_digits::InferenceService;

#[derive(Parser)]
#[command(name = "digits-server")]
#[command(about = "HTTP prediction API for the handwritten digit classifier")]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "DIGITS_ADDR", default_value = "127.0.0.1:8000")]
    addr: String,

    /// Model artifact loaded at startup
    #[arg(long, env = "DIGITS_MODEL", default_value = "trained_models/mnist_cnn.json")]
    model: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    // A missing or broken model leaves the server up in degraded mode.
    let service = Arc::new(InferenceService::load(&args.model));
    if !service.is_model_loaded() {
        warn!("{}", service.status().message);
    }

    let server = Server::http(&args.addr)
        .map_err(|e| anyhow!("Failed to bind HTTP server on {}: {}", args.addr, e))?;
    info!(addr = %args.addr, "listening");

    // Each request is dispatched on its own thread; the service is read-only
    // so handlers share it without locking.
    for request in server.incoming_requests() {
        let service = Arc::clone(&service);
        std::thread::spawn(move || {
            routes::dispatch(request, &service);
        });
    }
    Ok(())
}
