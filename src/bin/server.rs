//! DeskFlow REST server: HTTP API for external integrations.
//!
//! Each request authenticates with its own `user_token`; the server itself
//! only needs the backend URL and anon key.
//!
//! Usage:
//!   SUPABASE_URL=... SUPABASE_ANON_KEY=... deskflow-server
//!
//! Or with args:
//!   deskflow-server --config /path/to/settings.json --bind 0.0.0.0:8000

use std::path::PathBuf;
use std::sync::Arc;

use deskflow_lib::http_server;
use deskflow_lib::logging::init_tracing;
use deskflow_lib::{AppState, Settings};

fn print_help() {
    println!("deskflow-server - DeskFlow REST API");
    println!();
    println!("Usage: deskflow-server [--config PATH] [--bind ADDR:PORT]");
    println!();
    println!("Environment variables:");
    println!("  SUPABASE_URL         Backend URL (required)");
    println!("  SUPABASE_ANON_KEY    Backend anon key (required)");
    println!("  DESKFLOW_BIND        Bind address (default: 0.0.0.0:8000)");
    println!("  PORT                 Port, when DESKFLOW_BIND is unset");
    println!("  RATE_LIMIT_READ      Reads per minute (default: 100)");
    println!("  RATE_LIMIT_WRITE     Writes per minute (default: 30)");
    println!("  RUST_LOG             Log filter (default: info)");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    // Simple args, same shape as the env vars
    let args: Vec<String> = std::env::args().collect();
    let mut config_arg: Option<PathBuf> = None;
    let mut bind_arg: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                config_arg = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--bind" if i + 1 < args.len() => {
                bind_arg = Some(args[i + 1].clone());
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                i += 1;
            }
        }
    }

    init_tracing();

    let mut settings = match Settings::load(config_arg.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load settings");
            std::process::exit(1);
        }
    };
    if let Some(bind) = bind_arg {
        settings.bind = bind;
    }
    if let Err(e) = settings.validate(false) {
        tracing::error!(error = %e, "Invalid settings");
        std::process::exit(1);
    }

    tracing::info!(
        backend = %settings.supabase_url,
        anon_key = %settings.masked_anon_key(),
        read_limit = settings.rate_limit_read,
        write_limit = settings.rate_limit_write,
        "Starting DeskFlow API"
    );

    let limiter = AppState::limiter_for(&settings);
    let bind_addr = settings.bind.clone();
    let app = http_server::router(Arc::new(settings), limiter);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %bind_addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(addr = %bind_addr, "Listening");
    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
