// medbackup/src/server/mod.rs
//! HTTP control surface for manual backup triggers and status queries.

pub mod handlers;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::backup::BackupRunner;

pub use routes::create_router;

/// Binds the listener and serves the control API until the process exits.
pub async fn run(runner: Arc<BackupRunner>, host: &str, port: u16) -> Result<()> {
    let app = create_router(runner);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid HTTP bind address {host}:{port}"))?;

    println!("🚀 Backup control server");
    println!("   📍 Listening on http://{addr}");
    println!();
    println!("📚 Endpoints:");
    println!("   POST /backup/trigger  - Run a full backup now");
    println!("   GET  /backup/status   - List stored backups grouped by date");
    println!("   POST /backup/database - Run only the database snapshot stage");
    println!("   POST /backup/images   - Run only the image mirror stage");
    println!();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app)
        .await
        .context("HTTP server terminated unexpectedly")?;

    Ok(())
}
