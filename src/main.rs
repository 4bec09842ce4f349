//! Medical Records Backup Service
//!
//! Snapshots the PostgreSQL database, mirrors the patient image bucket and
//! ships both archives to the backup bucket. Runs as a long-lived service
//! with an HTTP control surface, or as a one-shot CLI command.

// medbackup/src/main.rs
use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenv::dotenv;

use medbackup::backup::BackupRunner;
use medbackup::config::AppConfig;
use medbackup::storage::s3::S3ObjectStore;
use medbackup::{scheduler, server};

#[tokio::main]
async fn main() -> ExitCode {
    match run_app().await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    dotenv().ok();
    let config = Arc::new(AppConfig::from_env());

    let args: Vec<String> = env::args().collect();
    let mode = args.get(1).map(|arg| arg.trim()).unwrap_or("serve");

    let store = Arc::new(S3ObjectStore::connect(&config.object_store).await);
    let runner = Arc::new(BackupRunner::new(config.clone(), store));

    match mode {
        "serve" => {
            tokio::spawn(scheduler::initialize_scheduler(
                runner.clone(),
                config.schedule,
            ));
            server::run(runner, &config.http_host, config.http_port).await?;
        }
        "backup" => {
            println!("🚀 Starting Backup Process...");
            let result = runner.run_full().await.context("Backup process failed")?;
            if !result.success {
                anyhow::bail!(
                    "Backup failed: {}",
                    result.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
        }
        "database" => {
            println!("🚀 Starting Database Backup...");
            let artifact = runner
                .run_database()
                .await
                .context("Database backup failed")?;
            println!(
                "📦 {} artifact written to {}",
                artifact.kind.tag(),
                artifact.local_path.display()
            );
        }
        "images" => {
            println!("🚀 Starting Images Backup...");
            let outcome = runner.run_images().await.context("Images backup failed")?;
            println!(
                "📦 {} artifact written to {} ({}/{} objects mirrored)",
                outcome.artifact.kind.tag(),
                outcome.artifact.local_path.display(),
                outcome.successful_downloads,
                outcome.total_objects
            );
        }
        _ => {
            println!("❌ Invalid mode. Use 'serve', 'backup', 'database' or 'images'.");
            anyhow::bail!("Invalid operation mode '{mode}'");
        }
    }
    Ok(())
}
