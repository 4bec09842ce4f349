// medbackup/src/scheduler/mod.rs
//! Startup and daily scheduling of the backup pipeline.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};
use tokio::task::JoinHandle;

use crate::backup::BackupRunner;
use crate::config::ScheduleConfig;
use crate::errors::BackupError;

/// Runs the startup backup and, when enabled, registers the daily loop.
/// Meant to be spawned next to the HTTP listener so the service accepts
/// requests while the initial run is still going.
pub async fn initialize_scheduler(runner: Arc<BackupRunner>, schedule: ScheduleConfig) {
    println!("🔄 Initializing backup scheduler...");
    run_initial_backup(&runner).await;
    if register_daily_backup(runner, schedule).is_none() {
        println!("⚠️ Daily backup is disabled. Set ENABLE_DAILY_BACKUP=true to enable it.");
    }
    println!("✅ Backup scheduler initialized");
}

/// One unconditional run at process start. A failure is logged and
/// swallowed; it must not keep the service from coming up.
pub async fn run_initial_backup(runner: &BackupRunner) {
    println!("🚀 Running initial backup on startup...");
    match runner.run_full().await {
        Ok(result) if result.success => println!("✅ Initial backup completed successfully"),
        Ok(result) => eprintln!(
            "❌ Initial backup failed: {}",
            result.error.unwrap_or_default()
        ),
        Err(e) => eprintln!("❌ Initial backup skipped: {e}"),
    }
}

/// Spawns the daily backup loop, or returns `None` when the schedule is
/// disabled by configuration.
pub fn register_daily_backup(
    runner: Arc<BackupRunner>,
    schedule: ScheduleConfig,
) -> Option<JoinHandle<()>> {
    if !schedule.daily_enabled {
        return None;
    }

    let handle = tokio::spawn(daily_backup_loop(
        runner,
        schedule.daily_at,
        schedule.utc_offset,
    ));
    println!(
        "✅ Daily backup scheduled for {} ({})",
        schedule.daily_at.format("%H:%M"),
        schedule.utc_offset
    );
    Some(handle)
}

async fn daily_backup_loop(runner: Arc<BackupRunner>, fire_at: NaiveTime, offset: FixedOffset) {
    loop {
        let now = Utc::now();
        let next = next_run_after(now, fire_at, offset);
        println!(
            "⏰ Next scheduled backup at {}",
            next.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S %:z")
        );

        let wait = (next - now).to_std().unwrap_or(StdDuration::ZERO);
        tokio::time::sleep(wait).await;

        println!("🕐 Daily backup triggered");
        match runner.run_full().await {
            Ok(result) if result.success => {}
            Ok(result) => eprintln!(
                "❌ Scheduled backup failed: {}",
                result.error.unwrap_or_default()
            ),
            Err(BackupError::AlreadyRunning) => {
                println!("⚠️ Skipping scheduled backup: another run is in progress");
            }
            Err(e) => eprintln!("❌ Scheduled backup error: {e}"),
        }
    }
}

/// First instant strictly after `now` at which the wall clock in the given
/// fixed offset reads `fire_at`. Pure so the schedule arithmetic can be
/// tested without sleeping.
pub fn next_run_after(now: DateTime<Utc>, fire_at: NaiveTime, offset: FixedOffset) -> DateTime<Utc> {
    let local_now = now.with_timezone(&offset).naive_local();
    let mut delta = local_now.date().and_time(fire_at) - local_now;
    if delta <= Duration::zero() {
        delta = delta + Duration::days(1);
    }
    now + delta
}
