// medbackup/src/server/routes.rs
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;
use crate::backup::BackupRunner;

pub fn create_router(runner: Arc<BackupRunner>) -> Router {
    Router::new()
        .route("/backup/trigger", post(handlers::trigger_backup))
        .route("/backup/status", get(handlers::backup_status))
        .route("/backup/database", post(handlers::backup_database))
        .route("/backup/images", post(handlers::backup_images))
        .with_state(runner)
}
