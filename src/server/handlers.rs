// medbackup/src/server/handlers.rs
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::SecondsFormat;
use serde::Serialize;

use crate::backup::{BackupRunner, BackupStatusReport};
use crate::errors::BackupError;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct TriggerResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    duration: f64,
    timestamp: String,
}

#[derive(Serialize)]
pub struct StageResponse {
    success: bool,
    message: String,
    file: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    success: bool,
    #[serde(flatten)]
    report: BackupStatusReport,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    success: bool,
    message: String,
    error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /backup/trigger - run the full pipeline and report the outcome.
pub async fn trigger_backup(State(runner): State<Arc<BackupRunner>>) -> Response {
    println!("Manual backup triggered via API");
    match runner.run_full().await {
        Ok(result) => {
            let timestamp = result.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
            if result.success {
                (
                    StatusCode::OK,
                    Json(TriggerResponse {
                        success: true,
                        message: "Backup completed successfully".to_string(),
                        error: None,
                        duration: result.duration,
                        timestamp,
                    }),
                )
                    .into_response()
            } else {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(TriggerResponse {
                        success: false,
                        message: "Backup failed".to_string(),
                        error: result.error,
                        duration: result.duration,
                        timestamp,
                    }),
                )
                    .into_response()
            }
        }
        Err(err) => {
            let (status, message) = if matches!(err, BackupError::AlreadyRunning) {
                (StatusCode::CONFLICT, "Backup already in progress")
            } else {
                (StatusCode::INTERNAL_SERVER_ERROR, "Backup failed")
            };
            (
                status,
                Json(ErrorResponse {
                    success: false,
                    message: message.to_string(),
                    error: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /backup/status - list stored backups grouped by date.
pub async fn backup_status(State(runner): State<Arc<BackupRunner>>) -> Response {
    match runner.status().await {
        Ok(report) => (
            StatusCode::OK,
            Json(StatusResponse {
                success: true,
                report,
            }),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                success: false,
                message: "Failed to get backup status".to_string(),
                error: format!("{err:#}"),
            }),
        )
            .into_response(),
    }
}

/// POST /backup/database - run only the snapshot stage; the artifact stays local.
pub async fn backup_database(State(runner): State<Arc<BackupRunner>>) -> Response {
    println!("Manual database backup triggered via API");
    match runner.run_database().await {
        Ok(artifact) => (
            StatusCode::OK,
            Json(StageResponse {
                success: true,
                message: "Database backup completed successfully".to_string(),
                file: artifact.local_path.display().to_string(),
            }),
        )
            .into_response(),
        Err(err) => stage_error_response("Database backup failed", err),
    }
}

/// POST /backup/images - run only the mirror stage; the artifact stays local.
pub async fn backup_images(State(runner): State<Arc<BackupRunner>>) -> Response {
    println!("Manual images backup triggered via API");
    match runner.run_images().await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(StageResponse {
                success: true,
                message: "S3 images backup completed successfully".to_string(),
                file: outcome.artifact.local_path.display().to_string(),
            }),
        )
            .into_response(),
        Err(err) => stage_error_response("S3 images backup failed", err),
    }
}

fn stage_error_response(message: &str, error: anyhow::Error) -> Response {
    let status = if is_already_running(&error) {
        StatusCode::CONFLICT
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(ErrorResponse {
            success: false,
            message: message.to_string(),
            error: format!("{error:#}"),
        }),
    )
        .into_response()
}

fn is_already_running(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<BackupError>(),
        Some(BackupError::AlreadyRunning)
    )
}
