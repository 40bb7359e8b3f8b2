//! Health check and log-tail handlers

use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;

use crate::shared::state::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let db_ok = state.conn.get().is_ok();

    let status = if db_ok { "healthy" } else { "degraded" };
    let code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "database": db_ok
        })),
    )
}

/// Serves the last 100 lines of the configured log file as plain text. The
/// file is written by the process supervisor redirecting stderr.
pub async fn tail_logs(State(state): State<Arc<AppState>>) -> Response {
    let path = Path::new(&state.config.log_file);
    if !path.exists() {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Log file not found"})),
        )
            .into_response();
    }

    match tail_file(path, 100) {
        Ok(tail) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            tail,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to read logs: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to read logs"})),
            )
                .into_response()
        }
    }
}

pub fn tail_file(path: &Path, lines: usize) -> std::io::Result<String> {
    let content = std::fs::read_to_string(path)?;
    Ok(last_lines(&content, lines))
}

pub fn last_lines(content: &str, count: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn short_files_come_back_whole() {
        assert_eq!(last_lines("a\nb\nc", 100), "a\nb\nc");
    }

    #[test]
    fn long_files_are_trimmed_to_the_window() {
        let content: String = (0..150).map(|i| format!("line {}\n", i)).collect();
        let tail = last_lines(&content, 100);
        assert_eq!(tail.lines().count(), 100);
        assert!(tail.starts_with("line 50"));
        assert!(tail.ends_with("line 149"));
    }

    #[test]
    fn tail_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..120 {
            writeln!(file, "entry {}", i).unwrap();
        }
        let tail = tail_file(file.path(), 100).unwrap();
        assert_eq!(tail.lines().count(), 100);
        assert!(tail.starts_with("entry 20"));
    }
}
