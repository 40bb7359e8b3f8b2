//! Request middleware: tenant-header validation, the optional static API-key
//! check on mutating calls, and the CORS layer.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{request::Parts, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::shared::state::AppState;

/// Routes the provider or operators call without a tenant context.
const TENANT_EXEMPT_PATHS: &[&str] = &[
    "/api/machine/status",
    "/api/health",
    "/api/logs",
    "/api/razorpay/webhook",
    "/debug/razorpay",
];

pub fn is_tenant_exempt(path: &str) -> bool {
    TENANT_EXEMPT_PATHS
        .iter()
        .any(|p| path == *p || path.starts_with(&format!("{}/", p)))
}

pub fn is_valid_tenant_id(tenant: &str) -> bool {
    tenant
        .strip_prefix("VM-")
        .map(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// Extracts the validated `x-tenant-id` header inside handlers. The guard
/// middleware has already rejected requests without one, so the rejection
/// here only fires for routes wired up outside the `/api` tree.
pub struct Tenant(pub String);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-tenant-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| Tenant(s.to_string()))
            .ok_or((
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Tenant ID is required"})),
            ))
    }
}

pub async fn tenant_guard(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();

    if path.starts_with("/api") && !is_tenant_exempt(&path) {
        let tenant = req
            .headers()
            .get("x-tenant-id")
            .and_then(|v| v.to_str().ok());

        match tenant {
            None => {
                error!("Tenant ID required for path: {}", path);
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": "Tenant ID is required in headers as x-tenant-id"
                    })),
                )
                    .into_response();
            }
            Some(t) if !is_valid_tenant_id(t) => {
                error!("Invalid tenant ID: {}", t);
                return (
                    StatusCode::FORBIDDEN,
                    Json(serde_json::json!({"error": "Invalid Tenant ID format"})),
                )
                    .into_response();
            }
            _ => {}
        }

        if let Some(expected) = &state.config.api_key {
            if matches!(*req.method(), Method::POST | Method::PUT | Method::DELETE) {
                let provided = req.headers().get("x-api-key").and_then(|v| v.to_str().ok());
                if provided != Some(expected.as_str()) {
                    error!("API key mismatch for path: {}", path);
                    return (
                        StatusCode::FORBIDDEN,
                        Json(serde_json::json!({"error": "Invalid API key"})),
                    )
                        .into_response();
                }
            }
        }
    }

    next.run(req).await
}

pub fn create_cors_layer(config: &AppConfig) -> CorsLayer {
    let allowed_headers = [
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        HeaderName::from_static("x-tenant-id"),
        HeaderName::from_static("x-api-key"),
    ];

    match &config.frontend_url {
        Some(frontend) => {
            let mut origins: Vec<HeaderValue> = [
                "http://localhost:8000",
                "http://localhost:8080",
                "http://localhost:8081",
            ]
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
            if let Ok(origin) = frontend.parse() {
                origins.push(origin);
            }

            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers(allowed_headers)
                .allow_credentials(true)
                .max_age(Duration::from_secs(86400))
        }
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .max_age(Duration::from_secs(86400)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_id_format_requires_vm_prefix_and_digits() {
        assert!(is_valid_tenant_id("VM-001"));
        assert!(is_valid_tenant_id("VM-42"));
        assert!(!is_valid_tenant_id("VM-"));
        assert!(!is_valid_tenant_id("VM-abc"));
        assert!(!is_valid_tenant_id("vm-001"));
        assert!(!is_valid_tenant_id("001"));
        assert!(!is_valid_tenant_id(""));
    }

    #[test]
    fn exempt_paths_skip_the_tenant_check() {
        assert!(is_tenant_exempt("/api/health"));
        assert!(is_tenant_exempt("/api/logs"));
        assert!(is_tenant_exempt("/api/machine/status"));
        assert!(is_tenant_exempt("/api/machine/status/VM-002"));
        assert!(is_tenant_exempt("/api/razorpay/webhook"));
        assert!(is_tenant_exempt("/debug/razorpay"));
        assert!(!is_tenant_exempt("/api/inventory"));
        assert!(!is_tenant_exempt("/api/orders"));
        assert!(!is_tenant_exempt("/api/machine/statuses"));
    }
}
