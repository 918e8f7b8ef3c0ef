use crate::api::responses::{ApiErrorCode, ApiErrorResponse, HealthResponse, HealthStatus};
use crate::display;
use crate::monitor::{self, MonitorSettings};
use crate::store::Store;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug, Clone)]
pub struct ApiContext {
    pub store: Store,
    pub settings: MonitorSettings,
}

fn rfc3339_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn internal_error(endpoint: &str, message: &str) -> Response {
    error!(message, "Internal error while handling {endpoint}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiErrorResponse {
            error_code: ApiErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: rfc3339_now(),
        }),
    )
        .into_response()
}

/// Nested route → trip → train display structure built from the latest
/// window, with per-trip travel metrics attached.
pub async fn get_routes(State(context): State<Arc<ApiContext>>) -> Response {
    let now = Utc::now().with_timezone(&context.settings.timezone);
    match monitor::evaluate_current_window(&context.store, &context.settings, now).await {
        Ok((rows, evaluation)) => {
            let groups = display::build_route_groups(&rows, &evaluation.summaries);
            (StatusCode::OK, Json(groups)).into_response()
        }
        Err(err) => internal_error("/api/routes", &err.to_string()),
    }
}

/// Current delayed-trip table.
pub async fn get_delays(State(context): State<Arc<ApiContext>>) -> Response {
    match context.store.delayed_trips().await {
        Ok(delays) => (StatusCode::OK, Json(delays)).into_response(),
        Err(err) => internal_error("/api/delays", &err.to_string()),
    }
}

pub async fn get_health(State(context): State<Arc<ApiContext>>) -> Response {
    let (status_code, status) = match context.store.ping().await {
        Ok(()) => (StatusCode::OK, HealthStatus::Ok),
        Err(err) => {
            error!(error = %err, "store unreachable during health check");
            (StatusCode::SERVICE_UNAVAILABLE, HealthStatus::Ko)
        }
    };
    (
        status_code,
        Json(HealthResponse {
            status,
            timestamp: rfc3339_now(),
        }),
    )
        .into_response()
}
