//! HTTP handlers for the lookup facade.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::branch::BranchDirectory;
use crate::config::AppConfig;
use crate::portal::{self, PatientLookup};

use super::types::{
    extract_params, LookupErrorBody, LookupResponseBody, LookupSuccessBody, ValidationErrorBody,
};

/// Shared state for the facade.
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<AppConfig>,
    pub branches: Arc<BranchDirectory>,
    pub lookup: Arc<dyn PatientLookup>,
}

/// POST /lookup.
///
/// The voice platform treats any non-200 as a transport failure, so
/// every outcome (validation, not-found, internal error) answers 200
/// with the failure encoded in the body.
pub async fn lookup_handler(
    State(state): State<ApiState>,
    body: Option<Json<Value>>,
) -> (StatusCode, Json<LookupResponseBody>) {
    let started = Instant::now();
    info!("Lookup request received");

    let Json(body) = body.unwrap_or(Json(Value::Null));
    let Some(params) = extract_params(&body).validate() else {
        info!("Missing required lookup fields");
        return (
            StatusCode::OK,
            Json(LookupResponseBody::Invalid(
                ValidationErrorBody::missing_fields(),
            )),
        );
    };

    let branch = state.branches.resolve(&params.suave_branch);
    info!("Branch mapping: '{}' -> '{}'", params.suave_branch, branch);

    let response = match state
        .lookup
        .lookup_patient(&branch, &params.dob, &params.first_name, &params.last_name)
        .await
    {
        Ok(outcome) => LookupResponseBody::Success(LookupSuccessBody::from_outcome(outcome)),
        Err(e) => {
            error!("Lookup failed: {}", e);
            LookupResponseBody::Error(LookupErrorBody::from_message(e.to_string()))
        }
    };

    info!("Lookup answered in {:?}", started.elapsed());
    (StatusCode::OK, Json(response))
}

/// GET /debug — automation engine and browser-binary status, for
/// operational troubleshooting only.
pub async fn debug_handler(State(state): State<ApiState>) -> Json<portal::EngineStatus> {
    Json(portal::engine_status(&state.config))
}

/// GET /health — simple liveness probe.
pub async fn health_handler() -> Json<Value> {
    Json(serde_json::json!({
        "healthy": true,
        "service": "patient-lookup-service",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
