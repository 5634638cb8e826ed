//! Router assembly and serving.

use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use super::handlers::{debug_handler, health_handler, lookup_handler, ApiState};

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/lookup", post(lookup_handler))
        .route("/debug", get(debug_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Bind and serve until ctrl-c.
pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Lookup service listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::BranchDirectory;
    use crate::config::AppConfig;
    use crate::portal::{
        LookupOutcome, PatientLookup, PatientRecord, PortalError, TreatmentRow,
    };
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    enum StubMode {
        Found,
        NotFound,
        Fail,
    }

    struct StubLookup(StubMode);

    #[async_trait]
    impl PatientLookup for StubLookup {
        async fn lookup_patient(
            &self,
            _branch: &str,
            _dob: &str,
            _first_name: &str,
            _last_name: &str,
        ) -> Result<LookupOutcome, PortalError> {
            match self.0 {
                StubMode::Found => Ok(LookupOutcome::Found(PatientRecord {
                    patient_name: "John Smith".to_string(),
                    provider: Some("Dr. Lee DDS".to_string()),
                    last_visit: Some("01/02/2024".to_string()),
                    treatment_rows: vec![TreatmentRow {
                        date: "12/15/2023".to_string(),
                        description: "Crown prep".to_string(),
                    }],
                })),
                StubMode::NotFound => Ok(LookupOutcome::NotFound),
                StubMode::Fail => Err(PortalError::Timeout("login page".to_string())),
            }
        }
    }

    fn test_router(mode: StubMode) -> Router {
        router(ApiState {
            config: Arc::new(AppConfig::default()),
            branches: Arc::new(BranchDirectory::new()),
            lookup: Arc::new(StubLookup(mode)),
        })
    }

    async fn post_lookup(app: Router, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/lookup")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn full_params() -> Value {
        json!({
            "suaveBranch": "modesto",
            "dob": "02/10/1980",
            "firstName": "John",
            "lastName": "Smith"
        })
    }

    #[tokio::test]
    async fn test_missing_fields_answer_200_with_validation_body() {
        let (status, body) = post_lookup(
            test_router(StubMode::Found),
            json!({"suaveBranch": "modesto"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], "Missing required fields");
        assert!(body["message"].as_str().unwrap().contains("suaveBranch"));
    }

    #[tokio::test]
    async fn test_found_maps_to_fixed_shape() {
        let (status, body) = post_lookup(test_router(StubMode::Found), full_params()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["PatientName"], "John Smith");
        assert_eq!(body["DoctorName"], "Dr. Lee DDS");
        assert_eq!(body["PatientLastVisit"], "01/02/2024");
        assert_eq!(body["treatmentrows"][0]["description"], "Crown prep");
    }

    #[tokio::test]
    async fn test_not_found_uses_fallback_strings() {
        let (status, body) = post_lookup(test_router(StubMode::NotFound), full_params()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["PatientName"], "No patient record found");
        assert_eq!(body["DoctorName"], "N/A");
        assert_eq!(body["treatmentrows"], "N/A");
    }

    #[tokio::test]
    async fn test_workflow_error_still_answers_200() {
        let (status, body) = post_lookup(test_router(StubMode::Fail), full_params()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], true);
        assert_eq!(body["patientName"], "Not found");
        assert_eq!(body["provider"], "Error occurred");
        assert!(body["message"].as_str().unwrap().contains("login page"));
    }

    #[tokio::test]
    async fn test_tool_call_envelope_accepted() {
        let envelope = json!({
            "message": {
                "toolCalls": [{
                    "function": {"arguments": full_params()}
                }]
            }
        });
        let (status, body) = post_lookup(test_router(StubMode::Found), envelope).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["PatientName"], "John Smith");
    }

    #[tokio::test]
    async fn test_empty_body_answer_200_with_validation_body() {
        let app = test_router(StubMode::Found);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/lookup")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Missing required fields");
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = test_router(StubMode::Found);
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["healthy"], true);
    }

    #[tokio::test]
    async fn test_debug_endpoint() {
        let app = test_router(StubMode::Found);
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/debug")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["engine"], "chromiumoxide");
    }
}
