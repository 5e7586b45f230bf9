//! REST endpoints for onboarding, uploads, verification and customer lookup.

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::identity::{CompositeKey, Country, IdentityRecord, SessionId, normalize_national_id};
use crate::pipeline::{OnboardingRequest, VerificationStep};
use crate::store::{DEFAULT_UPLOAD_FILE, ObjectLocation, ObjectStore, RecordStore};

use super::AppState;
use super::agent::{self, ActionRequest};

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// A body that did not deserialize is an input error like any other.
fn rejected(rejection: JsonRejection) -> Response {
    debug!(status = %rejection.status(), "Rejected request body");
    error_response(StatusCode::BAD_REQUEST, rejection.body_text())
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /api/onboarding
///
/// Runs the full pipeline. Business outcomes (including `error`) are 200;
/// only input errors are 400.
async fn onboard(
    State(state): State<AppState>,
    payload: Result<Json<OnboardingRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected(rejection),
    };
    match state.orchestrator.handle(&request).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct UploadParams {
    country: String,
    file: Option<String>,
}

/// POST /api/uploads/{session_id}?country=SE[&file=id_front.jpg]
///
/// Stores the request body under today's session prefix.
async fn upload(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Response {
    let session = match SessionId::parse(&session_id) {
        Ok(s) => s,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let country: Country = match params.country.parse() {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("{e}")),
    };
    if body.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "empty upload");
    }
    let file = params.file.as_deref().unwrap_or(DEFAULT_UPLOAD_FILE);
    let location =
        match ObjectLocation::for_upload(country, Utc::now().date_naive(), &session, file) {
            Ok(loc) => loc,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        };

    let size = body.len();
    match state.objects.put(&location, body.to_vec()).await {
        Ok(()) => {
            info!(session = %session, location = %location, size, "Document uploaded");
            (
                StatusCode::CREATED,
                Json(serde_json::json!({ "objectLocation": location })),
            )
                .into_response()
        }
        Err(e) => {
            warn!(location = %location, error = %e, "Upload failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

/// POST /api/verify
async fn verify(
    State(state): State<AppState>,
    payload: Result<Json<IdentityRecord>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(identity)) => Json(state.verifier.verify(&identity).await).into_response(),
        Err(rejection) => rejected(rejection),
    }
}

/// GET /api/customers/{country}/{national_id}
async fn get_customer(
    State(state): State<AppState>,
    Path((country, national_id)): Path<(String, String)>,
) -> Response {
    let country: Country = match country.parse() {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("{e}")),
    };
    let key = CompositeKey::new(country, &normalize_national_id(&national_id));
    match state.records.get_by_key(&key).await {
        Ok(Some(customer)) => Json(customer).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("No customer {key}")),
        Err(e) => {
            warn!(error = %e, "Customer lookup failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

/// POST /api/agent/actions
async fn agent_action(
    State(state): State<AppState>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(request)) => Json(agent::handle_action(&state, request).await).into_response(),
        Err(rejection) => rejected(rejection),
    }
}

/// Build the API router.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/onboarding", post(onboard))
        .route(
            "/api/uploads/{session_id}",
            post(upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/verify", post(verify))
        .route("/api/customers/{country}/{national_id}", get(get_customer))
        .route("/api/agent/actions", post(agent_action))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
