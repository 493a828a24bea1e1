//! HTTP surface for the scheduling core.
//!
//! Thin adapter: two session operations plus read-only state exposure.
//! The caller's identity arrives as an `x-user-id` header placed there by
//! an upstream authenticator; this layer trusts it opaquely. All clock
//! reads happen here — the core below takes explicit `now` values.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::catalog::{reconcile_user, StaticCatalog};
use crate::scheduler::{SessionCoordinator, StudyError};
use crate::store::{CardStateStore, StoreError};

/// Server state shared across requests
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SessionCoordinator>,
    pub store: Arc<dyn CardStateStore>,
    pub catalog: Arc<StaticCatalog>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{id}/reviews", post(submit_review))
        .route("/sessions/{id}", delete(finish_session))
        .route("/cards/active", axum::routing::put(set_active_cards))
        .route("/cards/{card_id}", get(get_card_state))
        .route("/stats", get(get_stats))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ==================== Error envelope ====================

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                message: self.message,
            }),
        )
            .into_response()
    }
}

impl From<StudyError> for ApiError {
    fn from(err: StudyError) -> Self {
        let status = match &err {
            StudyError::InvalidGrade(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StudyError::UnknownSession(_) | StudyError::CardNotInSession { .. } => {
                StatusCode::NOT_FOUND
            }
            StudyError::StaleState(_) => StatusCode::CONFLICT,
            StudyError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status == StatusCode::SERVICE_UNAVAILABLE {
            log::warn!("Store failure surfaced to client: {}", err);
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

// ==================== Identity ====================

/// Authenticated caller, taken on trust from the `x-user-id` header
pub struct UserId(pub Uuid);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing x-user-id header"))?;
        let user_id = Uuid::parse_str(raw)
            .map_err(|e| ApiError::unauthorized(format!("Invalid user id: {}", e)))?;
        Ok(UserId(user_id))
    }
}

// ==================== Handlers ====================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    /// Maximum queue length; defaults to the configured session size
    #[serde(default)]
    cap: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitReviewRequest {
    card_id: Uuid,
    grade: u8,
}

async fn create_session(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .coordinator
        .start_session(user_id, request.cap, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn submit_review(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<SubmitReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let card_state = state
        .coordinator
        .submit_review(session_id, request.card_id, request.grade, Utc::now())
        .await?;
    Ok(Json(card_state))
}

async fn finish_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.coordinator.finish_session(session_id, Utc::now())?;
    Ok(Json(summary))
}

async fn get_card_state(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(card_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state.store.get(user_id, card_id).await?;
    Ok(Json(row))
}

async fn get_stats(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.store.review_stats(user_id, Utc::now()).await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetActiveCardsRequest {
    card_ids: Vec<Uuid>,
}

/// Catalog push notification: the deck/card catalog tells us which cards
/// are active for this user, and state rows are created/retired to match.
async fn set_active_cards(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<SetActiveCardsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .catalog
        .set_active_cards(user_id, request.card_ids.into_iter().collect());
    let report = reconcile_user(
        state.catalog.as_ref(),
        state.store.as_ref(),
        user_id,
        Utc::now(),
    )
    .await?;
    Ok(Json(report))
}
