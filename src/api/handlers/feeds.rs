//! Feed handlers: coordinator status and local change injection.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{EmitChangeRequest, EmitChangeResponse, FeedListResponse};
use crate::app_state::AppState;
use crate::coordinator::CoordinatorStatus;
use crate::domain::{Identity, ResourceKey};
use crate::error::{ErrorResponse, HubError};

/// `GET /feeds` — Status of every coordinator.
#[utoipa::path(
    get,
    path = "/api/v1/feeds",
    tag = "Feeds",
    summary = "List feeds",
    description = "Returns the lifecycle phase, subscriber count and counters for every watched resource.",
    responses(
        (status = 200, description = "Coordinator statuses", body = FeedListResponse),
    )
)]
pub async fn list_feeds(State(state): State<AppState>) -> impl IntoResponse {
    let backend = if state.local_feed.is_some() {
        "memory"
    } else {
        "postgres"
    };
    Json(FeedListResponse {
        backend: backend.to_string(),
        data: state.registry.statuses(),
    })
}

/// `GET /feeds/{resource}` — Status of one coordinator.
///
/// # Errors
///
/// Returns [`HubError::InvalidResourceKey`] for a malformed key and
/// [`HubError::UnknownResource`] if nothing watches it.
#[utoipa::path(
    get,
    path = "/api/v1/feeds/{resource}",
    tag = "Feeds",
    summary = "Get feed status",
    description = "Returns the coordinator status for one resource. The bound identity is never exposed.",
    params(
        ("resource" = String, Path, description = "Resource key"),
    ),
    responses(
        (status = 200, description = "Coordinator status", body = CoordinatorStatus),
        (status = 400, description = "Malformed resource key", body = ErrorResponse),
        (status = 404, description = "Resource not watched", body = ErrorResponse),
    )
)]
pub async fn get_feed(
    State(state): State<AppState>,
    Path(resource): Path<String>,
) -> Result<Json<CoordinatorStatus>, HubError> {
    let resource = ResourceKey::new(&resource)?;
    let coordinator = state.registry.get(&resource)?;
    Ok(Json(coordinator.status()))
}

/// `POST /feeds/{resource}/changes` — Inject a change into the in-process
/// feed.
///
/// # Errors
///
/// Returns [`HubError::InvalidRequest`] when the hub runs on a database
/// backend, plus the lookup errors of [`get_feed`].
#[utoipa::path(
    post,
    path = "/api/v1/feeds/{resource}/changes",
    tag = "Feeds",
    summary = "Inject a change",
    description = "Delivers a change to the open watches on the resource. Only available with the in-memory backend.",
    params(
        ("resource" = String, Path, description = "Resource key"),
    ),
    request_body = EmitChangeRequest,
    responses(
        (status = 202, description = "Change accepted", body = EmitChangeResponse),
        (status = 400, description = "Invalid request or backend", body = ErrorResponse),
        (status = 404, description = "Resource not watched", body = ErrorResponse),
    )
)]
pub async fn emit_change(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Json(req): Json<EmitChangeRequest>,
) -> Result<impl IntoResponse, HubError> {
    let Some(feed) = state.local_feed.as_ref() else {
        return Err(HubError::InvalidRequest(
            "change injection requires the memory backend".to_string(),
        ));
    };
    let resource = ResourceKey::new(&resource)?;
    state.registry.get(&resource)?;

    let delivered = match req.identity {
        Some(identity) => feed.emit_to(&resource, &Identity::new(identity)?, req.payload),
        None => feed.emit(&resource, req.payload),
    };
    tracing::debug!(%resource, delivered, "change injected");

    Ok((StatusCode::ACCEPTED, Json(EmitChangeResponse { delivered })))
}

/// Feed routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/feeds", get(list_feeds))
        .route("/feeds/{resource}", get(get_feed))
        .route("/feeds/{resource}/changes", post(emit_change))
}
