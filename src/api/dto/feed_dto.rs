//! Feed status and change-injection DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::coordinator::CoordinatorStatus;

/// Response body for `GET /api/v1/feeds`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FeedListResponse {
    /// Change-feed backend in use (`memory` or `postgres`).
    pub backend: String,
    /// One entry per watched resource, ordered by key.
    pub data: Vec<CoordinatorStatus>,
}

/// Request body for `POST /api/v1/feeds/{resource}/changes`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EmitChangeRequest {
    /// Deliver only to the watch owned by this identity. Omit to deliver
    /// to every open watch on the resource.
    #[serde(default)]
    pub identity: Option<String>,
    /// Opaque change payload.
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
}

/// Response body for an injected change.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EmitChangeResponse {
    /// Number of upstream watches the change was delivered to.
    pub delivered: usize,
}
