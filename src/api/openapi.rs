//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

use crate::api::dto::{EmitChangeRequest, EmitChangeResponse, FeedListResponse};
use crate::api::handlers::{feeds, system};
use crate::coordinator::{ConnectionStats, CoordinatorStatus, Phase};
use crate::error::{ErrorBody, ErrorResponse};

/// Generated OpenAPI document, served by Swagger UI when the
/// `swagger-ui` feature is enabled.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "changefeed-hub",
        description = "Shared upstream change-feed subscriptions with keyed fan-out."
    ),
    paths(
        system::health_handler,
        feeds::list_feeds,
        feeds::get_feed,
        feeds::emit_change,
    ),
    components(schemas(
        system::HealthResponse,
        FeedListResponse,
        CoordinatorStatus,
        ConnectionStats,
        Phase,
        EmitChangeRequest,
        EmitChangeResponse,
        ErrorResponse,
        ErrorBody,
    )),
    tags(
        (name = "System", description = "Service health"),
        (name = "Feeds", description = "Coordinator status and change injection"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_feed_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/health"));
        assert!(doc.paths.paths.contains_key("/api/v1/feeds"));
        assert!(doc.paths.paths.contains_key("/api/v1/feeds/{resource}/changes"));
    }
}
