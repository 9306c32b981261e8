use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::server::AppState;

use super::console::{
    delete_queue_message, list_dlq_messages, list_queue_messages, move_dlq_message,
    report_last_attempts,
};
use super::handlers::{
    acknowledge, get_message_by_transport_id, list_pending_messages, list_pending_transport_ids,
    submit_message,
};
use super::health::{health, metrics, stats};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(metrics))
        // Pull delivery endpoint + inbound submit
        .nest(
            "/api/v1",
            Router::new()
                .route("/messages", post(submit_message))
                .route("/messages/pending", get(list_pending_messages))
                .route("/messages/pending/ids", get(list_pending_transport_ids))
                .route("/messages/{transport_id}", get(get_message_by_transport_id))
                .route("/messages/{transport_id}/ack", post(acknowledge)),
        )
        // Dead-letter recovery console + reporting (operator tooling)
        .nest(
            "/admin/queues",
            Router::new()
                .route("/{queue}/messages", get(list_queue_messages))
                .route("/{queue}/messages/{id}", delete(delete_queue_message))
                .route("/{queue}/dlq", get(list_dlq_messages))
                .route("/{queue}/dlq/{id}/move", post(move_dlq_message)),
        )
        .route("/admin/transport/last-attempts", get(report_last_attempts))
}
