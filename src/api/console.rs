//! Administrative surface of the dead-letter recovery console.
//!
//! Operator tooling only; the automatic pipeline never calls these routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{LinkPartnerName, TransportState, TransportStep};
use crate::error::{AppError, Result};
use crate::queue::{DlqConsole, QueuedMessage};
use crate::server::AppState;
use crate::transport::{Page, Pagination};

/// Broker metadata of one queued message, as shown to operators.
#[derive(Debug, Serialize)]
pub struct QueueMessageView {
    pub id: Uuid,
    pub connector_message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_link_partner: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub redelivery_count: u32,
}

impl From<QueuedMessage> for QueueMessageView {
    fn from(queued: QueuedMessage) -> Self {
        Self {
            id: queued.id,
            connector_message_id: queued.message.id.0.clone(),
            target_link_partner: queued
                .message
                .details
                .target_link_partner
                .as_ref()
                .map(|p| p.to_string()),
            enqueued_at: queued.enqueued_at,
            redelivery_count: queued.redelivery_count,
        }
    }
}

fn console_for(state: &AppState, queue: &str) -> DlqConsole {
    DlqConsole::new(state.queue_backend.clone(), queue)
}

#[tracing::instrument(name = "console.list_queue_messages", skip(state))]
pub async fn list_queue_messages(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> Result<Json<Vec<QueueMessageView>>> {
    let messages = console_for(&state, &queue).list_all_messages().await?;
    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

#[tracing::instrument(name = "console.list_dlq_messages", skip(state))]
pub async fn list_dlq_messages(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> Result<Json<Vec<QueueMessageView>>> {
    let messages = console_for(&state, &queue).list_all_messages_in_dlq().await?;
    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

/// Delete a message from the queue or its DLQ. Idempotent: deleting an
/// absent message answers success.
#[tracing::instrument(name = "console.delete_queue_message", skip(state))]
pub async fn delete_queue_message(
    State(state): State<AppState>,
    Path((queue, id)): Path<(String, Uuid)>,
) -> Result<StatusCode> {
    console_for(&state, &queue).delete_msg(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Move a message from the DLQ back to its origin queue. Unlike delete, a
/// missing message is an error here.
#[tracing::instrument(name = "console.move_dlq_message", skip(state))]
pub async fn move_dlq_message(
    State(state): State<AppState>,
    Path((queue, id)): Path<(String, Uuid)>,
) -> Result<StatusCode> {
    let moved = console_for(&state, &queue)
        .move_msg_from_dlq_to_queue(id)
        .await?;
    if !moved {
        return Err(AppError::NotFound(format!(
            "No message [{id}] on DLQ of queue [{queue}]"
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Reporting view for operator dashboards: the latest attempt per
/// (message, partner) pair, filtered by state and partner sets.
#[derive(Debug, Deserialize)]
pub struct LastAttemptQuery {
    /// Comma-separated transport state names
    pub states: String,
    /// Comma-separated link partner names
    pub partners: String,
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub size: u32,
}

fn default_page_size() -> u32 {
    50
}

#[tracing::instrument(name = "console.report_last_attempts", skip(state, query))]
pub async fn report_last_attempts(
    State(state): State<AppState>,
    Query(query): Query<LastAttemptQuery>,
) -> Result<Json<Page<TransportStep>>> {
    let states = query
        .states
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<TransportState>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(AppError::Validation)?;
    let partners: Vec<LinkPartnerName> = query
        .partners
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(LinkPartnerName::from)
        .collect();

    let page = state
        .transport_store
        .find_last_attempt_with_states(
            &states,
            &partners,
            Pagination {
                page: query.page,
                size: query.size,
            },
        )
        .await?;
    Ok(Json(page))
}
