//! Pull delivery endpoint.
//!
//! The request/response surface a polling partner uses to fetch and
//! acknowledge its pending messages, plus the inbound submit operation. All
//! operations act strictly on the authenticated caller's own transport
//! steps; foreign transport ids answer as not found.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domain::{
    ConnectorMessageId, Message, TransportId, TransportState, TransportStep, TransportUpdate,
};
use crate::error::{AppError, Result};
use crate::metrics::{
    INBOUND_SUBMISSIONS_TOTAL, PULL_ACKNOWLEDGEMENTS_TOTAL, PULL_DOWNLOADS_TOTAL,
};
use crate::server::AppState;
use crate::transform::{TransportAck, WireMessage};
use crate::transport::{TransportStepStore, TransportStoreError};

use super::extract::AuthenticatedPartner;

#[derive(Debug, Serialize)]
pub struct PendingMessagesResponse {
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Serialize)]
pub struct PendingTransportIdsResponse {
    pub transport_ids: Vec<String>,
}

/// Acknowledgement a partner reports for one fetched message.
#[derive(Debug, Deserialize)]
pub struct AcknowledgementRequest {
    pub result: bool,
    #[serde(default)]
    pub assigned_message_id: Option<String>,
    #[serde(default)]
    pub result_message: Option<String>,
}

/// List the full payload of every step currently pending for the caller.
///
/// Non-destructive and idempotent; polling repeatedly before downloading
/// is safe.
#[tracing::instrument(
    name = "pull.list_pending_messages",
    skip(state, caller),
    fields(link_partner = %caller.partner.name)
)]
pub async fn list_pending_messages(
    State(state): State<AppState>,
    caller: AuthenticatedPartner,
) -> Result<Json<PendingMessagesResponse>> {
    let steps = state
        .transport_store
        .find_pending_for_partner(&caller.partner.name)
        .await?;

    let mut messages = Vec::with_capacity(steps.len());
    for step in steps {
        // steps whose message is already purged stay listable by id only
        if let Some(message) = step.message {
            let wire = state
                .transformer
                .to_wire(&message)
                .map_err(|e| AppError::Internal(e.to_string()))?;
            messages.push(wire);
        }
    }

    tracing::debug!(count = messages.len(), "Listed pending messages");
    Ok(Json(PendingMessagesResponse { messages }))
}

/// Same selection as `list_pending_messages`, identifiers only. Lets a
/// partner checkpoint before bulk-fetching.
#[tracing::instrument(
    name = "pull.list_pending_transport_ids",
    skip(state, caller),
    fields(link_partner = %caller.partner.name)
)]
pub async fn list_pending_transport_ids(
    State(state): State<AppState>,
    caller: AuthenticatedPartner,
) -> Result<Json<PendingTransportIdsResponse>> {
    let steps = state
        .transport_store
        .find_pending_for_partner(&caller.partner.name)
        .await?;

    let transport_ids = steps
        .into_iter()
        .map(|step| step.transport_id.0)
        .collect::<Vec<_>>();

    tracing::debug!(count = transport_ids.len(), "Listed pending transport ids");
    Ok(Json(PendingTransportIdsResponse { transport_ids }))
}

/// Fetch one pending message by transport id.
///
/// The step moves to `PENDING_DOWNLOADED` only after the response has been
/// handed over; a request that fails before that leaves the step pending.
#[tracing::instrument(
    name = "pull.get_message_by_transport_id",
    skip(state, caller),
    fields(link_partner = %caller.partner.name, transport_id = %transport_id)
)]
pub async fn get_message_by_transport_id(
    State(state): State<AppState>,
    caller: AuthenticatedPartner,
    Path(transport_id): Path<String>,
) -> Result<Json<WireMessage>> {
    let transport_id = TransportId(transport_id);
    let step = owned_step(&state, &caller, &transport_id).await?;

    if step.state != TransportState::Pending {
        return Err(TransportStoreError::NotPending {
            transport_id,
            state: step.state,
        }
        .into());
    }

    let message = step
        .message
        .ok_or_else(|| TransportStoreError::ContentUnavailable(transport_id.clone()))?;
    let wire = state
        .transformer
        .to_wire(&message)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    PULL_DOWNLOADS_TOTAL.inc();
    defer_download_transition(state.transport_store.clone(), transport_id);
    Ok(Json(wire))
}

/// Commit the download transition once the handler has produced the
/// response and control is back with the server's write path. Best effort:
/// a lost race against a concurrent acknowledgement only logs.
fn defer_download_transition(store: Arc<dyn TransportStepStore>, transport_id: TransportId) {
    tokio::spawn(async move {
        let update = TransportUpdate::to_state(TransportState::PendingDownloaded)
            .with_text("Message downloaded by partner");
        match store.update_status(&transport_id, update).await {
            Ok(_) => {
                tracing::debug!(transport_id = %transport_id, "Marked message as downloaded")
            }
            Err(e) => tracing::warn!(
                transport_id = %transport_id,
                error = %e,
                "Post-response download transition failed"
            ),
        }
    });
}

/// Acknowledge a fetched message, closing its transport step.
#[tracing::instrument(
    name = "pull.acknowledge",
    skip(state, caller, ack),
    fields(link_partner = %caller.partner.name, transport_id = %transport_id, result = ack.result)
)]
pub async fn acknowledge(
    State(state): State<AppState>,
    caller: AuthenticatedPartner,
    Path(transport_id): Path<String>,
    Json(ack): Json<AcknowledgementRequest>,
) -> Result<StatusCode> {
    let transport_id = TransportId(transport_id);
    owned_step(&state, &caller, &transport_id).await?;

    let state_to = if ack.result {
        TransportState::Accepted
    } else {
        TransportState::Failed
    };
    let mut update = TransportUpdate::to_state(state_to);
    update.result_text = ack.result_message;
    update.remote_message_id = ack.assigned_message_id;

    let step = state
        .transport_store
        .update_status(&transport_id, update)
        .await?;

    PULL_ACKNOWLEDGEMENTS_TOTAL
        .with_label_values(&[step.state.as_str()])
        .inc();
    tracing::info!(
        final_state = %step.state,
        remote_message_id = step.remote_message_id.as_deref().unwrap_or(""),
        "Transport step acknowledged"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Inbound submit: a link partner hands a message into the connector.
///
/// Mints a connector message id, converts from wire form and enqueues on the
/// inbound-router queue. Failures answer with `result = false` in the
/// acknowledgement record rather than a transport-level error, mirroring the
/// push protocol's acknowledgement shape.
#[tracing::instrument(
    name = "pull.submit_message",
    skip(state, caller, wire),
    fields(link_partner = %caller.partner.name)
)]
pub async fn submit_message(
    State(state): State<AppState>,
    caller: AuthenticatedPartner,
    Json(wire): Json<WireMessage>,
) -> Result<Json<TransportAck>> {
    let connector_message_id = ConnectorMessageId::generate();

    let outcome = async {
        let message = state
            .transformer
            .from_wire(wire, connector_message_id.clone())
            .map_err(|e| e.to_string())?;
        let message = stamp_origin(message, &caller);
        state
            .queue_backend
            .enqueue(&state.settings.queues.to_connector.name, message)
            .await
            .map_err(|e| e.to_string())
    }
    .await;

    let ack = match outcome {
        Ok(_) => {
            INBOUND_SUBMISSIONS_TOTAL.with_label_values(&["accepted"]).inc();
            tracing::info!(connector_message_id = %connector_message_id, "Accepted inbound message");
            TransportAck {
                result: true,
                message_id: Some(connector_message_id.0),
                result_message: None,
            }
        }
        Err(e) => {
            INBOUND_SUBMISSIONS_TOTAL.with_label_values(&["rejected"]).inc();
            tracing::warn!(
                connector_message_id = %connector_message_id,
                error = %e,
                "Rejected inbound message"
            );
            TransportAck {
                result: false,
                message_id: None,
                result_message: Some(e),
            }
        }
    };

    Ok(Json(ack))
}

fn stamp_origin(mut message: Message, caller: &AuthenticatedPartner) -> Message {
    message.details.origin_link_partner = Some(caller.partner.name.clone());
    message
}

/// Load a step and hide foreign ones from the caller.
async fn owned_step(
    state: &AppState,
    caller: &AuthenticatedPartner,
    transport_id: &TransportId,
) -> Result<TransportStep> {
    let step = state
        .transport_store
        .get_step(transport_id)
        .await?
        .ok_or_else(|| TransportStoreError::NotFound(transport_id.clone()))?;

    if step.link_partner != caller.partner.name {
        tracing::warn!(
            transport_id = %transport_id,
            owner = %step.link_partner,
            caller = %caller.partner.name,
            "Caller requested a foreign transport step"
        );
        return Err(TransportStoreError::NotFound(transport_id.clone()).into());
    }
    Ok(step)
}
