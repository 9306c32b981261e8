//! PostgreSQL-based transport step store.
//!
//! The state machine precondition is part of the `UPDATE` row predicate, so
//! a transition either commits against a non-terminal row or affects zero
//! rows; concurrent writers are serialized by the row lock and the loser
//! gets the precondition failure, never a silent overwrite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::domain::{
    ConnectorMessageId, LinkPartnerName, Message, TransportId, TransportState,
    TransportStatusUpdate, TransportStep, TransportUpdate,
};
use crate::metrics::{
    TRANSPORT_STEPS_CREATED_TOTAL, TRANSPORT_TRANSITIONS_REJECTED_TOTAL,
    TRANSPORT_TRANSITIONS_TOTAL,
};

use super::store::{Page, Pagination, TransportStepStore, TransportStoreError};

const STEP_COLUMNS: &str = "transport_id, connector_message_id, link_partner, attempt, state, \
                            result_text, remote_message_id, message, status_history, created, updated";

pub struct PostgresTransportStepStore {
    pool: PgPool,
}

impl PostgresTransportStepStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the backing table exists.
    pub async fn connect(url: &str) -> Result<Self, TransportStoreError> {
        let pool = PgPool::connect(url).await?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        tracing::info!("Connected PostgreSQL transport step store");
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), TransportStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transport_step (
                transport_id         TEXT PRIMARY KEY,
                connector_message_id TEXT NOT NULL,
                link_partner         TEXT NOT NULL,
                attempt              INTEGER NOT NULL,
                state                TEXT NOT NULL,
                result_text          TEXT,
                remote_message_id    TEXT,
                message              JSONB,
                status_history       JSONB NOT NULL DEFAULT '[]'::jsonb,
                created              TIMESTAMPTZ NOT NULL,
                updated              TIMESTAMPTZ NOT NULL,
                UNIQUE (connector_message_id, link_partner, attempt)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_step(row: &PgRow) -> Result<TransportStep, TransportStoreError> {
        let state_raw: String = row.try_get("state")?;
        let state = state_raw
            .parse::<TransportState>()
            .map_err(|e| TransportStoreError::Serialization(serde::de::Error::custom(e)))?;

        let message: Option<Message> = row
            .try_get::<Option<serde_json::Value>, _>("message")?
            .map(serde_json::from_value)
            .transpose()?;

        let status_history: Vec<TransportStatusUpdate> =
            serde_json::from_value(row.try_get::<serde_json::Value, _>("status_history")?)?;

        Ok(TransportStep {
            transport_id: TransportId(row.try_get("transport_id")?),
            connector_message_id: ConnectorMessageId(row.try_get("connector_message_id")?),
            link_partner: LinkPartnerName(row.try_get("link_partner")?),
            attempt: row.try_get::<i32, _>("attempt")? as u32,
            state,
            result_text: row.try_get("result_text")?,
            remote_message_id: row.try_get("remote_message_id")?,
            message,
            created: row.try_get::<DateTime<Utc>, _>("created")?,
            updated: row.try_get::<DateTime<Utc>, _>("updated")?,
            status_history,
        })
    }

    /// States a step may be in for a transition into `to` to be legal.
    fn allowed_predecessors(to: TransportState) -> Vec<String> {
        [TransportState::Pending, TransportState::PendingDownloaded]
            .into_iter()
            .filter(|from| from.can_transition_to(to))
            .map(|from| from.as_str().to_string())
            .collect()
    }
}

#[async_trait]
impl TransportStepStore for PostgresTransportStepStore {
    async fn create_step(
        &self,
        message: &Message,
        partner: &LinkPartnerName,
    ) -> Result<TransportStep, TransportStoreError> {
        let initial_history = serde_json::to_value(vec![TransportStatusUpdate {
            state: TransportState::Pending,
            created: Utc::now(),
        }])?;
        let message_json = serde_json::to_value(message)?;

        let row = sqlx::query(&format!(
            r#"
            WITH next AS (
                SELECT COALESCE(MAX(attempt), 0) + 1 AS attempt
                FROM transport_step
                WHERE connector_message_id = $1 AND link_partner = $2
            )
            INSERT INTO transport_step
                (transport_id, connector_message_id, link_partner, attempt, state,
                 message, status_history, created, updated)
            SELECT $1 || '_' || $2 || '_' || next.attempt::text, $1, $2, next.attempt,
                   'PENDING', $3, $4, NOW(), NOW()
            FROM next
            RETURNING {STEP_COLUMNS}
            "#
        ))
        .bind(message.id.as_str())
        .bind(partner.as_str())
        .bind(message_json)
        .bind(initial_history)
        .fetch_one(&self.pool)
        .await?;

        let step = Self::row_to_step(&row)?;
        TRANSPORT_STEPS_CREATED_TOTAL.inc();
        tracing::debug!(
            transport_id = %step.transport_id,
            connector_message_id = %message.id,
            link_partner = %partner,
            attempt = step.attempt,
            "Created transport step"
        );
        Ok(step)
    }

    async fn update_status(
        &self,
        transport_id: &TransportId,
        update: TransportUpdate,
    ) -> Result<TransportStep, TransportStoreError> {
        let history_entry = serde_json::to_value(vec![TransportStatusUpdate {
            state: update.state,
            created: Utc::now(),
        }])?;
        let allowed = Self::allowed_predecessors(update.state);

        let row = sqlx::query(&format!(
            r#"
            UPDATE transport_step
            SET state = $2,
                result_text = COALESCE($3, result_text),
                remote_message_id = COALESCE(remote_message_id, $4),
                status_history = status_history || $5,
                updated = NOW()
            WHERE transport_id = $1 AND state = ANY($6)
            RETURNING {STEP_COLUMNS}
            "#
        ))
        .bind(transport_id.as_str())
        .bind(update.state.as_str())
        .bind(update.result_text.as_deref())
        .bind(update.remote_message_id.as_deref())
        .bind(history_entry)
        .bind(&allowed)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            TRANSPORT_TRANSITIONS_TOTAL
                .with_label_values(&[update.state.as_str()])
                .inc();
            return Self::row_to_step(&row);
        }

        // zero rows: missing, terminal, or an undefined transition
        TRANSPORT_TRANSITIONS_REJECTED_TOTAL.inc();
        let current = sqlx::query("SELECT state FROM transport_step WHERE transport_id = $1")
            .bind(transport_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match current {
            None => Err(TransportStoreError::NotFound(transport_id.clone())),
            Some(row) => {
                let state_raw: String = row.try_get("state")?;
                let state = state_raw
                    .parse::<TransportState>()
                    .map_err(|e| TransportStoreError::Serialization(serde::de::Error::custom(e)))?;
                if state.is_terminal() {
                    Err(TransportStoreError::AlreadyTerminal {
                        transport_id: transport_id.clone(),
                        state,
                    })
                } else {
                    Err(TransportStoreError::IllegalTransition {
                        transport_id: transport_id.clone(),
                        from: state,
                        to: update.state,
                    })
                }
            }
        }
    }

    async fn get_step(
        &self,
        transport_id: &TransportId,
    ) -> Result<Option<TransportStep>, TransportStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM transport_step WHERE transport_id = $1"
        ))
        .bind(transport_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| Self::row_to_step(&row)).transpose()
    }

    async fn find_pending_for_partner(
        &self,
        partner: &LinkPartnerName,
    ) -> Result<Vec<TransportStep>, TransportStoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {STEP_COLUMNS} FROM transport_step
            WHERE link_partner = $1 AND state = 'PENDING'
            ORDER BY created, attempt
            "#
        ))
        .bind(partner.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_step).collect()
    }

    async fn find_by_connector_message_id(
        &self,
        id: &ConnectorMessageId,
    ) -> Result<Vec<TransportStep>, TransportStoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {STEP_COLUMNS} FROM transport_step
            WHERE connector_message_id = $1
            ORDER BY attempt
            "#
        ))
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_step).collect()
    }

    async fn find_last_attempt_with_states(
        &self,
        states: &[TransportState],
        partners: &[LinkPartnerName],
        pagination: Pagination,
    ) -> Result<Page<TransportStep>, TransportStoreError> {
        let state_names: Vec<String> = states.iter().map(|s| s.as_str().to_string()).collect();
        let partner_names: Vec<String> =
            partners.iter().map(|p| p.as_str().to_string()).collect();

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM (
                SELECT state,
                       ROW_NUMBER() OVER (
                           PARTITION BY connector_message_id, link_partner
                           ORDER BY attempt DESC
                       ) AS rn
                FROM transport_step
                WHERE link_partner = ANY($1)
            ) latest
            WHERE rn = 1 AND state = ANY($2)
            "#,
        )
        .bind(&partner_names)
        .bind(&state_names)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {STEP_COLUMNS} FROM (
                SELECT *,
                       ROW_NUMBER() OVER (
                           PARTITION BY connector_message_id, link_partner
                           ORDER BY attempt DESC
                       ) AS rn
                FROM transport_step
                WHERE link_partner = ANY($1)
            ) latest
            WHERE rn = 1 AND state = ANY($2)
            ORDER BY created DESC, attempt DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(&partner_names)
        .bind(&state_names)
        .bind(pagination.size as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .iter()
            .map(Self::row_to_step)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            page: pagination.page,
            size: pagination.size,
            total: total as u64,
        })
    }
}
