// src/db/followup_repo.rs

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::followup::{
        ClaimPolicy, DispatchCheck, DueFollowUp, FollowUpDraft, FollowUpStats, ScheduledMessage,
    },
};

const MESSAGE_COLUMNS: &str = "id, lead_id, message, scheduled_for, sent, sent_at, cancelled, \
    cancelled_reason, attempt_count, last_attempt_at, last_error, claimed_at, claim_token, \
    provider_message_id, created_at";

#[derive(Clone, Default)]
pub struct FollowUpRepository;

impl FollowUpRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn insert<'e, E>(
        &self,
        executor: E,
        lead_id: Uuid,
        draft: &FollowUpDraft,
    ) -> Result<ScheduledMessage, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "INSERT INTO scheduled_messages (lead_id, message, scheduled_for) \
             VALUES ($1, $2, $3) RETURNING {MESSAGE_COLUMNS}"
        );

        let row = sqlx::query_as::<_, ScheduledMessage>(&sql)
            .bind(lead_id)
            .bind(&draft.message)
            .bind(draft.scheduled_for)
            .fetch_one(executor)
            .await?;

        Ok(row)
    }

    pub async fn list_by_lead<'e, E>(
        &self,
        executor: E,
        lead_id: Uuid,
        pending_only: bool,
    ) -> Result<Vec<ScheduledMessage>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM scheduled_messages \
             WHERE lead_id = $1 AND (NOT $2 OR (sent = FALSE AND cancelled = FALSE)) \
             ORDER BY scheduled_for ASC"
        );

        let rows = sqlx::query_as::<_, ScheduledMessage>(&sql)
            .bind(lead_id)
            .bind(pending_only)
            .fetch_all(executor)
            .await?;

        Ok(rows)
    }

    /// Cancela em massa os pendentes do lead, reservados ou não. Um envio em
    /// andamento perde a baixa condicional e não é registrado como enviado.
    pub async fn cancel_pending<'e, E>(
        &self,
        executor: E,
        lead_id: Uuid,
        reason: &str,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            "UPDATE scheduled_messages \
             SET cancelled = TRUE, cancelled_reason = $2, claimed_at = NULL, claim_token = NULL \
             WHERE lead_id = $1 AND sent = FALSE AND cancelled = FALSE",
        )
        .bind(lead_id)
        .bind(reason)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// Reserva atômica das mensagens vencidas.
    ///
    /// `FOR UPDATE SKIP LOCKED` + o UPDATE na mesma instrução garantem que duas
    /// execuções sobrepostas nunca pegam a mesma linha. Cada linha recebe um
    /// token novo, conferido de novo antes do envio.
    pub async fn claim_due<'e, E>(
        &self,
        executor: E,
        now: DateTime<Utc>,
        limit: i64,
        policy: &ClaimPolicy,
    ) -> Result<Vec<DueFollowUp>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let stale_before = now - policy.lease;

        let rows = sqlx::query_as::<_, DueFollowUp>(
            r#"
            WITH due AS (
                SELECT id FROM scheduled_messages
                WHERE scheduled_for <= $1
                  AND sent = FALSE
                  AND cancelled = FALSE
                  AND (claimed_at IS NULL OR claimed_at < $2)
                  AND ($4::int IS NULL OR attempt_count < $4)
                ORDER BY scheduled_for ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            UPDATE scheduled_messages m
            SET claimed_at = $1,
                claim_token = gen_random_uuid(),
                attempt_count = m.attempt_count + 1,
                last_attempt_at = $1
            FROM due, leads l
            WHERE m.id = due.id AND l.id = m.lead_id
            RETURNING m.id, m.lead_id, m.message, m.claim_token, m.attempt_count,
                      m.created_at, l.phone AS lead_phone
            "#,
        )
        .bind(now)
        .bind(stale_before)
        .bind(limit)
        .bind(policy.max_attempts)
        .fetch_all(executor)
        .await?;

        Ok(rows)
    }

    /// Trava a linha e confere se ela segue pendente e reservada com `token`.
    /// `None` quando a reserva ainda é nossa.
    pub async fn lock_claimed<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        token: Uuid,
    ) -> Result<Option<DispatchCheck>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row: Option<(bool, Option<Uuid>)> = sqlx::query_as(
            "SELECT (sent = FALSE AND cancelled = FALSE), claim_token \
             FROM scheduled_messages WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(match row {
            Some((true, Some(current))) if current == token => None,
            Some((true, _)) => Some(DispatchCheck::ClaimLost),
            _ => Some(DispatchCheck::Resolved),
        })
    }

    /// Renova o lease da linha que vai ser enviada agora.
    pub async fn renew_claim<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        token: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE scheduled_messages SET claimed_at = $3 WHERE id = $1 AND claim_token = $2")
            .bind(id)
            .bind(token)
            .bind(at)
            .execute(executor)
            .await?;

        Ok(())
    }

    /// Cancela uma mensagem específica. Condicional: se já foi enviada ou
    /// cancelada, nada muda (retorna false).
    pub async fn cancel_one<'e, E>(&self, executor: E, id: Uuid, reason: &str) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            "UPDATE scheduled_messages \
             SET cancelled = TRUE, cancelled_reason = $2, claimed_at = NULL, claim_token = NULL \
             WHERE id = $1 AND sent = FALSE AND cancelled = FALSE",
        )
        .bind(id)
        .bind(reason)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Baixa condicional: só vale para a reserva identificada por `token`.
    pub async fn mark_sent<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        token: Uuid,
        sent_at: DateTime<Utc>,
        provider_message_id: Option<&str>,
    ) -> Result<Option<ScheduledMessage>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "UPDATE scheduled_messages \
             SET sent = TRUE, sent_at = $3, claimed_at = NULL, claim_token = NULL, \
                 last_error = NULL, provider_message_id = $4 \
             WHERE id = $1 AND claim_token = $2 AND sent = FALSE AND cancelled = FALSE \
             RETURNING {MESSAGE_COLUMNS}"
        );

        let row = sqlx::query_as::<_, ScheduledMessage>(&sql)
            .bind(id)
            .bind(token)
            .bind(sent_at)
            .bind(provider_message_id)
            .fetch_optional(executor)
            .await?;

        Ok(row)
    }

    /// Devolve a mensagem para a fila depois de uma falha de envio.
    pub async fn release<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        token: Uuid,
        error: &str,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            "UPDATE scheduled_messages SET claimed_at = NULL, claim_token = NULL, last_error = $3 \
             WHERE id = $1 AND claim_token = $2 AND sent = FALSE AND cancelled = FALSE",
        )
        .bind(id)
        .bind(token)
        .bind(error)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn stats<'e, E>(
        &self,
        executor: E,
        now: DateTime<Utc>,
        max_attempts: Option<i32>,
    ) -> Result<FollowUpStats, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let (pending, due, exhausted): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE scheduled_for <= $1),
                COUNT(*) FILTER (WHERE $2::int IS NOT NULL AND attempt_count >= $2)
            FROM scheduled_messages
            WHERE sent = FALSE AND cancelled = FALSE
            "#,
        )
        .bind(now)
        .bind(max_attempts)
        .fetch_one(executor)
        .await?;

        Ok(FollowUpStats {
            pending,
            due,
            exhausted,
        })
    }
}
