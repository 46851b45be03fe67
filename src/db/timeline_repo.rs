// src/db/timeline_repo.rs

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::timeline::{NewEvent, SortOrder, TimelineEvent, TimelineQuery},
};

// Append-only: só insert e leitura.
#[derive(Clone, Default)]
pub struct TimelineRepository;

impl TimelineRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn append<'e, E>(
        &self,
        executor: E,
        lead_id: Uuid,
        event: &NewEvent,
    ) -> Result<TimelineEvent, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        // created_at vem do banco (clock_timestamp), não do processo
        let created = sqlx::query_as::<_, TimelineEvent>(
            "INSERT INTO timeline_events (lead_id, event_type, payload) VALUES ($1, $2, $3) \
             RETURNING id, lead_id, event_type, payload, created_at",
        )
        .bind(lead_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .fetch_one(executor)
        .await?;

        Ok(created)
    }

    pub async fn query<'e, E>(
        &self,
        executor: E,
        lead_id: Uuid,
        query: &TimelineQuery,
    ) -> Result<Vec<TimelineEvent>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        // Direção vem de um enum fechado
        let direction = match query.order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };

        let sql = format!(
            "SELECT id, lead_id, event_type, payload, created_at FROM timeline_events \
             WHERE lead_id = $1 \
               AND ($2::timestamptz IS NULL OR created_at >= $2) \
               AND (cardinality($3::text[]) = 0 OR event_type = ANY($3)) \
             ORDER BY created_at {direction}, id {direction} \
             LIMIT $4"
        );

        let events = sqlx::query_as::<_, TimelineEvent>(&sql)
            .bind(lead_id)
            .bind(query.since)
            .bind(&query.types)
            .bind(query.limit.unwrap_or(500).clamp(1, 5000))
            .fetch_all(executor)
            .await?;

        Ok(events)
    }

    /// "O lead fez algo desde `since`?" (leitura crítica do processador)
    pub async fn has_event_since<'e, E>(
        &self,
        executor: E,
        lead_id: Uuid,
        since: DateTime<Utc>,
        types: &[String],
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS ( \
                SELECT 1 FROM timeline_events \
                WHERE lead_id = $1 AND created_at >= $2 AND event_type = ANY($3) \
             )",
        )
        .bind(lead_id)
        .bind(since)
        .bind(types)
        .fetch_one(executor)
        .await?;

        Ok(exists)
    }
}
