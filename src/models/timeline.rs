// src/models/timeline.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Tipos de evento conhecidos. O campo é TEXT no banco (enum aberto),
/// então integrações podem gravar tipos novos sem migração.
pub struct EventType;

impl EventType {
    pub const CREATED: &'static str = "CREATED";
    pub const MESSAGE_RECEIVED: &'static str = "MESSAGE_RECEIVED";
    pub const MESSAGE_SENT: &'static str = "MESSAGE_SENT";
    pub const AUTOREPLY_SENT: &'static str = "AUTOREPLY_SENT";
    pub const TRIAGE_COMPLETED: &'static str = "TRIAGE_COMPLETED";
    pub const FOLLOWUP_SENT: &'static str = "FOLLOWUP_SENT";
    pub const CONTACT_LOGGED: &'static str = "CONTACT_LOGGED";
    pub const STATUS_CHANGED: &'static str = "STATUS_CHANGED";
    pub const OWNER_CHANGED: &'static str = "OWNER_CHANGED";
    pub const CONVERTED_TO_PATIENT: &'static str = "CONVERTED_TO_PATIENT";
    pub const PROTOCOL_SENT: &'static str = "PROTOCOL_SENT";
}

/// Eventos que contam como "o lead respondeu" para o cancelamento de follow-ups.
pub fn default_engagement_types() -> Vec<String> {
    vec![
        EventType::MESSAGE_RECEIVED.to_string(),
        EventType::TRIAGE_COMPLETED.to_string(),
        EventType::AUTOREPLY_SENT.to_string(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub id: Uuid,
    pub lead_id: Uuid,

    #[serde(rename = "type")]
    #[schema(example = "MESSAGE_RECEIVED")]
    pub event_type: String,

    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// Evento ainda não gravado.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: String,
    pub payload: Value,
}

impl NewEvent {
    pub fn new(event_type: &str, payload: Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    // A UI quer o mais recente primeiro
    #[default]
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct TimelineQuery {
    pub since: Option<DateTime<Utc>>,
    // Vazio = todos os tipos
    pub types: Vec<String>,
    pub order: SortOrder,
    pub limit: Option<i64>,
}
