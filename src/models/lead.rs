// src/models/lead.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::models::triage::TriageResult;

// --- ENUMS ---

// Mapeia o CREATE TYPE lead_status do banco
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "lead_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    New,
    Triaging,
    Contacted,
    Scheduled,
    Won,
    Lost,
    Converted,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "NEW",
            LeadStatus::Triaging => "TRIAGING",
            LeadStatus::Contacted => "CONTACTED",
            LeadStatus::Scheduled => "SCHEDULED",
            LeadStatus::Won => "WON",
            LeadStatus::Lost => "LOST",
            LeadStatus::Converted => "CONVERTED",
        }
    }

    /// Status em que o funil acabou: follow-ups pendentes não fazem mais sentido.
    pub fn is_closed(&self) -> bool {
        matches!(self, LeadStatus::Won | LeadStatus::Lost | LeadStatus::Converted)
    }
}

// --- LEAD (raiz do agregado) ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,

    #[schema(example = "Maria Souza")]
    pub name: String,

    // Sempre só dígitos (ver common::phone)
    #[schema(example = "5511999999999")]
    pub phone: String,

    #[schema(example = "whatsapp")]
    pub source: String,

    #[schema(example = "Quero saber o preço")]
    pub message: Option<String>,

    pub status: LeadStatus,
    pub assigned_owner_id: Option<Uuid>,
    pub last_contact_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lead com a triagem atual, para a tela de detalhe.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeadDetail {
    #[serde(flatten)]
    pub lead: Lead,
    pub triage: Option<TriageResult>,
}

/// Dados de entrada para criar um lead (já normalizados pelo serviço).
#[derive(Debug, Clone)]
pub struct NewLead {
    pub name: String,
    pub phone: String,
    pub source: String,
    pub message: Option<String>,
}

/// Alterações de um PATCH. `None` = campo não enviado.
#[derive(Debug, Clone, Default)]
pub struct LeadChanges {
    pub name: Option<String>,
    pub message: Option<String>,
    pub status: Option<LeadStatus>,
    // Some(None) remove o responsável
    pub assigned_owner_id: Option<Option<Uuid>>,
    pub last_contact_at: Option<DateTime<Utc>>,
}

impl LeadChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.message.is_none()
            && self.status.is_none()
            && self.assigned_owner_id.is_none()
            && self.last_contact_at.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub assigned_owner_id: Option<Uuid>,
    pub limit: Option<i64>,
}

// --- PACIENTE (destino da conversão) ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPatient {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

/// Resultado de um envio manual pelo atendente.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub lead_id: Uuid,
    #[schema(example = "wamid.HBgMNTUxMTk5OTk5OTk5")]
    pub provider_message_id: String,
    pub sent_at: DateTime<Utc>,
}
