// src/models/settings.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Configuração da clínica usada pelo classificador.
/// Lida do banco a cada classificação (sem cache): editou, vale na próxima.
#[derive(Debug, Clone, Default, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClinicSettings {
    #[schema(example = "Você é a assistente virtual da Clínica Vida. Classifique a mensagem do lead.")]
    pub system_prompt: String,

    #[schema(example = "Consulta: R$ 250. Planos: Mensal, Trimestral. Atendemos de seg a sex.")]
    pub knowledge_base: String,

    pub updated_at: Option<DateTime<Utc>>,
}

impl ClinicSettings {
    pub fn is_configured(&self) -> bool {
        !self.system_prompt.trim().is_empty()
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClinicSettingsRequest {
    #[validate(length(min = 1, message = "required"))]
    pub system_prompt: String,

    #[serde(default)]
    pub knowledge_base: String,
}
