// src/models/triage.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// --- ENUMS (mesmos valores que o classificador devolve) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "triage_intent", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    AgendarConsulta,
    MaisInformacoes,
    NaoInteressado,
    NaoEntendido,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "lead_score", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LeadScore {
    Baixo,
    Medio,
    Alto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "urgency_level", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Baixa,
    Moderada,
    Alta,
}

// O modelo às vezes responde "Médio", "agendar consulta", "ALTA"...
// Normalizamos antes de comparar: minúsculas, sem acento, espaço/hífen -> '_'.
pub(crate) fn fold_label(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'Á' | 'À' | 'Â' | 'Ã' => 'a',
            'é' | 'ê' | 'É' | 'Ê' => 'e',
            'í' | 'Í' => 'i',
            'ó' | 'ô' | 'õ' | 'Ó' | 'Ô' | 'Õ' => 'o',
            'ú' | 'Ú' => 'u',
            'ç' | 'Ç' => 'c',
            ' ' | '-' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

impl Intent {
    pub fn parse_loose(raw: &str) -> Option<Self> {
        match fold_label(raw).as_str() {
            "agendar_consulta" => Some(Intent::AgendarConsulta),
            "mais_informacoes" => Some(Intent::MaisInformacoes),
            "nao_interessado" => Some(Intent::NaoInteressado),
            "nao_entendido" => Some(Intent::NaoEntendido),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::AgendarConsulta => "AGENDAR_CONSULTA",
            Intent::MaisInformacoes => "MAIS_INFORMACOES",
            Intent::NaoInteressado => "NAO_INTERESSADO",
            Intent::NaoEntendido => "NAO_ENTENDIDO",
        }
    }
}

impl LeadScore {
    pub fn parse_loose(raw: &str) -> Option<Self> {
        match fold_label(raw).as_str() {
            "baixo" => Some(LeadScore::Baixo),
            "medio" => Some(LeadScore::Medio),
            "alto" => Some(LeadScore::Alto),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadScore::Baixo => "baixo",
            LeadScore::Medio => "medio",
            LeadScore::Alto => "alto",
        }
    }
}

impl UrgencyLevel {
    pub fn parse_loose(raw: &str) -> Option<Self> {
        match fold_label(raw).as_str() {
            "baixa" => Some(UrgencyLevel::Baixa),
            "moderada" | "media" => Some(UrgencyLevel::Moderada),
            "alta" => Some(UrgencyLevel::Alta),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Baixa => "baixa",
            UrgencyLevel::Moderada => "moderada",
            UrgencyLevel::Alta => "alta",
        }
    }
}

// --- CLASSIFICAÇÃO (saída validada do classificador, ainda sem lead) ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub resposta_ao_usuario: String,
    pub intent: Intent,
    pub lead_score: LeadScore,
    pub interesse_principal: String,
    pub nivel_urgencia: UrgencyLevel,
    pub provavel_plano: String,
    pub indicacao_programa: String,
    pub precisa_humano: bool,
    pub possivel_ticket: Option<String>,
    pub probabilidade_fechamento: Option<String>,
    pub observacoes: Option<String>,

    // Resposta crua do modelo, guardada para auditoria
    pub raw_payload: Option<Value>,
    pub is_fallback: bool,
}

impl Classification {
    /// Resultado seguro quando a triagem automática falha.
    /// Sempre pede um humano: melhor um atendente olhar do que perder o lead.
    pub fn fallback(reason: &str) -> Self {
        Self {
            resposta_ao_usuario: String::new(),
            intent: Intent::MaisInformacoes,
            lead_score: LeadScore::Baixo,
            interesse_principal: String::new(),
            nivel_urgencia: UrgencyLevel::Baixa,
            provavel_plano: String::new(),
            indicacao_programa: String::new(),
            precisa_humano: true,
            possivel_ticket: None,
            probabilidade_fechamento: None,
            observacoes: Some(format!("Triagem automática indisponível: {}", reason)),
            raw_payload: None,
            is_fallback: true,
        }
    }
}

// --- RESULTADO PERSISTIDO (1:1 com o lead) ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriageResult {
    pub id: Uuid,
    pub lead_id: Uuid,

    #[schema(example = "Olá! Temos horários amanhã pela manhã. Quer agendar?")]
    pub resposta_ao_usuario: String,
    pub intent: Intent,
    pub lead_score: LeadScore,
    #[schema(example = "Emagrecimento")]
    pub interesse_principal: String,
    pub nivel_urgencia: UrgencyLevel,
    #[schema(example = "Plano Trimestral")]
    pub provavel_plano: String,
    #[schema(example = "Programa Nutri 90 dias")]
    pub indicacao_programa: String,
    pub precisa_humano: bool,
    pub possivel_ticket: Option<String>,
    pub probabilidade_fechamento: Option<String>,
    pub observacoes: Option<String>,

    pub raw_payload: Option<Value>,
    pub is_fallback: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
