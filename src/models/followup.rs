// src/models/followup.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledMessage {
    pub id: Uuid,
    pub lead_id: Uuid,

    // Texto fixado na criação, não é re-renderizado no envio
    pub message: String,
    pub scheduled_for: DateTime<Utc>,

    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub cancelled: bool,
    #[schema(example = "lead_responded")]
    pub cancelled_reason: Option<String>,

    pub attempt_count: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    // Marca de "em envio" (lease). NULL = livre.
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub claim_token: Option<Uuid>,
    pub provider_message_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl ScheduledMessage {
    pub fn is_pending(&self) -> bool {
        !self.sent && !self.cancelled
    }
}

/// Mensagem reservada pelo processador, já com o telefone do lead.
/// `claim_token` identifica esta reserva: se outra execução reservar a linha
/// depois que o lease expirar, o token muda e esta cópia perde o direito de enviar.
#[derive(Debug, Clone, FromRow)]
pub struct DueFollowUp {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub message: String,
    pub claim_token: Uuid,
    pub attempt_count: i32,
    pub created_at: DateTime<Utc>,
    pub lead_phone: String,
}

// --- PLANO DO COHORT ---

#[derive(Debug, Clone)]
pub struct FollowUpStep {
    pub offset: Duration,
    pub message: String,
}

/// Cohort fixo criado para cada lead. Constante de configuração:
/// nada é personalizado por lead na hora de agendar.
#[derive(Debug, Clone)]
pub struct FollowUpPlan {
    pub steps: Vec<FollowUpStep>,
}

impl Default for FollowUpPlan {
    fn default() -> Self {
        Self {
            steps: vec![
                FollowUpStep {
                    offset: Duration::hours(24),
                    message: "Olá! Passando para saber se ficou alguma dúvida sobre nossos atendimentos. Posso ajudar a agendar sua consulta?".to_string(),
                },
                FollowUpStep {
                    offset: Duration::days(7),
                    message: "Oi! Ainda temos horários disponíveis nesta semana. Quer que eu reserve um para você?".to_string(),
                },
                FollowUpStep {
                    offset: Duration::days(30),
                    message: "Olá! Faz um tempo que conversamos. Se ainda tiver interesse, é só responder esta mensagem que retomamos de onde paramos.".to_string(),
                },
            ],
        }
    }
}

/// Linha a ser inserida no cohort.
#[derive(Debug, Clone)]
pub struct FollowUpDraft {
    pub message: String,
    pub scheduled_for: DateTime<Utc>,
}

impl FollowUpPlan {
    pub fn drafts(&self, now: DateTime<Utc>) -> Vec<FollowUpDraft> {
        self.steps
            .iter()
            .map(|step| FollowUpDraft {
                message: step.message.clone(),
                scheduled_for: now + step.offset,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CohortOutcome {
    // false = já existia cohort pendente, nada foi criado
    pub created: bool,
    pub messages: Vec<ScheduledMessage>,
}

// --- CANCELAMENTO ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    LeadResponded,
    LeadClosed,
    Manual(String),
}

impl CancelReason {
    pub fn as_str(&self) -> &str {
        match self {
            CancelReason::LeadResponded => "lead_responded",
            CancelReason::LeadClosed => "lead_closed",
            CancelReason::Manual(reason) => reason.as_str(),
        }
    }
}

/// Resultado da checagem feita antes de enviar uma mensagem reservada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchCheck {
    // Nada aconteceu desde o agendamento: pode enviar
    Clear,
    Cancelled(CancelReason),
    // A linha já foi enviada/cancelada por outro caminho
    Resolved,
    // Outra execução reservou a linha depois do lease
    ClaimLost,
}

// --- RESULTADO DO PROCESSAMENTO EM LOTE ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Sent,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpOutcome {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResult {
    pub processed: usize,
    pub sent: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub results: Vec<FollowUpOutcome>,
}

impl ProcessResult {
    pub fn push(&mut self, outcome: FollowUpOutcome) {
        match outcome.status {
            OutcomeStatus::Sent => self.sent += 1,
            OutcomeStatus::Cancelled => self.cancelled += 1,
            OutcomeStatus::Failed => self.failed += 1,
        }
        self.processed += 1;
        self.results.push(outcome);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpStats {
    pub pending: i64,
    pub due: i64,
    // Pendentes que já atingiram o limite de tentativas (0 sem limite)
    pub exhausted: i64,
}

/// Regras de reserva do processador.
#[derive(Debug, Clone)]
pub struct ClaimPolicy {
    // Depois disso uma reserva órfã (processo caiu) volta a ser elegível
    pub lease: Duration,
    pub max_attempts: Option<i32>,
}

impl Default for ClaimPolicy {
    fn default() -> Self {
        Self {
            lease: Duration::minutes(5),
            max_attempts: None,
        }
    }
}
