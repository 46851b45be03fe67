pub mod lead_repo;
pub use lead_repo::LeadRepository;
pub mod triage_repo;
pub use triage_repo::TriageRepository;
pub mod timeline_repo;
pub use timeline_repo::TimelineRepository;
pub mod followup_repo;
pub use followup_repo::FollowUpRepository;
pub mod settings_repo;
pub use settings_repo::SettingsRepository;
pub mod store;
pub use store::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        followup::{
            CancelReason, ClaimPolicy, CohortOutcome, DispatchCheck, DueFollowUp, FollowUpDraft, FollowUpStats,
            ScheduledMessage,
        },
        lead::{Lead, LeadChanges, LeadFilter, LeadStatus, NewLead, NewPatient, Patient},
        settings::{ClinicSettings, UpdateClinicSettingsRequest},
        timeline::{NewEvent, TimelineEvent, TimelineQuery},
        triage::{Classification, TriageResult},
    },
};

/// O agregado Lead visto de fora.
///
/// Código externo nunca mexe nas tabelas filhas (triagem, timeline, follow-ups)
/// diretamente: cada operação aqui é atômica e trava a linha do lead quando
/// altera algo dele.
#[async_trait]
pub trait LeadStore: Send + Sync {
    // --- Lead ---

    /// Cria o lead (status NEW) e o evento CREATED na mesma transação.
    async fn create_lead(&self, new: NewLead) -> Result<Lead, AppError>;
    async fn find_lead(&self, id: Uuid) -> Result<Option<Lead>, AppError>;
    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, AppError>;
    /// Todos os leads cujo telefone termina com `suffix`, mais antigo primeiro.
    async fn find_leads_by_phone_suffix(&self, suffix: &str) -> Result<Vec<Lead>, AppError>;
    /// Aplica as mudanças e grava os eventos juntos.
    async fn update_lead(
        &self,
        id: Uuid,
        changes: LeadChanges,
        events: Vec<NewEvent>,
    ) -> Result<Lead, AppError>;
    async fn set_status(&self, id: Uuid, status: LeadStatus) -> Result<Lead, AppError>;

    // --- Triagem ---

    /// Ponto único de commit da triagem: upsert do resultado, status de
    /// repouso e evento TRIAGE_COMPLETED.
    async fn record_classification(
        &self,
        lead_id: Uuid,
        classification: &Classification,
        resting_status: LeadStatus,
    ) -> Result<TriageResult, AppError>;
    async fn find_triage(&self, lead_id: Uuid) -> Result<Option<TriageResult>, AppError>;

    // --- Timeline ---

    async fn append_event(&self, lead_id: Uuid, event: NewEvent) -> Result<TimelineEvent, AppError>;
    async fn query_events(
        &self,
        lead_id: Uuid,
        query: &TimelineQuery,
    ) -> Result<Vec<TimelineEvent>, AppError>;

    // --- Follow-ups ---

    /// Cria o cohort, a menos que o lead já tenha um pendente.
    /// O created_at das linhas vem do relógio do store, o mesmo da timeline.
    async fn create_cohort(
        &self,
        lead_id: Uuid,
        drafts: &[FollowUpDraft],
    ) -> Result<CohortOutcome, AppError>;
    async fn cancel_pending(&self, lead_id: Uuid, reason: &CancelReason) -> Result<u64, AppError>;
    async fn list_follow_ups(&self, lead_id: Uuid) -> Result<Vec<ScheduledMessage>, AppError>;
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        policy: &ClaimPolicy,
    ) -> Result<Vec<DueFollowUp>, AppError>;
    /// Checagem de corrida + cancelamento na mesma transação, com o lead travado.
    /// Confere o token da reserva e, se puder enviar, renova o lease em `at`.
    async fn cancel_if_engaged(
        &self,
        message: &DueFollowUp,
        engagement_types: &[String],
        at: DateTime<Utc>,
    ) -> Result<DispatchCheck, AppError>;
    /// Marca como enviada e grava FOLLOWUP_SENT. `None` se a linha já tinha
    /// sido resolvida por outro caminho ou reservada por outra execução.
    async fn complete_follow_up(
        &self,
        message: &DueFollowUp,
        sent_at: DateTime<Utc>,
        provider_message_id: &str,
    ) -> Result<Option<ScheduledMessage>, AppError>;
    async fn release_follow_up(&self, message: &DueFollowUp, error: &str) -> Result<(), AppError>;
    async fn follow_up_stats(
        &self,
        now: DateTime<Utc>,
        max_attempts: Option<i32>,
    ) -> Result<FollowUpStats, AppError>;

    // --- Conversão ---

    /// Cria o paciente, marca CONVERTED, grava o evento e cancela follow-ups.
    async fn convert_to_patient(&self, lead_id: Uuid, new: NewPatient) -> Result<Patient, AppError>;
}

/// Configuração da clínica (prompt + base de conhecimento).
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn clinic_settings(&self) -> Result<ClinicSettings, AppError>;
    async fn update_clinic_settings(
        &self,
        input: &UpdateClinicSettingsRequest,
    ) -> Result<ClinicSettings, AppError>;
}

#[cfg(test)]
pub mod memory;
