// src/db/store.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{
        FollowUpRepository, LeadRepository, LeadStore, SettingsRepository, SettingsStore,
        TimelineRepository, TriageRepository,
    },
    models::{
        followup::{
            CancelReason, ClaimPolicy, CohortOutcome, DispatchCheck, DueFollowUp, FollowUpDraft, FollowUpStats,
            ScheduledMessage,
        },
        lead::{Lead, LeadChanges, LeadFilter, LeadStatus, NewLead, NewPatient, Patient},
        settings::{ClinicSettings, UpdateClinicSettingsRequest},
        timeline::{EventType, NewEvent, TimelineEvent, TimelineQuery},
        triage::{Classification, TriageResult},
    },
};

/// Implementação Postgres do agregado. Cada método abre a própria transação
/// e passa `&mut *tx` para os repositórios.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    leads: LeadRepository,
    triage: TriageRepository,
    timeline: TimelineRepository,
    followups: FollowUpRepository,
    settings: SettingsRepository,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            leads: LeadRepository::new(),
            triage: TriageRepository::new(),
            timeline: TimelineRepository::new(),
            followups: FollowUpRepository::new(),
            settings: SettingsRepository::new(),
        }
    }
}

#[async_trait]
impl LeadStore for PgStore {
    async fn create_lead(&self, new: NewLead) -> Result<Lead, AppError> {
        let mut tx = self.pool.begin().await?;

        let lead = self.leads.create(&mut *tx, &new).await?;
        self.timeline
            .append(
                &mut *tx,
                lead.id,
                &NewEvent::new(
                    EventType::CREATED,
                    json!({ "source": lead.source, "message": lead.message }),
                ),
            )
            .await?;

        tx.commit().await?;
        Ok(lead)
    }

    async fn find_lead(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        self.leads.find_by_id(&self.pool, id).await
    }

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, AppError> {
        self.leads.list(&self.pool, filter).await
    }

    async fn find_leads_by_phone_suffix(&self, suffix: &str) -> Result<Vec<Lead>, AppError> {
        self.leads.find_by_phone_suffix(&self.pool, suffix).await
    }

    async fn update_lead(
        &self,
        id: Uuid,
        changes: LeadChanges,
        events: Vec<NewEvent>,
    ) -> Result<Lead, AppError> {
        let mut tx = self.pool.begin().await?;

        self.leads.lock(&mut *tx, id).await?;
        let lead = self.leads.update(&mut *tx, id, &changes).await?;
        for event in &events {
            self.timeline.append(&mut *tx, id, event).await?;
        }

        tx.commit().await?;
        Ok(lead)
    }

    async fn set_status(&self, id: Uuid, status: LeadStatus) -> Result<Lead, AppError> {
        self.leads.set_status(&self.pool, id, status).await
    }

    async fn record_classification(
        &self,
        lead_id: Uuid,
        classification: &Classification,
        resting_status: LeadStatus,
    ) -> Result<TriageResult, AppError> {
        let mut tx = self.pool.begin().await?;

        // Serializa triagens concorrentes do mesmo lead (sem lost update)
        self.leads.lock(&mut *tx, lead_id).await?;

        let result = self.triage.upsert(&mut *tx, lead_id, classification).await?;
        self.leads.set_status(&mut *tx, lead_id, resting_status).await?;
        self.timeline
            .append(
                &mut *tx,
                lead_id,
                &NewEvent::new(
                    EventType::TRIAGE_COMPLETED,
                    json!({
                        "triageResultId": result.id,
                        "intent": result.intent,
                        "leadScore": result.lead_score,
                        "nivelUrgencia": result.nivel_urgencia,
                        "precisaHumano": result.precisa_humano,
                        "fallback": result.is_fallback,
                    }),
                ),
            )
            .await?;

        tx.commit().await?;
        Ok(result)
    }

    async fn find_triage(&self, lead_id: Uuid) -> Result<Option<TriageResult>, AppError> {
        self.triage.find_by_lead(&self.pool, lead_id).await
    }

    async fn append_event(&self, lead_id: Uuid, event: NewEvent) -> Result<TimelineEvent, AppError> {
        let mut tx = self.pool.begin().await?;

        // Trava o lead: uma mensagem chegando não "fura" a checagem do processador
        self.leads.lock(&mut *tx, lead_id).await?;
        let created = self.timeline.append(&mut *tx, lead_id, &event).await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn query_events(
        &self,
        lead_id: Uuid,
        query: &TimelineQuery,
    ) -> Result<Vec<TimelineEvent>, AppError> {
        self.timeline.query(&self.pool, lead_id, query).await
    }

    async fn create_cohort(
        &self,
        lead_id: Uuid,
        drafts: &[FollowUpDraft],
    ) -> Result<CohortOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        self.leads.lock(&mut *tx, lead_id).await?;

        // Idempotência: com o lead travado, a checagem + insert não competem
        let pending = self.followups.list_by_lead(&mut *tx, lead_id, true).await?;
        if !pending.is_empty() {
            tx.commit().await?;
            return Ok(CohortOutcome {
                created: false,
                messages: pending,
            });
        }

        let mut messages = Vec::with_capacity(drafts.len());
        for draft in drafts {
            messages.push(self.followups.insert(&mut *tx, lead_id, draft).await?);
        }

        tx.commit().await?;
        Ok(CohortOutcome {
            created: true,
            messages,
        })
    }

    async fn cancel_pending(&self, lead_id: Uuid, reason: &CancelReason) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;

        self.leads.lock(&mut *tx, lead_id).await?;
        let count = self
            .followups
            .cancel_pending(&mut *tx, lead_id, reason.as_str())
            .await?;

        tx.commit().await?;
        Ok(count)
    }

    async fn list_follow_ups(&self, lead_id: Uuid) -> Result<Vec<ScheduledMessage>, AppError> {
        self.followups.list_by_lead(&self.pool, lead_id, false).await
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        policy: &ClaimPolicy,
    ) -> Result<Vec<DueFollowUp>, AppError> {
        self.followups.claim_due(&self.pool, now, limit, policy).await
    }

    async fn cancel_if_engaged(
        &self,
        message: &DueFollowUp,
        engagement_types: &[String],
        at: DateTime<Utc>,
    ) -> Result<DispatchCheck, AppError> {
        let mut tx = self.pool.begin().await?;

        let lead = self.leads.lock(&mut *tx, message.lead_id).await?;
        if let Some(check) = self
            .followups
            .lock_claimed(&mut *tx, message.id, message.claim_token)
            .await?
        {
            tx.commit().await?;
            return Ok(check);
        }

        // A janela começa no AGENDAMENTO (created_at), não no vencimento
        let reason = if lead.status.is_closed() {
            Some(CancelReason::LeadClosed)
        } else if self
            .timeline
            .has_event_since(&mut *tx, message.lead_id, message.created_at, engagement_types)
            .await?
        {
            Some(CancelReason::LeadResponded)
        } else {
            None
        };

        let check = match reason {
            Some(reason) => {
                self.followups
                    .cancel_one(&mut *tx, message.id, reason.as_str())
                    .await?;
                DispatchCheck::Cancelled(reason)
            }
            None => {
                self.followups
                    .renew_claim(&mut *tx, message.id, message.claim_token, at)
                    .await?;
                DispatchCheck::Clear
            }
        };

        tx.commit().await?;
        Ok(check)
    }

    async fn complete_follow_up(
        &self,
        message: &DueFollowUp,
        sent_at: DateTime<Utc>,
        provider_message_id: &str,
    ) -> Result<Option<ScheduledMessage>, AppError> {
        let mut tx = self.pool.begin().await?;

        self.leads.lock(&mut *tx, message.lead_id).await?;
        let updated = self
            .followups
            .mark_sent(&mut *tx, message.id, message.claim_token, sent_at, Some(provider_message_id))
            .await?;

        if updated.is_some() {
            self.timeline
                .append(
                    &mut *tx,
                    message.lead_id,
                    &NewEvent::new(
                        EventType::FOLLOWUP_SENT,
                        json!({
                            "scheduledMessageId": message.id,
                            "message": message.message,
                            "providerMessageId": provider_message_id,
                        }),
                    ),
                )
                .await?;
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn release_follow_up(&self, message: &DueFollowUp, error: &str) -> Result<(), AppError> {
        self.followups
            .release(&self.pool, message.id, message.claim_token, error)
            .await
    }

    async fn follow_up_stats(
        &self,
        now: DateTime<Utc>,
        max_attempts: Option<i32>,
    ) -> Result<FollowUpStats, AppError> {
        self.followups.stats(&self.pool, now, max_attempts).await
    }

    async fn convert_to_patient(&self, lead_id: Uuid, new: NewPatient) -> Result<Patient, AppError> {
        let mut tx = self.pool.begin().await?;

        let lead = self.leads.lock(&mut *tx, lead_id).await?;
        let patient = self.leads.create_patient(&mut *tx, lead_id, &new).await?;

        self.leads.set_status(&mut *tx, lead_id, LeadStatus::Converted).await?;
        self.timeline
            .append(
                &mut *tx,
                lead_id,
                &NewEvent::new(
                    EventType::CONVERTED_TO_PATIENT,
                    json!({ "patientId": patient.id, "previousStatus": lead.status }),
                ),
            )
            .await?;
        self.followups
            .cancel_pending(&mut *tx, lead_id, CancelReason::LeadClosed.as_str())
            .await?;

        tx.commit().await?;
        Ok(patient)
    }
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn clinic_settings(&self) -> Result<ClinicSettings, AppError> {
        self.settings.get_settings(&self.pool).await
    }

    async fn update_clinic_settings(
        &self,
        input: &UpdateClinicSettingsRequest,
    ) -> Result<ClinicSettings, AppError> {
        self.settings.update_settings(&self.pool, input).await
    }
}
