// src/services/followup_service.rs

use std::{sync::Arc, time::Instant};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::LeadStore,
    models::{
        followup::{
            CancelReason, ClaimPolicy, CohortOutcome, DispatchCheck, DueFollowUp, FollowUpOutcome,
            FollowUpPlan, FollowUpStats, OutcomeStatus, ProcessResult, ScheduledMessage,
        },
        timeline::default_engagement_types,
    },
    services::messenger::MessageSender,
};

pub const MAX_BATCH_LIMIT: i64 = 500;

#[derive(Debug, Clone)]
pub struct FollowUpConfig {
    pub plan: FollowUpPlan,
    pub batch_limit: i64,
    pub policy: ClaimPolicy,
    // Tipos de evento que contam como resposta do lead
    pub engagement_types: Vec<String>,
}

impl Default for FollowUpConfig {
    fn default() -> Self {
        Self {
            plan: FollowUpPlan::default(),
            batch_limit: 50,
            policy: ClaimPolicy::default(),
            engagement_types: default_engagement_types(),
        }
    }
}

#[derive(Clone)]
pub struct FollowUpService {
    store: Arc<dyn LeadStore>,
    sender: Arc<dyn MessageSender>,
    config: Arc<FollowUpConfig>,
}

impl FollowUpService {
    pub fn new(
        store: Arc<dyn LeadStore>,
        sender: Arc<dyn MessageSender>,
        config: FollowUpConfig,
    ) -> Self {
        Self {
            store,
            sender,
            config: Arc::new(config),
        }
    }

    // --- AGENDAMENTO ---

    /// Cria o cohort fixo (24h, 7d, 30d a partir de `now`).
    /// Se o lead já tem um cohort pendente, devolve o existente sem criar nada.
    pub async fn schedule_follow_ups(
        &self,
        lead_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CohortOutcome, AppError> {
        let drafts = self.config.plan.drafts(now);
        let outcome = self.store.create_cohort(lead_id, &drafts).await?;

        if outcome.created {
            tracing::info!(%lead_id, count = outcome.messages.len(), "Follow-ups agendados");
        } else {
            tracing::debug!(%lead_id, "Lead já tem follow-ups pendentes, nada criado");
        }
        Ok(outcome)
    }

    pub async fn cancel_follow_ups(
        &self,
        lead_id: Uuid,
        reason: CancelReason,
    ) -> Result<u64, AppError> {
        let count = self.store.cancel_pending(lead_id, &reason).await?;
        if count > 0 {
            tracing::info!(%lead_id, count, reason = reason.as_str(), "Follow-ups cancelados");
        }
        Ok(count)
    }

    pub async fn list_follow_ups(&self, lead_id: Uuid) -> Result<Vec<ScheduledMessage>, AppError> {
        self.store
            .find_lead(lead_id)
            .await?
            .ok_or(AppError::LeadNotFound)?;

        self.store.list_follow_ups(lead_id).await
    }

    // --- PROCESSAMENTO ---

    /// Drena as mensagens vencidas: reserva, checa se o lead respondeu,
    /// envia ou cancela. Só a reserva inicial pode falhar a chamada inteira;
    /// erros por mensagem viram resultado `failed`.
    ///
    /// `now` é o instante da reserva. Cada linha é checada e enviada em
    /// `now` + tempo decorrido no lote, e o lease é renovado nesse instante.
    pub async fn process_due(
        &self,
        now: DateTime<Utc>,
        limit: Option<i64>,
    ) -> Result<ProcessResult, AppError> {
        let limit = limit
            .unwrap_or(self.config.batch_limit)
            .clamp(1, MAX_BATCH_LIMIT);

        let claimed = self
            .store
            .claim_due(now, limit, &self.config.policy)
            .await?;

        let started = Instant::now();
        let mut result = ProcessResult::default();
        for message in &claimed {
            let at = now + Duration::from_std(started.elapsed()).unwrap_or_else(|_| Duration::zero());
            let outcome = self.process_one(message, at).await;
            result.push(outcome);
        }

        tracing::info!(
            processed = result.processed,
            sent = result.sent,
            cancelled = result.cancelled,
            failed = result.failed,
            "Processamento de follow-ups concluído"
        );
        Ok(result)
    }

    async fn process_one(&self, message: &DueFollowUp, now: DateTime<Utc>) -> FollowUpOutcome {
        let outcome = |status, reason: Option<String>| FollowUpOutcome {
            id: message.id,
            lead_id: message.lead_id,
            status,
            reason,
        };

        match self
            .store
            .cancel_if_engaged(message, &self.config.engagement_types, now)
            .await
        {
            Ok(DispatchCheck::Clear) => {}
            Ok(DispatchCheck::Cancelled(reason)) => {
                return outcome(OutcomeStatus::Cancelled, Some(reason.as_str().to_string()));
            }
            Ok(DispatchCheck::Resolved) => {
                return outcome(OutcomeStatus::Failed, Some("already_resolved".to_string()));
            }
            Ok(DispatchCheck::ClaimLost) => {
                tracing::warn!(id = %message.id, "Reserva expirou e foi assumida por outra execução");
                return outcome(OutcomeStatus::Failed, Some("claim_lost".to_string()));
            }
            Err(e) => {
                tracing::warn!(id = %message.id, "Falha na checagem do follow-up: {}", e);
                self.release(message, &e.to_string()).await;
                return outcome(OutcomeStatus::Failed, Some(e.to_string()));
            }
        }

        let provider_id = match self.sender.send(&message.lead_phone, &message.message).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(
                    id = %message.id,
                    lead_id = %message.lead_id,
                    attempt = message.attempt_count,
                    "Falha no envio do follow-up: {}",
                    e
                );
                self.release(message, &e.to_string()).await;
                return outcome(OutcomeStatus::Failed, Some(e.to_string()));
            }
        };

        match self.store.complete_follow_up(message, now, &provider_id).await {
            Ok(Some(_)) => outcome(OutcomeStatus::Sent, None),
            Ok(None) => {
                tracing::warn!(id = %message.id, "Follow-up enviado, mas a linha já estava resolvida");
                outcome(OutcomeStatus::Failed, Some("already_resolved".to_string()))
            }
            Err(e) => {
                // Enviado mas não registrado: a reserva expira e ele volta para a fila
                tracing::error!(id = %message.id, "Follow-up enviado sem registro: {}", e);
                outcome(OutcomeStatus::Failed, Some(e.to_string()))
            }
        }
    }

    async fn release(&self, message: &DueFollowUp, error: &str) {
        if let Err(e) = self.store.release_follow_up(message, error).await {
            tracing::error!(id = %message.id, "Falha ao liberar a reserva do follow-up: {}", e);
        }
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> Result<FollowUpStats, AppError> {
        self.store
            .follow_up_stats(now, self.config.policy.max_attempts)
            .await
    }
}
