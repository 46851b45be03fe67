// src/db/memory.rs
//
// Store em memória para os testes dos serviços. Segue a mesma semântica do
// PgStore: operações atômicas (um Mutex só) e updates condicionais.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::{
    common::{error::AppError, phone::normalize_phone},
    db::{LeadStore, SettingsStore},
    models::{
        followup::{
            CancelReason, ClaimPolicy, CohortOutcome, DispatchCheck, DueFollowUp, FollowUpDraft, FollowUpStats,
            ScheduledMessage,
        },
        lead::{Lead, LeadChanges, LeadFilter, LeadStatus, NewLead, NewPatient, Patient},
        settings::{ClinicSettings, UpdateClinicSettingsRequest},
        timeline::{EventType, NewEvent, SortOrder, TimelineEvent, TimelineQuery},
        triage::{Classification, TriageResult},
    },
};

#[derive(Default)]
struct State {
    leads: Vec<Lead>,
    triage: HashMap<Uuid, TriageResult>,
    events: Vec<TimelineEvent>,
    messages: Vec<ScheduledMessage>,
    patients: Vec<Patient>,
    settings: ClinicSettings,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    // Relógio do "banco". None = relógio real.
    clock: Mutex<Option<DateTime<Utc>>>,
    fail_record_classification: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: ClinicSettings) -> Self {
        let store = Self::new();
        store.state.lock().unwrap().settings = settings;
        store
    }

    /// Fixa o relógio usado nos timestamps gravados pelo store.
    pub fn set_clock(&self, now: DateTime<Utc>) {
        *self.clock.lock().unwrap() = Some(now);
    }

    pub fn fail_record_classification(&self, fail: bool) {
        self.fail_record_classification.store(fail, Ordering::SeqCst);
    }

    pub fn events_for(&self, lead_id: Uuid) -> Vec<TimelineEvent> {
        let state = self.state.lock().unwrap();
        state.events.iter().filter(|e| e.lead_id == lead_id).cloned().collect()
    }

    pub fn messages_for(&self, lead_id: Uuid) -> Vec<ScheduledMessage> {
        let state = self.state.lock().unwrap();
        state.messages.iter().filter(|m| m.lead_id == lead_id).cloned().collect()
    }

    pub fn message(&self, id: Uuid) -> ScheduledMessage {
        let state = self.state.lock().unwrap();
        state.messages.iter().find(|m| m.id == id).cloned().unwrap()
    }

    pub fn lead_count(&self) -> usize {
        self.state.lock().unwrap().leads.len()
    }

    // Como o clock_timestamp(): cada gravação anda 1ms
    fn stamp(&self) -> DateTime<Utc> {
        let mut clock = self.clock.lock().unwrap();
        match clock.as_mut() {
            Some(now) => {
                let current = *now;
                *now = current + Duration::milliseconds(1);
                current
            }
            None => Utc::now(),
        }
    }

    fn push_event(&self, state: &mut State, lead_id: Uuid, event: &NewEvent) -> TimelineEvent {
        let created = TimelineEvent {
            id: Uuid::new_v4(),
            lead_id,
            event_type: event.event_type.clone(),
            payload: event.payload.clone(),
            created_at: self.stamp(),
        };
        state.events.push(created.clone());
        created
    }

    fn lead_mut<'a>(state: &'a mut State, id: Uuid) -> Result<&'a mut Lead, AppError> {
        state
            .leads
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(AppError::LeadNotFound)
    }

    fn cancel_pending_locked(state: &mut State, lead_id: Uuid, reason: &str) -> u64 {
        let mut count = 0;
        for m in state.messages.iter_mut() {
            if m.lead_id == lead_id && m.is_pending() {
                m.cancelled = true;
                m.cancelled_reason = Some(reason.to_string());
                m.claimed_at = None;
                m.claim_token = None;
                count += 1;
            }
        }
        count
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn create_lead(&self, new: NewLead) -> Result<Lead, AppError> {
        let mut state = self.state.lock().unwrap();
        let now = self.stamp();
        let lead = Lead {
            id: Uuid::new_v4(),
            name: new.name,
            phone: new.phone,
            source: new.source,
            message: new.message,
            status: LeadStatus::New,
            assigned_owner_id: None,
            last_contact_at: None,
            created_at: now,
            updated_at: now,
        };
        state.leads.push(lead.clone());
        self.push_event(
            &mut state,
            lead.id,
            &NewEvent::new(
                EventType::CREATED,
                json!({ "source": lead.source, "message": lead.message }),
            ),
        );
        Ok(lead)
    }

    async fn find_lead(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state.leads.iter().find(|l| l.id == id).cloned())
    }

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, AppError> {
        let state = self.state.lock().unwrap();
        let mut leads: Vec<Lead> = state
            .leads
            .iter()
            .filter(|l| filter.status.is_none_or(|s| l.status == s))
            .filter(|l| filter.assigned_owner_id.is_none_or(|o| l.assigned_owner_id == Some(o)))
            .cloned()
            .collect();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        leads.truncate(filter.limit.unwrap_or(100).clamp(1, 500) as usize);
        Ok(leads)
    }

    async fn find_leads_by_phone_suffix(&self, suffix: &str) -> Result<Vec<Lead>, AppError> {
        let state = self.state.lock().unwrap();
        let mut leads: Vec<Lead> = state
            .leads
            .iter()
            .filter(|l| normalize_phone(&l.phone).ends_with(suffix))
            .cloned()
            .collect();
        leads.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(leads)
    }

    async fn update_lead(
        &self,
        id: Uuid,
        changes: LeadChanges,
        events: Vec<NewEvent>,
    ) -> Result<Lead, AppError> {
        let mut state = self.state.lock().unwrap();
        let now = self.stamp();
        let lead = Self::lead_mut(&mut state, id)?;

        if let Some(name) = changes.name {
            lead.name = name;
        }
        if let Some(message) = changes.message {
            lead.message = Some(message);
        }
        if let Some(status) = changes.status {
            lead.status = status;
        }
        if let Some(owner) = changes.assigned_owner_id {
            lead.assigned_owner_id = owner;
        }
        if let Some(at) = changes.last_contact_at {
            lead.last_contact_at = Some(at);
        }
        lead.updated_at = now;
        let updated = lead.clone();

        for event in &events {
            self.push_event(&mut state, id, event);
        }
        Ok(updated)
    }

    async fn set_status(&self, id: Uuid, status: LeadStatus) -> Result<Lead, AppError> {
        let mut state = self.state.lock().unwrap();
        let lead = Self::lead_mut(&mut state, id)?;
        lead.status = status;
        Ok(lead.clone())
    }

    async fn record_classification(
        &self,
        lead_id: Uuid,
        classification: &Classification,
        resting_status: LeadStatus,
    ) -> Result<TriageResult, AppError> {
        if self.fail_record_classification.load(Ordering::SeqCst) {
            return Err(AppError::InternalServerError(anyhow::anyhow!("falha simulada")));
        }

        let mut state = self.state.lock().unwrap();
        let now = self.stamp();
        Self::lead_mut(&mut state, lead_id)?.status = resting_status;

        let previous = state.triage.get(&lead_id).cloned();
        let c = classification.clone();
        let result = TriageResult {
            id: previous.as_ref().map(|p| p.id).unwrap_or_else(Uuid::new_v4),
            lead_id,
            resposta_ao_usuario: c.resposta_ao_usuario,
            intent: c.intent,
            lead_score: c.lead_score,
            interesse_principal: c.interesse_principal,
            nivel_urgencia: c.nivel_urgencia,
            provavel_plano: c.provavel_plano,
            indicacao_programa: c.indicacao_programa,
            precisa_humano: c.precisa_humano,
            possivel_ticket: c.possivel_ticket,
            probabilidade_fechamento: c.probabilidade_fechamento,
            observacoes: c.observacoes,
            raw_payload: c.raw_payload,
            is_fallback: c.is_fallback,
            created_at: previous.as_ref().map(|p| p.created_at).unwrap_or(now),
            updated_at: now,
        };
        state.triage.insert(lead_id, result.clone());

        self.push_event(
            &mut state,
            lead_id,
            &NewEvent::new(
                EventType::TRIAGE_COMPLETED,
                json!({ "intent": result.intent, "fallback": result.is_fallback }),
            ),
        );
        Ok(result)
    }

    async fn find_triage(&self, lead_id: Uuid) -> Result<Option<TriageResult>, AppError> {
        Ok(self.state.lock().unwrap().triage.get(&lead_id).cloned())
    }

    async fn append_event(&self, lead_id: Uuid, event: NewEvent) -> Result<TimelineEvent, AppError> {
        let mut state = self.state.lock().unwrap();
        Self::lead_mut(&mut state, lead_id)?;
        Ok(self.push_event(&mut state, lead_id, &event))
    }

    async fn query_events(
        &self,
        lead_id: Uuid,
        query: &TimelineQuery,
    ) -> Result<Vec<TimelineEvent>, AppError> {
        let state = self.state.lock().unwrap();
        let mut events: Vec<TimelineEvent> = state
            .events
            .iter()
            .filter(|e| e.lead_id == lead_id)
            .filter(|e| query.since.is_none_or(|since| e.created_at >= since))
            .filter(|e| query.types.is_empty() || query.types.contains(&e.event_type))
            .cloned()
            .collect();

        events.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        if query.order == SortOrder::Desc {
            events.reverse();
        }
        events.truncate(query.limit.unwrap_or(500).clamp(1, 5000) as usize);
        Ok(events)
    }

    async fn create_cohort(
        &self,
        lead_id: Uuid,
        drafts: &[FollowUpDraft],
    ) -> Result<CohortOutcome, AppError> {
        let mut state = self.state.lock().unwrap();
        Self::lead_mut(&mut state, lead_id)?;

        let pending: Vec<ScheduledMessage> = state
            .messages
            .iter()
            .filter(|m| m.lead_id == lead_id && m.is_pending())
            .cloned()
            .collect();
        if !pending.is_empty() {
            return Ok(CohortOutcome {
                created: false,
                messages: pending,
            });
        }

        let now = self.stamp();
        let messages: Vec<ScheduledMessage> = drafts
            .iter()
            .map(|d| ScheduledMessage {
                id: Uuid::new_v4(),
                lead_id,
                message: d.message.clone(),
                scheduled_for: d.scheduled_for,
                sent: false,
                sent_at: None,
                cancelled: false,
                cancelled_reason: None,
                attempt_count: 0,
                last_attempt_at: None,
                last_error: None,
                claimed_at: None,
                claim_token: None,
                provider_message_id: None,
                created_at: now,
            })
            .collect();
        state.messages.extend(messages.iter().cloned());

        Ok(CohortOutcome {
            created: true,
            messages,
        })
    }

    async fn cancel_pending(&self, lead_id: Uuid, reason: &CancelReason) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        Self::lead_mut(&mut state, lead_id)?;
        Ok(Self::cancel_pending_locked(&mut state, lead_id, reason.as_str()))
    }

    async fn list_follow_ups(&self, lead_id: Uuid) -> Result<Vec<ScheduledMessage>, AppError> {
        let mut messages = self.messages_for(lead_id);
        messages.sort_by(|a, b| a.scheduled_for.cmp(&b.scheduled_for));
        Ok(messages)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        policy: &ClaimPolicy,
    ) -> Result<Vec<DueFollowUp>, AppError> {
        let mut state = self.state.lock().unwrap();
        let stale_before = now - policy.lease;

        let mut due: Vec<usize> = state
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| {
                m.scheduled_for <= now
                    && m.is_pending()
                    && m.claimed_at.is_none_or(|c| c < stale_before)
                    && policy.max_attempts.is_none_or(|max| m.attempt_count < max)
            })
            .map(|(i, _)| i)
            .collect();
        due.sort_by_key(|&i| state.messages[i].scheduled_for);
        due.truncate(limit.max(0) as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for i in due {
            let lead_id = state.messages[i].lead_id;
            let phone = state
                .leads
                .iter()
                .find(|l| l.id == lead_id)
                .map(|l| l.phone.clone())
                .unwrap_or_default();

            let token = Uuid::new_v4();
            let m = &mut state.messages[i];
            m.claimed_at = Some(now);
            m.claim_token = Some(token);
            m.attempt_count += 1;
            m.last_attempt_at = Some(now);

            claimed.push(DueFollowUp {
                id: m.id,
                lead_id: m.lead_id,
                message: m.message.clone(),
                claim_token: token,
                attempt_count: m.attempt_count,
                created_at: m.created_at,
                lead_phone: phone,
            });
        }
        Ok(claimed)
    }

    async fn cancel_if_engaged(
        &self,
        message: &DueFollowUp,
        engagement_types: &[String],
        at: DateTime<Utc>,
    ) -> Result<DispatchCheck, AppError> {
        let mut state = self.state.lock().unwrap();
        let lead = Self::lead_mut(&mut state, message.lead_id)?.clone();

        match state.messages.iter().find(|m| m.id == message.id) {
            Some(m) if m.is_pending() && m.claim_token == Some(message.claim_token) => {}
            Some(m) if m.is_pending() => return Ok(DispatchCheck::ClaimLost),
            _ => return Ok(DispatchCheck::Resolved),
        }

        let reason = if lead.status.is_closed() {
            CancelReason::LeadClosed
        } else if state.events.iter().any(|e| {
            e.lead_id == message.lead_id
                && e.created_at >= message.created_at
                && engagement_types.contains(&e.event_type)
        }) {
            CancelReason::LeadResponded
        } else {
            if let Some(m) = state.messages.iter_mut().find(|m| m.id == message.id) {
                m.claimed_at = Some(at);
            }
            return Ok(DispatchCheck::Clear);
        };

        if let Some(m) = state.messages.iter_mut().find(|m| m.id == message.id) {
            m.cancelled = true;
            m.cancelled_reason = Some(reason.as_str().to_string());
            m.claimed_at = None;
            m.claim_token = None;
        }
        Ok(DispatchCheck::Cancelled(reason))
    }

    async fn complete_follow_up(
        &self,
        message: &DueFollowUp,
        sent_at: DateTime<Utc>,
        provider_message_id: &str,
    ) -> Result<Option<ScheduledMessage>, AppError> {
        let mut state = self.state.lock().unwrap();

        let updated = match state.messages.iter_mut().find(|m| m.id == message.id) {
            Some(m) if m.is_pending() && m.claim_token == Some(message.claim_token) => {
                m.sent = true;
                m.sent_at = Some(sent_at);
                m.claimed_at = None;
                m.claim_token = None;
                m.last_error = None;
                m.provider_message_id = Some(provider_message_id.to_string());
                m.clone()
            }
            _ => return Ok(None),
        };

        self.push_event(
            &mut state,
            message.lead_id,
            &NewEvent::new(
                EventType::FOLLOWUP_SENT,
                json!({
                    "scheduledMessageId": message.id,
                    "message": message.message,
                    "providerMessageId": provider_message_id,
                }),
            ),
        );
        Ok(Some(updated))
    }

    async fn release_follow_up(&self, message: &DueFollowUp, error: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        if let Some(m) = state.messages.iter_mut().find(|m| m.id == message.id) {
            if m.is_pending() && m.claim_token == Some(message.claim_token) {
                m.claimed_at = None;
                m.claim_token = None;
                m.last_error = Some(error.to_string());
            }
        }
        Ok(())
    }

    async fn follow_up_stats(
        &self,
        now: DateTime<Utc>,
        max_attempts: Option<i32>,
    ) -> Result<FollowUpStats, AppError> {
        let state = self.state.lock().unwrap();
        let pending: Vec<&ScheduledMessage> =
            state.messages.iter().filter(|m| m.is_pending()).collect();

        Ok(FollowUpStats {
            pending: pending.len() as i64,
            due: pending.iter().filter(|m| m.scheduled_for <= now).count() as i64,
            exhausted: pending
                .iter()
                .filter(|m| max_attempts.is_some_and(|max| m.attempt_count >= max))
                .count() as i64,
        })
    }

    async fn convert_to_patient(&self, lead_id: Uuid, new: NewPatient) -> Result<Patient, AppError> {
        let mut state = self.state.lock().unwrap();
        let previous = Self::lead_mut(&mut state, lead_id)?.status;

        if state.patients.iter().any(|p| p.lead_id == lead_id) {
            return Err(AppError::PatientAlreadyExists);
        }

        let patient = Patient {
            id: Uuid::new_v4(),
            lead_id,
            name: new.name,
            phone: new.phone,
            email: new.email,
            created_at: self.stamp(),
        };
        state.patients.push(patient.clone());
        Self::lead_mut(&mut state, lead_id)?.status = LeadStatus::Converted;

        self.push_event(
            &mut state,
            lead_id,
            &NewEvent::new(
                EventType::CONVERTED_TO_PATIENT,
                json!({ "patientId": patient.id, "previousStatus": previous }),
            ),
        );
        Self::cancel_pending_locked(&mut state, lead_id, CancelReason::LeadClosed.as_str());
        Ok(patient)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn clinic_settings(&self) -> Result<ClinicSettings, AppError> {
        Ok(self.state.lock().unwrap().settings.clone())
    }

    async fn update_clinic_settings(
        &self,
        input: &UpdateClinicSettingsRequest,
    ) -> Result<ClinicSettings, AppError> {
        let mut state = self.state.lock().unwrap();
        state.settings = ClinicSettings {
            system_prompt: input.system_prompt.clone(),
            knowledge_base: input.knowledge_base.clone(),
            updated_at: Some(Utc::now()),
        };
        Ok(state.settings.clone())
    }
}
