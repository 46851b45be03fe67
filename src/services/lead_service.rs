// src/services/lead_service.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::{
    common::{error::AppError, phone::normalize_phone},
    db::{LeadStore, SettingsStore},
    models::{
        followup::CancelReason,
        lead::{
            Lead, LeadChanges, LeadDetail, LeadFilter, LeadStatus, NewLead, NewPatient, Patient,
            SentMessage,
        },
        timeline::{EventType, NewEvent, TimelineEvent, TimelineQuery},
        triage::{Classification, TriageResult},
    },
    services::{
        classifier::TriageClient, followup_service::FollowUpService, messenger::MessageSender,
    },
};

/// Resposta automática quando não há sugestão do classificador.
pub const ACK_MESSAGE: &str =
    "Olá! Recebemos sua mensagem. Em breve alguém da nossa equipe vai falar com você.";

/// Passo transitório TRIAGING.
///
/// `begin` coloca o lead em TRIAGING; `commit` grava a classificação e leva o
/// lead ao status de repouso. Se o commit falhar, o status volta ao repouso
/// (melhor esforço) e o erro sobe.
struct TriageTransition<'a> {
    store: &'a dyn LeadStore,
    lead: Lead,
    resting: LeadStatus,
}

impl<'a> TriageTransition<'a> {
    async fn begin(
        store: &'a dyn LeadStore,
        lead_id: Uuid,
        resting: LeadStatus,
    ) -> Result<TriageTransition<'a>, AppError> {
        let lead = store.set_status(lead_id, LeadStatus::Triaging).await?;
        Ok(Self { store, lead, resting })
    }

    async fn commit(self, classification: &Classification) -> Result<TriageResult, AppError> {
        match self
            .store
            .record_classification(self.lead.id, classification, self.resting)
            .await
        {
            Ok(result) => Ok(result),
            Err(e) => {
                if let Err(reset) = self.store.set_status(self.lead.id, self.resting).await {
                    tracing::error!(lead_id = %self.lead.id, "Falha ao sair de TRIAGING: {}", reset);
                }
                Err(e)
            }
        }
    }
}

#[derive(Clone)]
pub struct LeadService {
    store: Arc<dyn LeadStore>,
    settings: Arc<dyn SettingsStore>,
    classifier: TriageClient,
    sender: Arc<dyn MessageSender>,
    followups: FollowUpService,
}

impl LeadService {
    pub fn new(
        store: Arc<dyn LeadStore>,
        settings: Arc<dyn SettingsStore>,
        classifier: TriageClient,
        sender: Arc<dyn MessageSender>,
        followups: FollowUpService,
    ) -> Self {
        Self {
            store,
            settings,
            classifier,
            sender,
            followups,
        }
    }

    // =========================================================================
    //  ENTRADA DE LEADS
    // =========================================================================

    /// Pipeline completo: cria, classifica, responde e agenda follow-ups.
    /// Só a criação é obrigatória; o resto falha sem desfazer o lead.
    pub async fn create_lead(&self, new: NewLead, now: DateTime<Utc>) -> Result<LeadDetail, AppError> {
        let new = normalize_new_lead(new)?;

        let lead = self.store.create_lead(new).await?;
        tracing::info!(lead_id = %lead.id, source = %lead.source, "Lead criado");

        let triage = match self.run_triage(lead.id, None, LeadStatus::New).await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(lead_id = %lead.id, "Triagem do novo lead falhou: {}", e);
                None
            }
        };

        let reply = triage
            .as_ref()
            .filter(|t| !t.is_fallback && !t.resposta_ao_usuario.trim().is_empty())
            .map(|t| t.resposta_ao_usuario.clone())
            .unwrap_or_else(|| ACK_MESSAGE.to_string());
        self.auto_reply(&lead, &reply).await;

        if let Err(e) = self.followups.schedule_follow_ups(lead.id, now).await {
            tracing::warn!(lead_id = %lead.id, "Falha ao agendar follow-ups: {}", e);
        }

        self.get_lead(lead.id).await
    }

    /// Cria o lead sem triagem (entrada pelo webhook no modo padrão).
    pub async fn register_lead(&self, new: NewLead) -> Result<Lead, AppError> {
        let new = normalize_new_lead(new)?;
        let lead = self.store.create_lead(new).await?;
        tracing::info!(lead_id = %lead.id, source = %lead.source, "Lead criado sem triagem");
        Ok(lead)
    }

    /// Envia o reconhecimento fixo e registra AUTOREPLY_SENT.
    pub async fn acknowledge(&self, lead: &Lead) -> bool {
        self.auto_reply(lead, ACK_MESSAGE).await
    }

    async fn auto_reply(&self, lead: &Lead, text: &str) -> bool {
        let provider_id = match self.sender.send(&lead.phone, text).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(lead_id = %lead.id, "Resposta automática não enviada: {}", e);
                return false;
            }
        };

        let event = NewEvent::new(
            EventType::AUTOREPLY_SENT,
            json!({ "message": text, "providerMessageId": provider_id }),
        );
        match self.store.append_event(lead.id, event).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(lead_id = %lead.id, "Falha ao registrar AUTOREPLY_SENT: {}", e);
                false
            }
        }
    }

    // =========================================================================
    //  CONSULTAS
    // =========================================================================

    pub async fn get_lead(&self, id: Uuid) -> Result<LeadDetail, AppError> {
        let lead = self.find(id).await?;
        let triage = self.store.find_triage(id).await?;
        Ok(LeadDetail { lead, triage })
    }

    pub async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, AppError> {
        self.store.list_leads(filter).await
    }

    pub async fn timeline(
        &self,
        id: Uuid,
        query: &TimelineQuery,
    ) -> Result<Vec<TimelineEvent>, AppError> {
        self.find(id).await?;
        self.store.query_events(id, query).await
    }

    async fn find(&self, id: Uuid) -> Result<Lead, AppError> {
        self.store.find_lead(id).await?.ok_or(AppError::LeadNotFound)
    }

    // =========================================================================
    //  TRANSIÇÕES
    // =========================================================================

    /// (Re)classifica o lead. Sem `text`, usa a mensagem guardada no lead.
    /// A configuração da clínica é lida a cada chamada.
    pub async fn run_triage(
        &self,
        id: Uuid,
        text: Option<String>,
        resting: LeadStatus,
    ) -> Result<TriageResult, AppError> {
        let transition = TriageTransition::begin(self.store.as_ref(), id, resting).await?;

        let text = text
            .or_else(|| transition.lead.message.clone())
            .unwrap_or_default();

        let classification = match self.settings.clinic_settings().await {
            Ok(settings) => self.classifier.classify(&text, &settings).await,
            Err(e) => {
                tracing::warn!(lead_id = %id, "Configuração da clínica indisponível: {}", e);
                Classification::fallback("configuração da clínica indisponível")
            }
        };

        let result = transition.commit(&classification).await?;
        tracing::info!(
            lead_id = %id,
            intent = result.intent.as_str(),
            score = result.lead_score.as_str(),
            urgency = result.nivel_urgencia.as_str(),
            fallback = result.is_fallback,
            "Triagem concluída"
        );
        Ok(result)
    }

    /// PATCH do lead. Mudanças de status e responsável viram eventos na mesma
    /// transação; fechar o lead cancela os follow-ups pendentes.
    pub async fn update_lead(&self, id: Uuid, changes: LeadChanges) -> Result<Lead, AppError> {
        let current = self.find(id).await?;
        if changes.is_empty() {
            return Ok(current);
        }

        let mut events = Vec::new();
        if let Some(status) = changes.status.filter(|s| *s != current.status) {
            events.push(NewEvent::new(
                EventType::STATUS_CHANGED,
                json!({ "from": current.status, "to": status }),
            ));
        }
        if let Some(owner) = changes.assigned_owner_id.filter(|o| *o != current.assigned_owner_id) {
            events.push(NewEvent::new(
                EventType::OWNER_CHANGED,
                json!({ "from": current.assigned_owner_id, "to": owner }),
            ));
        }

        let lead = self.store.update_lead(id, changes, events).await?;
        if lead.status != current.status {
            tracing::info!(
                lead_id = %id,
                from = current.status.as_str(),
                to = lead.status.as_str(),
                "Status do lead alterado"
            );
        }

        if lead.status.is_closed() && !current.status.is_closed() {
            self.followups
                .cancel_follow_ups(id, CancelReason::LeadClosed)
                .await?;
        }
        Ok(lead)
    }

    /// Registra um contato feito pela equipe (ligação, visita...).
    pub async fn log_contact(
        &self,
        id: Uuid,
        channel: Option<String>,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Lead, AppError> {
        let current = self.find(id).await?;

        let mut changes = LeadChanges {
            last_contact_at: Some(now),
            ..LeadChanges::default()
        };
        let mut events = vec![NewEvent::new(
            EventType::CONTACT_LOGGED,
            json!({ "channel": channel, "note": note }),
        )];

        if matches!(current.status, LeadStatus::New | LeadStatus::Triaging) {
            changes.status = Some(LeadStatus::Contacted);
            events.push(NewEvent::new(
                EventType::STATUS_CHANGED,
                json!({ "from": current.status, "to": LeadStatus::Contacted }),
            ));
        }

        self.store.update_lead(id, changes, events).await
    }

    /// Mensagem manual do atendente. Falha no provedor vira 502.
    pub async fn send_message(
        &self,
        id: Uuid,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<SentMessage, AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::InvalidPayload("message".into()));
        }

        let lead = self.find(id).await?;
        let provider_message_id = self
            .sender
            .send(&lead.phone, text)
            .await
            .map_err(|e| AppError::SendFailed(e.to_string()))?;

        let changes = LeadChanges {
            last_contact_at: Some(now),
            ..LeadChanges::default()
        };
        let event = NewEvent::new(
            EventType::MESSAGE_SENT,
            json!({ "message": text, "providerMessageId": provider_message_id }),
        );
        self.store.update_lead(id, changes, vec![event]).await?;

        Ok(SentMessage {
            lead_id: id,
            provider_message_id,
            sent_at: now,
        })
    }

    pub async fn convert_to_patient(
        &self,
        id: Uuid,
        email: Option<String>,
    ) -> Result<Patient, AppError> {
        let lead = self.find(id).await?;

        let patient = self
            .store
            .convert_to_patient(
                id,
                NewPatient {
                    name: lead.name,
                    phone: lead.phone,
                    email: email.filter(|e| !e.trim().is_empty()),
                },
            )
            .await?;

        tracing::info!(lead_id = %id, patient_id = %patient.id, "Lead convertido em paciente");
        Ok(patient)
    }
}

fn normalize_new_lead(new: NewLead) -> Result<NewLead, AppError> {
    let phone = normalize_phone(&new.phone);
    if phone.is_empty() {
        return Err(AppError::InvalidPayload("phone".into()));
    }

    let name = new.name.trim();
    Ok(NewLead {
        name: if name.is_empty() { phone.clone() } else { name.to_string() },
        phone,
        source: new.source.trim().to_lowercase(),
        message: new.message.map(|m| m.trim().to_string()).filter(|m| !m.is_empty()),
    })
}
