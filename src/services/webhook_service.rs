// src/services/webhook_service.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::{
    common::{error::AppError, phone::MatchBySuffix},
    db::LeadStore,
    models::{
        lead::NewLead,
        timeline::{EventType, NewEvent},
        webhook::{InboundMessage, WhatsAppEnvelope},
    },
    services::lead_service::LeadService,
};

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub verify_token: Option<String>,
    // false: lead novo só recebe o reconhecimento; true: pipeline completo
    pub classify_on_inbound: bool,
    pub phone_match: MatchBySuffix,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            verify_token: None,
            classify_on_inbound: false,
            phone_match: MatchBySuffix::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InboundOutcome {
    Created,
    Matched,
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookReceipt {
    #[schema(example = "ok")]
    pub status: String,
    pub processed: usize,
    pub created: usize,
    pub matched: usize,
}

#[derive(Clone)]
pub struct WebhookService {
    store: Arc<dyn LeadStore>,
    leads: LeadService,
    config: Arc<WebhookConfig>,
}

impl WebhookService {
    pub fn new(store: Arc<dyn LeadStore>, leads: LeadService, config: WebhookConfig) -> Self {
        Self {
            store,
            leads,
            config: Arc::new(config),
        }
    }

    /// Handshake de verificação da Meta: devolve o `hub.challenge` quando o
    /// token confere.
    pub fn verify(
        &self,
        mode: Option<&str>,
        token: Option<&str>,
        challenge: Option<&str>,
    ) -> Result<String, AppError> {
        let expected = self
            .config
            .verify_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(AppError::InvalidVerifyToken)?;

        if mode == Some("subscribe") && token == Some(expected) {
            tracing::info!("Webhook do WhatsApp verificado");
            Ok(challenge.unwrap_or_default().to_string())
        } else {
            tracing::warn!("Verificação do webhook recusada");
            Err(AppError::InvalidVerifyToken)
        }
    }

    /// Processa todas as mensagens do envelope. Erro de persistência
    /// sobe (o provedor reenvia); falhas de classificação/envio não.
    pub async fn handle_inbound(
        &self,
        envelope: &WhatsAppEnvelope,
        now: DateTime<Utc>,
    ) -> Result<WebhookReceipt, AppError> {
        let mut receipt = WebhookReceipt {
            status: "ok".to_string(),
            ..WebhookReceipt::default()
        };

        for message in envelope.inbound_messages() {
            match self.handle_message(&message, now).await? {
                InboundOutcome::Created => receipt.created += 1,
                InboundOutcome::Matched => receipt.matched += 1,
                InboundOutcome::Skipped => continue,
            }
            receipt.processed += 1;
        }

        tracing::info!(
            processed = receipt.processed,
            created = receipt.created,
            matched = receipt.matched,
            "Webhook do WhatsApp processado"
        );
        Ok(receipt)
    }

    async fn handle_message(
        &self,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Result<InboundOutcome, AppError> {
        let Some(key) = self.config.phone_match.key(&message.from_phone) else {
            tracing::warn!(
                id = %message.provider_message_id,
                "Mensagem sem telefone válido (curto demais para casar) ignorada"
            );
            return Ok(InboundOutcome::Skipped);
        };

        let candidates = self.store.find_leads_by_phone_suffix(&key).await?;
        if candidates.len() > 1 {
            tracing::warn!(
                suffix = %key,
                count = candidates.len(),
                chosen = %candidates[0].id,
                "Telefone ambíguo: mais de um lead com o mesmo sufixo, usando o mais antigo"
            );
        }

        if let Some(lead) = candidates.into_iter().next() {
            self.store
                .append_event(
                    lead.id,
                    NewEvent::new(
                        EventType::MESSAGE_RECEIVED,
                        json!({
                            "type": message.kind,
                            "text": message.text,
                            "providerMessageId": message.provider_message_id,
                        }),
                    ),
                )
                .await?;
            return Ok(InboundOutcome::Matched);
        }

        let new = NewLead {
            name: message
                .display_name
                .clone()
                .unwrap_or_else(|| message.from_phone.clone()),
            phone: message.from_phone.clone(),
            source: "whatsapp".to_string(),
            message: message.text.clone(),
        };

        if self.config.classify_on_inbound {
            self.leads.create_lead(new, now).await?;
        } else {
            let lead = self.leads.register_lead(new).await?;
            self.leads.acknowledge(&lead).await;
        }
        Ok(InboundOutcome::Created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::{
        db::memory::MemoryStore,
        models::{lead::LeadStatus, triage::Intent},
        services::{
            classifier::TriageClient,
            followup_service::{FollowUpConfig, FollowUpService},
            lead_service::ACK_MESSAGE,
        },
        testing::{t0, RecordingSender, StubBackend, TRIAGE_REPLY},
    };

    struct Fixture {
        store: Arc<MemoryStore>,
        sender: Arc<RecordingSender>,
        backend: Arc<StubBackend>,
        followups: FollowUpService,
        service: WebhookService,
    }

    fn fixture_with(classify_on_inbound: bool, backend: StubBackend) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        store.set_clock(t0());
        let sender = Arc::new(RecordingSender::new());
        let backend = Arc::new(backend);
        let followups =
            FollowUpService::new(store.clone(), sender.clone(), FollowUpConfig::default());
        let leads = LeadService::new(
            store.clone(),
            store.clone(),
            TriageClient::new(Some(backend.clone())),
            sender.clone(),
            followups.clone(),
        );
        let service = WebhookService::new(
            store.clone(),
            leads,
            WebhookConfig {
                verify_token: Some("segredo".into()),
                classify_on_inbound,
                phone_match: MatchBySuffix::default(),
            },
        );
        Fixture { store, sender, backend, followups, service }
    }

    fn envelope(from: &str, name: &str, text: &str) -> WhatsAppEnvelope {
        serde_json::from_value(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "1",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "contacts": [{ "wa_id": from, "profile": { "name": name } }],
                        "messages": [{
                            "id": format!("wamid.{from}"),
                            "from": from,
                            "type": "text",
                            "text": { "body": text }
                        }]
                    }
                }]
            }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn unknown_phone_creates_lead_and_acknowledges() {
        let f = fixture_with(false, StubBackend::replying(TRIAGE_REPLY));

        let receipt = f
            .service
            .handle_inbound(&envelope("5511999999999", "Maria", "Quero saber o preço"), t0())
            .await
            .unwrap();
        assert_eq!((receipt.processed, receipt.created), (1, 1));

        let leads = f.store.find_leads_by_phone_suffix("99999999").await.unwrap();
        assert_eq!(leads.len(), 1);
        let lead = &leads[0];
        assert_eq!(lead.status, LeadStatus::New);
        assert_eq!(lead.name, "Maria");
        assert_eq!(lead.message.as_deref(), Some("Quero saber o preço"));

        let types: Vec<String> = f.store.events_for(lead.id).into_iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::CREATED, EventType::AUTOREPLY_SENT]);
        assert_eq!(f.sender.sent(), vec![("5511999999999".to_string(), ACK_MESSAGE.to_string())]);

        // Modo padrão: sem classificação e sem follow-ups
        assert_eq!(f.backend.calls(), 0);
        assert!(f.store.messages_for(lead.id).is_empty());
    }

    #[tokio::test]
    async fn classify_on_inbound_runs_the_full_intake() {
        let f = fixture_with(true, StubBackend::replying(TRIAGE_REPLY));

        f.service
            .handle_inbound(&envelope("5511988887777", "João", "Quero agendar consulta"), t0())
            .await
            .unwrap();

        let lead = f.store.find_leads_by_phone_suffix("88887777").await.unwrap().remove(0);
        let triage = f.store.find_triage(lead.id).await.unwrap().unwrap();
        assert_eq!(triage.intent, Intent::AgendarConsulta);
        assert_eq!(lead.status, LeadStatus::New);
        assert_eq!(f.store.messages_for(lead.id).len(), 3);
        assert_eq!(f.backend.calls(), 1);
    }

    #[tokio::test]
    async fn classifier_outage_does_not_block_ingestion() {
        let f = fixture_with(true, StubBackend::failing("timeout"));

        let receipt = f
            .service
            .handle_inbound(&envelope("5511977776666", "Ana", "Oi"), t0())
            .await
            .unwrap();
        assert_eq!(receipt.created, 1);

        let lead = f.store.find_leads_by_phone_suffix("77776666").await.unwrap().remove(0);
        assert_eq!(lead.status, LeadStatus::New);
        let triage = f.store.find_triage(lead.id).await.unwrap().unwrap();
        assert!(triage.is_fallback);
        assert!(triage.precisa_humano);
    }

    #[tokio::test]
    async fn known_phone_appends_message_and_cancels_followup() {
        let f = fixture_with(true, StubBackend::replying(TRIAGE_REPLY));
        f.service
            .handle_inbound(&envelope("5511966665555", "Bia", "Quero agendar"), t0())
            .await
            .unwrap();

        // Mesmo número sem o DDI, duas horas depois
        f.store.set_clock(t0() + Duration::hours(2));
        let receipt = f
            .service
            .handle_inbound(&envelope("11966665555", "Bia", "Ainda tem horário?"), t0() + Duration::hours(2))
            .await
            .unwrap();
        assert_eq!((receipt.created, receipt.matched), (0, 1));
        assert_eq!(f.store.lead_count(), 1);

        let result = f.followups.process_due(t0() + Duration::hours(25), None).await.unwrap();
        assert_eq!(result.cancelled, 1);
        assert_eq!(result.results[0].reason.as_deref(), Some("lead_responded"));
    }

    #[tokio::test]
    async fn media_reply_counts_as_engagement() {
        let f = fixture_with(false, StubBackend::replying(TRIAGE_REPLY));
        let lead = f
            .store
            .create_lead(NewLead {
                name: "Clara".into(),
                phone: "5511955554444".into(),
                source: "site".into(),
                message: None,
            })
            .await
            .unwrap();
        f.followups.schedule_follow_ups(lead.id, t0()).await.unwrap();

        // Resposta em áudio, sem texto nenhum
        f.store.set_clock(t0() + Duration::hours(2));
        let audio: WhatsAppEnvelope = serde_json::from_value(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messages": [{
                            "id": "wamid.audio",
                            "from": "5511955554444",
                            "type": "audio",
                            "audio": { "id": "media-1", "mime_type": "audio/ogg; codecs=opus" }
                        }]
                    }
                }]
            }]
        }))
        .unwrap();

        let receipt = f.service.handle_inbound(&audio, t0() + Duration::hours(2)).await.unwrap();
        assert_eq!((receipt.processed, receipt.matched), (1, 1));

        let received = f
            .store
            .events_for(lead.id)
            .into_iter()
            .find(|e| e.event_type == EventType::MESSAGE_RECEIVED)
            .unwrap();
        assert_eq!(received.payload["type"], "audio");
        assert!(received.payload["text"].is_null());
        assert_eq!(received.payload["providerMessageId"], "wamid.audio");

        let result = f.followups.process_due(t0() + Duration::hours(25), None).await.unwrap();
        assert_eq!((result.sent, result.cancelled), (0, 1));
        assert_eq!(result.results[0].reason.as_deref(), Some("lead_responded"));
        assert!(f.sender.sent().is_empty());
    }

    #[tokio::test]
    async fn media_from_unknown_phone_creates_lead_without_message() {
        let f = fixture_with(false, StubBackend::replying(TRIAGE_REPLY));
        let image: WhatsAppEnvelope = serde_json::from_value(json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "changes": [{
                    "value": {
                        "contacts": [{ "wa_id": "5511944443333", "profile": { "name": "Davi" } }],
                        "messages": [{
                            "id": "wamid.img",
                            "from": "5511944443333",
                            "type": "image",
                            "image": { "id": "media-2" }
                        }]
                    }
                }]
            }]
        }))
        .unwrap();

        let receipt = f.service.handle_inbound(&image, t0()).await.unwrap();
        assert_eq!(receipt.created, 1);

        let lead = f.store.find_leads_by_phone_suffix("44443333").await.unwrap().remove(0);
        assert_eq!(lead.name, "Davi");
        assert_eq!(lead.message, None);
        assert_eq!(f.sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn ambiguous_suffix_picks_the_oldest_lead() {
        let f = fixture_with(false, StubBackend::replying(TRIAGE_REPLY));
        let older = f
            .store
            .create_lead(NewLead {
                name: "Primeiro".into(),
                phone: "5511912345678".into(),
                source: "site".into(),
                message: None,
            })
            .await
            .unwrap();
        f.store
            .create_lead(NewLead {
                name: "Segundo".into(),
                phone: "5521912345678".into(),
                source: "site".into(),
                message: None,
            })
            .await
            .unwrap();

        f.service
            .handle_inbound(&envelope("5531912345678", "?", "oi"), t0())
            .await
            .unwrap();

        let received: Vec<_> = f
            .store
            .events_for(older.id)
            .into_iter()
            .filter(|e| e.event_type == EventType::MESSAGE_RECEIVED)
            .collect();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].payload["text"], "oi");
    }

    #[tokio::test]
    async fn short_sender_id_never_matches_a_lead() {
        let f = fixture_with(false, StubBackend::replying(TRIAGE_REPLY));
        let lead = f
            .store
            .create_lead(NewLead {
                name: "Edu".into(),
                phone: "5511900001234".into(),
                source: "site".into(),
                message: None,
            })
            .await
            .unwrap();

        let receipt = f
            .service
            .handle_inbound(&envelope("1234", "Operadora", "Sua fatura chegou"), t0())
            .await
            .unwrap();
        assert_eq!(receipt.processed, 0);
        assert_eq!(f.store.lead_count(), 1);

        let received = f
            .store
            .events_for(lead.id)
            .into_iter()
            .filter(|e| e.event_type == EventType::MESSAGE_RECEIVED)
            .count();
        assert_eq!(received, 0);
        assert!(f.sender.sent().is_empty());
    }

    #[tokio::test]
    async fn status_only_payload_processes_nothing() {
        let f = fixture_with(false, StubBackend::replying(TRIAGE_REPLY));
        let payload: WhatsAppEnvelope = serde_json::from_value(json!({
            "object": "whatsapp_business_account",
            "entry": [{ "changes": [{ "value": { "statuses": [{ "id": "wamid.x", "status": "read" }] } }] }]
        }))
        .unwrap();

        let receipt = f.service.handle_inbound(&payload, t0()).await.unwrap();
        assert_eq!(receipt.processed, 0);
        assert_eq!(f.store.lead_count(), 0);
    }

    #[test]
    fn verification_handshake() {
        let f = fixture_with(false, StubBackend::replying(TRIAGE_REPLY));

        let challenge = f
            .service
            .verify(Some("subscribe"), Some("segredo"), Some("1158201444"))
            .unwrap();
        assert_eq!(challenge, "1158201444");

        assert!(matches!(
            f.service.verify(Some("subscribe"), Some("errado"), Some("1")),
            Err(AppError::InvalidVerifyToken)
        ));
        assert!(matches!(
            f.service.verify(None, Some("segredo"), Some("1")),
            Err(AppError::InvalidVerifyToken)
        ));
    }
}
