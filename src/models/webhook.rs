// src/models/webhook.rs

use serde::Deserialize;
use utoipa::ToSchema;

// Envelope da WhatsApp Cloud API (só o que usamos).
// Tudo com default: a Meta manda formatos diferentes para status, mídia etc.

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct WhatsAppEnvelope {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WhatsAppEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct WhatsAppEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<WhatsAppChange>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct WhatsAppChange {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: WhatsAppValue,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct WhatsAppValue {
    #[serde(default)]
    pub contacts: Vec<WhatsAppContact>,
    #[serde(default)]
    pub messages: Vec<WhatsAppMessage>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct WhatsAppContact {
    #[serde(default)]
    pub wa_id: String,
    pub profile: Option<WhatsAppProfile>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct WhatsAppProfile {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct WhatsAppMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub text: Option<WhatsAppText>,
    pub button: Option<WhatsAppButton>,
    pub interactive: Option<WhatsAppInteractive>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct WhatsAppText {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct WhatsAppButton {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct WhatsAppInteractive {
    pub button_reply: Option<WhatsAppReply>,
    pub list_reply: Option<WhatsAppReply>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct WhatsAppReply {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
}

/// Mensagem de entrada já normalizada. `text` é `None` para mídia,
/// localização, figurinha etc.: o tipo vem em `kind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub from_phone: String,
    pub kind: String,
    pub text: Option<String>,
    pub display_name: Option<String>,
    pub provider_message_id: String,
}

impl WhatsAppMessage {
    /// Texto útil da mensagem. Mídia, localização etc. não têm texto.
    pub fn text_content(&self) -> Option<String> {
        let text = match self.kind.as_str() {
            "text" => self.text.as_ref().map(|t| t.body.clone()),
            "button" => self.button.as_ref().map(|b| b.text.clone()),
            "interactive" => self.interactive.as_ref().and_then(|i| {
                i.button_reply
                    .as_ref()
                    .or(i.list_reply.as_ref())
                    .map(|r| r.title.clone())
            }),
            _ => None,
        }?;

        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

impl WhatsAppEnvelope {
    /// Achata entry/changes/messages em uma lista de mensagens, de qualquer tipo.
    /// Um único webhook pode trazer várias mensagens.
    pub fn inbound_messages(&self) -> Vec<InboundMessage> {
        let mut out = Vec::new();

        for entry in &self.entry {
            for change in &entry.changes {
                let value = &change.value;
                for msg in &value.messages {
                    if msg.from.trim().is_empty() {
                        tracing::debug!("Mensagem {} sem remetente ignorada", msg.id);
                        continue;
                    }

                    let display_name = value
                        .contacts
                        .iter()
                        .find(|c| c.wa_id == msg.from)
                        .or(value.contacts.first())
                        .and_then(|c| c.profile.as_ref())
                        .map(|p| p.name.trim().to_string())
                        .filter(|n| !n.is_empty());

                    out.push(InboundMessage {
                        from_phone: msg.from.clone(),
                        kind: msg.kind.clone(),
                        text: msg.text_content(),
                        display_name,
                        provider_message_id: msg.id.clone(),
                    });
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_multiple_messages_including_media() {
        let payload = json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "123",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "contacts": [
                            { "wa_id": "5511999999999", "profile": { "name": "Maria" } },
                            { "wa_id": "5521988887777", "profile": { "name": "João" } }
                        ],
                        "messages": [
                            { "id": "wamid.1", "from": "5511999999999", "type": "text", "text": { "body": "Quero saber o preço" } },
                            { "id": "wamid.2", "from": "5521988887777", "type": "image", "image": { "id": "x" } },
                            { "id": "wamid.3", "from": "5521988887777", "type": "interactive",
                              "interactive": { "type": "button_reply", "button_reply": { "id": "b1", "title": "Agendar" } } }
                        ]
                    }
                }]
            }]
        });

        let envelope: WhatsAppEnvelope = serde_json::from_value(payload).unwrap();
        let messages = envelope.inbound_messages();

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].from_phone, "5511999999999");
        assert_eq!(messages[0].kind, "text");
        assert_eq!(messages[0].text.as_deref(), Some("Quero saber o preço"));
        assert_eq!(messages[0].display_name.as_deref(), Some("Maria"));

        // Mídia entra sem texto
        assert_eq!(messages[1].kind, "image");
        assert_eq!(messages[1].text, None);
        assert_eq!(messages[1].provider_message_id, "wamid.2");

        assert_eq!(messages[2].text.as_deref(), Some("Agendar"));
        assert_eq!(messages[2].display_name.as_deref(), Some("João"));
    }

    #[test]
    fn status_only_payload_has_no_messages() {
        let payload = json!({
            "object": "whatsapp_business_account",
            "entry": [{ "changes": [{ "field": "messages", "value": { "statuses": [{ "id": "wamid.9" }] } }] }]
        });

        let envelope: WhatsAppEnvelope = serde_json::from_value(payload).unwrap();
        assert!(envelope.inbound_messages().is_empty());
    }
}
