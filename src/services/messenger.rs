// src/services/messenger.rs

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::common::phone::normalize_phone;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("envio de WhatsApp não configurado")]
    NotConfigured,

    #[error("telefone inválido: {0}")]
    InvalidPhone(String),

    #[error("falha na requisição: {0}")]
    Request(String),

    #[error("WhatsApp respondeu {status}: {body}")]
    Provider { status: u16, body: String },
}

/// Transporte de saída: (telefone, texto) -> id da mensagem no provedor.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, phone: &str, text: &str) -> Result<String, SendError>;
}

#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub api_url: String,
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    // Limite por requisição. Precisa ficar abaixo do lease dos follow-ups
    pub timeout: Duration,
}

/// Envio pela WhatsApp Cloud API (Graph).
pub struct WhatsAppSender {
    client: reqwest::Client,
    config: WhatsAppConfig,
}

impl WhatsAppSender {
    pub fn new(config: WhatsAppConfig) -> Result<Self, SendError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SendError::Request(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn credentials(&self) -> Result<(&str, &str), SendError> {
        match (&self.config.access_token, &self.config.phone_number_id) {
            (Some(token), Some(number_id)) if !token.is_empty() && !number_id.is_empty() => {
                Ok((token, number_id))
            }
            _ => Err(SendError::NotConfigured),
        }
    }
}

pub fn text_message_body(to: &str, text: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "text",
        "text": { "preview_url": false, "body": text }
    })
}

#[async_trait]
impl MessageSender for WhatsAppSender {
    async fn send(&self, phone: &str, text: &str) -> Result<String, SendError> {
        let (token, number_id) = self.credentials()?;

        let to = normalize_phone(phone);
        if to.is_empty() {
            return Err(SendError::InvalidPhone(phone.to_string()));
        }

        let url = format!("{}/{}/messages", self.config.api_url.trim_end_matches('/'), number_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&text_message_body(&to, text))
            .send()
            .await
            .map_err(|e| SendError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Provider { status, body });
        }

        let result: Value = response
            .json()
            .await
            .map_err(|e| SendError::Request(format!("resposta inválida: {e}")))?;

        let message_id = result["messages"][0]["id"]
            .as_str()
            .unwrap_or("unknown")
            .to_string();

        tracing::debug!("WhatsApp enviado: {} -> {}", message_id, to);
        Ok(message_id)
    }
}
