// src/services/classifier.rs

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{
    settings::ClinicSettings,
    triage::{fold_label, Classification, Intent, LeadScore, UrgencyLevel},
};

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classificador não configurado")]
    NotConfigured,

    #[error("mensagem vazia")]
    EmptyText,

    #[error("falha na requisição: {0}")]
    Request(String),

    #[error("classificador respondeu {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("resposta sem conteúdo")]
    EmptyResponse,

    #[error("JSON inválido: {0}")]
    Malformed(String),

    #[error("campo inválido: {0}")]
    Schema(String),
}

/// Backend de completion: recebe o prompt de sistema e o texto do lead e
/// devolve a resposta crua do modelo.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, system: &str, text: &str) -> Result<String, ClassifierError>;
}

// --- BACKEND HTTP (API compatível com OpenAI) ---

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

pub struct OpenAiBackend {
    client: reqwest::Client,
    config: ClassifierConfig,
}

impl OpenAiBackend {
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClassifierError::Request(e.to_string()))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, system: &str, text: &str) -> Result<String, ClassifierError> {
        let url = format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'));
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: text },
            ],
            temperature: 0.2,
        };

        tracing::debug!("classificador: POST {} model={}", url, self.config.model);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifierError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ClassifierError::Upstream { status, body });
        }

        let parsed: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| ClassifierError::Malformed(e.to_string()))?;

        parsed
            .choices
            .and_then(|choices| choices.into_iter().next())
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ClassifierError::EmptyResponse)
    }
}

// --- PROMPT ---

const SCHEMA_INSTRUCTIONS: &str = r#"Responda SOMENTE com um objeto JSON, sem texto antes ou depois, com exatamente estes campos:
{
  "resposta_ao_usuario": "texto curto para enviar ao lead",
  "intent": "AGENDAR_CONSULTA | MAIS_INFORMACOES | NAO_INTERESSADO | NAO_ENTENDIDO",
  "lead_score": "baixo | medio | alto",
  "interesse_principal": "texto",
  "nivel_urgencia": "baixa | moderada | alta",
  "provavel_plano": "texto",
  "indicacao_programa": "texto",
  "precisa_humano": true,
  "possivel_ticket": "texto ou null",
  "probabilidade_fechamento": "texto ou null",
  "observacoes": "texto ou null"
}"#;

/// Prompt de sistema: instruções da clínica + base de conhecimento + formato.
pub fn build_system_prompt(settings: &ClinicSettings) -> String {
    let mut prompt = String::new();

    if settings.is_configured() {
        prompt.push_str(settings.system_prompt.trim());
    } else {
        prompt.push_str("Você é a assistente virtual de uma clínica. Classifique a mensagem do lead.");
    }

    if !settings.knowledge_base.trim().is_empty() {
        prompt.push_str("\n\n### Base de conhecimento da clínica\n");
        prompt.push_str(settings.knowledge_base.trim());
    }

    prompt.push_str("\n\n### Formato da resposta\n");
    prompt.push_str(SCHEMA_INSTRUCTIONS);
    prompt
}

// --- PARSE (tolerante na forma, estrito no conteúdo) ---

/// Recorta o JSON da resposta: tira cercas de markdown e qualquer texto
/// fora do `{...}` mais externo.
pub fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

#[derive(Deserialize)]
struct WireClassification {
    resposta_ao_usuario: String,
    intent: String,
    lead_score: String,
    #[serde(default)]
    interesse_principal: String,
    nivel_urgencia: String,
    #[serde(default)]
    provavel_plano: String,
    #[serde(default)]
    indicacao_programa: String,
    precisa_humano: Value,
    #[serde(default)]
    possivel_ticket: Value,
    #[serde(default)]
    probabilidade_fechamento: Value,
    #[serde(default)]
    observacoes: Value,
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match fold_label(s).as_str() {
            "true" | "sim" | "yes" => Some(true),
            "false" | "nao" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn optional_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub fn parse_classification(raw: &str) -> Result<Classification, ClassifierError> {
    let json = extract_json(raw)
        .ok_or_else(|| ClassifierError::Malformed("nenhum objeto JSON na resposta".into()))?;

    let payload: Value =
        serde_json::from_str(json).map_err(|e| ClassifierError::Malformed(e.to_string()))?;
    let wire: WireClassification = serde_json::from_value(payload.clone())
        .map_err(|e| ClassifierError::Schema(e.to_string()))?;

    let intent = Intent::parse_loose(&wire.intent)
        .ok_or_else(|| ClassifierError::Schema(format!("intent = {}", wire.intent)))?;
    let lead_score = LeadScore::parse_loose(&wire.lead_score)
        .ok_or_else(|| ClassifierError::Schema(format!("lead_score = {}", wire.lead_score)))?;
    let nivel_urgencia = UrgencyLevel::parse_loose(&wire.nivel_urgencia).ok_or_else(|| {
        ClassifierError::Schema(format!("nivel_urgencia = {}", wire.nivel_urgencia))
    })?;
    let precisa_humano = parse_bool(&wire.precisa_humano)
        .ok_or_else(|| ClassifierError::Schema(format!("precisa_humano = {}", wire.precisa_humano)))?;

    Ok(Classification {
        resposta_ao_usuario: wire.resposta_ao_usuario.trim().to_string(),
        intent,
        lead_score,
        interesse_principal: wire.interesse_principal,
        nivel_urgencia,
        provavel_plano: wire.provavel_plano,
        indicacao_programa: wire.indicacao_programa,
        precisa_humano,
        possivel_ticket: optional_text(&wire.possivel_ticket),
        probabilidade_fechamento: optional_text(&wire.probabilidade_fechamento),
        observacoes: optional_text(&wire.observacoes),
        raw_payload: Some(payload),
        is_fallback: false,
    })
}

// --- CLIENTE DE TRIAGEM ---

/// Cliente usado pelo resto do sistema. Nunca falha: qualquer problema vira
/// a classificação de fallback.
#[derive(Clone)]
pub struct TriageClient {
    backend: Option<Arc<dyn CompletionBackend>>,
}

impl TriageClient {
    pub fn new(backend: Option<Arc<dyn CompletionBackend>>) -> Self {
        Self { backend }
    }

    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub async fn classify(&self, text: &str, settings: &ClinicSettings) -> Classification {
        match self.try_classify(text, settings).await {
            Ok(classification) => classification,
            Err(e) => {
                tracing::warn!("Triagem automática falhou, usando fallback: {}", e);
                Classification::fallback(&e.to_string())
            }
        }
    }

    async fn try_classify(
        &self,
        text: &str,
        settings: &ClinicSettings,
    ) -> Result<Classification, ClassifierError> {
        let backend = self.backend.as_ref().ok_or(ClassifierError::NotConfigured)?;
        if text.trim().is_empty() {
            return Err(ClassifierError::EmptyText);
        }

        let system = build_system_prompt(settings);
        let raw = backend.complete(&system, text.trim()).await?;
        parse_classification(&raw)
    }
}
