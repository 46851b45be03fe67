// src/testing.rs
//
// Dublês dos colaboradores externos (classificador e WhatsApp).

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::services::{
    classifier::{ClassifierError, CompletionBackend},
    messenger::{MessageSender, SendError},
};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

pub const TRIAGE_REPLY: &str = r#"{
    "resposta_ao_usuario": "Olá! Podemos agendar sua consulta para amanhã.",
    "intent": "AGENDAR_CONSULTA",
    "lead_score": "alto",
    "interesse_principal": "Emagrecimento",
    "nivel_urgencia": "alta",
    "provavel_plano": "Trimestral",
    "indicacao_programa": "Nutri 90",
    "precisa_humano": false
}"#;

/// Responde na ordem dada; depois da última resposta, repete a última.
pub struct StubBackend {
    replies: Vec<Result<String, String>>,
    calls: AtomicUsize,
    last_system: Mutex<Option<String>>,
}

impl StubBackend {
    pub fn replying(reply: &str) -> Self {
        Self::sequence(&[Ok(reply)])
    }

    pub fn failing(reason: &str) -> Self {
        Self::sequence(&[Err(reason)])
    }

    pub fn sequence(replies: &[Result<&str, &str>]) -> Self {
        assert!(!replies.is_empty());
        Self {
            replies: replies
                .iter()
                .copied()
                .map(|r| r.map(String::from).map_err(String::from))
                .collect(),
            calls: AtomicUsize::new(0),
            last_system: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_system(&self) -> Option<String> {
        self.last_system.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for StubBackend {
    async fn complete(&self, system: &str, _text: &str) -> Result<String, ClassifierError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_system.lock().unwrap() = Some(system.to_string());
        self.replies[call.min(self.replies.len() - 1)]
            .clone()
            .map_err(ClassifierError::Request)
    }
}

/// Guarda tudo que "enviou". Pode ser virado para falhar no meio do teste.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
    failing: AtomicBool,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, phone: &str, text: &str) -> Result<String, SendError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SendError::Provider {
                status: 503,
                body: "indisponível".into(),
            });
        }

        let mut sent = self.sent.lock().unwrap();
        sent.push((phone.to_string(), text.to_string()));
        Ok(format!("wamid.{}", sent.len()))
    }
}
