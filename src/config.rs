// src/config.rs

use std::{env, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    common::{i18n::I18nStore, phone::MatchBySuffix},
    db::{LeadStore, PgStore, SettingsStore},
    models::{followup::ClaimPolicy, followup::FollowUpPlan, timeline::default_engagement_types},
    services::{
        classifier::{ClassifierConfig, CompletionBackend, OpenAiBackend, TriageClient},
        followup_service::{FollowUpConfig, FollowUpService},
        lead_service::LeadService,
        messenger::{MessageSender, WhatsAppConfig, WhatsAppSender},
        webhook_service::{WebhookConfig, WebhookService},
    },
};

/// Configuração lida do ambiente (.env em desenvolvimento).
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub server_addr: String,
    pub db_max_connections: u32,

    pub classifier: Option<ClassifierConfig>,
    pub whatsapp: WhatsAppConfig,
    pub webhook: WebhookConfig,
    pub followups: FollowUpConfig,

    pub cron_secret: Option<String>,
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw.parse().with_context(|| format!("{key} inválida: {raw}")),
        None => Ok(default),
    }
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = var("DATABASE_URL").context("DATABASE_URL deve ser definida")?;

        // Classificador só existe com URL e chave
        let classifier = match (var("CLASSIFIER_API_URL"), var("CLASSIFIER_API_KEY")) {
            (Some(api_url), Some(api_key)) => Some(ClassifierConfig {
                api_url,
                api_key,
                model: var("CLASSIFIER_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
                timeout: Duration::from_secs(parse_var("CLASSIFIER_TIMEOUT_SECS", 20)?),
            }),
            _ => None,
        };

        let whatsapp = WhatsAppConfig {
            api_url: var("WHATSAPP_API_URL")
                .unwrap_or_else(|| "https://graph.facebook.com/v21.0".to_string()),
            access_token: var("WHATSAPP_ACCESS_TOKEN"),
            phone_number_id: var("WHATSAPP_PHONE_NUMBER_ID"),
            timeout: Duration::from_secs(parse_var("WHATSAPP_TIMEOUT_SECS", 15)?),
        };

        let webhook = WebhookConfig {
            verify_token: var("WHATSAPP_VERIFY_TOKEN"),
            classify_on_inbound: parse_var("CLASSIFY_ON_INBOUND", false)?,
            phone_match: MatchBySuffix::new(parse_var("PHONE_MATCH_SUFFIX_LEN", 8)?),
        };

        let max_attempts: Option<i32> = match var("FOLLOWUP_MAX_ATTEMPTS") {
            Some(raw) => Some(
                raw.parse()
                    .with_context(|| format!("FOLLOWUP_MAX_ATTEMPTS inválida: {raw}"))?,
            ),
            None => None,
        };

        let engagement_types = match var("FOLLOWUP_ENGAGEMENT_EVENTS") {
            Some(raw) => raw
                .split(',')
                .map(|t| t.trim().to_uppercase())
                .filter(|t| !t.is_empty())
                .collect(),
            None => default_engagement_types(),
        };

        let followups = FollowUpConfig {
            plan: FollowUpPlan::default(),
            batch_limit: parse_var("FOLLOWUP_BATCH_LIMIT", 50)?,
            policy: ClaimPolicy {
                lease: chrono::Duration::seconds(parse_var("FOLLOWUP_CLAIM_LEASE_SECS", 300)?),
                max_attempts,
            },
            engagement_types,
        };

        let settings = Self {
            database_url,
            server_addr: var("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 5)?,
            classifier,
            whatsapp,
            webhook,
            followups,
            cron_secret: var("CRON_SECRET"),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Um envio travado não pode durar mais que a reserva da mensagem.
    pub fn validate(&self) -> anyhow::Result<()> {
        let lease = self
            .followups
            .policy
            .lease
            .to_std()
            .context("FOLLOWUP_CLAIM_LEASE_SECS deve ser positivo")?;

        if self.whatsapp.timeout.is_zero() || self.whatsapp.timeout >= lease {
            anyhow::bail!(
                "WHATSAPP_TIMEOUT_SECS ({}s) deve ser maior que zero e menor que FOLLOWUP_CLAIM_LEASE_SECS ({}s)",
                self.whatsapp.timeout.as_secs(),
                lease.as_secs()
            );
        }
        Ok(())
    }
}

pub async fn connect_pool(settings: &Settings) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.db_max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&settings.database_url)
        .await
        .context("Falha ao conectar ao banco de dados")?;

    tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");
    Ok(pool)
}

/// Estado compartilhado por todos os handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub i18n_store: Arc<I18nStore>,
    pub lead_service: LeadService,
    pub followup_service: FollowUpService,
    pub webhook_service: WebhookService,
    pub settings_store: Arc<dyn SettingsStore>,
}

impl AppState {
    /// Monta o grafo de dependências de produção (Postgres + HTTP).
    pub fn new(settings: Settings, pool: PgPool) -> anyhow::Result<Self> {
        let store = Arc::new(PgStore::new(pool));

        let classifier = match settings.classifier.clone() {
            Some(config) => {
                tracing::info!(model = %config.model, "Classificador configurado");
                let backend: Arc<dyn CompletionBackend> = Arc::new(OpenAiBackend::new(config)?);
                TriageClient::new(Some(backend))
            }
            None => {
                tracing::warn!("Classificador não configurado: toda triagem usará o fallback");
                TriageClient::disabled()
            }
        };

        let sender: Arc<dyn MessageSender> = Arc::new(WhatsAppSender::new(settings.whatsapp.clone())?);

        Ok(Self::with_components(settings, store.clone(), store, classifier, sender))
    }

    pub fn with_components(
        settings: Settings,
        store: Arc<dyn LeadStore>,
        settings_store: Arc<dyn SettingsStore>,
        classifier: TriageClient,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        let followup_service =
            FollowUpService::new(store.clone(), sender.clone(), settings.followups.clone());
        let lead_service = LeadService::new(
            store.clone(),
            settings_store.clone(),
            classifier,
            sender,
            followup_service.clone(),
        );
        let webhook_service =
            WebhookService::new(store, lead_service.clone(), settings.webhook.clone());

        Self {
            settings: Arc::new(settings),
            i18n_store: Arc::new(I18nStore::new()),
            lead_service,
            followup_service,
            webhook_service,
            settings_store,
        }
    }
}

#[cfg(test)]
impl Settings {
    pub fn for_tests() -> Self {
        Self {
            database_url: String::new(),
            server_addr: "127.0.0.1:0".to_string(),
            db_max_connections: 1,
            classifier: None,
            whatsapp: WhatsAppConfig {
                api_url: String::new(),
                access_token: None,
                phone_number_id: None,
                timeout: Duration::from_secs(15),
            },
            webhook: WebhookConfig {
                verify_token: Some("segredo".to_string()),
                ..WebhookConfig::default()
            },
            followups: FollowUpConfig::default(),
            cron_secret: None,
        }
    }
}
