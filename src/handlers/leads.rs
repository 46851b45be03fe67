// src/handlers/leads.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
    models::{
        lead::{Lead, LeadChanges, LeadDetail, LeadFilter, LeadStatus, NewLead, Patient, SentMessage},
        timeline::{SortOrder, TimelineEvent, TimelineQuery},
        triage::TriageResult,
    },
};

// =============================================================================
//  PAYLOADS
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeadPayload {
    #[serde(default)]
    #[schema(example = "Maria Souza")]
    pub name: String,

    #[validate(length(min = 8, max = 20, message = "O telefone deve ter entre 8 e 20 caracteres"))]
    #[schema(example = "+55 11 99999-9999")]
    pub phone: String,

    #[validate(length(min = 1, max = 50, message = "required"))]
    #[schema(example = "instagram")]
    pub source: String,

    #[schema(example = "Quero saber o valor da consulta")]
    pub message: Option<String>,
}

// Distingue "campo ausente" de "null" (null remove o responsável)
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLeadPayload {
    #[validate(length(min = 1, message = "required"))]
    pub name: Option<String>,
    pub message: Option<String>,
    pub status: Option<LeadStatus>,

    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub assigned_owner_id: Option<Option<Uuid>>,
}

impl From<UpdateLeadPayload> for LeadChanges {
    fn from(payload: UpdateLeadPayload) -> Self {
        LeadChanges {
            name: payload.name,
            message: payload.message,
            status: payload.status,
            assigned_owner_id: payload.assigned_owner_id,
            last_contact_at: None,
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriagePayload {
    // Sem texto, usa a mensagem guardada no lead
    pub text: Option<String>,
    pub resting_status: Option<LeadStatus>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct TimelineParams {
    pub since: Option<DateTime<Utc>>,
    /// Lista separada por vírgula (ex: MESSAGE_RECEIVED,TRIAGE_COMPLETED)
    pub types: Option<String>,
    pub order: Option<SortOrder>,
    pub limit: Option<i64>,
}

impl From<TimelineParams> for TimelineQuery {
    fn from(params: TimelineParams) -> Self {
        TimelineQuery {
            since: params.since,
            types: params
                .types
                .map(|raw| {
                    raw.split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            order: params.order.unwrap_or_default(),
            limit: params.limit,
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactPayload {
    #[schema(example = "telefone")]
    pub channel: Option<String>,
    #[schema(example = "Pediu retorno na sexta")]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    #[validate(length(min = 1, max = 4096, message = "required"))]
    #[schema(example = "Olá Maria, conseguimos um horário amanhã às 10h.")]
    pub message: String,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConvertPayload {
    #[validate(email(message = "E-mail inválido"))]
    pub email: Option<String>,
}

// =============================================================================
//  HANDLERS
// =============================================================================

// POST /api/leads
#[utoipa::path(
    post,
    path = "/api/leads",
    tag = "Leads",
    request_body = CreateLeadPayload,
    responses(
        (status = 201, description = "Lead criado, triado e com follow-ups agendados", body = LeadDetail),
        (status = 400, description = "Dados inválidos")
    )
)]
pub async fn create_lead(
    State(app_state): State<AppState>,
    locale: Locale,
    Json(payload): Json<CreateLeadPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let new = NewLead {
        name: payload.name,
        phone: payload.phone,
        source: payload.source,
        message: payload.message,
    };

    let detail = app_state
        .lead_service
        .create_lead(new, Utc::now())
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(detail)))
}

// GET /api/leads
#[utoipa::path(
    get,
    path = "/api/leads",
    tag = "Leads",
    params(LeadFilter),
    responses(
        (status = 200, description = "Leads mais recentes primeiro", body = Vec<Lead>)
    )
)]
pub async fn list_leads(
    State(app_state): State<AppState>,
    locale: Locale,
    Query(filter): Query<LeadFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let leads = app_state
        .lead_service
        .list_leads(&filter)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(leads)))
}

// GET /api/leads/{id}
#[utoipa::path(
    get,
    path = "/api/leads/{id}",
    tag = "Leads",
    params(("id" = Uuid, Path, description = "ID do lead")),
    responses(
        (status = 200, description = "Lead com a triagem atual", body = LeadDetail),
        (status = 404, description = "Lead não encontrado")
    )
)]
pub async fn get_lead(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = app_state
        .lead_service
        .get_lead(id)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(detail)))
}

// PATCH /api/leads/{id}
#[utoipa::path(
    patch,
    path = "/api/leads/{id}",
    tag = "Leads",
    params(("id" = Uuid, Path, description = "ID do lead")),
    request_body = UpdateLeadPayload,
    responses(
        (status = 200, description = "Lead atualizado", body = Lead),
        (status = 400, description = "Dados inválidos"),
        (status = 404, description = "Lead não encontrado")
    )
)]
pub async fn update_lead(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLeadPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let lead = app_state
        .lead_service
        .update_lead(id, payload.into())
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(lead)))
}

// POST /api/leads/{id}/triage
#[utoipa::path(
    post,
    path = "/api/leads/{id}/triage",
    tag = "Leads",
    params(("id" = Uuid, Path, description = "ID do lead")),
    request_body(content = TriagePayload, description = "Opcional: texto a classificar e status de repouso"),
    responses(
        (status = 200, description = "Triagem refeita (fallback se o classificador falhar)", body = TriageResult),
        (status = 404, description = "Lead não encontrado")
    )
)]
pub async fn run_triage(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
    payload: Option<Json<TriagePayload>>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();

    let result = app_state
        .lead_service
        .run_triage(id, payload.text, payload.resting_status.unwrap_or(LeadStatus::New))
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(result)))
}

// GET /api/leads/{id}/timeline
#[utoipa::path(
    get,
    path = "/api/leads/{id}/timeline",
    tag = "Leads",
    params(("id" = Uuid, Path, description = "ID do lead"), TimelineParams),
    responses(
        (status = 200, description = "Eventos do lead", body = Vec<TimelineEvent>),
        (status = 404, description = "Lead não encontrado")
    )
)]
pub async fn get_timeline(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
    Query(params): Query<TimelineParams>,
) -> Result<impl IntoResponse, ApiError> {
    let events = app_state
        .lead_service
        .timeline(id, &params.into())
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(events)))
}

// POST /api/leads/{id}/contacts
#[utoipa::path(
    post,
    path = "/api/leads/{id}/contacts",
    tag = "Leads",
    params(("id" = Uuid, Path, description = "ID do lead")),
    request_body = ContactPayload,
    responses(
        (status = 200, description = "Contato registrado", body = Lead),
        (status = 404, description = "Lead não encontrado")
    )
)]
pub async fn log_contact(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
    Json(payload): Json<ContactPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let lead = app_state
        .lead_service
        .log_contact(id, payload.channel, payload.note, Utc::now())
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(lead)))
}

// POST /api/leads/{id}/messages
#[utoipa::path(
    post,
    path = "/api/leads/{id}/messages",
    tag = "Leads",
    params(("id" = Uuid, Path, description = "ID do lead")),
    request_body = MessagePayload,
    responses(
        (status = 201, description = "Mensagem enviada", body = SentMessage),
        (status = 404, description = "Lead não encontrado"),
        (status = 502, description = "Falha no provedor de mensagens")
    )
)]
pub async fn send_message(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
    Json(payload): Json<MessagePayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let sent = app_state
        .lead_service
        .send_message(id, &payload.message, Utc::now())
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(sent)))
}

// POST /api/leads/{id}/convert
#[utoipa::path(
    post,
    path = "/api/leads/{id}/convert",
    tag = "Leads",
    params(("id" = Uuid, Path, description = "ID do lead")),
    request_body(content = ConvertPayload, description = "Opcional"),
    responses(
        (status = 201, description = "Paciente criado", body = Patient),
        (status = 404, description = "Lead não encontrado"),
        (status = 409, description = "Lead já convertido")
    )
)]
pub async fn convert_lead(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
    payload: Option<Json<ConvertPayload>>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let patient = app_state
        .lead_service
        .convert_to_patient(id, payload.email)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(patient)))
}
