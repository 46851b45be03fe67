// src/handlers/followups.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::{cron::CronAuth, i18n::Locale},
    models::followup::{CancelReason, CohortOutcome, FollowUpStats, ProcessResult, ScheduledMessage},
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProcessParams {
    /// Máximo de mensagens por execução (padrão: FOLLOWUP_BATCH_LIMIT)
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CancelParams {
    /// Motivo gravado nas mensagens (padrão: "manual")
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub cancelled: u64,
}

// GET /api/leads/{id}/followups
#[utoipa::path(
    get,
    path = "/api/leads/{id}/followups",
    tag = "Follow-ups",
    params(("id" = Uuid, Path, description = "ID do lead")),
    responses(
        (status = 200, description = "Follow-ups do lead, por data", body = Vec<ScheduledMessage>),
        (status = 404, description = "Lead não encontrado")
    )
)]
pub async fn list_follow_ups(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = app_state
        .followup_service
        .list_follow_ups(id)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(messages)))
}

// POST /api/leads/{id}/followups
#[utoipa::path(
    post,
    path = "/api/leads/{id}/followups",
    tag = "Follow-ups",
    params(("id" = Uuid, Path, description = "ID do lead")),
    responses(
        (status = 201, description = "Cohort criado", body = CohortOutcome),
        (status = 200, description = "Lead já tinha cohort pendente", body = CohortOutcome),
        (status = 404, description = "Lead não encontrado")
    )
)]
pub async fn schedule_follow_ups(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = app_state
        .followup_service
        .schedule_follow_ups(id, Utc::now())
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(outcome)))
}

// DELETE /api/leads/{id}/followups
#[utoipa::path(
    delete,
    path = "/api/leads/{id}/followups",
    tag = "Follow-ups",
    params(("id" = Uuid, Path, description = "ID do lead"), CancelParams),
    responses(
        (status = 200, description = "Pendentes cancelados (0 se não havia nenhum)", body = CancelResponse),
        (status = 404, description = "Lead não encontrado")
    )
)]
pub async fn cancel_follow_ups(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
    Query(params): Query<CancelParams>,
) -> Result<impl IntoResponse, ApiError> {
    let reason = params
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "manual".to_string());

    let cancelled = app_state
        .followup_service
        .cancel_follow_ups(id, CancelReason::Manual(reason))
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(CancelResponse { cancelled })))
}

// POST /api/followups/process
#[utoipa::path(
    post,
    path = "/api/followups/process",
    tag = "Follow-ups",
    params(ProcessParams),
    responses(
        (status = 200, description = "Resultado do lote", body = ProcessResult),
        (status = 401, description = "Token do cron inválido")
    ),
    security(("cron_secret" = []))
)]
pub async fn process_due(
    State(app_state): State<AppState>,
    locale: Locale,
    _cron: CronAuth,
    Query(params): Query<ProcessParams>,
) -> Result<impl IntoResponse, ApiError> {
    let result = app_state
        .followup_service
        .process_due(Utc::now(), params.limit)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(result)))
}

// GET /api/followups/process
#[utoipa::path(
    get,
    path = "/api/followups/process",
    tag = "Follow-ups",
    responses(
        (status = 200, description = "Contagens para monitoramento", body = FollowUpStats),
        (status = 401, description = "Token do cron inválido")
    ),
    security(("cron_secret" = []))
)]
pub async fn follow_up_stats(
    State(app_state): State<AppState>,
    locale: Locale,
    _cron: CronAuth,
) -> Result<impl IntoResponse, ApiError> {
    let stats = app_state
        .followup_service
        .stats(Utc::now())
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(stats)))
}
