// src/handlers/settings.rs

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
    models::settings::{ClinicSettings, UpdateClinicSettingsRequest},
};

// GET /api/settings/clinic
#[utoipa::path(
    get,
    path = "/api/settings/clinic",
    tag = "Settings",
    responses(
        (status = 200, description = "Prompt e base de conhecimento da clínica", body = ClinicSettings)
    )
)]
pub async fn get_clinic_settings(
    State(app_state): State<AppState>,
    locale: Locale,
) -> Result<impl IntoResponse, ApiError> {
    let settings = app_state
        .settings_store
        .clinic_settings()
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(settings)))
}

// PUT /api/settings/clinic
#[utoipa::path(
    put,
    path = "/api/settings/clinic",
    tag = "Settings",
    request_body = UpdateClinicSettingsRequest,
    responses(
        (status = 200, description = "Configuração salva; vale na próxima triagem", body = ClinicSettings),
        (status = 400, description = "Dados inválidos")
    )
)]
pub async fn update_clinic_settings(
    State(app_state): State<AppState>,
    locale: Locale,
    Json(payload): Json<UpdateClinicSettingsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let updated = app_state
        .settings_store
        .update_clinic_settings(&payload)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(updated)))
}
