// src/handlers/webhooks.rs

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::i18n::Locale,
    models::webhook::WhatsAppEnvelope,
    services::webhook_service::WebhookReceipt,
};

// GET /api/webhooks/whatsapp
#[utoipa::path(
    get,
    path = "/api/webhooks/whatsapp",
    tag = "Webhooks",
    params(
        ("hub.mode" = String, Query, description = "Sempre 'subscribe'"),
        ("hub.verify_token" = String, Query, description = "Token configurado na Meta"),
        ("hub.challenge" = String, Query, description = "Valor a ser devolvido")
    ),
    responses(
        (status = 200, description = "Challenge devolvido", body = String),
        (status = 403, description = "Token de verificação inválido")
    )
)]
pub async fn verify_whatsapp(
    State(app_state): State<AppState>,
    locale: Locale,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let challenge = app_state
        .webhook_service
        .verify(
            params.get("hub.mode").map(String::as_str),
            params.get("hub.verify_token").map(String::as_str),
            params.get("hub.challenge").map(String::as_str),
        )
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, challenge))
}

// POST /api/webhooks/whatsapp
#[utoipa::path(
    post,
    path = "/api/webhooks/whatsapp",
    tag = "Webhooks",
    request_body = WhatsAppEnvelope,
    responses(
        (status = 200, description = "Mensagens gravadas", body = WebhookReceipt),
        (status = 500, description = "Falha ao gravar: o provedor deve reenviar")
    )
)]
pub async fn receive_whatsapp(
    State(app_state): State<AppState>,
    locale: Locale,
    Json(envelope): Json<WhatsAppEnvelope>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = app_state
        .webhook_service
        .handle_inbound(&envelope, Utc::now())
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(receipt)))
}
