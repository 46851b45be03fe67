// src/middleware/cron.rs

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
};

// Extrator que protege o disparo do processador (cron).
// Sem CRON_SECRET configurado a rota fica aberta.
pub struct CronAuth;

impl FromRequestParts<AppState> for CronAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.settings.cron_secret.as_deref() else {
            return Ok(CronAuth);
        };

        let bearer = TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
            .ok();

        match bearer {
            Some(TypedHeader(Authorization(token))) if token.token() == secret => Ok(CronAuth),
            _ => {
                let Ok(locale) = Locale::from_request_parts(parts, state).await;
                tracing::warn!("Disparo do processador recusado: token ausente ou inválido");
                Err(AppError::InvalidToken.to_api_error(&locale, &state.i18n_store))
            }
        }
    }
}
