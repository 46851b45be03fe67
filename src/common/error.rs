use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::common::i18n::I18nStore;
use crate::middleware::i18n::Locale;

// Nosso tipo de erro, agora com `thiserror` para melhor ergonomia.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Lead não encontrado")]
    LeadNotFound,

    #[error("Lead já convertido em paciente")]
    PatientAlreadyExists,

    #[error("Payload inválido: {0}")]
    InvalidPayload(String),

    #[error("Token de verificação do webhook inválido")]
    InvalidVerifyToken,

    #[error("Token inválido")]
    InvalidToken,

    #[error("Falha no envio da mensagem: {0}")]
    SendFailed(String),

    // Variante para erros de banco de dados (exemplo com sqlx)
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    /// Código estável usado como chave de tradução.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "validation_error",
            AppError::LeadNotFound => "lead_not_found",
            AppError::PatientAlreadyExists => "patient_already_exists",
            AppError::InvalidPayload(_) => "invalid_payload",
            AppError::InvalidVerifyToken => "invalid_verify_token",
            AppError::InvalidToken => "invalid_token",
            AppError::SendFailed(_) => "send_failed",
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            AppError::LeadNotFound => StatusCode::NOT_FOUND,
            AppError::PatientAlreadyExists => StatusCode::CONFLICT,
            AppError::InvalidVerifyToken => StatusCode::FORBIDDEN,
            AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::SendFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Converte para a resposta HTTP no idioma do cliente.
    pub fn to_api_error(self, locale: &Locale, i18n: &I18nStore) -> ApiError {
        let status = self.status();
        let message = i18n.translate(&locale.0, self.code());

        let details = match &self {
            // Retorna todos os detalhes da validação: campo -> códigos
            AppError::ValidationError(errors) => {
                let mut details = serde_json::Map::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<Value> = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string())
                                .into()
                        })
                        .collect();
                    details.insert(field.to_string(), Value::Array(messages));
                }
                Some(Value::Object(details))
            }
            AppError::InvalidPayload(reason) | AppError::SendFailed(reason) => {
                Some(json!({ "reason": reason }))
            }
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                // O `tracing` loga a mensagem detalhada; o cliente só vê a genérica.
                tracing::error!("Erro Interno do Servidor: {:?}", self);
                None
            }
            _ => None,
        };

        ApiError {
            status,
            message,
            details,
        }
    }
}

/// Erro já pronto para o cliente (status + mensagem traduzida).
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.message, "details": details }),
            None => json!({ "error": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_translated_and_mapped_to_404() {
        let i18n = I18nStore::new();
        let err = AppError::LeadNotFound.to_api_error(&Locale("pt".into()), &i18n);
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "Lead não encontrado.");

        let err = AppError::LeadNotFound.to_api_error(&Locale("en".into()), &i18n);
        assert_eq!(err.message, "Lead not found.");
    }

    #[test]
    fn send_failure_is_a_bad_gateway_with_reason() {
        let i18n = I18nStore::new();
        let err = AppError::SendFailed("numero invalido".into())
            .to_api_error(&Locale("pt".into()), &i18n);
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.details.unwrap()["reason"], "numero invalido");
    }
}
