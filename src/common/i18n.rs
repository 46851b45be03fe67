// src/common/i18n.rs

use std::collections::HashMap;

const DEFAULT_LANG: &str = "pt";

// (código, português, inglês)
const MESSAGES: &[(&str, &str, &str)] = &[
    ("validation_error", "Um ou mais campos são inválidos.", "One or more fields are invalid."),
    ("lead_not_found", "Lead não encontrado.", "Lead not found."),
    ("patient_already_exists", "Este lead já foi convertido em paciente.", "This lead was already converted to a patient."),
    ("invalid_payload", "Payload inválido.", "Invalid payload."),
    ("invalid_verify_token", "Token de verificação inválido.", "Invalid verification token."),
    ("invalid_token", "Token de autenticação inválido ou ausente.", "Missing or invalid authentication token."),
    ("send_failed", "Não foi possível enviar a mensagem.", "The message could not be sent."),
    ("internal_error", "Ocorreu um erro inesperado.", "An unexpected error occurred."),
];

/// Textos de erro por idioma. Carregado uma vez no AppState.
#[derive(Debug, Clone)]
pub struct I18nStore {
    messages: HashMap<&'static str, HashMap<&'static str, &'static str>>,
}

impl Default for I18nStore {
    fn default() -> Self {
        Self::new()
    }
}

impl I18nStore {
    pub fn new() -> Self {
        let mut pt = HashMap::new();
        let mut en = HashMap::new();
        for (code, pt_text, en_text) in MESSAGES {
            pt.insert(*code, *pt_text);
            en.insert(*code, *en_text);
        }

        let mut messages = HashMap::new();
        messages.insert("pt", pt);
        messages.insert("en", en);
        Self { messages }
    }

    /// Idioma desconhecido cai no português; código desconhecido volta cru.
    pub fn translate(&self, lang: &str, code: &str) -> String {
        self.messages
            .get(lang)
            .and_then(|m| m.get(code))
            .or_else(|| self.messages.get(DEFAULT_LANG).and_then(|m| m.get(code)))
            .map(|s| s.to_string())
            .unwrap_or_else(|| code.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_language_falls_back_to_portuguese() {
        let store = I18nStore::new();
        assert_eq!(store.translate("de", "lead_not_found"), "Lead não encontrado.");
        assert_eq!(store.translate("en", "nope"), "nope");
    }
}
