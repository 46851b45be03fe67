// src/common/phone.rs

/// Mantém só os dígitos. "+55 (11) 99999-9999" -> "5511999999999".
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Estratégia de casamento de telefone por sufixo.
///
/// O provedor às vezes manda o número com DDI, às vezes sem, às vezes com o
/// nono dígito. Comparar os últimos N dígitos tolera essas variações. O preço é
/// que dois leads podem compartilhar o mesmo sufixo: quem chama deve tratar
/// múltiplos resultados como ambíguos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchBySuffix {
    pub len: usize,
}

impl Default for MatchBySuffix {
    fn default() -> Self {
        Self { len: 8 }
    }
}

impl MatchBySuffix {
    pub fn new(len: usize) -> Self {
        Self { len: len.max(1) }
    }

    /// Sufixo de busca: os últimos N dígitos. `None` quando o número tem
    /// menos que N dígitos (um código curto casaria com qualquer lead).
    pub fn key(&self, raw: &str) -> Option<String> {
        let digits = normalize_phone(raw);
        if digits.len() < self.len {
            return None;
        }
        Some(digits[digits.len() - self.len..].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_everything_but_digits() {
        assert_eq!(normalize_phone("+55 (11) 99999-9999"), "5511999999999");
        assert_eq!(normalize_phone("abc"), "");
    }

    #[test]
    fn suffix_tolerates_country_code_variance() {
        let strategy = MatchBySuffix::default();
        assert_eq!(strategy.key("5511999999999").as_deref(), Some("99999999"));
        assert_eq!(strategy.key("+55 11 99999-9999"), strategy.key("11999999999"));
        assert_ne!(strategy.key("5511988887777"), strategy.key("5511999999999"));
    }

    #[test]
    fn numbers_shorter_than_the_suffix_have_no_key() {
        let strategy = MatchBySuffix::new(8);
        assert_eq!(strategy.key("1234"), None);
        assert_eq!(strategy.key("1234567"), None);
        assert_eq!(strategy.key("---"), None);
        assert_eq!(strategy.key("12345678").as_deref(), Some("12345678"));
    }
}
