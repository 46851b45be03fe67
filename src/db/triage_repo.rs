// src/db/triage_repo.rs

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::triage::{Classification, TriageResult},
};

const TRIAGE_COLUMNS: &str = "id, lead_id, resposta_ao_usuario, intent, lead_score, \
    interesse_principal, nivel_urgencia, provavel_plano, indicacao_programa, precisa_humano, \
    possivel_ticket, probabilidade_fechamento, observacoes, raw_payload, is_fallback, \
    created_at, updated_at";

#[derive(Clone, Default)]
pub struct TriageRepository;

impl TriageRepository {
    pub fn new() -> Self {
        Self
    }

    /// UPSERT (Insert or Update): no máximo uma triagem por lead.
    /// Reclassificar sobrescreve TODOS os campos, não guardamos histórico.
    pub async fn upsert<'e, E>(
        &self,
        executor: E,
        lead_id: Uuid,
        c: &Classification,
    ) -> Result<TriageResult, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            INSERT INTO triage_results (
                lead_id, resposta_ao_usuario, intent, lead_score, interesse_principal,
                nivel_urgencia, provavel_plano, indicacao_programa, precisa_humano,
                possivel_ticket, probabilidade_fechamento, observacoes, raw_payload, is_fallback
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (lead_id)
            DO UPDATE SET
                resposta_ao_usuario = EXCLUDED.resposta_ao_usuario,
                intent = EXCLUDED.intent,
                lead_score = EXCLUDED.lead_score,
                interesse_principal = EXCLUDED.interesse_principal,
                nivel_urgencia = EXCLUDED.nivel_urgencia,
                provavel_plano = EXCLUDED.provavel_plano,
                indicacao_programa = EXCLUDED.indicacao_programa,
                precisa_humano = EXCLUDED.precisa_humano,
                possivel_ticket = EXCLUDED.possivel_ticket,
                probabilidade_fechamento = EXCLUDED.probabilidade_fechamento,
                observacoes = EXCLUDED.observacoes,
                raw_payload = EXCLUDED.raw_payload,
                is_fallback = EXCLUDED.is_fallback,
                updated_at = NOW()
            RETURNING {TRIAGE_COLUMNS}
            "#
        );

        let result = sqlx::query_as::<_, TriageResult>(&sql)
            .bind(lead_id)
            .bind(&c.resposta_ao_usuario)
            .bind(c.intent)
            .bind(c.lead_score)
            .bind(&c.interesse_principal)
            .bind(c.nivel_urgencia)
            .bind(&c.provavel_plano)
            .bind(&c.indicacao_programa)
            .bind(c.precisa_humano)
            .bind(&c.possivel_ticket)
            .bind(&c.probabilidade_fechamento)
            .bind(&c.observacoes)
            .bind(&c.raw_payload)
            .bind(c.is_fallback)
            .fetch_one(executor)
            .await?;

        Ok(result)
    }

    pub async fn find_by_lead<'e, E>(
        &self,
        executor: E,
        lead_id: Uuid,
    ) -> Result<Option<TriageResult>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("SELECT {TRIAGE_COLUMNS} FROM triage_results WHERE lead_id = $1");
        let result = sqlx::query_as::<_, TriageResult>(&sql)
            .bind(lead_id)
            .fetch_optional(executor)
            .await?;

        Ok(result)
    }
}
