use sqlx::{Executor, Postgres};

use crate::{
    common::error::AppError,
    models::settings::{ClinicSettings, UpdateClinicSettingsRequest},
};

#[derive(Clone, Default)]
pub struct SettingsRepository;

impl SettingsRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn get_settings<'e, E>(&self, executor: E) -> Result<ClinicSettings, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        // Se ainda não existe a linha, tratamos o "Not Found" como "Vazio".
        let settings = sqlx::query_as::<_, ClinicSettings>(
            "SELECT system_prompt, knowledge_base, updated_at FROM clinic_settings WHERE id = 1",
        )
        .fetch_optional(executor)
        .await?;

        Ok(settings.unwrap_or_default())
    }

    pub async fn update_settings<'e, E>(
        &self,
        executor: E,
        input: &UpdateClinicSettingsRequest,
    ) -> Result<ClinicSettings, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        // UPSERT (Insert or Update)
        let settings = sqlx::query_as::<_, ClinicSettings>(
            r#"
            INSERT INTO clinic_settings (id, system_prompt, knowledge_base, updated_at)
            VALUES (1, $1, $2, NOW())
            ON CONFLICT (id)
            DO UPDATE SET
                system_prompt = EXCLUDED.system_prompt,
                knowledge_base = EXCLUDED.knowledge_base,
                updated_at = NOW()
            RETURNING system_prompt, knowledge_base, updated_at
            "#,
        )
        .bind(&input.system_prompt)
        .bind(&input.knowledge_base)
        .fetch_one(executor)
        .await?;

        Ok(settings)
    }
}
