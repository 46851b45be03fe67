// src/db/lead_repo.rs

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::lead::{Lead, LeadChanges, LeadFilter, LeadStatus, NewLead, NewPatient, Patient},
};

const LEAD_COLUMNS: &str = "id, name, phone, source, message, status, assigned_owner_id, \
                            last_contact_at, created_at, updated_at";

// Repositório da tabela 'leads' (e 'patients', que só nasce de um lead)
#[derive(Clone, Default)]
pub struct LeadRepository;

impl LeadRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn create<'e, E>(&self, executor: E, new: &NewLead) -> Result<Lead, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "INSERT INTO leads (name, phone, source, message, status) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {LEAD_COLUMNS}"
        );

        let lead = sqlx::query_as::<_, Lead>(&sql)
            .bind(&new.name)
            .bind(&new.phone)
            .bind(&new.source)
            .bind(&new.message)
            .bind(LeadStatus::New)
            .fetch_one(executor)
            .await?;

        Ok(lead)
    }

    pub async fn find_by_id<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<Lead>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1");
        let lead = sqlx::query_as::<_, Lead>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(lead)
    }

    /// Trava a linha do lead até o fim da transação.
    /// É o ponto de serialização de tudo que mexe no agregado.
    pub async fn lock<'e, E>(&self, executor: E, id: Uuid) -> Result<Lead, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Lead>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?
            .ok_or(AppError::LeadNotFound)
    }

    /// Casamento por sufixo dos dígitos. Mais antigo primeiro, para o desempate
    /// ser determinístico.
    pub async fn find_by_phone_suffix<'e, E>(
        &self,
        executor: E,
        suffix: &str,
    ) -> Result<Vec<Lead>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leads \
             WHERE regexp_replace(phone, '\\D', '', 'g') LIKE '%' || $1 \
             ORDER BY created_at ASC"
        );

        let leads = sqlx::query_as::<_, Lead>(&sql)
            .bind(suffix)
            .fetch_all(executor)
            .await?;

        Ok(leads)
    }

    pub async fn list<'e, E>(&self, executor: E, filter: &LeadFilter) -> Result<Vec<Lead>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leads \
             WHERE ($1::lead_status IS NULL OR status = $1) \
               AND ($2::uuid IS NULL OR assigned_owner_id = $2) \
             ORDER BY created_at DESC \
             LIMIT $3"
        );

        let leads = sqlx::query_as::<_, Lead>(&sql)
            .bind(filter.status)
            .bind(filter.assigned_owner_id)
            .bind(filter.limit.unwrap_or(100).clamp(1, 500))
            .fetch_all(executor)
            .await?;

        Ok(leads)
    }

    /// Aplica um PATCH. Campos `None` ficam como estão (COALESCE);
    /// o responsável usa uma flag porque "remover" também é uma mudança.
    pub async fn update<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        changes: &LeadChanges,
    ) -> Result<Lead, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "UPDATE leads SET \
                name = COALESCE($2, name), \
                message = COALESCE($3, message), \
                status = COALESCE($4, status), \
                assigned_owner_id = CASE WHEN $5 THEN $6 ELSE assigned_owner_id END, \
                last_contact_at = COALESCE($7, last_contact_at), \
                updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {LEAD_COLUMNS}"
        );

        sqlx::query_as::<_, Lead>(&sql)
            .bind(id)
            .bind(&changes.name)
            .bind(&changes.message)
            .bind(changes.status)
            .bind(changes.assigned_owner_id.is_some())
            .bind(changes.assigned_owner_id.flatten())
            .bind(changes.last_contact_at)
            .fetch_optional(executor)
            .await?
            .ok_or(AppError::LeadNotFound)
    }

    pub async fn set_status<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        status: LeadStatus,
    ) -> Result<Lead, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "UPDATE leads SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {LEAD_COLUMNS}"
        );

        sqlx::query_as::<_, Lead>(&sql)
            .bind(id)
            .bind(status)
            .fetch_optional(executor)
            .await?
            .ok_or(AppError::LeadNotFound)
    }

    // =========================================================================
    //  PACIENTES
    // =========================================================================

    pub async fn create_patient<'e, E>(
        &self,
        executor: E,
        lead_id: Uuid,
        new: &NewPatient,
    ) -> Result<Patient, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Patient>(
            "INSERT INTO patients (lead_id, name, phone, email) VALUES ($1, $2, $3, $4) \
             RETURNING id, lead_id, name, phone, email, created_at",
        )
        .bind(lead_id)
        .bind(&new.name)
        .bind(&new.phone)
        .bind(&new.email)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            // Converte erro de violação de chave única em um erro mais amigável
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return AppError::PatientAlreadyExists;
                }
            }
            e.into()
        })
    }
}
