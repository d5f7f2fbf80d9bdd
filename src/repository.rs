//! Lead persistence.
//!
//! [`LeadRepository`] is the seam between handlers and storage. The PostgreSQL
//! implementation lives here; the in-memory one is in [`crate::memory_repo`].

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::models::{Lead, LeadQuery, LeadRow, NewLead, TrackingUpdate, DEFAULT_LIST_LIMIT};

/// Storage operations for leads. Each call is a single, independent unit of
/// work; a missing id surfaces as [`AppError::NotFound`].
#[async_trait]
pub trait LeadRepository: Send + Sync {
    async fn create(&self, lead: NewLead) -> Result<Lead, AppError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Lead, AppError>;

    /// Matching leads ordered by `(created_at, id)`, paged by `limit`/`skip`.
    async fn search(&self, criteria: &LeadQuery) -> Result<Vec<Lead>, AppError>;

    /// Replaces the descriptive attributes of a lead.
    async fn update(&self, id: Uuid, lead: NewLead) -> Result<Lead, AppError>;

    async fn update_tracking(&self, id: Uuid, update: TrackingUpdate) -> Result<Lead, AppError>;

    async fn delete(&self, id: Uuid) -> Result<(), AppError>;

    /// Cheap reachability check used by the health endpoint.
    async fn ping(&self) -> Result<(), AppError>;
}

const LEAD_COLUMNS: &str = "id, name, website, industry, company_size, description, \
    technologies, contact_email, contact_phone, contact_address, stage, proposal_generated, \
    proposal_sent, proposal_sent_at, last_contacted_at, next_follow_up_at, notes, \
    tracking_updated_at, created_at, updated_at";

/// Escapes LIKE wildcards so user input only ever matches literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn into_lead(row: LeadRow) -> Result<Lead, AppError> {
    let id = row.id;
    Lead::try_from(row)
        .map_err(|e| AppError::InternalError(format!("corrupt lead row {}: {}", id, e)))
}

/// PostgreSQL-backed repository. Connections come from the pool per query and
/// go back on every exit path.
#[derive(Clone)]
pub struct PgLeadRepository {
    pool: PgPool,
}

impl PgLeadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadRepository for PgLeadRepository {
    async fn create(&self, lead: NewLead) -> Result<Lead, AppError> {
        let now = Utc::now();
        let sql = format!(
            r#"
            INSERT INTO leads (
                id, name, website, industry, company_size, description, technologies,
                contact_email, contact_phone, contact_address, stage, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'new', $11, $11)
            RETURNING {}
            "#,
            LEAD_COLUMNS
        );

        let row = sqlx::query_as::<_, LeadRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&lead.name)
            .bind(&lead.website)
            .bind(&lead.industry)
            .bind(&lead.company_size)
            .bind(&lead.description)
            .bind(&lead.technologies)
            .bind(&lead.contact_email)
            .bind(&lead.contact_phone)
            .bind(&lead.contact_address)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .context("inserting lead")?;

        tracing::debug!("Inserted lead {}", row.id);
        into_lead(row)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Lead, AppError> {
        let sql = format!("SELECT {} FROM leads WHERE id = $1", LEAD_COLUMNS);
        let row = sqlx::query_as::<_, LeadRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("fetching lead {}", id))?
            .ok_or_else(|| AppError::lead_not_found(id))?;
        into_lead(row)
    }

    async fn search(&self, criteria: &LeadQuery) -> Result<Vec<Lead>, AppError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM leads
            WHERE ($1::text IS NULL
                   OR name ILIKE $1 OR website ILIKE $1
                   OR industry ILIKE $1 OR contact_email ILIKE $1)
              AND ($2::text IS NULL OR name ILIKE $2)
              AND ($3::text IS NULL OR industry ILIKE $3)
              AND ($4::text IS NULL OR stage = $4)
            ORDER BY created_at ASC, id ASC
            LIMIT $5 OFFSET $6
            "#,
            LEAD_COLUMNS
        );

        let (limit, skip) = criteria
            .sql_paging(DEFAULT_LIST_LIMIT)
            .map_err(AppError::BadRequest)?;
        let text = criteria.text().map(like_pattern);
        let name = criteria.name_term().map(like_pattern);
        let industry = criteria.industry_term().map(like_pattern);
        let stage = criteria.stage.map(|s| s.as_str());

        let rows = sqlx::query_as::<_, LeadRow>(&sql)
            .bind(text)
            .bind(name)
            .bind(industry)
            .bind(stage)
            .bind(limit)
            .bind(skip)
            .fetch_all(&self.pool)
            .await
            .context("searching leads")?;

        rows.into_iter().map(into_lead).collect()
    }

    async fn update(&self, id: Uuid, lead: NewLead) -> Result<Lead, AppError> {
        let sql = format!(
            r#"
            UPDATE leads
            SET name = $2, website = $3, industry = $4, company_size = $5,
                description = $6, technologies = $7, contact_email = $8,
                contact_phone = $9, contact_address = $10, updated_at = $11
            WHERE id = $1
            RETURNING {}
            "#,
            LEAD_COLUMNS
        );

        let row = sqlx::query_as::<_, LeadRow>(&sql)
            .bind(id)
            .bind(&lead.name)
            .bind(&lead.website)
            .bind(&lead.industry)
            .bind(&lead.company_size)
            .bind(&lead.description)
            .bind(&lead.technologies)
            .bind(&lead.contact_email)
            .bind(&lead.contact_phone)
            .bind(&lead.contact_address)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("updating lead {}", id))?
            .ok_or_else(|| AppError::lead_not_found(id))?;
        into_lead(row)
    }

    async fn update_tracking(&self, id: Uuid, update: TrackingUpdate) -> Result<Lead, AppError> {
        let now = Utc::now();
        let sql = format!(
            r#"
            UPDATE leads
            SET stage = COALESCE($2, stage),
                proposal_generated = COALESCE($3, proposal_generated),
                proposal_sent = COALESCE($4, proposal_sent),
                proposal_sent_at = CASE WHEN $5 THEN $6 ELSE proposal_sent_at END,
                last_contacted_at = CASE WHEN $7 THEN $8 ELSE last_contacted_at END,
                next_follow_up_at = CASE WHEN $9 THEN $10 ELSE next_follow_up_at END,
                notes = CASE WHEN $11 THEN $12 ELSE notes END,
                tracking_updated_at = $13,
                updated_at = $13
            WHERE id = $1
            RETURNING {}
            "#,
            LEAD_COLUMNS
        );

        let row = sqlx::query_as::<_, LeadRow>(&sql)
            .bind(id)
            .bind(update.stage.map(|s| s.as_str()))
            .bind(update.proposal_generated)
            .bind(update.proposal_sent)
            .bind(update.proposal_sent_at.is_some())
            .bind(update.proposal_sent_at.flatten())
            .bind(update.last_contacted_at.is_some())
            .bind(update.last_contacted_at.flatten())
            .bind(update.next_follow_up_at.is_some())
            .bind(update.next_follow_up_at.flatten())
            .bind(update.notes.is_some())
            .bind(update.notes.clone().flatten())
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("updating tracking for lead {}", id))?
            .ok_or_else(|| AppError::lead_not_found(id))?;
        into_lead(row)
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM leads WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("deleting lead {}", id))?;

        if result.rows_affected() == 0 {
            return Err(AppError::lead_not_found(id));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("pinging database")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("acme"), "%acme%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
