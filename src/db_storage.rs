use async_trait::async_trait;
use sqlx::PgPool;

use crate::dedup::fingerprint;
use crate::errors::{AppError, ResultExt};
use crate::models::Lead;
use crate::repository::{IdentityKeys, LeadRepository};

/// Postgres-backed lead store in the `discovery` schema.
pub struct LeadStorage {
    pool: PgPool,
}

impl LeadStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the schema and table if they are missing.
    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        sqlx::query("CREATE SCHEMA IF NOT EXISTS discovery")
            .execute(&self.pool)
            .await
            .context("Failed to create discovery schema")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS discovery.leads (
                id UUID PRIMARY KEY,
                fingerprint TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                name_key TEXT,
                phone_key TEXT,
                domain_key TEXT,
                industry TEXT NOT NULL,
                location TEXT NOT NULL,
                opportunity_score SMALLINT NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create discovery.leads")?;

        for column in ["name_key", "phone_key", "domain_key"] {
            let ddl = format!(
                "CREATE INDEX IF NOT EXISTS idx_leads_{column} ON discovery.leads ({column})"
            );
            sqlx::query(&ddl)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to index {}", column))?;
        }

        tracing::info!("✓ discovery.leads ready");
        Ok(())
    }
}

#[async_trait]
impl LeadRepository for LeadStorage {
    async fn exists(
        &self,
        name: &str,
        phone: Option<&str>,
        website: Option<&str>,
    ) -> Result<bool, AppError> {
        let keys = IdentityKeys::new(name, phone, website);
        if keys == IdentityKeys::default() {
            return Ok(false);
        }

        let found: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM discovery.leads
                WHERE ($1::text IS NOT NULL AND name_key = $1)
                   OR ($2::text IS NOT NULL AND phone_key = $2)
                   OR ($3::text IS NOT NULL AND domain_key = $3)
            )
            "#,
        )
        .bind(keys.name)
        .bind(keys.phone)
        .bind(keys.domain)
        .fetch_one(&self.pool)
        .await
        .context("Failed to look up existing lead")?;

        Ok(found)
    }

    async fn save(&self, lead: &Lead) -> Result<(), AppError> {
        let fp = fingerprint(&lead.name, lead.phone.as_deref(), lead.website.as_deref());
        let keys = IdentityKeys::for_lead(lead);
        let data = serde_json::to_value(lead)
            .map_err(|e| AppError::InternalError(format!("Failed to serialize lead: {}", e)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO discovery.leads
                (id, fingerprint, name, name_key, phone_key, domain_key,
                 industry, location, opportunity_score, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (fingerprint) DO NOTHING
            "#,
        )
        .bind(lead.id)
        .bind(&fp)
        .bind(&lead.name)
        .bind(keys.name)
        .bind(keys.phone)
        .bind(keys.domain)
        .bind(&lead.industry)
        .bind(&lead.location)
        .bind(lead.opportunity_score as i16)
        .bind(data)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save lead '{}'", lead.name))?;

        if result.rows_affected() == 0 {
            tracing::debug!("Lead '{}' already stored ({})", lead.name, &fp[..12]);
        } else {
            tracing::info!("✓ Saved lead '{}' (score {})", lead.name, lead.opportunity_score);
        }
        Ok(())
    }
}
