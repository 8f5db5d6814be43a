use sqlx::Row;

use cassie_core::domain::manual::Manual;

use super::RepositoryError;
use crate::DbPool;

/// Generated product manuals, one row per (product, section).
#[derive(Clone)]
pub struct SqlManualStore {
    pool: DbPool,
}

impl SqlManualStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(
        &self,
        product: &str,
        section: &str,
        markdown: &str,
        facts_json: Option<&str>,
    ) -> Result<i64, RepositoryError> {
        let product = normalize_key(product);
        let section = normalize_key(section);
        sqlx::query(
            "INSERT INTO manuals (product, section, markdown, facts_json) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT (product, section) DO UPDATE SET markdown = excluded.markdown, \
             facts_json = excluded.facts_json",
        )
        .bind(&product)
        .bind(&section)
        .bind(markdown)
        .bind(facts_json)
        .execute(&self.pool)
        .await?;

        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM manuals WHERE product = ?1 AND section = ?2",
        )
        .bind(&product)
        .bind(&section)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn get(
        &self,
        product: &str,
        section: &str,
    ) -> Result<Option<Manual>, RepositoryError> {
        let row = sqlx::query(
            "SELECT product, section, markdown FROM manuals WHERE product = ?1 AND section = ?2",
        )
        .bind(normalize_key(product))
        .bind(normalize_key(section))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Manual {
                product: row.try_get("product")?,
                section: row.try_get("section")?,
                markdown: row.try_get("markdown")?,
            })
        })
        .transpose()
    }
}

fn normalize_key(value: &str) -> String {
    value.trim().to_lowercase()
}
