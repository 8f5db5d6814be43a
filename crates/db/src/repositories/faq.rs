use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::Row;

use cassie_core::domain::faq::FaqEntry;
use cassie_core::faq::seed_entries;
use cassie_core::gateway::FaqSource;
use cassie_core::GatewayError;

use super::RepositoryError;
use crate::DbPool;

/// FAQ rows with a comma-separated keyword column, as the matcher expects.
#[derive(Clone)]
pub struct SqlFaqStore {
    pool: DbPool,
}

impl SqlFaqStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(
        &self,
        question: &str,
        answer: &str,
        keywords: &[String],
    ) -> Result<i64, RepositoryError> {
        let keywords_csv = normalize_keywords(keywords);
        let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM faq WHERE question = ?1")
            .bind(question)
            .fetch_optional(&self.pool)
            .await?;

        match existing {
            Some(id) => {
                sqlx::query("UPDATE faq SET answer = ?1, keywords = ?2 WHERE id = ?3")
                    .bind(answer)
                    .bind(&keywords_csv)
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
                Ok(id)
            }
            None => {
                let result =
                    sqlx::query("INSERT INTO faq (question, answer, keywords) VALUES (?1, ?2, ?3)")
                        .bind(question)
                        .bind(answer)
                        .bind(&keywords_csv)
                        .execute(&self.pool)
                        .await?;
                Ok(result.last_insert_rowid())
            }
        }
    }

    /// Loads the canonical knowledge base; returns how many rows were written.
    pub async fn seed_defaults(&self) -> Result<usize, RepositoryError> {
        let entries = seed_entries();
        let count = entries.len();
        for (question, answer, keywords) in entries {
            let keywords: Vec<String> = keywords.into_iter().map(str::to_string).collect();
            self.upsert(question, answer, &keywords).await?;
        }
        Ok(count)
    }

    async fn list_faqs_inner(&self) -> Result<Vec<FaqEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, question, answer, COALESCE(keywords, '') AS keywords FROM faq ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let keywords_csv: String = row.try_get("keywords")?;
                Ok(FaqEntry {
                    id: row.try_get("id")?,
                    question: row.try_get("question")?,
                    answer: row.try_get("answer")?,
                    keywords: split_keywords(&keywords_csv),
                })
            })
            .collect()
    }
}

#[async_trait]
impl FaqSource for SqlFaqStore {
    async fn list_faqs(&self) -> Result<Vec<FaqEntry>, GatewayError> {
        self.list_faqs_inner().await.map_err(Into::into)
    }
}

fn normalize_keywords(keywords: &[String]) -> String {
    keywords
        .iter()
        .map(|keyword| keyword.trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(",")
}

fn split_keywords(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(|keyword| keyword.trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .collect()
}
