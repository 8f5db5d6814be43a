use chrono::{Datelike, NaiveDateTime, Utc};
use serde::Serialize;

use crate::repositories::RepositoryError;
use crate::DbPool;

#[derive(Clone, Debug, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct IssueCount {
    pub issue_code: String,
    pub count: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct DayCount {
    pub day: String,
    pub count: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct AgingBucket {
    pub bucket: String,
    pub count: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReportSummary {
    pub total: i64,
    pub by_status: Vec<StatusCount>,
    pub by_issue_code: Vec<IssueCount>,
    pub created_per_day: Vec<DayCount>,
    pub avg_resolution_hours: Option<f64>,
    pub open_aging: Vec<AgingBucket>,
}

/// Ticket aggregates between two UTC timestamps formatted like
/// `datetime('now')` output (`YYYY-MM-DD HH:MM:SS`).
pub async fn summary(
    pool: &DbPool,
    from_utc: &str,
    to_utc: &str,
) -> Result<ReportSummary, RepositoryError> {
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM tickets WHERE created_at >= ?1 AND created_at <= ?2",
    )
    .bind(from_utc)
    .bind(to_utc)
    .fetch_one(pool)
    .await?;

    let by_status = sqlx::query_as::<_, (String, i64)>(
        "SELECT COALESCE(status, 'open') AS status, COUNT(*) AS count FROM tickets \
         WHERE created_at >= ?1 AND created_at <= ?2 GROUP BY COALESCE(status, 'open')",
    )
    .bind(from_utc)
    .bind(to_utc)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(status, count)| StatusCount { status, count })
    .collect();

    let by_issue_code = sqlx::query_as::<_, (String, i64)>(
        "SELECT COALESCE(issue_code, 'OTHER') AS issue_code, COUNT(*) AS count FROM tickets \
         WHERE created_at >= ?1 AND created_at <= ?2 \
         GROUP BY COALESCE(issue_code, 'OTHER') ORDER BY count DESC",
    )
    .bind(from_utc)
    .bind(to_utc)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(issue_code, count)| IssueCount { issue_code, count })
    .collect();

    let created_per_day = sqlx::query_as::<_, (String, i64)>(
        "SELECT substr(created_at, 1, 10) AS day, COUNT(*) AS count FROM tickets \
         WHERE created_at >= ?1 AND created_at <= ?2 GROUP BY day ORDER BY day",
    )
    .bind(from_utc)
    .bind(to_utc)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(day, count)| DayCount { day, count })
    .collect();

    let avg_resolution_hours = sqlx::query_scalar::<_, Option<f64>>(
        "SELECT AVG((julianday(COALESCE(updated_at, created_at)) - julianday(created_at)) \
         * 24.0) FROM tickets WHERE status = 'closed' AND created_at >= ?1 AND \
         created_at <= ?2",
    )
    .bind(from_utc)
    .bind(to_utc)
    .fetch_one(pool)
    .await?
    .map(|hours| (hours * 100.0).round() / 100.0);

    let open_aging = sqlx::query_as::<_, (String, i64)>(
        "SELECT CASE \
           WHEN (julianday('now') - julianday(created_at)) * 24 < 24 THEN '<24h' \
           WHEN (julianday('now') - julianday(created_at)) * 24 < 72 THEN '1-3d' \
           WHEN (julianday('now') - julianday(created_at)) * 24 < 168 THEN '3-7d' \
           ELSE '7d+' END AS bucket, COUNT(*) AS count \
         FROM tickets \
         WHERE COALESCE(status, 'open') != 'closed' \
         AND created_at >= ?1 AND created_at <= ?2 \
         GROUP BY bucket \
         ORDER BY CASE bucket WHEN '<24h' THEN 1 WHEN '1-3d' THEN 2 WHEN '3-7d' THEN 3 \
         ELSE 4 END",
    )
    .bind(from_utc)
    .bind(to_utc)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(bucket, count)| AgingBucket { bucket, count })
    .collect();

    Ok(ReportSummary {
        total,
        by_status,
        by_issue_code,
        created_per_day,
        avg_resolution_hours,
        open_aging,
    })
}

/// `[start, now]` in the store's timestamp format for the presets
/// `today` | `this_week` | `this_month` | `last30`; anything else means
/// the last 7 days. Weeks start on Monday.
pub fn utc_range_for(preset: &str) -> (String, String) {
    let now = Utc::now().naive_utc();
    let today = now.date();
    let start_date = match preset {
        "today" => today,
        "this_week" => today - chrono::Duration::days(today.weekday().num_days_from_monday() as i64),
        "this_month" => today.with_day(1).unwrap_or(today),
        "last30" => today - chrono::Duration::days(30),
        _ => today - chrono::Duration::days(7),
    };
    let start = start_date.and_hms_opt(0, 0, 0).unwrap_or(now);
    (format_timestamp(start), format_timestamp(now))
}

fn format_timestamp(value: NaiveDateTime) -> String {
    value.format("%Y-%m-%d %H:%M:%S").to_string()
}
