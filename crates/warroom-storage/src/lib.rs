//! SQLite persistence for canonical ads, weekly briefs, and fetch runs.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use thiserror::Error;
use tracing::debug;
use warroom_core::{CanonicalAd, MediaType};

pub const CRATE_NAME: &str = "warroom-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("decoding stored field: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Filter set for ad listing queries. `None` means "no constraint".
#[derive(Debug, Clone, Default)]
pub struct AdFilter {
    pub brand_key: Option<String>,
    pub competitor_name: Option<String>,
    pub media_type: Option<MediaType>,
    pub theme: Option<String>,
    pub is_active: Option<bool>,
    pub days_back: Option<i64>,
    pub limit: i64,
}

impl AdFilter {
    pub fn for_brand(brand_key: &str, limit: i64) -> Self {
        Self {
            brand_key: Some(brand_key.to_string()),
            limit,
            ..Default::default()
        }
    }
}

/// Aggregated dashboard counters for one brand scope (or the whole table).
#[derive(Debug, Clone, Default, Serialize)]
pub struct AdStats {
    pub total_ads: i64,
    pub active_ads: i64,
    pub sample_ads: i64,
    pub top_performers: i64,
    pub media_breakdown: BTreeMap<String, i64>,
    pub theme_breakdown: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewBrief {
    pub brand_key: String,
    pub generated_at: NaiveDateTime,
    pub week_start: NaiveDateTime,
    pub week_end: NaiveDateTime,
    pub brief_text: String,
    pub insights: JsonValue,
    pub ad_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredBrief {
    pub brand_key: String,
    pub generated_at: NaiveDateTime,
    pub brief_text: String,
    pub insights: JsonValue,
    pub ad_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchRunRecord {
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub status: String,
    pub source: String,
    pub ads_loaded: i64,
    pub error_count: i64,
}

/// Handle to the persistent store. Cloning shares the underlying pool.
#[derive(Debug, Clone)]
pub struct AdStore {
    pool: SqlitePool,
}

impl AdStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // In-memory databases exist per connection, so the pool must not
        // hand out a second one.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:").await
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ads (
                id TEXT PRIMARY KEY,
                page_name TEXT NOT NULL,
                page_id TEXT NOT NULL DEFAULT '',
                brand_key TEXT NOT NULL,
                competitor_name TEXT NOT NULL,
                ad_body TEXT NOT NULL DEFAULT '',
                ad_title TEXT NOT NULL DEFAULT '',
                ad_description TEXT NOT NULL DEFAULT '',
                media_type TEXT NOT NULL DEFAULT 'IMAGE',
                publisher_platforms TEXT NOT NULL DEFAULT '[]',
                languages TEXT NOT NULL DEFAULT '[]',
                ad_creation_time TEXT,
                ad_delivery_start_time TEXT,
                ad_delivery_stop_time TEXT,
                spend_lower INTEGER,
                spend_upper INTEGER,
                impressions_lower INTEGER,
                impressions_upper INTEGER,
                ad_snapshot_url TEXT,
                theme TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                run_days INTEGER NOT NULL DEFAULT 0,
                is_top_performer INTEGER NOT NULL DEFAULT 0,
                is_sample INTEGER NOT NULL DEFAULT 0,
                ingested_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS weekly_briefs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                brand_key TEXT NOT NULL,
                generated_at TEXT NOT NULL,
                week_start TEXT NOT NULL,
                week_end TEXT NOT NULL,
                brief_text TEXT NOT NULL,
                insights_json TEXT NOT NULL DEFAULT '[]',
                ad_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fetch_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                status TEXT NOT NULL,
                source TEXT NOT NULL,
                ads_loaded INTEGER NOT NULL DEFAULT 0,
                error_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert-or-replace keyed by `id`. Re-ingesting an id overwrites every
    /// column with the fresh normalization, never appends a duplicate row.
    pub async fn upsert_ad(&self, ad: &CanonicalAd) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ads (
                id, page_name, page_id, brand_key, competitor_name,
                ad_body, ad_title, ad_description, media_type,
                publisher_platforms, languages,
                ad_creation_time, ad_delivery_start_time, ad_delivery_stop_time,
                spend_lower, spend_upper, impressions_lower, impressions_upper,
                ad_snapshot_url, theme,
                is_active, run_days, is_top_performer, is_sample, ingested_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                page_name = excluded.page_name,
                page_id = excluded.page_id,
                brand_key = excluded.brand_key,
                competitor_name = excluded.competitor_name,
                ad_body = excluded.ad_body,
                ad_title = excluded.ad_title,
                ad_description = excluded.ad_description,
                media_type = excluded.media_type,
                publisher_platforms = excluded.publisher_platforms,
                languages = excluded.languages,
                ad_creation_time = excluded.ad_creation_time,
                ad_delivery_start_time = excluded.ad_delivery_start_time,
                ad_delivery_stop_time = excluded.ad_delivery_stop_time,
                spend_lower = excluded.spend_lower,
                spend_upper = excluded.spend_upper,
                impressions_lower = excluded.impressions_lower,
                impressions_upper = excluded.impressions_upper,
                ad_snapshot_url = excluded.ad_snapshot_url,
                theme = excluded.theme,
                is_active = excluded.is_active,
                run_days = excluded.run_days,
                is_top_performer = excluded.is_top_performer,
                is_sample = excluded.is_sample,
                ingested_at = excluded.ingested_at
            "#,
        )
        .bind(&ad.id)
        .bind(&ad.page_name)
        .bind(&ad.page_id)
        .bind(&ad.brand_key)
        .bind(&ad.competitor_name)
        .bind(&ad.ad_body)
        .bind(&ad.ad_title)
        .bind(&ad.ad_description)
        .bind(ad.media_type.as_str())
        .bind(serde_json::to_string(&ad.publisher_platforms)?)
        .bind(serde_json::to_string(&ad.languages)?)
        .bind(ad.ad_creation_time)
        .bind(ad.ad_delivery_start_time)
        .bind(ad.ad_delivery_stop_time)
        .bind(ad.spend_lower)
        .bind(ad.spend_upper)
        .bind(ad.impressions_lower)
        .bind(ad.impressions_upper)
        .bind(&ad.ad_snapshot_url)
        .bind(&ad.theme)
        .bind(ad.is_active)
        .bind(ad.run_days)
        .bind(ad.is_top_performer)
        .bind(ad.is_sample)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_ads(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM ads")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    /// Bulk reset used by the reseed path. Unconditional.
    pub async fn delete_all_ads(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM ads").execute(&self.pool).await?;
        debug!(deleted = result.rows_affected(), "cleared ads table");
        Ok(result.rows_affected())
    }

    pub async fn get_ad(&self, id: &str) -> Result<Option<CanonicalAd>, StoreError> {
        let row = sqlx::query("SELECT * FROM ads WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_ad(&r)).transpose()
    }

    pub async fn list_ads(&self, filter: &AdFilter) -> Result<Vec<CanonicalAd>, StoreError> {
        let mut sql = String::from("SELECT * FROM ads WHERE 1=1");
        if filter.brand_key.is_some() {
            sql.push_str(" AND brand_key = ?");
        }
        if filter.competitor_name.is_some() {
            sql.push_str(" AND competitor_name = ?");
        }
        if filter.media_type.is_some() {
            sql.push_str(" AND media_type = ?");
        }
        if filter.theme.is_some() {
            sql.push_str(" AND theme = ?");
        }
        if filter.is_active.is_some() {
            sql.push_str(" AND is_active = ?");
        }
        if filter.days_back.is_some() {
            sql.push_str(" AND ad_delivery_start_time >= ?");
        }
        sql.push_str(" ORDER BY ad_delivery_start_time DESC, id LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(brand_key) = &filter.brand_key {
            query = query.bind(brand_key);
        }
        if let Some(competitor) = &filter.competitor_name {
            query = query.bind(competitor);
        }
        if let Some(media_type) = filter.media_type {
            query = query.bind(media_type.as_str());
        }
        if let Some(theme) = &filter.theme {
            query = query.bind(theme);
        }
        if let Some(is_active) = filter.is_active {
            query = query.bind(is_active);
        }
        if let Some(days_back) = filter.days_back {
            let cutoff = Utc::now().naive_utc() - Duration::days(days_back);
            query = query.bind(cutoff);
        }
        let limit = if filter.limit > 0 { filter.limit } else { 100 };
        let rows = query.bind(limit).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_ad).collect()
    }

    /// Long-running top performers, longest first. When nothing is flagged,
    /// falls back to the longest-running ads in scope so the dashboard never
    /// renders an empty panel.
    pub async fn top_performers(
        &self,
        brand_key: Option<&str>,
        limit: i64,
    ) -> Result<Vec<CanonicalAd>, StoreError> {
        let flagged = self
            .ranked_by_run_days(brand_key, limit, true)
            .await?;
        if !flagged.is_empty() {
            return Ok(flagged);
        }
        self.ranked_by_run_days(brand_key, limit, false).await
    }

    async fn ranked_by_run_days(
        &self,
        brand_key: Option<&str>,
        limit: i64,
        flagged_only: bool,
    ) -> Result<Vec<CanonicalAd>, StoreError> {
        let mut sql = String::from("SELECT * FROM ads WHERE 1=1");
        if flagged_only {
            sql.push_str(" AND is_top_performer = 1");
        }
        if brand_key.is_some() {
            sql.push_str(" AND brand_key = ?");
        }
        sql.push_str(" ORDER BY run_days DESC, id LIMIT ?");
        let mut query = sqlx::query(&sql);
        if let Some(brand_key) = brand_key {
            query = query.bind(brand_key);
        }
        let rows = query.bind(limit).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_ad).collect()
    }

    pub async fn stats(&self, brand_key: Option<&str>) -> Result<AdStats, StoreError> {
        let scope = if brand_key.is_some() {
            " WHERE brand_key = ?"
        } else {
            ""
        };

        let totals_sql = format!(
            "SELECT COUNT(*) AS total, \
                    COALESCE(SUM(is_active), 0) AS active, \
                    COALESCE(SUM(is_sample), 0) AS sample, \
                    COALESCE(SUM(is_top_performer), 0) AS top \
             FROM ads{scope}"
        );
        let mut totals_query = sqlx::query(&totals_sql);
        if let Some(brand_key) = brand_key {
            totals_query = totals_query.bind(brand_key);
        }
        let totals = totals_query.fetch_one(&self.pool).await?;

        let media_sql =
            format!("SELECT media_type, COUNT(*) AS n FROM ads{scope} GROUP BY media_type");
        let mut media_query = sqlx::query(&media_sql);
        if let Some(brand_key) = brand_key {
            media_query = media_query.bind(brand_key);
        }
        let media_rows = media_query.fetch_all(&self.pool).await?;

        let theme_sql = if brand_key.is_some() {
            "SELECT theme, COUNT(*) AS n FROM ads WHERE brand_key = ? AND theme IS NOT NULL GROUP BY theme"
                .to_string()
        } else {
            "SELECT theme, COUNT(*) AS n FROM ads WHERE theme IS NOT NULL GROUP BY theme"
                .to_string()
        };
        let mut theme_query = sqlx::query(&theme_sql);
        if let Some(brand_key) = brand_key {
            theme_query = theme_query.bind(brand_key);
        }
        let theme_rows = theme_query.fetch_all(&self.pool).await?;

        let mut media_breakdown = BTreeMap::new();
        for row in &media_rows {
            media_breakdown.insert(row.try_get::<String, _>("media_type")?, row.try_get("n")?);
        }
        let mut theme_breakdown = BTreeMap::new();
        for row in &theme_rows {
            theme_breakdown.insert(row.try_get::<String, _>("theme")?, row.try_get("n")?);
        }

        Ok(AdStats {
            total_ads: totals.try_get("total")?,
            active_ads: totals.try_get("active")?,
            sample_ads: totals.try_get("sample")?,
            top_performers: totals.try_get("top")?,
            media_breakdown,
            theme_breakdown,
        })
    }

    pub async fn save_brief(&self, brief: &NewBrief) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO weekly_briefs
                (brand_key, generated_at, week_start, week_end, brief_text, insights_json, ad_count)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&brief.brand_key)
        .bind(brief.generated_at)
        .bind(brief.week_start)
        .bind(brief.week_end)
        .bind(&brief.brief_text)
        .bind(serde_json::to_string(&brief.insights)?)
        .bind(brief.ad_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn latest_brief(&self, brand_key: &str) -> Result<Option<StoredBrief>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT brand_key, generated_at, brief_text, insights_json, ad_count
              FROM weekly_briefs
             WHERE brand_key = ?
             ORDER BY generated_at DESC, id DESC
             LIMIT 1
            "#,
        )
        .bind(brand_key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let insights_json: String = row.try_get("insights_json")?;
        Ok(Some(StoredBrief {
            brand_key: row.try_get("brand_key")?,
            generated_at: row.try_get("generated_at")?,
            brief_text: row.try_get("brief_text")?,
            insights: serde_json::from_str(&insights_json)?,
            ad_count: row.try_get("ad_count")?,
        }))
    }

    pub async fn save_run(&self, run: &FetchRunRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO fetch_runs (started_at, finished_at, status, source, ads_loaded, error_count)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(&run.status)
        .bind(&run.source)
        .bind(run.ads_loaded)
        .bind(run.error_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_ad(row: &SqliteRow) -> Result<CanonicalAd, StoreError> {
    let media_type: String = row.try_get("media_type")?;
    let publisher_platforms: String = row.try_get("publisher_platforms")?;
    let languages: String = row.try_get("languages")?;
    Ok(CanonicalAd {
        id: row.try_get("id")?,
        page_name: row.try_get("page_name")?,
        page_id: row.try_get("page_id")?,
        brand_key: row.try_get("brand_key")?,
        competitor_name: row.try_get("competitor_name")?,
        ad_body: row.try_get("ad_body")?,
        ad_title: row.try_get("ad_title")?,
        ad_description: row.try_get("ad_description")?,
        media_type: MediaType::from_raw(Some(&media_type)),
        publisher_platforms: serde_json::from_str(&publisher_platforms)?,
        languages: serde_json::from_str(&languages)?,
        ad_creation_time: row.try_get("ad_creation_time")?,
        ad_delivery_start_time: row.try_get("ad_delivery_start_time")?,
        ad_delivery_stop_time: row.try_get("ad_delivery_stop_time")?,
        spend_lower: row.try_get("spend_lower")?,
        spend_upper: row.try_get("spend_upper")?,
        impressions_lower: row.try_get("impressions_lower")?,
        impressions_upper: row.try_get("impressions_upper")?,
        ad_snapshot_url: row.try_get("ad_snapshot_url")?,
        theme: row.try_get("theme")?,
        is_active: row.try_get("is_active")?,
        run_days: row.try_get("run_days")?,
        is_top_performer: row.try_get("is_top_performer")?,
        is_sample: row.try_get("is_sample")?,
    })
}
