//! Raw ad record sources: the live Ad Library client and the synthetic
//! sample generator.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;
use warroom_core::RawAdRecord;

pub const CRATE_NAME: &str = "warroom-adapters";

const GRAPH_BASE_URL: &str = "https://graph.facebook.com/v19.0";
const ARCHIVE_FIELDS: &str = "id,page_id,page_name,ad_creation_time,ad_delivery_start_time,\
ad_delivery_stop_time,ad_creative_bodies,ad_creative_link_titles,\
ad_creative_link_descriptions,ad_snapshot_url,publisher_platforms,languages,media_type,\
spend,impressions";
const PAGE_SIZE: u32 = 100;
const MAX_PAGES: usize = 10;

#[derive(Debug, Error)]
pub enum AdLibraryError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ad library returned status {status} for {url}")]
    Status { status: u16, url: String },
}

/// Seam between the orchestrator and the live data source. The real client
/// talks to the Graph API; tests substitute scripted implementations.
#[async_trait]
pub trait AdLibrary: Send + Sync {
    /// Cheap credential probe, evaluated once per ingestion batch.
    async fn validate_credential(&self) -> Result<bool, AdLibraryError>;

    /// Fetch every archived ad matching `search_term` delivered in `region`
    /// within the last `days_back` days. May return an empty list for a
    /// reachable but quiet advertiser.
    async fn fetch_records(
        &self,
        search_term: &str,
        region: &str,
        days_back: i64,
    ) -> Result<Vec<RawAdRecord>, AdLibraryError>;
}

#[derive(Debug, Deserialize)]
struct ArchivePage {
    #[serde(default)]
    data: Vec<RawAdRecord>,
    #[serde(default)]
    paging: Option<ArchivePaging>,
}

#[derive(Debug, Deserialize)]
struct ArchivePaging {
    next: Option<String>,
}

/// Meta Ad Library client. Every request carries a bounded timeout so a
/// hung upstream cannot stall an entire ingestion batch.
#[derive(Debug, Clone)]
pub struct MetaAdLibraryClient {
    http: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl MetaAdLibraryClient {
    pub fn new(access_token: impl Into<String>) -> Result<Self, AdLibraryError> {
        Self::with_base_url(access_token, GRAPH_BASE_URL)
    }

    pub fn with_base_url(
        access_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, AdLibraryError> {
        let http = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            http,
            access_token: access_token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AdLibrary for MetaAdLibraryClient {
    async fn validate_credential(&self) -> Result<bool, AdLibraryError> {
        let url = format!("{}/me", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("access_token", self.access_token.as_str())])
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    async fn fetch_records(
        &self,
        search_term: &str,
        region: &str,
        days_back: i64,
    ) -> Result<Vec<RawAdRecord>, AdLibraryError> {
        let since = (Utc::now() - chrono::Duration::days(days_back))
            .format("%Y-%m-%d")
            .to_string();
        let page_size = PAGE_SIZE.to_string();
        let mut url = format!("{}/ads_archive", self.base_url);
        let mut first_page = true;
        let mut records = Vec::new();

        for _ in 0..MAX_PAGES {
            let mut request = self.http.get(&url);
            if first_page {
                request = request.query(&[
                    ("access_token", self.access_token.as_str()),
                    ("search_terms", search_term),
                    ("ad_reached_countries", region),
                    ("ad_active_status", "ALL"),
                    ("ad_delivery_date_min", since.as_str()),
                    ("fields", ARCHIVE_FIELDS),
                    ("limit", page_size.as_str()),
                ]);
            }
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(AdLibraryError::Status {
                    status: status.as_u16(),
                    url: url.clone(),
                });
            }
            let page: ArchivePage = response.json().await?;
            records.extend(page.data);

            // The `next` cursor URL embeds all original query parameters.
            match page.paging.and_then(|p| p.next) {
                Some(next) => {
                    url = next;
                    first_page = false;
                }
                None => break,
            }
        }

        debug!(search_term, region, count = records.len(), "fetched archive records");
        Ok(records)
    }
}

const SAMPLE_THEMES: &[(&str, &str, &str)] = &[
    (
        "ugc_testimonial",
        "I never believed an ad until I tried {name}. Three months in and the difference is real.",
        "Real results, real people",
    ),
    (
        "doctor_authority",
        "Dermatologist-designed routine from {name}. Backed by specialists, built for daily use.",
        "Recommended by experts",
    ),
    (
        "offer_promo",
        "Festive offer: flat 40% off every {name} kit this week only. Free shipping over Rs 499.",
        "Limited time: 40% off",
    ),
    (
        "ingredient_science",
        "{name} combines biotin, keratin and clinically studied actives in one daily dose.",
        "The science of stronger hair",
    ),
    (
        "community_story",
        "Over 2 lakh members trust {name}. Join a community that shares what actually works.",
        "2,00,000+ happy customers",
    ),
    (
        "before_after",
        "Week 0 vs week 12 with {name}. Swipe to see the transformation our users share.",
        "See the 12-week difference",
    ),
    (
        "parent_reassurance",
        "Made safe for little ones: {name} is toxin-free, pediatrician-reviewed and gentle.",
        "Safe enough for your child",
    ),
];

const SPEND_BUCKETS: &[(&str, &str)] = &[
    ("0", "99"),
    ("100", "499"),
    ("500", "999"),
    ("1000", "4999"),
    ("5000", "9999"),
];

const IMPRESSION_BUCKETS: &[(&str, &str)] = &[
    ("1000", "4999"),
    ("5000", "9999"),
    ("10000", "49999"),
    ("50000", "99999"),
    ("100000", "499999"),
];

/// Synthetic ad source for demo mode and per-competitor fallback.
///
/// Generation is seeded from the competitor and brand names, so repeated
/// runs produce the same ids and the ingestion upsert stays idempotent.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleGenerator;

impl SampleGenerator {
    pub fn generate(
        &self,
        competitor_name: &str,
        brand_key: &str,
        count: usize,
    ) -> Vec<RawAdRecord> {
        self.generate_at(competitor_name, brand_key, count, Utc::now().naive_utc())
    }

    pub fn generate_at(
        &self,
        competitor_name: &str,
        brand_key: &str,
        count: usize,
        now: NaiveDateTime,
    ) -> Vec<RawAdRecord> {
        let mut rng = StdRng::seed_from_u64(seed_for(competitor_name, brand_key));
        let slug = slugify(competitor_name);
        let mut records = Vec::with_capacity(count);

        for index in 0..count {
            let (theme, body_template, title) =
                SAMPLE_THEMES[rng.gen_range(0..SAMPLE_THEMES.len())];
            let run_days = rng.gen_range(3..=75_i64);
            let is_active = rng.gen_bool(0.7);
            let start = now - chrono::Duration::days(run_days);
            let stop = (!is_active).then(|| now.format("%Y-%m-%dT%H:%M:%S+0000").to_string());
            let media_type = match rng.gen_range(0..10) {
                0..=4 => "IMAGE",
                5..=8 => "VIDEO",
                _ => "CAROUSEL",
            };
            let spend = SPEND_BUCKETS[rng.gen_range(0..SPEND_BUCKETS.len())];
            let impressions = IMPRESSION_BUCKETS[rng.gen_range(0..IMPRESSION_BUCKETS.len())];

            records.push(RawAdRecord {
                id: Some(format!("sample_{brand_key}_{slug}_{index}")),
                page_name: Some(competitor_name.to_string()),
                page_id: Some(format!("page_{slug}")),
                ad_creative_bodies: Some(vec![body_template.replace("{name}", competitor_name)]),
                ad_creative_link_titles: Some(vec![title.to_string()]),
                ad_creative_link_descriptions: Some(vec![format!(
                    "{competitor_name} official store"
                )]),
                media_type: Some(media_type.to_string()),
                publisher_platforms: Some(vec!["facebook".to_string(), "instagram".to_string()]),
                languages: Some(vec!["en".to_string()]),
                ad_creation_time: Some(start.format("%Y-%m-%dT%H:%M:%S+0000").to_string()),
                ad_delivery_start_time: Some(start.format("%Y-%m-%dT%H:%M:%S+0000").to_string()),
                ad_delivery_stop_time: stop,
                spend: Some(json!({"lower_bound": spend.0, "upper_bound": spend.1})),
                impressions: Some(
                    json!({"lower_bound": impressions.0, "upper_bound": impressions.1}),
                ),
                ad_snapshot_url: Some(format!(
                    "https://www.facebook.com/ads/library/?id=sample_{slug}_{index}"
                )),
                theme: None,
                theme_hint: Some(theme.to_string()),
                active_hint: Some(is_active),
                run_days_hint: Some(run_days),
                sample_hint: Some(true),
            });
        }

        records
    }
}

fn seed_for(competitor_name: &str, brand_key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    competitor_name.hash(&mut hasher);
    brand_key.hash(&mut hasher);
    hasher.finish()
}

fn slugify(input: &str) -> String {
    input
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}
