//! Ingestion orchestration: source selection per competitor, normalization,
//! idempotent persistence, and weekly brief composition.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};
use warroom_adapters::{AdLibrary, AdLibraryError, SampleGenerator};
use warroom_core::{normalize_ad, CanonicalAd, RawAdRecord};
use warroom_storage::{AdFilter, AdStore, FetchRunRecord, NewBrief, StoreError};

pub const CRATE_NAME: &str = "warroom-ingest";

/// Cap on per-competitor error messages reported back to the caller.
const MAX_REPORTED_ERRORS: usize = 5;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unknown brand '{0}'")]
    UnknownBrand(String),
    #[error("access credential is invalid or expired")]
    InvalidCredential,
    #[error(transparent)]
    Source(#[from] AdLibraryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorConfig {
    pub name: String,
    pub page_search_term: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandConfig {
    pub key: String,
    pub display_name: String,
    pub category: String,
    pub target_audience: String,
    pub competitors: Vec<CompetitorConfig>,
}

/// Immutable brand/competitor table handed to the orchestrator at
/// construction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandBook {
    pub brands: Vec<BrandConfig>,
}

impl BrandBook {
    /// Built-in demo configuration: three wellness brands and the
    /// competitors tracked for each.
    pub fn builtin() -> Self {
        fn competitor(name: &str, search: &str) -> CompetitorConfig {
            CompetitorConfig {
                name: name.to_string(),
                page_search_term: search.to_string(),
            }
        }
        Self {
            brands: vec![
                BrandConfig {
                    key: "man_matters".into(),
                    display_name: "Man Matters".into(),
                    category: "Men's wellness".into(),
                    target_audience: "Men 22-45 dealing with hair, skin and performance concerns"
                        .into(),
                    competitors: vec![
                        competitor("Traya Health", "Traya"),
                        competitor("Beardo", "Beardo"),
                        competitor("The Man Company", "The Man Company"),
                    ],
                },
                BrandConfig {
                    key: "be_bodywise".into(),
                    display_name: "Be Bodywise".into(),
                    category: "Women's wellness".into(),
                    target_audience: "Women 20-40 focused on hair, skin and body care".into(),
                    competitors: vec![
                        competitor("Mamaearth", "Mamaearth"),
                        competitor("Plum Goodness", "Plum Goodness"),
                        competitor("Pilgrim", "Pilgrim Skincare"),
                    ],
                },
                BrandConfig {
                    key: "little_joys".into(),
                    display_name: "Little Joys".into(),
                    category: "Kids' nutrition".into(),
                    target_audience: "Parents of children aged 2-12".into(),
                    competitors: vec![
                        competitor("Slurrp Farm", "Slurrp Farm"),
                        competitor("Himalaya BabyCare", "Himalaya Baby"),
                        competitor("SuperBottoms", "SuperBottoms"),
                    ],
                },
            ],
        }
    }

    pub fn from_yaml_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn get(&self, key: &str) -> Option<&BrandConfig> {
        self.brands.iter().find(|b| b.key == key)
    }
}

/// Where a batch sourced its records from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    SampleData,
    AdLibrary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
    Partial,
}

/// Result of one ingestion batch. `errors` is truncated to at most five
/// per-competitor messages.
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub status: BatchStatus,
    pub source: DataSource,
    pub ads_loaded: u64,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReseedOutcome {
    pub ads_seeded: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BriefOutcome {
    pub brand_key: String,
    pub brief_text: String,
    pub insights: Vec<String>,
    pub generated_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub region: String,
    pub days_back: i64,
    /// Samples per competitor when no credential is configured.
    pub refresh_sample_count: usize,
    /// Samples per competitor when a live fetch comes back empty.
    pub fallback_sample_count: usize,
    /// Samples per competitor for the reseed/startup path.
    pub seed_sample_count: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            region: "IN".to_string(),
            days_back: 90,
            refresh_sample_count: 15,
            fallback_sample_count: 10,
            seed_sample_count: 15,
        }
    }
}

/// Single-writer ingestion orchestrator. Batches run strictly sequentially:
/// brands, then competitors within a brand, then records within a
/// competitor.
pub struct IngestService {
    brands: BrandBook,
    store: AdStore,
    sampler: SampleGenerator,
    live: Option<Arc<dyn AdLibrary>>,
    settings: IngestSettings,
}

impl IngestService {
    pub fn new(brands: BrandBook, store: AdStore) -> Self {
        Self {
            brands,
            store,
            sampler: SampleGenerator,
            live: None,
            settings: IngestSettings::default(),
        }
    }

    pub fn with_live_source(mut self, client: Arc<dyn AdLibrary>) -> Self {
        self.live = Some(client);
        self
    }

    pub fn with_settings(mut self, settings: IngestSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn brands(&self) -> &BrandBook {
        &self.brands
    }

    pub fn store(&self) -> &AdStore {
        &self.store
    }

    /// Run one ingestion batch over `scope` (a brand key, or every brand).
    ///
    /// Source selection:
    /// 1. no live client configured: every competitor is served from the
    ///    sample generator, no live call is attempted;
    /// 2. otherwise the credential is validated once up front; an invalid
    ///    credential aborts the batch before any competitor runs;
    /// 3. a live fetch that returns zero records substitutes synthetic
    ///    records for that competitor only;
    /// 4. a live fetch that fails records the error, skips the competitor,
    ///    and does not fall back to samples.
    pub async fn fetch(&self, scope: Option<&str>) -> Result<FetchOutcome, IngestError> {
        let started_at = Utc::now().naive_utc();
        let brands = self.resolve_scope(scope)?;

        let outcome = match &self.live {
            None => {
                info!("no ad library credential configured, refreshing sample data");
                self.refresh_from_samples(&brands).await
            }
            Some(client) => self.fetch_live(client.as_ref(), &brands).await?,
        };

        let run = FetchRunRecord {
            started_at,
            finished_at: Utc::now().naive_utc(),
            status: match outcome.status {
                BatchStatus::Success => "success".to_string(),
                BatchStatus::Partial => "partial".to_string(),
            },
            source: match outcome.source {
                DataSource::SampleData => "sample_data".to_string(),
                DataSource::AdLibrary => "ad_library".to_string(),
            },
            ads_loaded: outcome.ads_loaded as i64,
            error_count: outcome.errors.len() as i64,
        };
        if let Err(err) = self.store.save_run(&run).await {
            error!(%err, "failed to record fetch run");
        }

        Ok(outcome)
    }

    /// Delete every stored ad, then seed fresh samples for every configured
    /// brand. Used on explicit reseed and at first startup.
    pub async fn reseed(&self) -> Result<ReseedOutcome, IngestError> {
        self.store.delete_all_ads().await?;
        for brand in &self.brands.brands {
            for competitor in &brand.competitors {
                let records = self.sampler.generate(
                    &competitor.name,
                    &brand.key,
                    self.settings.seed_sample_count,
                );
                for raw in &records {
                    self.persist_record(raw, &brand.key, &competitor.name).await;
                }
            }
        }
        let ads_seeded = self.store.count_ads().await?;
        info!(ads_seeded, "reseed complete");
        Ok(ReseedOutcome { ads_seeded })
    }

    /// Startup hook: seed sample data when the store is empty.
    pub async fn seed_if_empty(&self) -> Result<bool, IngestError> {
        if self.store.count_ads().await? > 0 {
            return Ok(false);
        }
        info!("store is empty, seeding sample data");
        self.reseed().await?;
        Ok(true)
    }

    /// Compose and persist a weekly brief for one brand from its stored
    /// ads. Fails fast on an unknown brand.
    pub async fn generate_brief(&self, brand_key: &str) -> Result<BriefOutcome, IngestError> {
        let brand = self
            .brands
            .get(brand_key)
            .ok_or_else(|| IngestError::UnknownBrand(brand_key.to_string()))?;
        let ads = self
            .store
            .list_ads(&AdFilter::for_brand(brand_key, 100))
            .await?;

        let now = Utc::now().naive_utc();
        let (brief_text, insights) = compose_brief(brand, &ads);
        self.store
            .save_brief(&NewBrief {
                brand_key: brand_key.to_string(),
                generated_at: now,
                week_start: now - Duration::days(7),
                week_end: now,
                brief_text: brief_text.clone(),
                insights: json!(insights),
                ad_count: ads.len() as i64,
            })
            .await?;

        Ok(BriefOutcome {
            brand_key: brand_key.to_string(),
            brief_text,
            insights,
            generated_at: now,
        })
    }

    /// Current insights for one brand, computed from the stored ads without
    /// persisting a brief.
    pub async fn brand_insights(&self, brand_key: &str) -> Result<Vec<String>, IngestError> {
        let brand = self
            .brands
            .get(brand_key)
            .ok_or_else(|| IngestError::UnknownBrand(brand_key.to_string()))?;
        let ads = self
            .store
            .list_ads(&AdFilter::for_brand(brand_key, 100))
            .await?;
        let (_, insights) = compose_brief(brand, &ads);
        Ok(insights)
    }

    fn resolve_scope(&self, scope: Option<&str>) -> Result<Vec<&BrandConfig>, IngestError> {
        match scope {
            Some(key) => {
                let brand = self
                    .brands
                    .get(key)
                    .ok_or_else(|| IngestError::UnknownBrand(key.to_string()))?;
                Ok(vec![brand])
            }
            None => Ok(self.brands.brands.iter().collect()),
        }
    }

    async fn refresh_from_samples(&self, brands: &[&BrandConfig]) -> FetchOutcome {
        let mut ads_loaded = 0u64;
        for brand in brands {
            for competitor in &brand.competitors {
                let records = self.sampler.generate(
                    &competitor.name,
                    &brand.key,
                    self.settings.refresh_sample_count,
                );
                for raw in &records {
                    ads_loaded += self.persist_record(raw, &brand.key, &competitor.name).await;
                }
            }
        }
        FetchOutcome {
            status: BatchStatus::Success,
            source: DataSource::SampleData,
            ads_loaded,
            errors: Vec::new(),
            message: Some(
                "Sample data refreshed. Configure an ad library credential to fetch live ads."
                    .to_string(),
            ),
        }
    }

    async fn fetch_live(
        &self,
        client: &dyn AdLibrary,
        brands: &[&BrandConfig],
    ) -> Result<FetchOutcome, IngestError> {
        if !client.validate_credential().await? {
            return Err(IngestError::InvalidCredential);
        }

        let mut ads_loaded = 0u64;
        let mut errors = Vec::new();
        for brand in brands {
            for competitor in &brand.competitors {
                let fetched = match client
                    .fetch_records(
                        &competitor.page_search_term,
                        &self.settings.region,
                        self.settings.days_back,
                    )
                    .await
                {
                    Ok(records) => records,
                    Err(err) => {
                        // Unreachable source: isolate the failure to this
                        // competitor and move on, no sample substitution.
                        error!(competitor = %competitor.name, %err, "live fetch failed");
                        errors.push(format!("{}: {err}", competitor.name));
                        continue;
                    }
                };

                let records = if fetched.is_empty() {
                    // Reachable but empty: keep the dashboard populated with
                    // clearly-flagged synthetic records for this competitor.
                    self.sampler.generate(
                        &competitor.name,
                        &brand.key,
                        self.settings.fallback_sample_count,
                    )
                } else {
                    fetched
                };

                for raw in &records {
                    ads_loaded += self.persist_record(raw, &brand.key, &competitor.name).await;
                }
            }
        }

        let status = if errors.is_empty() {
            BatchStatus::Success
        } else {
            BatchStatus::Partial
        };
        errors.truncate(MAX_REPORTED_ERRORS);
        Ok(FetchOutcome {
            status,
            source: DataSource::AdLibrary,
            ads_loaded,
            errors,
            message: None,
        })
    }

    /// Normalize and upsert one record. A persistence failure is logged and
    /// excluded from the count; it never aborts the sibling records in the
    /// batch.
    async fn persist_record(&self, raw: &RawAdRecord, brand_key: &str, competitor: &str) -> u64 {
        let ad = normalize_ad(raw, brand_key, competitor);
        match self.store.upsert_ad(&ad).await {
            Ok(()) => 1,
            Err(err) => {
                error!(ad_id = %ad.id, competitor, %err, "failed to persist ad");
                0
            }
        }
    }
}

/// Deterministic weekly brief from a brand's stored ads: totals, media mix,
/// dominant themes, and the standout long-runner.
pub fn compose_brief(brand: &BrandConfig, ads: &[CanonicalAd]) -> (String, Vec<String>) {
    let total = ads.len();
    let active = ads.iter().filter(|a| a.is_active).count();
    let top_performers = ads.iter().filter(|a| a.is_top_performer).count();

    let mut media_counts = std::collections::BTreeMap::new();
    let mut theme_counts = std::collections::BTreeMap::new();
    for ad in ads {
        *media_counts.entry(ad.media_type.as_str()).or_insert(0usize) += 1;
        if let Some(theme) = &ad.theme {
            *theme_counts.entry(theme.clone()).or_insert(0usize) += 1;
        }
    }
    let dominant_media = media_counts
        .iter()
        .max_by_key(|(_, n)| **n)
        .map(|(k, _)| *k);
    let mut themes_ranked: Vec<_> = theme_counts.into_iter().collect();
    themes_ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let longest = ads.iter().max_by_key(|a| a.run_days);

    let mut insights = Vec::new();
    insights.push(format!(
        "{total} competitor ads tracked, {active} currently active"
    ));
    if let Some(media) = dominant_media {
        insights.push(format!("{media} is the dominant creative format"));
    }
    if let Some((theme, count)) = themes_ranked.first() {
        insights.push(format!("'{theme}' leads the messaging mix ({count} ads)"));
    }
    if let Some(ad) = longest {
        if ad.run_days > 0 {
            insights.push(format!(
                "{} has kept one ad running for {} days",
                ad.competitor_name, ad.run_days
            ));
        }
    }
    if top_performers > 0 {
        insights.push(format!(
            "{top_performers} ads have crossed the 30-day top-performer threshold"
        ));
    }

    let mut lines = vec![
        format!("# Weekly Brief: {}", brand.display_name),
        String::new(),
        format!(
            "Competitive picture for {} ({}). {} ads tracked across {} competitors.",
            brand.display_name,
            brand.category,
            total,
            brand.competitors.len()
        ),
        String::new(),
        "## Key signals".to_string(),
    ];
    for insight in &insights {
        lines.push(format!("- {insight}"));
    }
    if total == 0 {
        lines.push("- No ads stored yet; run a fetch or reseed first.".to_string());
    }

    (lines.join("\n"), insights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    #[derive(Clone)]
    enum Script {
        Records(Vec<RawAdRecord>),
        Empty,
        Fail,
    }

    /// Scripted stand-in for the Graph client, keyed by search term.
    struct ScriptedLibrary {
        valid: bool,
        scripts: HashMap<String, Script>,
    }

    impl ScriptedLibrary {
        fn valid(scripts: Vec<(&str, Script)>) -> Self {
            Self {
                valid: true,
                scripts: scripts
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
            }
        }

        fn invalid() -> Self {
            Self {
                valid: false,
                scripts: HashMap::new(),
            }
        }
    }

    #[async_trait]
    impl AdLibrary for ScriptedLibrary {
        async fn validate_credential(&self) -> Result<bool, AdLibraryError> {
            Ok(self.valid)
        }

        async fn fetch_records(
            &self,
            search_term: &str,
            _region: &str,
            _days_back: i64,
        ) -> Result<Vec<RawAdRecord>, AdLibraryError> {
            match self.scripts.get(search_term) {
                Some(Script::Records(records)) => Ok(records.clone()),
                Some(Script::Empty) | None => Ok(Vec::new()),
                Some(Script::Fail) => Err(AdLibraryError::Status {
                    status: 500,
                    url: format!("https://graph.test/ads_archive?q={search_term}"),
                }),
            }
        }
    }

    fn live_record(id: &str) -> RawAdRecord {
        RawAdRecord {
            id: Some(id.to_string()),
            page_name: Some("Live Page".into()),
            ad_creative_bodies: Some(vec!["live creative".into()]),
            ad_delivery_start_time: Some("2024-04-01T00:00:00+0000".into()),
            ..Default::default()
        }
    }

    fn one_brand_book(competitors: &[(&str, &str)]) -> BrandBook {
        BrandBook {
            brands: vec![BrandConfig {
                key: "man_matters".into(),
                display_name: "Man Matters".into(),
                category: "Men's wellness".into(),
                target_audience: "Men 22-45".into(),
                competitors: competitors
                    .iter()
                    .map(|(name, search)| CompetitorConfig {
                        name: name.to_string(),
                        page_search_term: search.to_string(),
                    })
                    .collect(),
            }],
        }
    }

    async fn service(brands: BrandBook) -> IngestService {
        IngestService::new(brands, AdStore::in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn no_credential_refreshes_samples_for_whole_scope() {
        let brands = one_brand_book(&[("A", "a"), ("B", "b"), ("C", "c")]);
        let service = service(brands).await;

        let outcome = service.fetch(Some("man_matters")).await.unwrap();
        assert_eq!(outcome.status, BatchStatus::Success);
        assert_eq!(outcome.source, DataSource::SampleData);
        assert_eq!(outcome.ads_loaded, 3 * 15);
        assert!(outcome.errors.is_empty());
        assert_eq!(service.store().count_ads().await.unwrap(), 45);
    }

    #[tokio::test]
    async fn invalid_credential_aborts_before_any_competitor() {
        let brands = one_brand_book(&[("A", "a")]);
        let service = service(brands)
            .await
            .with_live_source(Arc::new(ScriptedLibrary::invalid()));

        let err = service.fetch(Some("man_matters")).await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidCredential));
        assert_eq!(service.store().count_ads().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_live_fetch_substitutes_flagged_samples_for_that_competitor_only() {
        let brands = one_brand_book(&[("Quiet Co", "quiet"), ("Loud Co", "loud")]);
        let library = ScriptedLibrary::valid(vec![
            ("quiet", Script::Empty),
            (
                "loud",
                Script::Records(vec![live_record("live_1"), live_record("live_2")]),
            ),
        ]);
        let service = service(brands).await.with_live_source(Arc::new(library));

        let outcome = service.fetch(Some("man_matters")).await.unwrap();
        assert_eq!(outcome.status, BatchStatus::Success);
        assert_eq!(outcome.source, DataSource::AdLibrary);
        assert_eq!(outcome.ads_loaded, 10 + 2);

        let quiet = service
            .store()
            .list_ads(&AdFilter {
                competitor_name: Some("Quiet Co".into()),
                limit: 100,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(quiet.len(), 10);
        assert!(quiet.iter().all(|ad| ad.is_sample));

        let loud = service
            .store()
            .list_ads(&AdFilter {
                competitor_name: Some("Loud Co".into()),
                limit: 100,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(loud.len(), 2);
        assert!(loud.iter().all(|ad| !ad.is_sample));
    }

    #[tokio::test]
    async fn failing_competitor_is_skipped_and_reported() {
        let brands = one_brand_book(&[("Broken Co", "broken"), ("Fine Co", "fine")]);
        let library = ScriptedLibrary::valid(vec![
            ("broken", Script::Fail),
            ("fine", Script::Records(vec![live_record("live_9")])),
        ]);
        let service = service(brands).await.with_live_source(Arc::new(library));

        let outcome = service.fetch(Some("man_matters")).await.unwrap();
        assert_eq!(outcome.status, BatchStatus::Partial);
        assert_eq!(outcome.ads_loaded, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("Broken Co:"));

        let broken = service
            .store()
            .list_ads(&AdFilter {
                competitor_name: Some("Broken Co".into()),
                limit: 100,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(broken.is_empty());
    }

    #[tokio::test]
    async fn reported_errors_are_capped_at_five() {
        let competitors: Vec<(String, String)> = (0..7)
            .map(|i| (format!("Comp {i}"), format!("search{i}")))
            .collect();
        let refs: Vec<(&str, &str)> = competitors
            .iter()
            .map(|(a, b)| (a.as_str(), b.as_str()))
            .collect();
        let brands = one_brand_book(&refs);
        let scripts = refs.iter().map(|(_, s)| (*s, Script::Fail)).collect();
        let service = service(brands)
            .await
            .with_live_source(Arc::new(ScriptedLibrary::valid(scripts)));

        let outcome = service.fetch(Some("man_matters")).await.unwrap();
        assert_eq!(outcome.status, BatchStatus::Partial);
        assert_eq!(outcome.ads_loaded, 0);
        assert_eq!(outcome.errors.len(), 5);
    }

    #[tokio::test]
    async fn unknown_brand_scope_is_fatal() {
        let service = service(BrandBook::builtin()).await;
        let err = service.fetch(Some("nope")).await.unwrap_err();
        assert!(matches!(err, IngestError::UnknownBrand(key) if key == "nope"));
    }

    #[tokio::test]
    async fn reseed_is_idempotent_across_runs() {
        let service = service(BrandBook::builtin()).await;
        let first = service.reseed().await.unwrap();
        assert_eq!(first.ads_seeded, 9 * 15);
        let second = service.reseed().await.unwrap();
        assert_eq!(second.ads_seeded, first.ads_seeded);
    }

    #[tokio::test]
    async fn seed_if_empty_runs_only_once() {
        let service = service(BrandBook::builtin()).await;
        assert!(service.seed_if_empty().await.unwrap());
        let count = service.store().count_ads().await.unwrap();
        assert!(count > 0);
        assert!(!service.seed_if_empty().await.unwrap());
        assert_eq!(service.store().count_ads().await.unwrap(), count);
    }

    #[tokio::test]
    async fn brief_generation_persists_and_summarizes() {
        let service = service(BrandBook::builtin()).await;
        service.reseed().await.unwrap();

        let brief = service.generate_brief("man_matters").await.unwrap();
        assert!(brief.brief_text.contains("Man Matters"));
        assert!(!brief.insights.is_empty());

        let stored = service
            .store()
            .latest_brief("man_matters")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.brief_text, brief.brief_text);
        assert!(stored.ad_count > 0);
    }

    #[tokio::test]
    async fn insights_summarize_without_persisting_a_brief() {
        let service = service(BrandBook::builtin()).await;
        service.reseed().await.unwrap();

        let insights = service.brand_insights("man_matters").await.unwrap();
        assert!(!insights.is_empty());
        assert!(insights[0].contains("45 competitor ads tracked"));
        assert!(service
            .store()
            .latest_brief("man_matters")
            .await
            .unwrap()
            .is_none());

        let err = service.brand_insights("nope").await.unwrap_err();
        assert!(matches!(err, IngestError::UnknownBrand(_)));
    }

    #[tokio::test]
    async fn brief_for_unknown_brand_is_fatal() {
        let service = service(BrandBook::builtin()).await;
        let err = service.generate_brief("nope").await.unwrap_err();
        assert!(matches!(err, IngestError::UnknownBrand(_)));
    }

    #[test]
    fn builtin_brand_book_is_well_formed() {
        let book = BrandBook::builtin();
        assert_eq!(book.brands.len(), 3);
        for brand in &book.brands {
            assert!(!brand.competitors.is_empty());
            assert!(book.get(&brand.key).is_some());
        }
        assert!(book.get("missing").is_none());
    }

    #[test]
    fn compose_brief_handles_empty_store() {
        let book = BrandBook::builtin();
        let (text, insights) = compose_brief(book.get("man_matters").unwrap(), &[]);
        assert!(text.contains("No ads stored yet"));
        assert_eq!(insights.len(), 1);
    }
}
