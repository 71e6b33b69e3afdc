//! Core domain model and ad normalization logic for the war room.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const CRATE_NAME: &str = "warroom-core";

/// Run duration (in days) above which an ad counts as a top performer.
pub const TOP_PERFORMER_MIN_RUN_DAYS: i64 = 30;

/// Normalized creative format. Anything the source reports that we do not
/// recognize collapses to `Image`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaType {
    #[default]
    Image,
    Video,
    Carousel,
}

impl MediaType {
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_uppercase()).as_deref() {
            Some("VIDEO") => MediaType::Video,
            Some("CAROUSEL") => MediaType::Carousel,
            _ => MediaType::Image,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "IMAGE",
            MediaType::Video => "VIDEO",
            MediaType::Carousel => "CAROUSEL",
        }
    }
}

/// Raw ad record as delivered by the Ad Library API or the sample generator.
///
/// Every field is optional; unknown keys in the source payload are ignored.
/// The underscore-prefixed hints are only ever written by the sample
/// generator and take precedence over the derived values during
/// normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAdRecord {
    pub id: Option<String>,
    pub page_name: Option<String>,
    pub page_id: Option<String>,
    pub ad_creative_bodies: Option<Vec<String>>,
    pub ad_creative_link_titles: Option<Vec<String>>,
    pub ad_creative_link_descriptions: Option<Vec<String>>,
    pub media_type: Option<String>,
    pub publisher_platforms: Option<Vec<String>>,
    pub languages: Option<Vec<String>>,
    pub ad_creation_time: Option<String>,
    pub ad_delivery_start_time: Option<String>,
    pub ad_delivery_stop_time: Option<String>,
    pub spend: Option<JsonValue>,
    pub impressions: Option<JsonValue>,
    pub ad_snapshot_url: Option<String>,
    pub theme: Option<String>,
    #[serde(rename = "_theme", skip_serializing_if = "Option::is_none")]
    pub theme_hint: Option<String>,
    #[serde(rename = "_is_active", skip_serializing_if = "Option::is_none")]
    pub active_hint: Option<bool>,
    #[serde(rename = "_run_days", skip_serializing_if = "Option::is_none")]
    pub run_days_hint: Option<i64>,
    #[serde(rename = "_is_sample", skip_serializing_if = "Option::is_none")]
    pub sample_hint: Option<bool>,
}

/// Canonical persisted ad representation.
///
/// Instances are created exclusively by [`normalize_ad`] and mutated only by
/// re-normalizing and upserting under the same `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalAd {
    pub id: String,
    pub page_name: String,
    pub page_id: String,
    pub brand_key: String,
    pub competitor_name: String,
    pub ad_body: String,
    pub ad_title: String,
    pub ad_description: String,
    pub media_type: MediaType,
    pub publisher_platforms: Vec<String>,
    pub languages: Vec<String>,
    pub ad_creation_time: Option<NaiveDateTime>,
    pub ad_delivery_start_time: Option<NaiveDateTime>,
    pub ad_delivery_stop_time: Option<NaiveDateTime>,
    pub spend_lower: Option<i64>,
    pub spend_upper: Option<i64>,
    pub impressions_lower: Option<i64>,
    pub impressions_upper: Option<i64>,
    pub ad_snapshot_url: Option<String>,
    pub theme: Option<String>,
    pub is_active: bool,
    pub run_days: i64,
    pub is_top_performer: bool,
    pub is_sample: bool,
}

/// Parse one of the timestamp encodings the Ad Library emits into a naive
/// UTC timestamp.
///
/// Accepted forms: RFC 3339 with offset, a `Z` suffix, the legacy `+0000`
/// offset spelling, offset-less `YYYY-MM-DDTHH:MM:SS[.f]`, and bare dates.
/// Malformed input is treated identically to absent input and resolves to
/// `None`; a bad upstream timestamp must never abort ingestion of an
/// otherwise valid record.
pub fn parse_timestamp(input: Option<&str>) -> Option<NaiveDateTime> {
    let raw = input?.trim();
    if raw.is_empty() {
        return None;
    }
    let normalized = raw.replace("+0000", "+00:00");
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Extract `(lower_bound, upper_bound)` from a loosely-typed range object
/// such as `{"lower_bound": "100", "upper_bound": "200"}`.
///
/// The pair is atomic: a non-object value, or either bound failing integer
/// coercion, yields `(None, None)`. An empty mapping counts as absent. A
/// bound that is missing from an otherwise populated mapping coerces to 0,
/// matching the upstream API's sparse payloads.
pub fn parse_bounds(value: Option<&JsonValue>) -> (Option<i64>, Option<i64>) {
    let Some(JsonValue::Object(map)) = value else {
        return (None, None);
    };
    if map.is_empty() {
        return (None, None);
    }
    match (
        coerce_bound(map.get("lower_bound")),
        coerce_bound(map.get("upper_bound")),
    ) {
        (Some(lower), Some(upper)) => (Some(lower), Some(upper)),
        _ => (None, None),
    }
}

fn coerce_bound(value: Option<&JsonValue>) -> Option<i64> {
    match value {
        None => Some(0),
        Some(JsonValue::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(JsonValue::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    }
}

fn first_or_empty(values: Option<&[String]>) -> String {
    values
        .and_then(|v| v.first())
        .cloned()
        .unwrap_or_default()
}

/// Reduce a raw record plus brand/competitor context to the canonical
/// schema, using the current wall clock for derived fields.
pub fn normalize_ad(raw: &RawAdRecord, brand_key: &str, competitor_name: &str) -> CanonicalAd {
    normalize_ad_at(raw, brand_key, competitor_name, Utc::now().naive_utc())
}

/// [`normalize_ad`] with an explicit "now", so run-day derivation is
/// deterministic under test.
///
/// `run_days` uses the stop time when one exists and `now` otherwise, which
/// makes the field grow on every re-ingestion of a still-delivering ad.
/// That is intentional: it tracks wall-clock elapsed delivery time.
pub fn normalize_ad_at(
    raw: &RawAdRecord,
    brand_key: &str,
    competitor_name: &str,
    now: NaiveDateTime,
) -> CanonicalAd {
    let (spend_lower, spend_upper) = parse_bounds(raw.spend.as_ref());
    let (impressions_lower, impressions_upper) = parse_bounds(raw.impressions.as_ref());

    let creation_time = parse_timestamp(raw.ad_creation_time.as_deref());
    // Fall back to the creation time only when no start string was supplied
    // at all; a malformed start string stays None.
    let start_source = raw
        .ad_delivery_start_time
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .or(raw.ad_creation_time.as_deref());
    let start_time = parse_timestamp(start_source);
    let stop_time = parse_timestamp(raw.ad_delivery_stop_time.as_deref());

    let is_active = raw.active_hint.unwrap_or(stop_time.is_none());
    let run_days = raw
        .run_days_hint
        .or_else(|| start_time.map(|start| (stop_time.unwrap_or(now) - start).num_days()))
        .unwrap_or(0);

    let id = raw.id.clone().unwrap_or_else(|| {
        // Last-resort identity for sample/demo records; live records always
        // carry an external id.
        format!("ad_{}_{}", now.and_utc().timestamp(), competitor_name)
    });

    CanonicalAd {
        id,
        page_name: raw
            .page_name
            .clone()
            .unwrap_or_else(|| competitor_name.to_string()),
        page_id: raw.page_id.clone().unwrap_or_default(),
        brand_key: brand_key.to_string(),
        competitor_name: competitor_name.to_string(),
        ad_body: first_or_empty(raw.ad_creative_bodies.as_deref()),
        ad_title: first_or_empty(raw.ad_creative_link_titles.as_deref()),
        ad_description: first_or_empty(raw.ad_creative_link_descriptions.as_deref()),
        media_type: MediaType::from_raw(raw.media_type.as_deref()),
        publisher_platforms: raw
            .publisher_platforms
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| vec!["facebook".to_string()]),
        languages: raw
            .languages
            .clone()
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| vec!["en".to_string()]),
        ad_creation_time: creation_time,
        ad_delivery_start_time: start_time,
        ad_delivery_stop_time: stop_time,
        spend_lower,
        spend_upper,
        impressions_lower,
        impressions_upper,
        ad_snapshot_url: raw.ad_snapshot_url.clone(),
        theme: raw.theme.clone().or_else(|| raw.theme_hint.clone()),
        is_active,
        run_days,
        is_top_performer: run_days > TOP_PERFORMER_MIN_RUN_DAYS,
        is_sample: raw.sample_hint.unwrap_or(false),
    }
}

/// A creative theme in the fixed taxonomy exposed to the filter UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThemeInfo {
    pub key: &'static str,
    pub label: &'static str,
    pub description: &'static str,
}

pub const THEME_CATALOG: &[ThemeInfo] = &[
    ThemeInfo {
        key: "ugc_testimonial",
        label: "UGC / Testimonial",
        description: "Real customer stories",
    },
    ThemeInfo {
        key: "doctor_authority",
        label: "Doctor / Expert Authority",
        description: "Clinical/professional backing",
    },
    ThemeInfo {
        key: "offer_promo",
        label: "Offer / Promo",
        description: "Discounts and deals",
    },
    ThemeInfo {
        key: "ingredient_science",
        label: "Ingredient Science",
        description: "Science-backed claims",
    },
    ThemeInfo {
        key: "community_story",
        label: "Community Story",
        description: "Social proof at scale",
    },
    ThemeInfo {
        key: "before_after",
        label: "Before / After",
        description: "Transformation results",
    },
    ThemeInfo {
        key: "parent_reassurance",
        label: "Parent Reassurance",
        description: "Parenting/safety focused",
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn test_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn timestamps_with_legacy_offset_and_z_suffix_agree() {
        let a = parse_timestamp(Some("2024-01-15T10:00:00+0000"));
        let b = parse_timestamp(Some("2024-01-15T10:00:00Z"));
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[test]
    fn timestamps_with_nonzero_offset_convert_to_utc() {
        let got = parse_timestamp(Some("2024-01-15T10:00:00+05:30")).unwrap();
        assert_eq!(
            got,
            NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(4, 30, 0)
                .unwrap()
        );
    }

    #[test]
    fn offsetless_and_date_only_timestamps_parse() {
        assert!(parse_timestamp(Some("2024-01-15T10:00:00")).is_some());
        let midnight = parse_timestamp(Some("2024-01-15")).unwrap();
        assert_eq!(
            midnight,
            NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn malformed_timestamps_fail_silently_to_none() {
        assert_eq!(parse_timestamp(None), None);
        assert_eq!(parse_timestamp(Some("")), None);
        assert_eq!(parse_timestamp(Some("   ")), None);
        assert_eq!(parse_timestamp(Some("not-a-date")), None);
        assert_eq!(parse_timestamp(Some("15/01/2024")), None);
    }

    #[test]
    fn bounds_absent_mapping_is_null_pair() {
        assert_eq!(parse_bounds(None), (None, None));
        assert_eq!(parse_bounds(Some(&json!("100-200"))), (None, None));
        assert_eq!(parse_bounds(Some(&json!(42))), (None, None));
    }

    #[test]
    fn bounds_empty_mapping_behaves_as_absent() {
        assert_eq!(parse_bounds(Some(&json!({}))), (None, None));
        // A populated mapping without either bound key still gets the
        // zero defaults.
        let unrelated = json!({"currency": "INR"});
        assert_eq!(parse_bounds(Some(&unrelated)), (Some(0), Some(0)));
    }

    #[test]
    fn bounds_coerce_numeric_strings() {
        let spend = json!({"lower_bound": "100", "upper_bound": "200"});
        assert_eq!(parse_bounds(Some(&spend)), (Some(100), Some(200)));
    }

    #[test]
    fn bounds_accept_numbers_and_default_missing_keys_to_zero() {
        let spend = json!({"lower_bound": 500, "upper_bound": 999});
        assert_eq!(parse_bounds(Some(&spend)), (Some(500), Some(999)));
        let sparse = json!({"upper_bound": "200"});
        assert_eq!(parse_bounds(Some(&sparse)), (Some(0), Some(200)));
    }

    #[test]
    fn bounds_pair_is_atomic_on_partial_failure() {
        let bad_upper = json!({"lower_bound": "100", "upper_bound": "lots"});
        assert_eq!(parse_bounds(Some(&bad_upper)), (None, None));
        let null_lower = json!({"lower_bound": null, "upper_bound": "200"});
        assert_eq!(parse_bounds(Some(&null_lower)), (None, None));
    }

    #[test]
    fn missing_spend_yields_null_pair_on_normalized_ad() {
        let raw = RawAdRecord {
            id: Some("a1".into()),
            ..Default::default()
        };
        let ad = normalize_ad_at(&raw, "brand", "Comp", test_now());
        assert_eq!((ad.spend_lower, ad.spend_upper), (None, None));
        assert_eq!((ad.impressions_lower, ad.impressions_upper), (None, None));
    }

    #[test]
    fn creative_lists_reduce_to_first_element() {
        let raw = RawAdRecord {
            id: Some("a1".into()),
            ad_creative_bodies: Some(vec!["first body".into(), "variant".into()]),
            ad_creative_link_titles: Some(vec![]),
            ..Default::default()
        };
        let ad = normalize_ad_at(&raw, "brand", "Comp", test_now());
        assert_eq!(ad.ad_body, "first body");
        assert_eq!(ad.ad_title, "");
        assert_eq!(ad.ad_description, "");
    }

    #[test]
    fn media_type_defaults_to_image_for_unknown_values() {
        assert_eq!(MediaType::from_raw(None), MediaType::Image);
        assert_eq!(MediaType::from_raw(Some("")), MediaType::Image);
        assert_eq!(MediaType::from_raw(Some("unknown")), MediaType::Image);
        assert_eq!(MediaType::from_raw(Some("video")), MediaType::Video);
        assert_eq!(MediaType::from_raw(Some("CAROUSEL")), MediaType::Carousel);
    }

    #[test]
    fn platform_and_language_defaults_apply() {
        let ad = normalize_ad_at(
            &RawAdRecord {
                id: Some("a1".into()),
                ..Default::default()
            },
            "brand",
            "Comp",
            test_now(),
        );
        assert_eq!(ad.publisher_platforms, vec!["facebook".to_string()]);
        assert_eq!(ad.languages, vec!["en".to_string()]);
    }

    #[test]
    fn active_when_no_stop_time_and_no_override() {
        let raw = RawAdRecord {
            id: Some("a1".into()),
            ad_delivery_start_time: Some("2024-05-01T00:00:00Z".into()),
            ..Default::default()
        };
        let ad = normalize_ad_at(&raw, "brand", "Comp", test_now());
        assert!(ad.is_active);
    }

    #[test]
    fn explicit_override_beats_derived_activity() {
        let raw = RawAdRecord {
            id: Some("a1".into()),
            ad_delivery_start_time: Some("2024-05-01T00:00:00Z".into()),
            active_hint: Some(false),
            ..Default::default()
        };
        let ad = normalize_ad_at(&raw, "brand", "Comp", test_now());
        assert!(!ad.is_active);
    }

    #[test]
    fn run_days_uses_stop_time_when_present() {
        let raw = RawAdRecord {
            id: Some("a1".into()),
            ad_delivery_start_time: Some("2024-01-01T00:00:00Z".into()),
            ad_delivery_stop_time: Some("2024-01-11T00:00:00Z".into()),
            ..Default::default()
        };
        let ad = normalize_ad_at(&raw, "brand", "Comp", test_now());
        assert_eq!(ad.run_days, 10);
        assert!(!ad.is_active);
    }

    #[test]
    fn run_days_zero_when_start_missing() {
        let ad = normalize_ad_at(
            &RawAdRecord {
                id: Some("a1".into()),
                ..Default::default()
            },
            "brand",
            "Comp",
            test_now(),
        );
        assert_eq!(ad.run_days, 0);
        assert!(!ad.is_top_performer);
    }

    #[test]
    fn top_performer_matches_run_day_threshold_exactly() {
        for (start, expect_top) in [
            ("2024-05-10T12:00:00Z", false), // 22 days
            ("2024-05-02T12:00:00Z", false), // exactly 30 days
            ("2024-04-01T12:00:00Z", true),  // 61 days
        ] {
            let raw = RawAdRecord {
                id: Some("a1".into()),
                ad_delivery_start_time: Some(start.into()),
                ..Default::default()
            };
            let ad = normalize_ad_at(&raw, "brand", "Comp", test_now());
            assert_eq!(ad.is_top_performer, ad.run_days > 30);
            assert_eq!(ad.is_top_performer, expect_top, "start={start}");
        }
    }

    #[test]
    fn run_days_hint_overrides_derivation() {
        let raw = RawAdRecord {
            id: Some("a1".into()),
            ad_delivery_start_time: Some("2024-05-30T00:00:00Z".into()),
            run_days_hint: Some(45),
            ..Default::default()
        };
        let ad = normalize_ad_at(&raw, "brand", "Comp", test_now());
        assert_eq!(ad.run_days, 45);
        assert!(ad.is_top_performer);
    }

    #[test]
    fn start_time_falls_back_to_creation_time() {
        let raw = RawAdRecord {
            id: Some("a1".into()),
            ad_creation_time: Some("2024-05-01T00:00:00Z".into()),
            ..Default::default()
        };
        let ad = normalize_ad_at(&raw, "brand", "Comp", test_now());
        assert_eq!(ad.ad_delivery_start_time, ad.ad_creation_time);
        assert_eq!(ad.run_days, 31);
    }

    #[test]
    fn missing_id_is_synthesized_from_timestamp_and_competitor() {
        let ad = normalize_ad_at(&RawAdRecord::default(), "brand", "Acme", test_now());
        assert_eq!(
            ad.id,
            format!("ad_{}_Acme", test_now().and_utc().timestamp())
        );
    }

    #[test]
    fn sample_hint_flags_record_as_synthetic() {
        let raw = RawAdRecord {
            id: Some("a1".into()),
            sample_hint: Some(true),
            theme_hint: Some("offer_promo".into()),
            ..Default::default()
        };
        let ad = normalize_ad_at(&raw, "brand", "Comp", test_now());
        assert!(ad.is_sample);
        assert_eq!(ad.theme.as_deref(), Some("offer_promo"));
    }

    #[test]
    fn unknown_payload_keys_are_ignored() {
        let raw: RawAdRecord = serde_json::from_value(json!({
            "id": "123",
            "page_name": "Acme",
            "estimated_audience_size": {"lower_bound": "1000"},
            "bylines": "Acme Inc",
        }))
        .unwrap();
        assert_eq!(raw.id.as_deref(), Some("123"));
        assert_eq!(raw.page_name.as_deref(), Some("Acme"));
    }

    #[test]
    fn full_record_normalizes_end_to_end() {
        let raw: RawAdRecord = serde_json::from_value(json!({
            "id": "884422",
            "page_name": "Traya Health",
            "page_id": "1010",
            "ad_creative_bodies": ["Regrow with science."],
            "ad_creative_link_titles": ["Hair Test"],
            "ad_creative_link_descriptions": ["Free dermatologist plan"],
            "media_type": "VIDEO",
            "publisher_platforms": ["facebook", "instagram"],
            "languages": ["en", "hi"],
            "ad_creation_time": "2024-04-01T08:00:00+0000",
            "ad_delivery_start_time": "2024-04-02T08:00:00Z",
            "spend": {"lower_bound": "100", "upper_bound": "200"},
            "impressions": {"lower_bound": 5000, "upper_bound": 10000},
            "ad_snapshot_url": "https://example.test/snapshot/884422",
            "theme": "ingredient_science",
        }))
        .unwrap();
        let ad = normalize_ad_at(&raw, "traya", "Traya Health", test_now());

        assert_eq!(ad.id, "884422");
        assert_eq!(ad.media_type, MediaType::Video);
        assert_eq!((ad.spend_lower, ad.spend_upper), (Some(100), Some(200)));
        assert_eq!(
            (ad.impressions_lower, ad.impressions_upper),
            (Some(5000), Some(10000))
        );
        assert_eq!(ad.run_days, 60);
        assert!(ad.is_active);
        assert!(ad.is_top_performer);
        assert!(!ad.is_sample);
        assert_eq!(ad.theme.as_deref(), Some("ingredient_science"));
    }
}
