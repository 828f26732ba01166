//! Showcase sources (HTTP API and fixture file) plus tour payload normalization.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tourbridge_core::{ItemId, TourRecord};
use uuid::Uuid;

mod http;

pub use http::{
    classify_reqwest_error, classify_status, BackoffPolicy, FetchError, HttpClientConfig,
    HttpFetcher, RetryDisposition,
};

pub const CRATE_NAME: &str = "tourbridge-remote";

/// Upper bound the showcase API accepts in place of real pagination.
pub const LIST_LIMIT: u64 = 99_999_999;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unexpected response shape: {0}")]
    Shape(String),
}

/// Remote source of truth for the tours of one showcase.
#[async_trait]
pub trait ShowcaseSource: Send + Sync {
    /// Distinct tour IDs published in `showcase`, ascending.
    async fn list_tour_ids(&self, run_id: Uuid, showcase: &str)
        -> Result<Vec<ItemId>, SourceError>;

    /// Full payload for one tour, or `None` when the showcase no longer has it.
    async fn fetch_tour(
        &self,
        run_id: Uuid,
        showcase: &str,
        id: ItemId,
    ) -> Result<Option<JsonValue>, SourceError>;
}

#[derive(Debug, Clone)]
pub struct ApiShowcaseSource {
    base_url: String,
    http: HttpFetcher,
}

impl ApiShowcaseSource {
    pub fn new(base_url: impl Into<String>, http: HttpFetcher) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }
}

#[async_trait]
impl ShowcaseSource for ApiShowcaseSource {
    async fn list_tour_ids(
        &self,
        run_id: Uuid,
        showcase: &str,
    ) -> Result<Vec<ItemId>, SourceError> {
        let body = self
            .http
            .get_json(
                run_id,
                showcase,
                &self.endpoint("getTours"),
                &[
                    ("offset", "0".to_string()),
                    ("limit", LIST_LIMIT.to_string()),
                    ("showcase", showcase.to_string()),
                ],
            )
            .await?;
        tour_ids_from_listing(&body)
    }

    async fn fetch_tour(
        &self,
        run_id: Uuid,
        showcase: &str,
        id: ItemId,
    ) -> Result<Option<JsonValue>, SourceError> {
        let body = self
            .http
            .get_json(
                run_id,
                showcase,
                &self.endpoint("getTour"),
                &[
                    ("id", id.0.to_string()),
                    ("showcase", showcase.to_string()),
                ],
            )
            .await?;
        Ok(tour_from_detail(body))
    }
}

/// Parses `{"tours": [{"id": ..}, ..]}`. A missing `tours` key is an empty showcase.
pub fn tour_ids_from_listing(body: &JsonValue) -> Result<Vec<ItemId>, SourceError> {
    let Some(tours) = body.get("tours") else {
        return Ok(Vec::new());
    };
    let tours = tours
        .as_array()
        .ok_or_else(|| SourceError::Shape("`tours` is not an array".to_string()))?;

    let mut ids = BTreeSet::new();
    for tour in tours {
        let id = tour
            .get("id")
            .and_then(json_i64)
            .ok_or_else(|| SourceError::Shape(format!("tour entry without numeric id: {tour}")))?;
        ids.insert(ItemId(id));
    }
    Ok(ids.into_iter().collect())
}

/// Extracts `tour` from a detail response; `false`, `null` or absence mean not found.
pub fn tour_from_detail(mut body: JsonValue) -> Option<JsonValue> {
    match body.get_mut("tour").map(JsonValue::take) {
        Some(JsonValue::Object(map)) => Some(JsonValue::Object(map)),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowcaseFixture {
    pub showcase: String,
    #[serde(default)]
    pub tours: Vec<JsonValue>,
}

/// Offline source backed by a JSON fixture file.
#[derive(Debug, Clone)]
pub struct FixtureShowcaseSource {
    fixture: ShowcaseFixture,
}

impl FixtureShowcaseSource {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let fixture: ShowcaseFixture =
            serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Self { fixture })
    }

    pub fn showcase(&self) -> &str {
        &self.fixture.showcase
    }
}

#[async_trait]
impl ShowcaseSource for FixtureShowcaseSource {
    async fn list_tour_ids(
        &self,
        _run_id: Uuid,
        showcase: &str,
    ) -> Result<Vec<ItemId>, SourceError> {
        if showcase != self.fixture.showcase {
            return Ok(Vec::new());
        }
        let listing = serde_json::json!({ "tours": self.fixture.tours });
        tour_ids_from_listing(&listing)
    }

    async fn fetch_tour(
        &self,
        _run_id: Uuid,
        showcase: &str,
        id: ItemId,
    ) -> Result<Option<JsonValue>, SourceError> {
        if showcase != self.fixture.showcase {
            return Ok(None);
        }
        Ok(self
            .fixture
            .tours
            .iter()
            .find(|tour| tour.get("id").and_then(json_i64) == Some(id.0))
            .cloned())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PrepareError {
    #[error("tour payload is not an object")]
    NotAnObject,
    #[error("tour payload has no numeric id")]
    MissingId,
    #[error("tour payload id {found} does not match requested id {expected}")]
    IdMismatch { expected: i64, found: i64 },
    #[error("tour {0} has no title")]
    MissingTitle(i64),
}

/// Normalizes a raw tour payload into the record persisted by the upsert step.
pub fn prepare_tour(
    expected: ItemId,
    payload: JsonValue,
    synced_at: DateTime<Utc>,
) -> Result<TourRecord, PrepareError> {
    if !payload.is_object() {
        return Err(PrepareError::NotAnObject);
    }
    let id = payload
        .get("id")
        .and_then(json_i64)
        .ok_or(PrepareError::MissingId)?;
    if id != expected.0 {
        return Err(PrepareError::IdMismatch {
            expected: expected.0,
            found: id,
        });
    }

    let title = json_str(&payload, &["title"])
        .or_else(|| json_str(&payload, &["name"]))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(PrepareError::MissingTitle(id))?
        .to_string();

    let alias = json_str(&payload, &["alias"])
        .map(slugify)
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| slugify(&title));
    let alias = if alias.is_empty() {
        format!("tour-{id}")
    } else {
        alias
    };

    let description = json_str(&payload, &["description"])
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);
    let price_from =
        json_f64(&payload, &["price", "from"]).or_else(|| json_f64(&payload, &["price_from"]));
    let currency = json_str(&payload, &["price", "currency"])
        .or_else(|| json_str(&payload, &["currency"]))
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty());
    let duration_days = json_f64(&payload, &["duration_days"])
        .or_else(|| json_f64(&payload, &["duration"]))
        .filter(|d| *d >= 0.0 && *d <= f64::from(u32::MAX))
        .map(|d| d as u32);

    Ok(TourRecord {
        id: ItemId(id),
        title,
        alias,
        description,
        price_from,
        currency,
        duration_days,
        payload,
        synced_at,
    })
}

pub fn slugify(input: &str) -> String {
    input
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

fn json_i64(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_lookup<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut cur = value;
    for key in path {
        cur = cur.get(*key)?;
    }
    Some(cur)
}

fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    json_lookup(value, path)?.as_str()
}

fn json_f64(value: &JsonValue, path: &[&str]) -> Option<f64> {
    match json_lookup(value, path)? {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
