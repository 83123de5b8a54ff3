//! Carbon-intensity enrichment for Lampyris
//!
//! Joins the regional carbon-intensity dataset onto stored readings that do
//! not have it yet. The gap range reported by the store is split into spans
//! the intensity API accepts, every returned half-hour bucket is collected,
//! and each bucket is applied through the store's null-guarded fill.

use crate::config::IntensityConfig;
use crate::error::{LampyrisError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::store::ReadingStore;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

/// Native bucket width of the intensity dataset in minutes
pub const HALF_HOUR_MINUTES: i64 = 30;

/// Longest span the intensity API accepts per call, in days
pub const MAX_SPAN_DAYS: i64 = 13;

/// One half-hour intensity bucket in the monitored region
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityWindow {
    /// Start of the bucket, inclusive
    pub from: DateTime<Utc>,

    /// End of the bucket, exclusive
    pub to: DateTime<Utc>,

    /// Forecast intensity in gCO2/kWh
    pub forecast: u32,

    /// Intensity band (e.g. "low", "moderate", "high")
    pub index: String,
}

/// Source of regional intensity data
#[async_trait::async_trait]
pub trait IntensityProvider: Send + Sync {
    /// Fetch the half-hour buckets covering `[from, to)`
    async fn fetch_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<IntensityWindow>>;
}

#[derive(Debug, Deserialize)]
struct IntensityResponse {
    data: IntensityRegion,
}

#[derive(Debug, Deserialize)]
struct IntensityRegion {
    data: Vec<IntensityEntry>,
}

#[derive(Debug, Deserialize)]
struct IntensityEntry {
    from: String,
    intensity: IntensityValue,
}

#[derive(Debug, Deserialize)]
struct IntensityValue {
    forecast: Option<u32>,
    index: String,
}

/// Client for the regional carbon-intensity API
pub struct CarbonIntensityClient {
    base_url: String,
    postcode: String,
    client: reqwest::Client,
    logger: StructuredLogger,
}

impl CarbonIntensityClient {
    /// Create a new client from the intensity configuration
    pub fn new(config: &IntensityConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent("lampyris/1.0")
            .build()?;

        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            postcode: config.postcode.clone(),
            client,
            logger: get_logger("carbon"),
        })
    }
}

#[async_trait::async_trait]
impl IntensityProvider for CarbonIntensityClient {
    async fn fetch_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<IntensityWindow>> {
        let url = format!(
            "{}/regional/intensity/{}/{}/postcode/{}",
            self.base_url,
            fmt_query_time(&from),
            fmt_query_time(&to),
            self.postcode
        );

        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            self.logger
                .error(&format!("Intensity API error: {}", resp.status()));
            return Err(LampyrisError::enrichment(format!(
                "Intensity API returned {}",
                resp.status()
            )));
        }

        let body: IntensityResponse = resp.json().await?;
        let mut windows = Vec::with_capacity(body.data.data.len());
        for entry in body.data.data {
            let Some(forecast) = entry.intensity.forecast else {
                self.logger
                    .debug(&format!("Skipping bucket without forecast at {}", entry.from));
                continue;
            };
            let start = parse_bucket_time(&entry.from)?;
            windows.push(IntensityWindow {
                from: start,
                to: start + Duration::minutes(HALF_HOUR_MINUTES),
                forecast,
                index: entry.intensity.index,
            });
        }
        Ok(windows)
    }
}

/// Split `[from, to]` into consecutive sub-ranges no longer than the API cap
///
/// Boundaries step from `from` in fixed increments; the final boundary is
/// always `to` itself, so the sub-ranges cover the span with shared boundary
/// points and no gaps.
pub fn split_range(from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let step = Duration::days(MAX_SPAN_DAYS);
    let mut boundaries = vec![from];
    let mut cursor = from;
    loop {
        let next = cursor + step;
        if next >= to {
            break;
        }
        boundaries.push(next);
        cursor = next;
    }
    boundaries.push(to);

    boundaries.windows(2).map(|pair| (pair[0], pair[1])).collect()
}

/// Fill carbon data onto every stored row still missing it
///
/// Returns the number of rows updated. A fetch failure for one sub-range is
/// tolerated; the pass fails only when every sub-range fetch fails.
pub async fn reconcile(store: &ReadingStore, provider: &dyn IntensityProvider) -> Result<usize> {
    let logger = get_logger("carbon");

    let Some((gap_min, gap_max)) = store.find_gap_range()? else {
        return Ok(0);
    };

    // Push the upper bound past the last unenriched row so the half-open
    // API range still includes its bucket.
    let upper = gap_max + Duration::minutes(HALF_HOUR_MINUTES);
    let spans = split_range(gap_min, upper);

    let mut buckets: Vec<IntensityWindow> = Vec::new();
    let mut failures = 0usize;
    for (from, to) in &spans {
        match provider.fetch_window(*from, *to).await {
            Ok(mut chunk) => buckets.append(&mut chunk),
            Err(e) => {
                failures += 1;
                logger.warn(&format!(
                    "Intensity fetch failed for {} to {}: {}",
                    from, to, e
                ));
            }
        }
    }

    if failures == spans.len() {
        return Err(LampyrisError::enrichment(
            "No intensity sub-range could be fetched",
        ));
    }

    let mut filled = 0usize;
    for bucket in &buckets {
        filled += store.fill_carbon(bucket.forecast, &bucket.index, bucket.from, bucket.to)?;
    }

    if filled > 0 {
        logger.info(&format!(
            "Enriched {} rows from {} intensity buckets",
            filled,
            buckets.len()
        ));
    }
    Ok(filled)
}

fn fmt_query_time(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%MZ").to_string()
}

fn parse_bucket_time(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%MZ") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            LampyrisError::enrichment(format!("Invalid bucket timestamp '{}': {}", value, e))
        })
}
