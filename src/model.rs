//! Payloads returned by the admin endpoints.
//!
//! Histogram data comes in two wire generations. `Legacy` servers return a
//! bare array of camelCase buckets and publish statistics only through the
//! flat `metrics.json` map (`{name}.avg`, `{name}.p9990`). `Current` servers
//! key bucket arrays by histogram name, use snake_case limits and serve a
//! nested summary from `histograms.json?summary=1`.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::error::PollError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum WireVersion {
    Legacy,
    #[default]
    Current,
}

/// One `{name, value|delta}` entry of a live metrics response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricSample {
    pub name: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub delta: Option<f64>,
}

impl MetricSample {
    /// The delta if the endpoint sent one, otherwise the gauge value.
    pub fn reading(&self) -> Option<f64> {
        self.delta.or(self.value)
    }
}

/// First sample whose name contains `pattern`.
pub fn find_matching<'a>(samples: &'a [MetricSample], pattern: &str) -> Option<&'a MetricSample> {
    samples.iter().find(|s| s.name.contains(pattern))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub percentage: f64,
}

impl Bucket {
    pub fn midpoint(&self) -> f64 {
        (self.lower_limit + self.upper_limit) / 2.0
    }
}

#[derive(Deserialize)]
struct CurrentBucket {
    lower_limit: f64,
    upper_limit: f64,
    percentage: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyBucket {
    lower_limit: f64,
    upper_limit: f64,
    percentage: f64,
}

/// Decode a histogram data response into buckets for `name`.
///
/// A current-format response without an entry for `name` yields no buckets.
pub fn decode_buckets(
    version: WireVersion,
    name: &str,
    body: &str,
) -> Result<Vec<Bucket>, PollError> {
    let buckets = match version {
        WireVersion::Current => {
            let mut map: HashMap<String, Vec<CurrentBucket>> = serde_json::from_str(body)?;
            map.remove(name)
                .unwrap_or_default()
                .into_iter()
                .map(|b| Bucket {
                    lower_limit: b.lower_limit,
                    upper_limit: b.upper_limit,
                    percentage: b.percentage,
                })
                .collect()
        }
        WireVersion::Legacy => {
            let list: Vec<LegacyBucket> = serde_json::from_str(body)?;
            list.into_iter()
                .map(|b| Bucket {
                    lower_limit: b.lower_limit,
                    upper_limit: b.upper_limit,
                    percentage: b.percentage,
                })
                .collect()
        }
    };

    Ok(buckets)
}

/// `(midpoint, percentage)` pairs ready to plot.
pub fn plot_points(buckets: &[Bucket]) -> Vec<(f64, f64)> {
    buckets.iter().map(|b| (b.midpoint(), b.percentage)).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Percentiles {
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub p999: Option<f64>,
    pub p9999: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HistogramSummary {
    pub name: Option<String>,
    pub count: Option<f64>,
    pub sum: Option<f64>,
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub percentiles: Option<Percentiles>,
}

// A direct summary carries numeric fields, so it never parses as a map of
// summaries; the keyed form has to be tried first.
#[derive(Deserialize)]
#[serde(untagged)]
enum SummaryBody {
    Keyed(HashMap<String, HistogramSummary>),
    Direct(HistogramSummary),
}

pub fn decode_summary(name: &str, body: &str) -> Result<HistogramSummary, PollError> {
    Ok(match serde_json::from_str::<SummaryBody>(body)? {
        SummaryBody::Direct(summary) => summary,
        SummaryBody::Keyed(mut map) => map.remove(name).unwrap_or_default(),
    })
}

/// Flat `metrics.json` map, non-numeric entries dropped.
pub type FlatMetrics = BTreeMap<String, f64>;

pub fn decode_flat(body: &str) -> Result<FlatMetrics, PollError> {
    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(body)?;
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| v.as_f64().map(|v| (k, v)))
        .collect())
}

/// Statistics shown next to a histogram. Missing fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsTable {
    pub count: Option<f64>,
    pub sum: Option<f64>,
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub p999: Option<f64>,
    pub p9999: Option<f64>,
}

impl StatisticsTable {
    pub fn from_summary(summary: &HistogramSummary) -> Self {
        let percentiles = summary.percentiles.clone().unwrap_or_default();
        Self {
            count: summary.count,
            sum: summary.sum,
            average: summary.average,
            min: summary.min,
            max: summary.max,
            p50: percentiles.p50,
            p90: percentiles.p90,
            p95: percentiles.p95,
            p99: percentiles.p99,
            p999: percentiles.p999,
            p9999: percentiles.p9999,
        }
    }

    /// Legacy layout: `"{name}.{field}"` keys in `metrics.json`.
    pub fn from_flat(metrics: &FlatMetrics, name: &str) -> Self {
        let field = |f: &str| metrics.get(&format!("{}.{}", name, f)).copied();
        Self {
            count: field("count"),
            sum: field("sum"),
            average: field("avg"),
            min: field("min"),
            max: field("max"),
            p50: field("p50"),
            p90: field("p90"),
            p95: field("p95"),
            p99: field("p99"),
            p999: field("p9990"),
            p9999: field("p9999"),
        }
    }

    /// `(element id, value)` rows in display order.
    pub fn rows(&self) -> [(&'static str, Option<f64>); 11] {
        [
            ("detail_count", self.count),
            ("detail_sum", self.sum),
            ("detail_average", self.average),
            ("detail_min", self.min),
            ("detail_max", self.max),
            ("detail_p50", self.p50),
            ("detail_p90", self.p90),
            ("detail_p95", self.p95),
            ("detail_p99", self.p99),
            ("detail_p999", self.p999),
            ("detail_p9999", self.p9999),
        ]
    }
}

/// Response of the summary query: server highlights and per-client metrics.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSummary {
    #[serde(default)]
    pub server: Vec<MetricSample>,
    #[serde(default)]
    pub clients: Vec<ClientSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSummary {
    pub name: String,
    #[serde(default)]
    pub ports: Vec<serde_json::Value>,
    #[serde(default)]
    pub metrics: Vec<MetricSample>,
}

impl ClientSummary {
    pub fn success_rate(&self) -> Option<f64> {
        let key = format!("clnt/{}/successRate", self.name);
        find_matching(&self.metrics, &key).and_then(MetricSample::reading)
    }

    pub fn port_labels(&self) -> Vec<String> {
        self.ports
            .iter()
            .map(|p| match p {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    }
}
