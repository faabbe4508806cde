//! View parameters and the URLs the dashboard polls.
//!
//! The histogram page keeps its display configuration in the query string of
//! its view URL (`h`, `fmt`, `log_scale`). [`build_url`] and [`parse_params`]
//! are exact inverses of each other.

use std::{fmt, str::FromStr};

use url::Url;

use crate::constants::SUMMARY_METRICS;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlotFormat {
    #[default]
    Cdf,
    Pdf,
}

impl PlotFormat {
    /// Form used in the view URL, e.g. `plot_cdf`.
    pub fn query_value(self) -> &'static str {
        match self {
            PlotFormat::Cdf => "plot_cdf",
            PlotFormat::Pdf => "plot_pdf",
        }
    }

    /// Form used when requesting histogram data, e.g. `cdf`.
    pub fn json_value(self) -> &'static str {
        match self {
            PlotFormat::Cdf => "cdf",
            PlotFormat::Pdf => "pdf",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PlotFormat::Cdf => "CDF",
            PlotFormat::Pdf => "PDF",
        }
    }
}

impl FromStr for PlotFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plot_cdf" | "cdf" => Ok(PlotFormat::Cdf),
            "plot_pdf" | "pdf" => Ok(PlotFormat::Pdf),
            other => Err(ConfigError::InvalidFormat(other.to_string())),
        }
    }
}

impl fmt::Display for PlotFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.query_value())
    }
}

/// User-controlled display configuration of the histogram page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewParams {
    pub metric_name: String,
    pub log_scale: bool,
    pub format: PlotFormat,
}

fn with_view_query(base: &Url, metric_name: &str, fmt: &str, log_scale: bool) -> Url {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.query_pairs_mut()
        .append_pair("h", metric_name)
        .append_pair("fmt", fmt)
        .append_pair("log_scale", if log_scale { "true" } else { "false" });
    url
}

/// Serialize view parameters into `base`, replacing any query it had.
pub fn build_url(base: &Url, metric_name: &str, format: PlotFormat, log_scale: bool) -> Url {
    with_view_query(base, metric_name, format.query_value(), log_scale)
}

/// Parse view parameters from a URL, defaulting `fmt` to `plot_cdf` and
/// `log_scale` to `false`.
pub fn parse_params(url: &Url) -> ViewParams {
    let mut params = ViewParams::default();

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "h" => params.metric_name = value.into_owned(),
            "fmt" => params.format = value.parse().unwrap_or_default(),
            "log_scale" => params.log_scale = value == "true",
            _ => {}
        }
    }

    params
}

/// Whether the URL asks for auto refresh to start switched on.
pub fn refresh_requested(url: &Url) -> bool {
    url.query_pairs()
        .any(|(k, v)| k == "refresh" && (v == "true" || v == "1"))
}

impl ViewParams {
    pub fn to_url(&self, base: &Url) -> Url {
        build_url(base, &self.metric_name, self.format, self.log_scale)
    }

    /// URL of the histogram data request: the view URL with the JSON format.
    pub fn data_url(&self, base: &Url) -> Url {
        with_view_query(
            base,
            &self.metric_name,
            self.format.json_value(),
            self.log_scale,
        )
    }

    /// URL of the histogram export: the JSON data, always on a linear scale.
    pub fn download_url(&self, base: &Url) -> Url {
        with_view_query(base, &self.metric_name, self.format.json_value(), false)
    }

    /// `{name}_{fmt}_{millis}.json`, with `/` in the name replaced so the
    /// export lands in a single file.
    pub fn download_file_name(&self, millis: i64) -> String {
        format!(
            "{}_{}_{}.json",
            self.metric_name.replace('/', "_"),
            self.format.json_value(),
            millis
        )
    }
}

/// Join a path onto the admin base URL.
pub fn admin_url(admin: &Url, path: &str) -> Result<Url, ConfigError> {
    Ok(admin.join(path.trim_start_matches('/'))?)
}

/// `{endpoint}?m=a&m=b...`
pub fn live_metrics_url<S: AsRef<str>>(endpoint: &Url, names: &[S]) -> Url {
    let mut url = endpoint.clone();
    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        for name in names {
            query.append_pair("m", name.as_ref());
        }
    }
    url
}

pub fn metrics_json_url(admin: &Url) -> Result<Url, ConfigError> {
    admin_url(admin, "metrics.json")
}

pub fn histogram_summary_url(admin: &Url, name: &str) -> Result<Url, ConfigError> {
    let mut url = admin_url(admin, "histograms.json")?;
    url.query_pairs_mut()
        .append_pair("summary", "1")
        .append_pair("h", name);
    Ok(url)
}

pub fn summary_url(admin: &Url) -> Result<Url, ConfigError> {
    let mut url = admin_url(admin, "metrics")?;
    {
        let mut query = url.query_pairs_mut();
        for (_, metric) in SUMMARY_METRICS.iter() {
            query.append_pair("serverMetric", metric);
        }
        query
            .append_pair("clientMetric", "successRate")
            .append_pair("sortClientsBy", "successRate")
            .append_pair("sortClientsOrder", "asc");
    }
    Ok(url)
}

/// Id of the text node a metric renders into: `/` becomes `-`.
pub fn element_id(name: &str) -> String {
    name.replace('/', "-")
}

// backslash-escaped when a fragment is used as an id selector
const SELECTOR_SPECIALS: &str = "!\"#%&'()*+,-./:;<=>?@[\\]^`{|}~";

/// A URL fragment turned into an escaped id selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector(String);

impl Selector {
    pub fn from_fragment(fragment: &str) -> Option<Self> {
        let id = element_id(fragment.trim_start_matches('#'));
        if id.is_empty() {
            return None;
        }

        let mut escaped = String::with_capacity(id.len());
        for c in id.chars() {
            if SELECTOR_SPECIALS.contains(c) {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        Some(Selector(escaped))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this selector picks the element with the given id.
    pub fn matches(&self, id: &str) -> bool {
        let mut chars = self.0.chars();
        let mut ids = id.chars();
        loop {
            let expected = match chars.next() {
                Some('\\') => chars.next(),
                other => other,
            };
            match (expected, ids.next()) {
                (None, None) => return true,
                (Some(a), Some(b)) if a == b => {}
                _ => return false,
            }
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The first `depth` path segments of a metric name, with a trailing `/`.
///
/// Names with `depth` segments or fewer are their own group.
pub fn strip_group(name: &str, depth: usize) -> String {
    let segments: Vec<&str> = name.split('/').collect();
    if segments.len() <= depth {
        return name.to_string();
    }
    format!("{}/", segments[..depth].join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://localhost:9990/admin/histograms?h=old&fmt=plot_pdf#frag").unwrap()
    }

    #[test]
    fn test_build_url_replaces_query() {
        let url = build_url(&base(), "finagle/timer/deviation_ms", PlotFormat::Pdf, true);
        assert_eq!(
            url.as_str(),
            "http://localhost:9990/admin/histograms?h=finagle%2Ftimer%2Fdeviation_ms&fmt=plot_pdf&log_scale=true"
        );
    }

    #[test]
    fn test_round_trip() {
        let names = ["requests", "srv/http/request_latency_ms", "a b&c=d", ""];
        for name in names.iter() {
            for format in [PlotFormat::Cdf, PlotFormat::Pdf].iter() {
                for log_scale in [true, false].iter() {
                    let url = build_url(&base(), name, *format, *log_scale);
                    let params = parse_params(&url);
                    assert_eq!(
                        params,
                        ViewParams {
                            metric_name: name.to_string(),
                            log_scale: *log_scale,
                            format: *format,
                        }
                    );
                }
            }
        }
    }

    #[test]
    fn test_parse_defaults() {
        let url = Url::parse("http://localhost:9990/admin/histograms?h=latency").unwrap();
        let params = parse_params(&url);
        assert_eq!(params.metric_name, "latency");
        assert_eq!(params.format, PlotFormat::Cdf);
        assert!(!params.log_scale);

        let url = Url::parse("http://localhost:9990/admin/histograms?fmt=bogus").unwrap();
        assert_eq!(parse_params(&url).format, PlotFormat::Cdf);
    }

    #[test]
    fn test_data_url_uses_json_format() {
        let params = ViewParams {
            metric_name: "latency".into(),
            log_scale: false,
            format: PlotFormat::Pdf,
        };
        let url = params.data_url(&base());
        assert_eq!(url.query(), Some("h=latency&fmt=pdf&log_scale=false"));
    }

    #[test]
    fn test_download_ignores_log_scale() {
        let params = ViewParams {
            metric_name: "srv/http/latency".into(),
            log_scale: true,
            format: PlotFormat::Cdf,
        };
        let url = params.download_url(&base());
        assert_eq!(
            url.as_str(),
            "http://localhost:9990/admin/histograms?h=srv%2Fhttp%2Flatency&fmt=cdf&log_scale=false"
        );
        assert_eq!(
            params.download_file_name(1_700_000_000_000),
            "srv_http_latency_cdf_1700000000000.json"
        );
    }

    #[test]
    fn test_refresh_requested() {
        let url = Url::parse("http://localhost/admin/histograms?h=x&refresh=true").unwrap();
        assert!(refresh_requested(&url));
        assert!(!refresh_requested(&base()));
    }

    #[test]
    fn test_endpoint_urls() {
        let admin = Url::parse("http://localhost:9990/admin/").unwrap();
        let live = admin_url(&admin, "/metrics").unwrap();
        assert_eq!(
            live_metrics_url(&live, &["srv/requests", "srv/failures"]).as_str(),
            "http://localhost:9990/admin/metrics?m=srv%2Frequests&m=srv%2Ffailures"
        );
        assert_eq!(
            histogram_summary_url(&admin, "latency").unwrap().as_str(),
            "http://localhost:9990/admin/histograms.json?summary=1&h=latency"
        );
        assert_eq!(
            metrics_json_url(&admin).unwrap().as_str(),
            "http://localhost:9990/admin/metrics.json"
        );
        let summary = summary_url(&admin).unwrap();
        assert!(summary
            .query()
            .unwrap()
            .ends_with("clientMetric=successRate&sortClientsBy=successRate&sortClientsOrder=asc"));
    }

    #[test]
    fn test_selector_escapes_specials() {
        let selector = Selector::from_fragment("#clnt/foo.bar/successRate").unwrap();
        assert_eq!(selector.as_str(), "clnt\\-foo\\.bar\\-successRate");
        assert!(selector.matches(&element_id("clnt/foo.bar/successRate")));
        assert!(!selector.matches("clnt-foo"));
        assert_eq!(Selector::from_fragment("#"), None);
    }

    #[test]
    fn test_strip_group() {
        assert_eq!(strip_group("clnt/foo/successRate", 2), "clnt/foo/");
        assert_eq!(strip_group("jvm/uptime", 2), "jvm/uptime");
        assert_eq!(strip_group("requests", 2), "requests");
    }
}
