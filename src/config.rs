use std::{path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};
use url::Url;

use crate::{
    constants::{
        ADMIN_PAGES, CHART_CAPACITY, DEFAULT_ADMIN_URL, DEFAULT_LOG_FILE, LIVE_INTERVAL_MS,
        REFRESH_INTERVAL_MS,
    },
    error::ConfigError,
    model::WireVersion,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Page {
    Summary,
    Metrics,
    Servers,
    Histograms,
    Process,
}

impl Page {
    pub const ALL: [Page; 5] = [
        Page::Summary,
        Page::Metrics,
        Page::Servers,
        Page::Histograms,
        Page::Process,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Page::Summary => "Summary",
            Page::Metrics => "Metrics",
            Page::Servers => "Servers",
            Page::Histograms => "Histograms",
            Page::Process => "Process",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "admin_dash")]
#[command(about = "Live terminal dashboard for a server's /admin metrics endpoint")]
pub struct Cli {
    /// Admin URL. A query string sets histogram view parameters and a
    /// #fragment selects a metric on load.
    #[arg(default_value = DEFAULT_ADMIN_URL)]
    pub admin_url: String,

    /// Histogram wire format spoken by the server
    #[arg(long, value_enum, default_value_t = WireVersion::Current)]
    pub wire: WireVersion,

    /// Page shown first
    #[arg(long, value_enum, default_value_t = Page::Summary)]
    pub page: Page,

    /// Metric or group to select, overrides the URL fragment
    #[arg(long)]
    pub select: Option<String>,

    /// Live metric poll interval in milliseconds
    #[arg(long, default_value_t = LIVE_INTERVAL_MS)]
    pub interval_ms: u64,

    /// Histogram auto refresh interval in milliseconds
    #[arg(long, default_value_t = REFRESH_INTERVAL_MS)]
    pub refresh_interval_ms: u64,

    /// Points kept by each live chart
    #[arg(long, default_value_t = CHART_CAPACITY)]
    pub capacity: usize,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,

    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    /// Directory histogram exports are written to
    #[arg(long, default_value = ".")]
    pub download_dir: PathBuf,

    /// Log filter directives, e.g. `admin_dash=debug`. Falls back to RUST_LOG.
    #[arg(long)]
    pub log_filter: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Admin base, always ending in `/`.
    pub admin: Url,
    /// Histogram page URL carrying the initial view parameters.
    pub view: Url,
    pub fragment: Option<String>,
    pub wire: WireVersion,
    pub page: Page,
    pub live_interval: Duration,
    pub refresh_interval: Duration,
    pub capacity: usize,
    pub timeout: Duration,
    pub log_file: PathBuf,
    pub log_filter: Option<String>,
    pub download_dir: PathBuf,
}

fn positive(value: u64, name: &'static str) -> Result<u64, ConfigError> {
    if value == 0 {
        Err(ConfigError::NotPositive { name })
    } else {
        Ok(value)
    }
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let mut url = Url::parse(&cli.admin_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Scheme(url.scheme().to_string()));
        }

        let fragment = cli
            .select
            .or_else(|| url.fragment().map(str::to_string))
            .filter(|f| !f.trim_start_matches('#').is_empty());
        let query = url.query().map(str::to_string);
        url.set_fragment(None);
        url.set_query(None);

        let page = url.path().rsplit('/').next().unwrap_or_default();
        let admin = if url.path().ends_with('/') {
            url
        } else if ADMIN_PAGES.contains(&page) {
            url.join(".")?
        } else {
            let path = format!("{}/", url.path());
            url.set_path(&path);
            url
        };

        let mut view = admin.join("histograms")?;
        view.set_query(query.as_deref());

        Ok(Self {
            admin,
            view,
            fragment,
            wire: cli.wire,
            page: cli.page,
            live_interval: Duration::from_millis(positive(cli.interval_ms, "interval-ms")?),
            refresh_interval: Duration::from_millis(positive(
                cli.refresh_interval_ms,
                "refresh-interval-ms",
            )?),
            capacity: positive(cli.capacity as u64, "capacity")? as usize,
            timeout: Duration::from_secs(positive(cli.timeout_secs, "timeout-secs")?),
            log_file: cli.log_file,
            log_filter: cli.log_filter,
            download_dir: cli.download_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config, ConfigError> {
        let mut argv = vec!["admin_dash"];
        argv.extend_from_slice(args);
        Config::from_cli(Cli::parse_from(argv))
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.admin.as_str(), "http://localhost:9990/admin/");
        assert_eq!(config.view.as_str(), "http://localhost:9990/admin/histograms");
        assert_eq!(config.live_interval, Duration::from_millis(1000));
        assert_eq!(config.refresh_interval, Duration::from_millis(5000));
        assert_eq!(config.capacity, 60);
        assert_eq!(config.wire, WireVersion::Current);
        assert_eq!(config.page, Page::Summary);
        assert_eq!(config.fragment, None);
        assert_eq!(config.download_dir, PathBuf::from("."));
    }

    #[test]
    fn test_histogram_page_url() {
        let config = parse(&[
            "http://host:9990/admin/histograms?h=latency&log_scale=true#srv/http",
            "--wire",
            "legacy",
        ])
        .unwrap();
        assert_eq!(config.admin.as_str(), "http://host:9990/admin/");
        assert_eq!(
            config.view.as_str(),
            "http://host:9990/admin/histograms?h=latency&log_scale=true"
        );
        assert_eq!(config.fragment.as_deref(), Some("srv/http"));
        assert_eq!(config.wire, WireVersion::Legacy);
    }

    #[test]
    fn test_metrics_graphs_page_url() {
        let config = parse(&["http://host/admin/metrics_graphs#srv/http/requests"]).unwrap();
        assert_eq!(config.admin.as_str(), "http://host/admin/");
        assert_eq!(config.view.as_str(), "http://host/admin/histograms");
        assert_eq!(config.fragment.as_deref(), Some("srv/http/requests"));

        // other trailing segments are part of the base
        let config = parse(&["http://host/admin/metrics"]).unwrap();
        assert_eq!(config.admin.as_str(), "http://host/admin/metrics/");
    }

    #[test]
    fn test_select_overrides_fragment() {
        let config = parse(&["http://host/admin#jvm", "--select", "srv/http/requests"]).unwrap();
        assert_eq!(config.admin.as_str(), "http://host/admin/");
        assert_eq!(config.fragment.as_deref(), Some("srv/http/requests"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            parse(&["--interval-ms", "0"]),
            Err(ConfigError::NotPositive { name: "interval-ms" })
        ));
        assert!(matches!(parse(&["ftp://host/admin/"]), Err(ConfigError::Scheme(_))));
        assert!(matches!(parse(&["not a url"]), Err(ConfigError::Url(_))));
    }
}
