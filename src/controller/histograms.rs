use std::time::Duration;

use url::Url;

use crate::{
    error::ConfigError,
    model::{
        decode_buckets, decode_flat, decode_summary, plot_points, Bucket, FlatMetrics,
        StatisticsTable, WireVersion,
    },
    params::{
        histogram_summary_url, metrics_json_url, parse_params, refresh_requested, PlotFormat,
        ViewParams,
    },
    poller::{text, PollTarget, Poller},
    render::{render_statistics, TextBoard},
};

use super::{PageContext, Toggle, Update};

const SUMMARY_SUFFIX: &str = ".p50";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Off,
    On,
}

/// The histogram page: one selected histogram, its view parameters and the
/// bucket and statistics pollers that follow them.
pub struct HistogramSession {
    ctx: PageContext,
    base: Url,
    params: ViewParams,
    view_url: Url,
    refresh: Toggle,
    log_scale: Toggle,
    pdf: Toggle,
    buckets_poller: Poller,
    stats_poller: Poller,
    download_poller: Poller,
    names: Vec<String>,
    pub cursor: usize,
    pub buckets: Vec<Bucket>,
    pub board: TextBoard,
}

impl HistogramSession {
    /// `view` is the histogram page URL; its query holds the initial view
    /// parameters and the `refresh` flag.
    pub fn new(ctx: PageContext, view: &Url) -> Self {
        let params = parse_params(view);
        let mut base = view.clone();
        base.set_query(None);
        base.set_fragment(None);

        Self {
            buckets_poller: ctx.poller("histogram"),
            stats_poller: ctx.poller("statistics"),
            download_poller: ctx.poller("download"),
            view_url: params.to_url(&base),
            refresh: Toggle::new(refresh_requested(view)),
            log_scale: Toggle::new(params.log_scale),
            pdf: Toggle::new(params.format == PlotFormat::Pdf),
            ctx,
            base,
            params,
            names: vec![],
            cursor: 0,
            buckets: vec![],
            board: TextBoard::new(),
        }
    }

    pub fn params(&self) -> &ViewParams {
        &self.params
    }

    /// The page URL for the current view parameters.
    pub fn view_url(&self) -> &Url {
        &self.view_url
    }

    pub fn refresh_state(&self) -> RefreshState {
        if self.refresh.is_on() {
            RefreshState::On
        } else {
            RefreshState::Off
        }
    }

    pub fn is_polling(&self) -> bool {
        self.buckets_poller.is_active() || self.stats_poller.is_active()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn activate(&mut self) {
        self.refresh();
    }

    pub fn deactivate(&mut self) {
        self.buckets_poller.stop();
        self.stats_poller.stop();
    }

    /// Histogram names from the catalog: every key with a `.p50` statistic.
    pub fn apply_catalog(&mut self, catalog: &FlatMetrics) {
        self.names = catalog
            .keys()
            .filter_map(|key| key.strip_suffix(SUMMARY_SUFFIX))
            .map(str::to_string)
            .collect();
        self.cursor = self
            .names
            .iter()
            .position(|n| *n == self.params.metric_name)
            .unwrap_or(0);
    }

    pub fn set_refresh(&mut self, state: RefreshState) {
        match state {
            RefreshState::On if self.refresh.turn_on() => {
                tracing::info!(interval_ms = self.ctx.refresh_interval.as_millis() as u64, "auto refresh on");
                self.refresh();
            }
            RefreshState::Off if self.refresh.turn_off() => {
                tracing::info!("auto refresh off");
                self.deactivate();
            }
            _ => {}
        }
    }

    pub fn set_log_scale(&mut self, on: bool) {
        let changed = if on {
            self.log_scale.turn_on()
        } else {
            self.log_scale.turn_off()
        };
        if changed {
            self.params.log_scale = on;
            self.refresh();
        }
    }

    pub fn set_format(&mut self, format: PlotFormat) {
        let changed = match format {
            PlotFormat::Pdf => self.pdf.turn_on(),
            PlotFormat::Cdf => self.pdf.turn_off(),
        };
        if changed {
            self.params.format = format;
            self.refresh();
        }
    }

    pub fn select(&mut self, name: &str) {
        if self.params.metric_name == name {
            return;
        }
        self.params.metric_name = name.to_string();
        self.buckets.clear();
        self.board = TextBoard::new();
        if let Some(idx) = self.names.iter().position(|n| n == name) {
            self.cursor = idx;
        }
        self.refresh();
    }

    pub fn move_cursor(&mut self, delta: isize) {
        if self.names.is_empty() {
            self.cursor = 0;
            return;
        }
        let next = self.cursor as isize + delta;
        self.cursor = next.clamp(0, self.names.len() as isize - 1) as usize;
    }

    pub fn activate_cursor(&mut self) {
        if let Some(name) = self.names.get(self.cursor).cloned() {
            self.select(&name);
        }
    }

    /// Re-serialize the view URL and fetch both panels: on a timer when auto
    /// refresh is on, once otherwise.
    pub fn refresh(&mut self) {
        self.view_url = self.params.to_url(&self.base);
        if self.params.metric_name.is_empty() {
            return;
        }

        let stats = match self.statistics_target(self.ctx.refresh_interval) {
            Ok(target) => target,
            Err(e) => {
                tracing::error!("cannot build statistics URL: {}", e);
                return;
            }
        };
        let buckets = self.buckets_target(self.ctx.refresh_interval);

        let params = self.params.clone();
        let stats_params = params.clone();
        let on_buckets = self.ctx.deliver(move |buckets| Update::Buckets {
            params: params.clone(),
            buckets,
        });
        let on_stats = self.ctx.deliver(move |table| Update::Statistics {
            params: stats_params.clone(),
            table,
        });

        if self.refresh.is_on() {
            self.buckets_poller.start(buckets, on_buckets);
            self.stats_poller.start(stats, on_stats);
        } else {
            self.buckets_poller.fetch_once(buckets, on_buckets);
            self.stats_poller.fetch_once(stats, on_stats);
        }
    }

    /// Export the selected histogram as JSON. The body comes back as an
    /// [`Update::Download`] named after the view and the current time.
    pub fn download(&self) {
        if self.params.metric_name.is_empty() {
            return;
        }
        let url = self.params.download_url(&self.base);
        let file_name = self
            .params
            .download_file_name(chrono::Local::now().timestamp_millis());
        tracing::info!(%url, file = %file_name, "downloading histogram");

        self.download_poller.fetch_once(
            PollTarget::new(url, self.ctx.refresh_interval, text),
            self.ctx.deliver(move |body| Update::Download {
                file_name: file_name.clone(),
                body,
            }),
        );
    }

    fn buckets_target(&self, interval: Duration) -> PollTarget<Vec<Bucket>> {
        let wire = self.ctx.wire;
        let name = self.params.metric_name.clone();
        PollTarget::new(self.params.data_url(&self.base), interval, move |body| {
            decode_buckets(wire, &name, body)
        })
    }

    fn statistics_target(&self, interval: Duration) -> Result<PollTarget<StatisticsTable>, ConfigError> {
        let name = self.params.metric_name.clone();
        let target = match self.ctx.wire {
            WireVersion::Current => {
                let url = histogram_summary_url(&self.ctx.admin, &name)?;
                PollTarget::new(url, interval, move |body| {
                    decode_summary(&name, body).map(|s| StatisticsTable::from_summary(&s))
                })
            }
            WireVersion::Legacy => {
                let url = metrics_json_url(&self.ctx.admin)?;
                PollTarget::new(url, interval, move |body| {
                    decode_flat(body).map(|m| StatisticsTable::from_flat(&m, &name))
                })
            }
        };
        Ok(target)
    }

    /// Replace the plotted buckets. Results requested for any other view,
    /// including a slow fetch made before the last toggle, are dropped.
    pub fn apply_buckets(&mut self, params: &ViewParams, buckets: Vec<Bucket>) {
        if *params == self.params {
            self.buckets = buckets;
        } else {
            tracing::debug!(histogram = %params.metric_name, "dropping stale buckets");
        }
    }

    pub fn apply_statistics(&mut self, params: &ViewParams, table: &StatisticsTable) {
        if *params == self.params {
            render_statistics(&mut self.board, table);
        }
    }

    /// Plot coordinates; with log scale on, x is `log10(midpoint)` and
    /// non-positive midpoints are left out.
    pub fn points(&self) -> Vec<(f64, f64)> {
        let points = plot_points(&self.buckets);
        if !self.params.log_scale {
            return points;
        }
        points
            .into_iter()
            .filter(|(x, _)| *x > 0.0)
            .map(|(x, y)| (x.log10(), y))
            .collect()
    }
}
