use std::collections::BTreeMap;

use crate::{
    chart::ChartAdapter,
    error::RenderError,
    model::{FlatMetrics, MetricSample},
    params::{admin_url, element_id, live_metrics_url, strip_group, Selector},
    poller::{json, PollTarget, Poller},
};

use super::{PageContext, Selection, Update};

const GROUP_DEPTH: usize = 2;

/// A row of the metric browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Group { name: String, expanded: bool },
    Metric { name: String, label: String },
}

pub struct MetricsSession {
    ctx: PageContext,
    poller: Poller,
    groups: BTreeMap<String, Vec<String>>,
    group: Selection<String>,
    metric: Selection<String>,
    pending: Option<Selector>,
    pub cursor: usize,
    pub chart: ChartAdapter,
}

impl MetricsSession {
    pub fn new(ctx: PageContext, fragment: Option<&str>) -> Self {
        Self {
            poller: ctx.poller("metric"),
            chart: ChartAdapter::new("Select a metric to begin graphing its values.", ctx.capacity),
            ctx,
            groups: BTreeMap::new(),
            group: Selection::new(),
            metric: Selection::new(),
            pending: fragment.and_then(Selector::from_fragment),
            cursor: 0,
        }
    }

    pub fn activate(&mut self) {
        if let Some(name) = self.metric.get().cloned() {
            self.start_polling(&name);
        }
    }

    pub fn deactivate(&mut self) {
        self.poller.stop();
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_active()
    }

    pub fn selected_metric(&self) -> Option<&str> {
        self.metric.get().map(String::as_str)
    }

    pub fn selected_group(&self) -> Option<&str> {
        self.group.get().map(String::as_str)
    }

    /// Rebuild the groups from the metric catalog, then apply a selection
    /// requested by the URL fragment.
    pub fn apply_catalog(&mut self, catalog: &FlatMetrics) {
        self.groups.clear();
        for name in catalog.keys() {
            self.groups
                .entry(strip_group(name, GROUP_DEPTH))
                .or_default()
                .push(name.clone());
        }

        if let Some(selector) = self.pending.take() {
            self.select_by(&selector);
        }
    }

    fn select_by(&mut self, selector: &Selector) {
        if let Some(group) = self.groups.keys().find(|g| selector.matches(&element_id(g))) {
            let group = group.clone();
            self.select_group(&group);
            return;
        }

        let metric = self
            .groups
            .values()
            .flatten()
            .find(|name| selector.matches(&element_id(name)))
            .cloned();

        match metric {
            Some(name) => self.select_metric(&name),
            None => tracing::info!(selector = %selector, "fragment does not name a metric"),
        }
    }

    pub fn select_group(&mut self, group: &str) {
        self.group.select(group.to_string());
        self.cursor = self
            .entries()
            .iter()
            .position(|e| matches!(e, Entry::Group { name, .. } if name == group))
            .unwrap_or(0);
    }

    /// Graph `name` at the live interval, replacing any previous graph.
    pub fn select_metric(&mut self, name: &str) {
        self.group.select(strip_group(name, GROUP_DEPTH));
        self.metric.select(name.to_string());
        self.chart = ChartAdapter::new(name, self.ctx.capacity);
        self.cursor = self
            .entries()
            .iter()
            .position(|e| matches!(e, Entry::Metric { name: n, .. } if n == name))
            .unwrap_or(0);
        self.start_polling(name);
    }

    fn start_polling(&mut self, name: &str) {
        let endpoint = match admin_url(&self.ctx.admin, "metrics") {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("cannot build metrics URL: {}", e);
                return;
            }
        };
        let target = PollTarget::new(
            live_metrics_url(&endpoint, &[name]),
            self.ctx.live_interval,
            json::<Vec<MetricSample>>,
        );
        let metric = name.to_string();
        self.poller.start(
            target,
            self.ctx.deliver(move |samples| Update::Metric {
                name: metric.clone(),
                samples,
            }),
        );
    }

    /// Append the first sample to the chart. Results for a metric that is no
    /// longer selected are dropped.
    pub fn apply_metric(&mut self, name: &str, samples: &[MetricSample]) -> Result<(), RenderError> {
        if !self.metric.is(&name.to_string()) {
            tracing::debug!(metric = name, "dropping result for deselected metric");
            return Ok(());
        }

        let value = samples
            .first()
            .and_then(MetricSample::reading)
            .ok_or_else(|| RenderError::MissingMetric(name.to_string()))?;
        self.chart.append_metric(value);
        Ok(())
    }

    /// Groups, with the members of the selected group listed under it.
    pub fn entries(&self) -> Vec<Entry> {
        let mut entries = vec![];
        for (group, names) in &self.groups {
            let expanded = self.group.is(group);
            entries.push(Entry::Group {
                name: group.clone(),
                expanded,
            });
            if expanded {
                for name in names {
                    let label = name.strip_prefix(group.as_str()).unwrap_or(name);
                    entries.push(Entry::Metric {
                        name: name.clone(),
                        label: if label.is_empty() { name.clone() } else { label.to_string() },
                    });
                }
            }
        }
        entries
    }

    pub fn move_cursor(&mut self, delta: isize) {
        let len = self.entries().len();
        if len == 0 {
            self.cursor = 0;
            return;
        }
        let next = self.cursor as isize + delta;
        self.cursor = next.clamp(0, len as isize - 1) as usize;
    }

    /// Open the group or graph the metric under the cursor.
    pub fn activate_cursor(&mut self) {
        match self.entries().get(self.cursor).cloned() {
            Some(Entry::Group { name, .. }) => self.select_group(&name),
            Some(Entry::Metric { name, .. }) => self.select_metric(&name),
            None => {}
        }
    }
}
