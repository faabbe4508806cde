//! Per-page sessions: what is selected, which toggles are on, and which
//! pollers run while the page is visible.
//!
//! Poll results never touch page state directly. Render callbacks forward
//! them as [`Update`]s over a channel and the UI thread applies them on its
//! next tick, so every session stays single-owner.

mod histograms;
mod metrics;
mod process;
mod servers;
mod summary;

pub use histograms::{HistogramSession, RefreshState};
pub use metrics::{Entry, MetricsSession};
pub use process::ProcessSession;
pub use servers::ServersSession;
pub use summary::{ClientView, SummarySession};

use std::{sync::Arc, time::Duration};

use tokio::{runtime::Handle, sync::mpsc::UnboundedSender};
use url::Url;

use crate::{
    error::RenderError,
    model::{Bucket, FlatMetrics, MetricSample, ServerSummary, StatisticsTable, WireVersion},
    params::ViewParams,
    poller::{Fetch, Poller},
};

/// A decoded poll result on its way to the UI thread.
#[derive(Debug, Clone)]
pub enum Update {
    Catalog(FlatMetrics),
    Summary(ServerSummary),
    Metric {
        name: String,
        samples: Vec<MetricSample>,
    },
    Server {
        server: String,
        samples: Vec<MetricSample>,
    },
    /// Tagged with the view the buckets were requested for.
    Buckets {
        params: ViewParams,
        buckets: Vec<Bucket>,
    },
    Statistics {
        params: ViewParams,
        table: StatisticsTable,
    },
    Process(Vec<MetricSample>),
    ClientInfo(String),
    ServerInfo(String),
    LintWarnings(String),
    /// A histogram export, written to `file_name` on the UI thread.
    Download {
        file_name: String,
        body: String,
    },
}

/// Everything a session needs to build its pollers.
#[derive(Clone)]
pub struct PageContext {
    pub admin: Url,
    pub wire: WireVersion,
    pub live_interval: Duration,
    pub refresh_interval: Duration,
    pub capacity: usize,
    runtime: Handle,
    fetcher: Arc<dyn Fetch>,
    updates: UnboundedSender<Update>,
}

impl PageContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        admin: Url,
        wire: WireVersion,
        live_interval: Duration,
        refresh_interval: Duration,
        capacity: usize,
        runtime: Handle,
        fetcher: Arc<dyn Fetch>,
        updates: UnboundedSender<Update>,
    ) -> Self {
        Self {
            admin,
            wire,
            live_interval,
            refresh_interval,
            capacity,
            runtime,
            fetcher,
            updates,
        }
    }

    pub fn poller(&self, name: &'static str) -> Poller {
        Poller::new(name, self.runtime.clone(), Arc::clone(&self.fetcher))
    }

    /// A render callback that forwards each decoded value to the UI thread.
    pub fn deliver<T>(
        &self,
        wrap: impl Fn(T) -> Update + Send + 'static,
    ) -> impl FnMut(T) -> Result<(), RenderError> + Send + 'static {
        let updates = self.updates.clone();
        move |value| {
            updates
                .send(wrap(value))
                .map_err(|_| RenderError::Disconnected)
        }
    }
}

/// An on/off button pair. Pressing the button of the current state does
/// nothing; the transition methods report whether the state changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toggle {
    active: bool,
}

impl Toggle {
    pub fn new(active: bool) -> Self {
        Self { active }
    }

    pub fn is_on(self) -> bool {
        self.active
    }

    pub fn turn_on(&mut self) -> bool {
        let changed = !self.active;
        self.active = true;
        changed
    }

    pub fn turn_off(&mut self) -> bool {
        let changed = self.active;
        self.active = false;
        changed
    }
}

/// Single active selection, last write wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection<T> {
    current: Option<T>,
}

impl<T: PartialEq> Selection<T> {
    pub fn new() -> Self {
        Self { current: None }
    }

    /// Select `item`, returning the previous selection.
    pub fn select(&mut self, item: T) -> Option<T> {
        self.current.replace(item)
    }

    pub fn clear(&mut self) -> Option<T> {
        self.current.take()
    }

    pub fn get(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn is(&self, item: &T) -> bool {
        self.current.as_ref() == Some(item)
    }
}

impl<T: PartialEq> Default for Selection<T> {
    fn default() -> Self {
        Self::new()
    }
}
