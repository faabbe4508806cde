use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use crossterm::event::KeyCode;
use tokio::{
    runtime::Handle,
    sync::mpsc::{self, UnboundedReceiver},
};

use crate::{
    config::{Config, Page},
    controller::{
        HistogramSession, MetricsSession, PageContext, ProcessSession, RefreshState,
        ServersSession, SummarySession, Update,
    },
    error::RenderError,
    model::decode_flat,
    params::{metrics_json_url, PlotFormat},
    poller::{Fetch, PollTarget, Poller},
};

// Main application state
pub struct App {
    pub page: Page,
    pub summary: SummarySession,
    pub metrics: MetricsSession,
    pub servers: ServersSession,
    pub histograms: HistogramSession,
    pub process: ProcessSession,
    pub fragment: Option<String>,
    /// Last render failure, shown in the status bar until the next one.
    pub last_error: Option<String>,
    /// Where the last histogram export was written.
    pub last_download: Option<PathBuf>,
    pub last_tick: Instant,
    pub should_quit: bool,

    ctx: PageContext,
    catalog: Poller,
    updates: UnboundedReceiver<Update>,
    download_dir: PathBuf,
}

impl App {
    pub fn new(config: &Config, runtime: Handle, fetcher: Arc<dyn Fetch>) -> App {
        let (tx, updates) = mpsc::unbounded_channel();
        let ctx = PageContext::new(
            config.admin.clone(),
            config.wire,
            config.live_interval,
            config.refresh_interval,
            config.capacity,
            runtime,
            fetcher,
            tx,
        );

        App {
            page: config.page,
            summary: SummarySession::new(ctx.clone()),
            metrics: MetricsSession::new(ctx.clone(), config.fragment.as_deref()),
            servers: ServersSession::new(ctx.clone()),
            histograms: HistogramSession::new(ctx.clone(), &config.view),
            process: ProcessSession::new(ctx.clone()),
            fragment: config.fragment.clone(),
            last_error: None,
            last_download: None,
            last_tick: Instant::now(),
            should_quit: false,
            catalog: ctx.poller("catalog"),
            ctx,
            updates,
            download_dir: config.download_dir.clone(),
        }
    }

    /// Start the metric catalog poll and the pollers of the first page.
    pub fn start(&mut self) {
        match metrics_json_url(&self.ctx.admin) {
            Ok(url) => self.catalog.start(
                PollTarget::new(url, self.ctx.refresh_interval, decode_flat),
                self.ctx.deliver(Update::Catalog),
            ),
            Err(e) => tracing::error!("cannot build catalog URL: {}", e),
        }
        self.activate(self.page);
    }

    pub fn stop(&mut self) {
        self.catalog.stop();
        for page in Page::ALL {
            self.deactivate(page);
        }
    }

    fn activate(&mut self, page: Page) {
        tracing::debug!(page = page.title(), "activating page");
        match page {
            Page::Summary => self.summary.activate(),
            Page::Metrics => self.metrics.activate(),
            Page::Servers => self.servers.activate(),
            Page::Histograms => self.histograms.activate(),
            Page::Process => self.process.activate(),
        }
    }

    fn deactivate(&mut self, page: Page) {
        match page {
            Page::Summary => self.summary.deactivate(),
            Page::Metrics => self.metrics.deactivate(),
            Page::Servers => self.servers.deactivate(),
            Page::Histograms => self.histograms.deactivate(),
            Page::Process => self.process.deactivate(),
        }
    }

    /// Only the visible page polls.
    pub fn switch_page(&mut self, page: Page) {
        if page == self.page {
            return;
        }
        self.deactivate(self.page);
        self.page = page;
        self.activate(page);
    }

    fn cycle_page(&mut self, delta: isize) {
        let len = Page::ALL.len() as isize;
        let idx = Page::ALL.iter().position(|p| *p == self.page).unwrap_or(0) as isize;
        self.switch_page(Page::ALL[(idx + delta).rem_euclid(len) as usize]);
    }

    /// Apply every poll result that arrived since the last tick.
    pub fn on_tick(&mut self) {
        while let Ok(update) = self.updates.try_recv() {
            self.apply(update);
        }
        self.last_tick = Instant::now();
    }

    fn apply(&mut self, update: Update) {
        let result = match update {
            Update::Catalog(catalog) => {
                self.metrics.apply_catalog(&catalog);
                self.histograms.apply_catalog(&catalog);
                self.servers.apply_catalog(&catalog);
                // the first catalog is what lets the servers page pick a tab
                if self.page == Page::Servers && !self.servers.is_polling() {
                    self.servers.activate();
                }
                Ok(())
            }
            Update::Summary(summary) => self.summary.apply(summary),
            Update::Metric { name, samples } => self.metrics.apply_metric(&name, &samples),
            Update::Server { server, samples } => {
                self.servers.apply(&server, &samples);
                Ok(())
            }
            Update::Buckets { params, buckets } => {
                self.histograms.apply_buckets(&params, buckets);
                Ok(())
            }
            Update::Statistics { params, table } => {
                self.histograms.apply_statistics(&params, &table);
                Ok(())
            }
            Update::Process(samples) => {
                self.process.apply(&samples);
                Ok(())
            }
            Update::ClientInfo(text) => {
                self.process.client_info = text;
                Ok(())
            }
            Update::ServerInfo(text) => {
                self.process.server_info = text;
                Ok(())
            }
            Update::LintWarnings(text) => {
                self.process.lint_warnings = text;
                Ok(())
            }
            Update::Download { file_name, body } => {
                save_download(&self.download_dir, &file_name, &body).map(|path| {
                    tracing::info!(path = %path.display(), "histogram saved");
                    self.last_download = Some(path);
                })
            }
        };

        if let Err(e) = result {
            tracing::warn!("render failed: {}", e);
            self.last_error = Some(e.to_string());
        }
    }

    pub fn on_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab => self.cycle_page(1),
            KeyCode::BackTab => self.cycle_page(-1),
            KeyCode::Char(c @ '1'..='5') => {
                let idx = c as usize - '1' as usize;
                self.switch_page(Page::ALL[idx]);
            }
            KeyCode::Left if self.page == Page::Servers => self.servers.next_tab(-1),
            KeyCode::Right if self.page == Page::Servers => self.servers.next_tab(1),
            KeyCode::Up => self.move_cursor(-1),
            KeyCode::Down => self.move_cursor(1),
            KeyCode::Enter => match self.page {
                Page::Metrics => self.metrics.activate_cursor(),
                Page::Histograms => self.histograms.activate_cursor(),
                _ => {}
            },
            KeyCode::Char(c) if self.page == Page::Histograms => self.on_histogram_key(c),
            _ => {}
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        match self.page {
            Page::Metrics => self.metrics.move_cursor(delta),
            Page::Histograms => self.histograms.move_cursor(delta),
            _ => {}
        }
    }

    fn on_histogram_key(&mut self, c: char) {
        match c {
            'r' => self.histograms.set_refresh(RefreshState::On),
            's' => self.histograms.set_refresh(RefreshState::Off),
            'l' => self.histograms.set_log_scale(true),
            'n' => self.histograms.set_log_scale(false),
            'p' => self.histograms.set_format(PlotFormat::Pdf),
            'c' => self.histograms.set_format(PlotFormat::Cdf),
            'd' => self.histograms.download(),
            _ => {}
        }
    }
}

/// Write a histogram export into `dir`, returning the file's path.
pub fn save_download(dir: &Path, file_name: &str, body: &str) -> Result<PathBuf, RenderError> {
    let path = dir.join(file_name);
    fs::write(&path, body).map_err(|e| RenderError::Save {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(path)
}
