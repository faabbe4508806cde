use crate::{
    constants::PROCESS_METRICS,
    model::MetricSample,
    params::{admin_url, live_metrics_url},
    poller::{json, text, PollTarget, Poller},
    render::{render_samples, TextBoard},
};

use super::{PageContext, Update};

/// JVM process stats at the live interval, the client registry text alongside,
/// and the server info and lint warning texts fetched once per activation.
pub struct ProcessSession {
    ctx: PageContext,
    stats_poller: Poller,
    clients_poller: Poller,
    info_poller: Poller,
    lint_poller: Poller,
    pub board: TextBoard,
    pub client_info: String,
    pub server_info: String,
    pub lint_warnings: String,
}

impl ProcessSession {
    pub fn new(ctx: PageContext) -> Self {
        Self {
            stats_poller: ctx.poller("process"),
            clients_poller: ctx.poller("client_info"),
            info_poller: ctx.poller("server_info"),
            lint_poller: ctx.poller("lint"),
            ctx,
            board: TextBoard::new(),
            client_info: String::new(),
            server_info: String::new(),
            lint_warnings: String::new(),
        }
    }

    pub fn activate(&mut self) {
        let urls = admin_url(&self.ctx.admin, "metrics").and_then(|metrics| {
            Ok((
                live_metrics_url(&metrics, &PROCESS_METRICS),
                admin_url(&self.ctx.admin, "clients/")?,
                admin_url(&self.ctx.admin, "server_info")?,
                admin_url(&self.ctx.admin, "failedlint")?,
            ))
        });
        let (stats, clients, info, lint) = match urls {
            Ok(urls) => urls,
            Err(e) => {
                tracing::error!("cannot build process URLs: {}", e);
                return;
            }
        };

        let interval = self.ctx.live_interval;
        self.stats_poller.start(
            PollTarget::new(stats, interval, json::<Vec<MetricSample>>),
            self.ctx.deliver(Update::Process),
        );
        self.clients_poller.start(
            PollTarget::new(clients, interval, text),
            self.ctx.deliver(Update::ClientInfo),
        );
        self.info_poller.fetch_once(
            PollTarget::new(info, interval, text),
            self.ctx.deliver(Update::ServerInfo),
        );
        self.lint_poller.fetch_once(
            PollTarget::new(lint, interval, text),
            self.ctx.deliver(Update::LintWarnings),
        );
    }

    pub fn deactivate(&mut self) {
        self.stats_poller.stop();
        self.clients_poller.stop();
    }

    pub fn is_polling(&self) -> bool {
        self.stats_poller.is_active()
    }

    pub fn apply(&mut self, samples: &[MetricSample]) {
        render_samples(&mut self.board, samples);
    }

    /// Text of the process metric `name`, e.g. `jvm/uptime`.
    pub fn text(&self, name: &str) -> &str {
        self.board.text(&crate::params::element_id(name))
    }
}
