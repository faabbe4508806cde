use std::collections::BTreeMap;

use crate::{
    chart::ChartAdapter,
    model::{FlatMetrics, MetricSample},
    params::{admin_url, live_metrics_url},
    poller::{json, PollTarget, Poller},
    render::TextBoard,
    util::success_rate_percent,
};

use super::{PageContext, Update};

/// One tab per server found in the catalog under `srv/<name>/`.
pub struct ServersSession {
    ctx: PageContext,
    poller: Poller,
    servers: BTreeMap<String, Vec<String>>,
    active: usize,
    pub board: TextBoard,
    pub chart: ChartAdapter,
}

impl ServersSession {
    pub fn new(ctx: PageContext) -> Self {
        Self {
            poller: ctx.poller("server"),
            chart: ChartAdapter::new("Success Rate", ctx.capacity),
            ctx,
            servers: BTreeMap::new(),
            active: 0,
            board: TextBoard::new(),
        }
    }

    pub fn apply_catalog(&mut self, catalog: &FlatMetrics) {
        self.servers.clear();
        for name in catalog.keys() {
            let segments: Vec<&str> = name.split('/').collect();
            if let ["srv", server, _stat] = segments.as_slice() {
                self.servers
                    .entry(server.to_string())
                    .or_default()
                    .push(name.clone());
            }
        }
        if self.active >= self.servers.len() {
            self.active = 0;
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.servers.keys().map(String::as_str).collect()
    }

    pub fn active_server(&self) -> Option<&str> {
        self.servers.keys().nth(self.active).map(String::as_str)
    }

    /// Keys of the active tab, in display order.
    pub fn active_keys(&self) -> &[String] {
        self.servers
            .values()
            .nth(self.active)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn activate(&mut self) {
        self.show_tab(self.active);
    }

    pub fn deactivate(&mut self) {
        self.poller.stop();
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_active()
    }

    pub fn next_tab(&mut self, delta: isize) {
        let len = self.servers.len() as isize;
        if len == 0 {
            return;
        }
        let next = (self.active as isize + delta).rem_euclid(len) as usize;
        self.show_tab(next);
    }

    /// Switch to tab `index`: fresh chart, poll that server's keys.
    pub fn show_tab(&mut self, index: usize) {
        self.active = index;
        let server = match self.active_server() {
            Some(server) => server.to_string(),
            None => return,
        };
        let keys = self.active_keys().to_vec();

        let endpoint = match admin_url(&self.ctx.admin, "metrics") {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("cannot build metrics URL: {}", e);
                return;
            }
        };

        self.chart = ChartAdapter::new("Success Rate", self.ctx.capacity);
        let target = PollTarget::new(
            live_metrics_url(&endpoint, &keys),
            self.ctx.live_interval,
            json::<Vec<MetricSample>>,
        );
        self.poller.start(
            target,
            self.ctx.deliver(move |samples| Update::Server {
                server: server.clone(),
                samples,
            }),
        );
    }

    /// Write every delta to the board and chart the success rate.
    pub fn apply(&mut self, server: &str, samples: &[MetricSample]) {
        if self.active_server() != Some(server) {
            return;
        }

        render_deltas(&mut self.board, samples);

        // only the server's own counters, not e.g. `pending_requests`
        let delta = |stat: &str| {
            samples
                .iter()
                .find(|s| s.name.strip_suffix(stat).map_or(false, |rest| rest.ends_with('/')))
                .and_then(|s| s.delta)
                .unwrap_or(0.0)
        };
        let failures = delta("failures");
        let requests = delta("requests");

        self.chart.append_metric(success_rate_percent(requests, failures));
    }
}

fn render_deltas(board: &mut TextBoard, samples: &[MetricSample]) {
    for sample in samples {
        board.set(crate::params::element_id(&sample.name), sample.delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::tests::{context, drain};
    use std::time::Duration;

    fn catalog() -> FlatMetrics {
        [
            "srv/http/requests",
            "srv/http/failures",
            "srv/thrift/requests",
            "srv/http/request_latency_ms.p50",
            "jvm/uptime",
            "srv/http/failures/timeout",
        ]
        .iter()
        .map(|k| (k.to_string(), 0.0))
        .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_tabs_poll_success_rate() {
        let body = r#"[{"name":"srv/http/requests","delta":400},{"name":"srv/http/failures","delta":1}]"#;
        let (ctx, mut rx, _) = context(vec![(200, body)]);
        let mut session = ServersSession::new(ctx);
        session.apply_catalog(&catalog());

        assert_eq!(session.names(), vec!["http", "thrift"]);
        assert_eq!(
            session.active_keys(),
            &[
                "srv/http/failures".to_string(),
                "srv/http/request_latency_ms.p50".to_string(),
                "srv/http/requests".to_string(),
            ]
        );

        session.activate();
        tokio::time::sleep(Duration::from_millis(10)).await;
        for update in drain(&mut rx) {
            if let Update::Server { server, samples } = update {
                session.apply(&server, &samples);
            }
        }

        assert_eq!(session.chart.latest(), 99.75);
        assert_eq!(session.board.get("srv-http-requests"), Some("400"));
        assert_eq!(session.board.get("srv-http-failures"), Some("1"));
    }

    #[tokio::test]
    async fn test_success_rate_uses_exact_counters() {
        let (ctx, _rx, _) = context(vec![]);
        let mut session = ServersSession::new(ctx);
        session.apply_catalog(&catalog());

        let sample = |name: &str, delta: f64| MetricSample {
            name: name.into(),
            value: None,
            delta: Some(delta),
        };
        let samples = vec![
            sample("srv/http/pending_requests", 3.0),
            sample("srv/http/failures/timeout", 7.0),
            sample("srv/http/requests", 400.0),
            sample("srv/http/failures", 1.0),
        ];
        session.apply("http", &samples);
        assert_eq!(session.chart.latest(), 99.75);
    }

    #[tokio::test]
    async fn test_switching_tabs_ignores_old_server() {
        let (ctx, _rx, _) = context(vec![]);
        let mut session = ServersSession::new(ctx);
        session.apply_catalog(&catalog());

        session.next_tab(1);
        assert_eq!(session.active_server(), Some("thrift"));
        session.next_tab(1);
        assert_eq!(session.active_server(), Some("http"));
        session.next_tab(-1);
        assert_eq!(session.active_server(), Some("thrift"));
        assert!(session.is_polling());

        let samples = vec![MetricSample {
            name: "srv/http/requests".into(),
            value: None,
            delta: Some(5.0),
        }];
        session.apply("http", &samples);
        assert_eq!(session.chart.generation(), 0);
    }
}
