use crate::{
    chart::ChartAdapter,
    constants::{LEAST_PERFORMANT_CLIENTS, SUMMARY_METRICS},
    error::RenderError,
    model::{find_matching, MetricSample, ServerSummary},
    params::summary_url,
    poller::{json, PollTarget, Poller},
    util::pretty,
};

use super::{PageContext, Update};

const NO_METRICS: &str =
    "No metrics information returned. This feature is only available when depending on finagle-stats.";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientView {
    pub name: String,
    pub success_rate: Option<f64>,
    pub ports: Vec<String>,
}

pub struct SummarySession {
    ctx: PageContext,
    poller: Poller,
    pub chart: ChartAdapter,
    pub success_rate: Option<f64>,
    /// `(label, formatted value)` rows of the server highlights table.
    pub highlights: Vec<(String, String)>,
    pub clients: Vec<ClientView>,
    pub notice: Option<&'static str>,
}

impl SummarySession {
    pub fn new(ctx: PageContext) -> Self {
        Self {
            poller: ctx.poller("summary"),
            chart: ChartAdapter::new("Requests", ctx.capacity),
            ctx,
            success_rate: None,
            highlights: vec![],
            clients: vec![],
            notice: None,
        }
    }

    pub fn activate(&mut self) {
        let url = match summary_url(&self.ctx.admin) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("cannot build summary URL: {}", e);
                return;
            }
        };
        let target = PollTarget::new(url, self.ctx.live_interval, json::<ServerSummary>);
        self.poller.start(target, self.ctx.deliver(Update::Summary));
    }

    pub fn deactivate(&mut self) {
        self.poller.stop();
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_active()
    }

    pub fn apply(&mut self, summary: ServerSummary) -> Result<(), RenderError> {
        let mut server = summary.server;
        self.notice = if server.is_empty() {
            Some(NO_METRICS)
        } else {
            None
        };

        self.success_rate = take_matching(&mut server, "successRate").and_then(|m| m.reading());
        if let Some(requests) = take_matching(&mut server, "requests").and_then(|m| m.reading()) {
            self.chart.append_metric(requests);
        }

        self.highlights = server
            .iter()
            .map(|sample| {
                let (label, key) = SUMMARY_METRICS
                    .iter()
                    .find(|(_, key)| *key == sample.name)
                    .map(|(label, key)| (label.to_string(), *key))
                    .unwrap_or_else(|| (sample.name.clone(), sample.name.as_str()));
                let value = sample
                    .reading()
                    .map(|v| pretty(key, v))
                    .unwrap_or_else(|| crate::render::UNDEFINED.to_string());
                (label, value)
            })
            .collect();

        self.clients = summary
            .clients
            .into_iter()
            .filter(|client| !client.metrics.is_empty())
            .take(LEAST_PERFORMANT_CLIENTS)
            .map(|client| ClientView {
                success_rate: client.success_rate(),
                ports: client.port_labels(),
                name: client.name,
            })
            .collect();

        if self.success_rate.is_none() && self.notice.is_none() {
            return Err(RenderError::MissingMetric("successRate".into()));
        }
        Ok(())
    }
}

fn take_matching(samples: &mut Vec<MetricSample>, pattern: &str) -> Option<MetricSample> {
    let name = find_matching(samples, pattern)?.name.clone();
    let idx = samples.iter().position(|s| s.name == name)?;
    Some(samples.remove(idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::tests::{context, drain};
    use std::time::Duration;

    const BODY: &str = r#"{
        "server": [
            {"name": "successRate", "value": 0.995},
            {"name": "requests", "value": 42},
            {"name": "jvm/uptime", "value": 3661000},
            {"name": "jvm/mem/current/used", "value": 1536},
            {"name": "jvm/thread/count", "value": 12}
        ],
        "clients": [
            {"name": "idle", "ports": [], "metrics": []},
            {"name": "db", "ports": [3306], "metrics": [{"name": "clnt/db/successRate", "value": 0.8}]},
            {"name": "cache", "ports": ["11211"], "metrics": [{"name": "clnt/cache/successRate", "value": 0.999}]}
        ]
    }"#;

    #[tokio::test(start_paused = true)]
    async fn test_summary_poll_and_apply() {
        let (ctx, mut rx, _) = context(vec![(200, BODY)]);
        let mut session = SummarySession::new(ctx);

        session.activate();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(session.is_polling());

        let updates = drain(&mut rx);
        assert_eq!(updates.len(), 2);
        for update in updates {
            match update {
                Update::Summary(summary) => session.apply(summary).unwrap(),
                other => panic!("unexpected update {:?}", other),
            }
        }

        assert_eq!(session.success_rate, Some(0.995));
        assert_eq!(session.chart.values().rev().take(2).collect::<Vec<_>>(), vec![42.0, 42.0]);
        assert_eq!(
            session.highlights,
            vec![
                ("Uptime".to_string(), "1h 1m 1s".to_string()),
                ("Memory".to_string(), "1.5KB".to_string()),
                ("Thread Count".to_string(), "12".to_string()),
            ]
        );
        assert_eq!(session.clients.len(), 2);
        assert_eq!(session.clients[0].name, "db");
        assert_eq!(session.clients[0].success_rate, Some(0.8));
        assert_eq!(session.clients[1].ports, vec!["11211"]);

        session.deactivate();
        assert!(!session.is_polling());
    }

    #[tokio::test]
    async fn test_empty_server_metrics_sets_notice() {
        let (ctx, _rx, _) = context(vec![]);
        let mut session = SummarySession::new(ctx);
        session.apply(ServerSummary::default()).unwrap();
        assert_eq!(session.notice, Some(NO_METRICS));
        assert!(session.highlights.is_empty());
    }
}
