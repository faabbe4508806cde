use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{extract::State, http::StatusCode, routing::get, Router};
use tokio::{net::TcpListener, runtime::Handle};
use url::Url;

use admin_dash::{
    chart::ChartAdapter,
    error::RenderError,
    model::MetricSample,
    params::live_metrics_url,
    poller::{json, HttpFetcher, PollTarget, Poller},
};

type Script = Arc<(AtomicUsize, Vec<(StatusCode, &'static str)>)>;

async fn scripted(State(script): State<Script>) -> (StatusCode, &'static str) {
    let (calls, responses) = &*script;
    let n = calls.fetch_add(1, Ordering::SeqCst);
    responses[n.min(responses.len() - 1)]
}

async fn serve(responses: Vec<(StatusCode, &'static str)>) -> (Url, Script) {
    let script: Script = Arc::new((AtomicUsize::new(0), responses));
    let app = Router::new()
        .route("/admin/metrics", get(scripted))
        .with_state(Arc::clone(&script));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let url = Url::parse(&format!("http://{}/admin/metrics", addr)).unwrap();
    (url, script)
}

fn charting(chart: &Arc<Mutex<ChartAdapter>>) -> impl FnMut(Vec<MetricSample>) -> Result<(), RenderError> {
    let chart = Arc::clone(chart);
    move |samples| {
        let value = samples
            .first()
            .and_then(MetricSample::reading)
            .ok_or_else(|| RenderError::MissingMetric("requests".into()))?;
        chart.lock().unwrap().append_metric(value);
        Ok(())
    }
}

async fn wait_for_calls(script: &Script, n: usize) {
    for _ in 0..200 {
        if script.0.load(Ordering::SeqCst) >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server saw fewer than {} requests", n);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_live_deltas_reach_the_chart() {
    let (endpoint, script) = serve(vec![
        (StatusCode::OK, r#"[{"name":"requests","delta":42}]"#),
        (StatusCode::OK, r#"[{"name":"requests","delta":45}]"#),
        (StatusCode::SERVICE_UNAVAILABLE, ""),
    ])
    .await;

    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(5)).unwrap());
    let mut poller = Poller::new("requests", Handle::current(), fetcher);
    let chart = Arc::new(Mutex::new(ChartAdapter::new("Requests", 60)));

    poller.start(
        PollTarget::new(
            live_metrics_url(&endpoint, &["requests"]),
            Duration::from_millis(20),
            json::<Vec<MetricSample>>,
        ),
        charting(&chart),
    );

    // failing ticks after the two good ones keep the timer alive
    wait_for_calls(&script, 5).await;
    assert!(poller.is_active());
    poller.stop();

    let chart = chart.lock().unwrap();
    let values: Vec<f64> = chart.values().collect();
    assert_eq!(values.len(), 60);
    assert_eq!(&values[58..], &[42.0, 45.0]);
    assert_eq!(chart.generation(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malformed_and_empty_bodies_are_skipped() {
    let (endpoint, script) = serve(vec![
        (StatusCode::OK, "<html>not json</html>"),
        (StatusCode::OK, "[]"),
        (StatusCode::OK, r#"[{"name":"requests","value":7}]"#),
    ])
    .await;

    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(5)).unwrap());
    let mut poller = Poller::new("requests", Handle::current(), fetcher);
    let chart = Arc::new(Mutex::new(ChartAdapter::new("Requests", 10)));

    poller.start(
        PollTarget::new(endpoint, Duration::from_millis(20), json::<Vec<MetricSample>>),
        charting(&chart),
    );
    wait_for_calls(&script, 4).await;
    poller.stop();

    let chart = chart.lock().unwrap();
    assert_eq!(chart.latest(), 7.0);
    assert!(chart.values().take(5).all(|v| v == 0.0));
}
