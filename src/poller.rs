//! Fixed-interval fetch-and-render tasks.
//!
//! A [`Poller`] owns at most one running timer. Starting a new target stops
//! the previous one first, and dropping the poller stops it too. Every tick is
//! independent: a failed request or a malformed body is logged and the next
//! tick runs on schedule.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::{
    runtime::Handle,
    sync::oneshot,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use url::Url;

use crate::error::{PollError, RenderError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

/// Issues the GET requests behind every poll tick.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get(&self, url: &Url) -> Result<Response, PollError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, PollError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get(&self, url: &Url) -> Result<Response, PollError> {
        tracing::trace!("GET {}", url);

        let resp = self
            .client
            .get(url.clone())
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await?;

        Ok(Response { status, body })
    }
}

pub type Decoder<T> = Arc<dyn Fn(&str) -> Result<T, PollError> + Send + Sync>;
pub type Gate = Arc<dyn Fn() -> bool + Send + Sync>;

/// What to poll and how to turn the body into a value.
pub struct PollTarget<T> {
    pub url: Url,
    pub interval: Duration,
    decode: Decoder<T>,
    gate: Option<Gate>,
}

impl<T> PollTarget<T> {
    pub fn new(
        url: Url,
        interval: Duration,
        decode: impl Fn(&str) -> Result<T, PollError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            url,
            interval,
            decode: Arc::new(decode),
            gate: None,
        }
    }

    /// Only fetch on ticks where `gate` returns true.
    pub fn gated(mut self, gate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.gate = Some(Arc::new(gate));
        self
    }

    fn is_open(&self) -> bool {
        self.gate.as_ref().map_or(true, |gate| gate())
    }
}

/// Body as JSON.
pub fn json<T: DeserializeOwned>(body: &str) -> Result<T, PollError> {
    Ok(serde_json::from_str(body)?)
}

/// Body as-is.
pub fn text(body: &str) -> Result<String, PollError> {
    Ok(body.to_string())
}

/// Body as a delimiter-separated line whose last field is the number.
pub fn scalar(delimiter: char) -> impl Fn(&str) -> Result<f64, PollError> + Send + Sync + Clone {
    move |body: &str| {
        body.split(delimiter)
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .last()
            .and_then(|field| field.parse().ok())
            .ok_or_else(|| PollError::Scalar(body.to_string()))
    }
}

async fn tick<T, R>(fetcher: &dyn Fetch, target: &PollTarget<T>, render: &mut R) -> Result<(), PollError>
where
    R: FnMut(T) -> Result<(), RenderError>,
{
    let response = fetcher.get(&target.url).await?;

    if response.status != 200 {
        return Err(PollError::Network {
            url: target.url.to_string(),
            status: response.status,
        });
    }

    let value = (target.decode)(&response.body)?;

    match panic::catch_unwind(AssertUnwindSafe(|| render(value))) {
        Ok(result) => Ok(result?),
        Err(_) => Err(PollError::Panicked),
    }
}

fn report(poller: &str, url: &Url, err: &PollError) {
    match err {
        PollError::Panicked => tracing::error!(poller, %url, "{}", err),
        e if e.is_parse() => tracing::warn!(poller, %url, "skipping tick, {}", e),
        e => tracing::warn!(poller, %url, "{}", e),
    }
}

// Counts a running timer for as long as it is alive.
struct LiveTimer(Arc<AtomicUsize>);

impl LiveTimer {
    fn register(live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(live)
    }
}

impl Drop for LiveTimer {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn run<T, R>(
    poller: &'static str,
    fetcher: Arc<dyn Fetch>,
    target: PollTarget<T>,
    mut render: R,
    mut stop: oneshot::Receiver<()>,
    live: Arc<AtomicUsize>,
) where
    R: FnMut(T) -> Result<(), RenderError>,
{
    let _timer = LiveTimer::register(live);

    let mut interval = time::interval(target.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            _ = interval.tick() => {}
        }

        if !target.is_open() {
            continue;
        }

        if let Err(e) = tick(&*fetcher, &target, &mut render).await {
            report(poller, &target.url, &e);
        }
    }

    tracing::debug!(poller, url = %target.url, "poller stopped");
}

struct ActiveTimer {
    url: Url,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub struct Poller {
    name: &'static str,
    runtime: Handle,
    fetcher: Arc<dyn Fetch>,
    active: Option<ActiveTimer>,
    live: Arc<AtomicUsize>,
}

impl Poller {
    pub fn new(name: &'static str, runtime: Handle, fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            name,
            runtime,
            fetcher,
            active: None,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Poll `target` until stopped, handing each decoded body to `render`.
    ///
    /// Any timer this poller was already running is stopped first. The first
    /// tick fires immediately.
    pub fn start<T, R>(&mut self, target: PollTarget<T>, render: R)
    where
        T: Send + 'static,
        R: FnMut(T) -> Result<(), RenderError> + Send + 'static,
    {
        self.stop();

        tracing::info!(
            poller = self.name,
            url = %target.url,
            interval_ms = target.interval.as_millis() as u64,
            "starting poller"
        );

        let (stop, stop_rx) = oneshot::channel();
        let url = target.url.clone();
        let task = self.runtime.spawn(run(
            self.name,
            Arc::clone(&self.fetcher),
            target,
            render,
            stop_rx,
            Arc::clone(&self.live),
        ));

        self.active = Some(ActiveTimer { url, stop, task });
    }

    /// Stop future ticks. An in-flight request still completes.
    ///
    /// Returns whether a timer was running; stopping an idle poller is a no-op.
    pub fn stop(&mut self) -> bool {
        match self.active.take() {
            Some(active) => {
                let _ = active.stop.send(());
                tracing::debug!(poller = self.name, url = %active.url, "stop requested");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .map_or(false, |active| !active.task.is_finished())
    }

    pub fn target(&self) -> Option<&Url> {
        self.active.as_ref().map(|active| &active.url)
    }

    /// Timers of this poller that are still running, including ones that were
    /// asked to stop but are finishing an in-flight request.
    pub fn live_timers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Run a single tick right away without touching the running timer.
    pub fn fetch_once<T, R>(&self, target: PollTarget<T>, mut render: R) -> JoinHandle<()>
    where
        T: Send + 'static,
        R: FnMut(T) -> Result<(), RenderError> + Send + 'static,
    {
        let name = self.name;
        let fetcher = Arc::clone(&self.fetcher);

        self.runtime.spawn(async move {
            if let Err(e) = tick(&*fetcher, &target, &mut render).await {
                report(name, &target.url, &e);
            }
        })
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::{
        collections::VecDeque,
        sync::{atomic::AtomicBool, Mutex},
    };

    /// Replays canned responses; the last one repeats forever.
    pub(crate) struct ScriptedFetcher {
        responses: Mutex<VecDeque<Response>>,
        pub(crate) calls: AtomicUsize,
        pub(crate) urls: Mutex<Vec<Url>>,
    }

    impl ScriptedFetcher {
        pub(crate) fn new(responses: Vec<(u16, &str)>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|(status, body)| Response {
                            status,
                            body: body.to_string(),
                        })
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
                urls: Mutex::new(vec![]),
            })
        }
    }

    #[async_trait]
    impl Fetch for ScriptedFetcher {
        async fn get(&self, url: &Url) -> Result<Response, PollError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(url.clone());
            let mut responses = self.responses.lock().unwrap();
            let next = if responses.len() > 1 {
                responses.pop_front()
            } else {
                responses.front().cloned()
            };
            Ok(next.unwrap_or(Response {
                status: 404,
                body: String::new(),
            }))
        }
    }

    fn url(path: &str) -> Url {
        Url::parse("http://localhost:9990/admin/").unwrap().join(path).unwrap()
    }

    fn collecting() -> (Arc<Mutex<Vec<f64>>>, impl FnMut(f64) -> Result<(), RenderError>) {
        let seen = Arc::new(Mutex::new(vec![]));
        let sink = Arc::clone(&seen);
        (seen, move |v| {
            sink.lock().unwrap().push(v);
            Ok(())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_leaves_one_live_timer() {
        let fetcher = ScriptedFetcher::new(vec![(200, "1")]);
        let mut poller = Poller::new("test", Handle::current(), fetcher);

        let (_, render) = collecting();
        poller.start(PollTarget::new(url("a"), Duration::from_secs(1), json::<f64>), render);
        let (_, render) = collecting();
        poller.start(PollTarget::new(url("b"), Duration::from_secs(1), json::<f64>), render);

        time::sleep(Duration::from_millis(10)).await;

        assert_eq!(poller.live_timers(), 1);
        assert!(poller.is_active());
        assert_eq!(poller.target(), Some(&url("b")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let fetcher = ScriptedFetcher::new(vec![(200, "1")]);
        let mut poller = Poller::new("test", Handle::current(), fetcher);

        assert!(!poller.stop());

        let (_, render) = collecting();
        poller.start(PollTarget::new(url("a"), Duration::from_secs(1), json::<f64>), render);
        time::sleep(Duration::from_millis(10)).await;

        assert!(poller.stop());
        assert!(!poller.stop());
        time::sleep(Duration::from_millis(10)).await;

        assert_eq!(poller.live_timers(), 0);
        assert!(!poller.is_active());
        assert_eq!(poller.target(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_ticks_do_not_stop_the_loop() {
        let fetcher = ScriptedFetcher::new(vec![(503, ""), (200, "not json"), (200, "42")]);
        let mut poller = Poller::new("test", Handle::current(), fetcher.clone());

        let (seen, render) = collecting();
        poller.start(PollTarget::new(url("a"), Duration::from_secs(1), json::<f64>), render);

        time::sleep(Duration::from_millis(3500)).await;

        // ticks at 0s, 1s, 2s and 3s
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 4);
        assert_eq!(*seen.lock().unwrap(), vec![42.0, 42.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_failures_are_contained() {
        let fetcher = ScriptedFetcher::new(vec![(200, "7")]);
        let mut poller = Poller::new("test", Handle::current(), fetcher.clone());

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        poller.start(
            PollTarget::new(url("a"), Duration::from_secs(1), json::<f64>),
            move |_| match counter.fetch_add(1, Ordering::SeqCst) {
                0 => panic!("render blew up"),
                1 => Err(RenderError::MissingMetric("requests".into())),
                _ => Ok(()),
            },
        );

        time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(poller.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_gate_skips_fetch() {
        let fetcher = ScriptedFetcher::new(vec![(200, "1")]);
        let mut poller = Poller::new("test", Handle::current(), fetcher.clone());

        let open = Arc::new(AtomicBool::new(false));
        let gate = Arc::clone(&open);
        let (seen, render) = collecting();
        poller.start(
            PollTarget::new(url("a"), Duration::from_secs(1), json::<f64>)
                .gated(move || gate.load(Ordering::SeqCst)),
            render,
        );

        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);

        open.store(true, Ordering::SeqCst);
        time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), vec![1.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_once_does_not_start_a_timer() {
        let fetcher = ScriptedFetcher::new(vec![(200, "3")]);
        let poller = Poller::new("test", Handle::current(), fetcher.clone());

        let (seen, render) = collecting();
        poller
            .fetch_once(PollTarget::new(url("a"), Duration::from_secs(1), json::<f64>), render)
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![3.0]);
        assert_eq!(poller.live_timers(), 0);
        assert!(!poller.is_active());
    }

    #[test]
    fn test_scalar_decoder() {
        let decode = scalar(',');
        assert_eq!(decode("requests,42\n").unwrap(), 42.0);
        assert_eq!(decode(" 3.5 ").unwrap(), 3.5);
        assert!(decode("requests,").is_err());
        assert!(decode("").is_err());
    }
}
