use std::{
    error::Error,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use clap::Parser;

use admin_dash::{
    app::App,
    config::{Cli, Config},
    logging,
    poller::HttpFetcher,
    ui,
};

fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::from_cli(Cli::parse())?;
    logging::init(&config)?;
    tracing::info!(admin = %config.admin, wire = ?config.wire, "starting dashboard");

    // Pollers run here; the terminal loop keeps the main thread.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;
    let fetcher = Arc::new(HttpFetcher::new(config.timeout)?);

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;

    let app = App::new(&config, runtime.handle().clone(), fetcher);
    let res = ui::run(app, running);

    runtime.shutdown_background();
    if let Err(err) = &res {
        tracing::error!("terminal error: {}", err);
    }
    Ok(res?)
}
