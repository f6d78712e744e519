mod app;
mod classify;
mod config;
mod control;
mod db;
mod domain;
mod export;
mod guard;
mod infrastructure;
mod scrape;
mod tasks;

use std::time::Duration;

use anyhow::Result;
use infrastructure::{directories, logging, shutdown};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config()?;
    let paths = directories::ensure_directories(&config.directories)?;
    logging::init_tracing(&config.logging, &paths)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(async move {
        let (shutdown, _) = shutdown::Shutdown::new();
        shutdown::install_signal_handlers(shutdown.clone());

        let app = app::LeadPipelineApp::initialize(config, paths, shutdown).await?;
        app.run().await
    });
    // A pending console read sits on a blocking thread that cannot be
    // cancelled.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}
