use std::path::PathBuf;
use std::sync::Arc;

use frame_enhance_api::{router, AppState};
use frame_enhance_common::config::Config;
use frame_enhance_common::selector::SourceSelector;
use frame_enhance_pipeline::sink::{StreamHub, StreamSink};
use frame_enhance_pipeline::source::{DefaultOpener, FfmpegSettings};
use frame_enhance_pipeline::{ActiveConfig, PipelineRunner, RunnerSettings, SharedConfig, StopHandle};
use tracing::{error, info};

/// Resolves on Ctrl-C, after stopping the runner and ending every viewer
/// stream so that open connections can drain.
async fn shutdown_signal(stop: StopHandle, hub: Arc<StreamHub>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        return;
    }
    info!("shutdown requested");
    stop.stop();
    hub.close();
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args().nth(1).map(PathBuf::from);

    let config = match Config::discover(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    let selector: SourceSelector = match config.source.selector.parse() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Invalid source.selector: {e}");
            std::process::exit(1);
        }
    };

    let shared = Arc::new(SharedConfig::new(ActiveConfig {
        filters: config.filters.clone(),
        selector,
    }));
    let hub = StreamHub::from_config(&config.stream);

    let runner = PipelineRunner::new(
        Arc::clone(&shared),
        Box::new(DefaultOpener::new(FfmpegSettings::from(&config.source))),
        RunnerSettings::from(&config),
    )
    .with_sink(Box::new(StreamSink::new(
        Arc::clone(&hub),
        config.stream.jpeg_quality,
    )));
    let stop = runner.stop_handle();
    let pipeline = match runner.spawn() {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to start pipeline thread: {e}");
            std::process::exit(1);
        }
    };

    let app = router(AppState {
        shared,
        hub: Arc::clone(&hub),
    });

    let addr = format!("{}:{}", config.api.bind, config.api.port);
    info!(addr, "frame-enhance API server starting");

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to bind to {addr}: {e}");
        std::process::exit(1);
    });
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(stop.clone(), Arc::clone(&hub)))
        .await
    {
        error!(error = %e, "server error");
    }

    stop.stop();
    hub.close();
    match tokio::task::spawn_blocking(move || pipeline.join()).await {
        Ok(Ok(())) => info!("pipeline thread joined"),
        Ok(Err(_)) => error!("pipeline thread panicked"),
        Err(e) => error!(error = %e, "spawn_blocking failed"),
    }
}
