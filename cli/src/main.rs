//! frame-enhance - run the enhancement pipeline locally, or threshold a still

mod args;

use std::sync::Arc;

use anyhow::{Context, Result};
use args::{Cli, Command, RunArgs, ThresholdArgs};
use clap::Parser;
use frame_enhance_common::config::Config;
use frame_enhance_common::frame::FrameImage;
use frame_enhance_common::selector::SourceSelector;
use frame_enhance_pipeline::filter::apply_adaptive_threshold;
use frame_enhance_pipeline::sink::{PreviewSettings, PreviewSink, RecordSettings, RecordSink};
use frame_enhance_pipeline::source::{DefaultOpener, FfmpegSettings};
use frame_enhance_pipeline::{ActiveConfig, PipelineRunner, RunnerSettings, SharedConfig};
use tracing::{info, warn};

const FFPLAY: &str = "ffplay";
/// Recording rate when neither `--fps` nor the source provides one.
const DEFAULT_FPS: f64 = 30.0;

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.parse().unwrap_or_default()),
        )
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args),
        Command::Threshold(args) => threshold(args),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = Config::discover(args.config.clone()).context("failed to load config")?;
    args.apply_to(&mut config)?;
    init_tracing(&config.logging.level);

    let selector: SourceSelector = config
        .source
        .selector
        .parse()
        .context("invalid source selector")?;
    info!(
        %selector,
        clahe = config.filters.clahe,
        denoise = config.filters.denoise,
        unsharp_amount = config.filters.unsharp_amount,
        "starting enhancement"
    );

    let opener = DefaultOpener::new(FfmpegSettings::from(&config.source));
    let fps = match args.fps {
        Some(fps) => fps,
        None if args.out.is_some() => opener.frame_rate(&selector).unwrap_or(DEFAULT_FPS),
        None => DEFAULT_FPS,
    };

    let shared = Arc::new(SharedConfig::new(ActiveConfig {
        filters: config.filters.clone(),
        selector,
    }));
    let mut runner = PipelineRunner::new(shared, Box::new(opener), RunnerSettings::from(&config));

    if args.show {
        let preview = PreviewSink::spawn(&PreviewSettings::ffplay(FFPLAY, config.stream.jpeg_quality))
            .context("failed to start preview")?;
        runner.add_sink(Box::new(preview));
    }
    if let Some(out) = &args.out {
        let settings = RecordSettings {
            fps,
            ..RecordSettings::new(config.source.ffmpeg.clone(), out.clone())
        };
        let recorder = RecordSink::start(&settings).context("failed to start recording")?;
        runner.add_sink(Box::new(recorder));
    }
    if !args.show && args.out.is_none() {
        warn!("neither --show nor --out given; frames are processed and discarded");
    }

    let stop = runner.stop_handle();
    if let Err(err) = ctrlc::set_handler(move || stop.stop()) {
        warn!("Failed to install Ctrl+C handler: {err}");
    }

    runner.run();
    info!("done");
    Ok(())
}

fn threshold(args: ThresholdArgs) -> Result<()> {
    init_tracing("info");

    let input = image::open(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let frame = FrameImage::Rgb(input.to_rgb8());
    let binary = apply_adaptive_threshold(&frame, args.block_size, args.c)?;
    let FrameImage::Gray(gray) = binary else {
        anyhow::bail!("adaptive threshold did not produce a grayscale image");
    };
    gray.save(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        block_size = args.block_size,
        c = args.c,
        "threshold written"
    );
    Ok(())
}
