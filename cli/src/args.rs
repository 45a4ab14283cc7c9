use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use frame_enhance_common::config::{Config, EndOfStreamPolicy};

#[derive(Parser, Debug)]
#[command(author, version, about = "Enhance frames from a camera or video file")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the enhancement pipeline on a video source.
    Run(RunArgs),
    /// Binarize a still image with a Gaussian adaptive threshold.
    Threshold(ThresholdArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Video source: device index (e.g. 0) or file path. Overrides the config file.
    #[arg(long)]
    pub source: Option<String>,
    /// Enable CLAHE contrast normalization.
    #[arg(long)]
    pub clahe: bool,
    /// Unsharp mask amount (0 disables).
    #[arg(long)]
    pub unsharp: Option<f32>,
    /// Enable non-local-means denoising (slow).
    #[arg(long)]
    pub denoise: bool,
    /// Show a live preview window; type q then Enter to stop.
    #[arg(long)]
    pub show: bool,
    /// Write the processed frames to this MP4 file.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Frame rate of the recorded file. Defaults to the source file's rate.
    #[arg(long)]
    pub fps: Option<f64>,
    /// What to do when a file source ends.
    #[arg(long, value_enum)]
    pub end_of_stream: Option<EndOfStreamArg>,
    /// Config file (defaults to ./config.toml when present).
    #[arg(long, env = "FRAME_ENHANCE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ThresholdArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Neighbourhood size in pixels; even values are bumped to odd.
    #[arg(long, default_value_t = 11)]
    pub block_size: u32,
    /// Constant subtracted from the weighted mean.
    #[arg(long, default_value_t = 2, allow_hyphen_values = true)]
    pub c: i32,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndOfStreamArg {
    Loop,
    Stop,
}

impl From<EndOfStreamArg> for EndOfStreamPolicy {
    fn from(arg: EndOfStreamArg) -> Self {
        match arg {
            EndOfStreamArg::Loop => EndOfStreamPolicy::Loop,
            EndOfStreamArg::Stop => EndOfStreamPolicy::Stop,
        }
    }
}

impl RunArgs {
    /// Layer the command-line flags over the loaded config. Flags only ever
    /// switch filters on; the file decides what is on by default.
    pub fn apply_to(&self, config: &mut Config) -> Result<()> {
        if let Some(source) = &self.source {
            config.source.selector = source.clone();
        }
        config.filters.clahe |= self.clahe;
        config.filters.denoise |= self.denoise;
        if let Some(amount) = self.unsharp {
            config.filters.unsharp_amount = amount;
        }
        if let Some(policy) = self.end_of_stream {
            config.source.end_of_stream = policy.into();
        }
        if let Some(fps) = self.fps {
            if !fps.is_finite() || fps <= 0.0 {
                bail!("--fps must be positive, got {fps}");
            }
        }
        config.validate()?;
        Ok(())
    }
}
