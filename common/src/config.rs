use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_selector")]
    pub selector: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub end_of_stream: EndOfStreamPolicy,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
}

/// What the runner does when a file source runs out of frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndOfStreamPolicy {
    /// Rewind to the first frame and keep going.
    #[default]
    Loop,
    /// Stop the pipeline.
    Stop,
}

/// Filter toggles plus the fixed parameters each stage runs with.
///
/// Only `clahe`, `denoise` and `unsharp_amount` are switched at runtime; the
/// remaining fields come from the config file and are carried along unchanged.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub clahe: bool,
    #[serde(default)]
    pub denoise: bool,
    #[serde(default)]
    pub unsharp_amount: f32,
    #[serde(default = "default_clip_limit")]
    pub clip_limit: f32,
    #[serde(default = "default_tile_grid")]
    pub tile_grid: u32,
    #[serde(default = "default_unsharp_kernel")]
    pub unsharp_kernel: u32,
    #[serde(default = "default_unsharp_sigma")]
    pub unsharp_sigma: f32,
    #[serde(default)]
    pub unsharp_threshold: u8,
    #[serde(default = "default_denoise_strength")]
    pub denoise_luma: f32,
    #[serde(default = "default_denoise_strength")]
    pub denoise_chroma: f32,
    #[serde(default = "default_denoise_template")]
    pub denoise_template: u32,
    #[serde(default = "default_denoise_search")]
    pub denoise_search: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
    #[serde(default = "default_tick_slot_ms")]
    pub tick_slot_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_viewer_queue")]
    pub viewer_queue: usize,
    #[serde(default = "default_max_dropped_frames")]
    pub max_dropped_frames: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            selector: default_selector(),
            width: default_width(),
            height: default_height(),
            end_of_stream: EndOfStreamPolicy::default(),
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            clahe: false,
            denoise: false,
            unsharp_amount: 0.0,
            clip_limit: default_clip_limit(),
            tile_grid: default_tile_grid(),
            unsharp_kernel: default_unsharp_kernel(),
            unsharp_sigma: default_unsharp_sigma(),
            unsharp_threshold: 0,
            denoise_luma: default_denoise_strength(),
            denoise_chroma: default_denoise_strength(),
            denoise_template: default_denoise_template(),
            denoise_search: default_denoise_search(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry_initial_ms: default_retry_initial_ms(),
            retry_max_ms: default_retry_max_ms(),
            tick_slot_ms: default_tick_slot_ms(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_quality(),
            viewer_queue: default_viewer_queue(),
            max_dropped_frames: default_max_dropped_frames(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load an explicitly named file, or `config.toml` if it exists, or fall
    /// back to built-in defaults.
    pub fn discover(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(&path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::load(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.selector.trim().is_empty() {
            return Err(ConfigError::invalid("source.selector", "must not be empty"));
        }
        self.filters.validate()?;
        if self.stream.jpeg_quality == 0 || self.stream.jpeg_quality > 100 {
            return Err(ConfigError::invalid("stream.jpeg_quality", "must be in 1..=100"));
        }
        if self.stream.viewer_queue == 0 {
            return Err(ConfigError::invalid("stream.viewer_queue", "must be at least 1"));
        }
        if self.pipeline.retry_initial_ms == 0 || self.pipeline.tick_slot_ms == 0 {
            return Err(ConfigError::invalid(
                "pipeline",
                "retry_initial_ms and tick_slot_ms must be positive",
            ));
        }
        Ok(())
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("filters.unsharp_amount", self.unsharp_amount)?;
        non_negative("filters.clip_limit", self.clip_limit)?;
        non_negative("filters.unsharp_sigma", self.unsharp_sigma)?;
        non_negative("filters.denoise_luma", self.denoise_luma)?;
        non_negative("filters.denoise_chroma", self.denoise_chroma)?;
        if self.tile_grid == 0 {
            return Err(ConfigError::invalid("filters.tile_grid", "must be at least 1"));
        }
        if self.unsharp_kernel % 2 == 0 {
            return Err(ConfigError::invalid("filters.unsharp_kernel", "must be odd"));
        }
        if self.denoise_template % 2 == 0 || self.denoise_search % 2 == 0 {
            return Err(ConfigError::invalid(
                "filters.denoise_template",
                "template and search windows must be odd",
            ));
        }
        Ok(())
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::invalid(
            field,
            format!("must be a finite value >= 0, got {value}"),
        ));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

// Default value functions
fn default_selector() -> String {
    "0".into()
}
fn default_width() -> u32 {
    1280
}
fn default_height() -> u32 {
    720
}
fn default_ffmpeg() -> String {
    "ffmpeg".into()
}
fn default_ffprobe() -> String {
    "ffprobe".into()
}
fn default_clip_limit() -> f32 {
    2.0
}
fn default_tile_grid() -> u32 {
    8
}
fn default_unsharp_kernel() -> u32 {
    5
}
fn default_unsharp_sigma() -> f32 {
    1.0
}
fn default_denoise_strength() -> f32 {
    10.0
}
fn default_denoise_template() -> u32 {
    7
}
fn default_denoise_search() -> u32 {
    21
}
fn default_retry_initial_ms() -> u64 {
    250
}
fn default_retry_max_ms() -> u64 {
    5000
}
fn default_tick_slot_ms() -> u64 {
    50
}
fn default_quality() -> u8 {
    80
}
fn default_viewer_queue() -> usize {
    4
}
fn default_max_dropped_frames() -> u32 {
    30
}
fn default_bind() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}
fn default_log_level() -> String {
    "info".into()
}
