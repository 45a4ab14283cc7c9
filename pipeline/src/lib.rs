//! Frame ingestion, enhancement and delivery.
//!
//! A [`PipelineRunner`] pulls frames from a [`source::FrameSource`], runs the
//! [`filter::FilterChain`] selected by the [`SharedConfig`] snapshot of each
//! tick, and hands the result to its [`sink::FrameSink`]s.

pub mod encode;
pub mod filter;
pub mod runner;
pub mod shared;
pub mod sink;
pub mod source;

pub use runner::{PipelineRunner, RunnerSettings, StopHandle, TickOutcome};
pub use shared::{ActiveConfig, ConfigUpdate, ConfigView, SharedConfig, UpdateError};
