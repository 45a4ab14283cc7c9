//! The tick loop.
//!
//! One [`PipelineRunner`] owns the live [`FrameSource`] and the sinks and runs
//! on a dedicated thread. Each tick takes one snapshot of the shared
//! configuration, makes sure a source matching the snapshot is open, reads one
//! frame, filters it, and hands the result to every sink. Failures inside a
//! tick are logged and retried on later ticks; only a stop ends the loop.

mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use frame_enhance_common::config::{Config, EndOfStreamPolicy, FilterConfig};
use frame_enhance_common::frame::TimestampedFrame;
use tracing::{debug, info, warn};

use crate::filter::FilterChain;
use crate::shared::{SharedConfig, Snapshot};
use crate::sink::{FrameSink, SinkError, SinkStatus};
use crate::source::{FrameSource, SourceError, SourceOpener};
use state::{next_backoff, RunnerState};

const DEFAULT_MAX_READ_FAILURES: u32 = 3;

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Wait before the first reopen attempt after a source fails.
    pub retry_initial: Duration,
    pub retry_max: Duration,
    /// Sleep between ticks while waiting for a source.
    pub tick_slot: Duration,
    pub end_of_stream: EndOfStreamPolicy,
    /// Consecutive read errors after which the source is reopened.
    pub max_read_failures: u32,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for RunnerSettings {
    fn from(config: &Config) -> Self {
        let retry_initial = Duration::from_millis(config.pipeline.retry_initial_ms);
        Self {
            retry_initial,
            retry_max: Duration::from_millis(config.pipeline.retry_max_ms).max(retry_initial),
            tick_slot: Duration::from_millis(config.pipeline.tick_slot_ms),
            end_of_stream: config.source.end_of_stream,
            max_read_failures: DEFAULT_MAX_READ_FAILURES,
        }
    }
}

/// Requests a cooperative stop. The runner checks it once per tick.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame reached the sinks.
    Delivered,
    /// The tick produced no frame (read or filter failure); try again.
    Skipped,
    /// No source is open yet.
    Waiting,
    Stopped,
}

pub struct PipelineRunner {
    shared: Arc<SharedConfig>,
    opener: Box<dyn SourceOpener>,
    sinks: Vec<Box<dyn FrameSink>>,
    settings: RunnerSettings,
    stop: StopHandle,
    state: Option<RunnerState>, // Option so we can take() during transitions
    chain_config: FilterConfig,
    chain: FilterChain,
}

impl PipelineRunner {
    pub fn new(
        shared: Arc<SharedConfig>,
        opener: Box<dyn SourceOpener>,
        settings: RunnerSettings,
    ) -> Self {
        let chain_config = shared.current().filters;
        let chain = FilterChain::from_config(&chain_config);
        Self {
            shared,
            opener,
            sinks: Vec::new(),
            settings,
            stop: StopHandle::default(),
            state: Some(RunnerState::Idle),
            chain_config,
            chain,
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn FrameSink>) {
        info!(sink = sink.name(), "sink attached");
        self.sinks.push(sink);
    }

    pub fn with_sink(mut self, sink: Box<dyn FrameSink>) -> Self {
        self.add_sink(sink);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state_name(&self) -> &'static str {
        self.state.as_ref().map_or("stopped", RunnerState::name)
    }

    /// Run the loop on its own thread until stopped.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        let mut runner = self;
        thread::Builder::new()
            .name("pipeline".into())
            .spawn(move || runner.run())
    }

    pub fn run(&mut self) {
        info!(sinks = self.sinks.len(), "pipeline runner started");
        loop {
            match self.tick() {
                TickOutcome::Stopped => break,
                TickOutcome::Waiting => thread::sleep(self.settings.tick_slot),
                TickOutcome::Delivered | TickOutcome::Skipped => {}
            }
        }
    }

    /// One pass: snapshot, ensure source, read, filter, deliver.
    pub fn tick(&mut self) -> TickOutcome {
        if self.stop.is_stopped() {
            self.shutdown();
            return TickOutcome::Stopped;
        }

        let snapshot = self.shared.snapshot();
        let state = self.state.take().unwrap_or(RunnerState::Stopped);
        let state = self.ensure_source(state, &snapshot);

        let (state, outcome) = match state {
            RunnerState::Streaming {
                source,
                generation,
                read_failures,
            } => self.process(source, generation, read_failures, &snapshot),
            RunnerState::Stopped => (RunnerState::Stopped, TickOutcome::Stopped),
            waiting => (waiting, TickOutcome::Waiting),
        };
        self.state = Some(state);

        if outcome == TickOutcome::Stopped {
            self.shutdown();
        }
        outcome
    }

    fn ensure_source(&mut self, state: RunnerState, snapshot: &Snapshot) -> RunnerState {
        match state {
            RunnerState::Idle => self.open(snapshot, self.settings.retry_initial),
            RunnerState::Streaming {
                mut source,
                generation,
                ..
            } if generation != snapshot.source_generation => {
                // The old handle is gone before anything else touches a source.
                source.release();
                info!(
                    old = %source.selector(),
                    new = %snapshot.config.selector,
                    "source selector changed"
                );
                drop(source);
                self.open(snapshot, self.settings.retry_initial)
            }
            RunnerState::AwaitingSource {
                generation,
                backoff,
                retry_at,
            } => {
                if generation != snapshot.source_generation {
                    self.open(snapshot, self.settings.retry_initial)
                } else if Instant::now() >= retry_at {
                    self.open(snapshot, next_backoff(backoff, self.settings.retry_max))
                } else {
                    RunnerState::AwaitingSource {
                        generation,
                        backoff,
                        retry_at,
                    }
                }
            }
            other => other,
        }
    }

    /// Try to open the snapshot's selector. On failure wait `backoff` before
    /// the next attempt.
    fn open(&mut self, snapshot: &Snapshot, backoff: Duration) -> RunnerState {
        let selector = &snapshot.config.selector;
        match self.opener.open(selector) {
            Ok(source) => {
                info!(%selector, generation = snapshot.source_generation, "source opened");
                RunnerState::Streaming {
                    source,
                    generation: snapshot.source_generation,
                    read_failures: 0,
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    retry_in_ms = backoff.as_millis() as u64,
                    "source unavailable"
                );
                self.awaiting(snapshot.source_generation, backoff)
            }
        }
    }

    fn awaiting(&self, generation: u64, backoff: Duration) -> RunnerState {
        RunnerState::AwaitingSource {
            generation,
            backoff,
            retry_at: Instant::now() + backoff,
        }
    }

    fn process(
        &mut self,
        mut source: Box<dyn FrameSource>,
        generation: u64,
        read_failures: u32,
        snapshot: &Snapshot,
    ) -> (RunnerState, TickOutcome) {
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(SourceError::EndOfStream) => match self.settings.end_of_stream {
                EndOfStreamPolicy::Stop => {
                    info!(selector = %source.selector(), "end of stream, stopping");
                    self.stop.stop();
                    return (
                        RunnerState::Streaming {
                            source,
                            generation,
                            read_failures,
                        },
                        TickOutcome::Stopped,
                    );
                }
                EndOfStreamPolicy::Loop => match source.rewind().and_then(|()| source.next_frame()) {
                    Ok(frame) => {
                        debug!(selector = %source.selector(), "looped to first frame");
                        frame
                    }
                    Err(e) => {
                        warn!(error = %e, selector = %source.selector(), "cannot loop source, reopening");
                        source.release();
                        let state = self.awaiting(generation, self.settings.retry_initial);
                        return (state, TickOutcome::Skipped);
                    }
                },
            },
            Err(e) => {
                let read_failures = read_failures + 1;
                if read_failures >= self.settings.max_read_failures {
                    warn!(error = %e, read_failures, "source keeps failing, reopening");
                    source.release();
                    let state = self.awaiting(generation, self.settings.retry_initial);
                    return (state, TickOutcome::Skipped);
                }
                warn!(error = %e, read_failures, "frame read failed");
                return (
                    RunnerState::Streaming {
                        source,
                        generation,
                        read_failures,
                    },
                    TickOutcome::Skipped,
                );
            }
        };

        let streaming = RunnerState::Streaming {
            source,
            generation,
            read_failures: 0,
        };

        self.refresh_chain(&snapshot.config.filters);
        let processed = match self.chain.apply(&frame) {
            Ok(processed) => processed,
            Err(e) => {
                warn!(seq = frame.seq(), error = %e, "filter failed, frame skipped");
                return (streaming, TickOutcome::Skipped);
            }
        };

        if self.deliver(&processed) {
            self.stop.stop();
            return (streaming, TickOutcome::Stopped);
        }
        (streaming, TickOutcome::Delivered)
    }

    fn refresh_chain(&mut self, filters: &FilterConfig) {
        if &self.chain_config != filters {
            self.chain = FilterChain::from_config(filters);
            self.chain_config = filters.clone();
            info!(stages = ?self.chain.stage_names(), "filter chain updated");
        }
    }

    /// Hand the frame to every sink. Returns true if any sink asked to stop.
    fn deliver(&mut self, frame: &TimestampedFrame) -> bool {
        let mut stop_requested = false;
        self.sinks.retain_mut(|sink| match sink.deliver(frame) {
            Ok(SinkStatus::Continue) => true,
            Ok(SinkStatus::StopRequested) => {
                info!(sink = sink.name(), "sink requested stop");
                stop_requested = true;
                true
            }
            Err(SinkError::Closed) => {
                info!(sink = sink.name(), "sink closed, detaching");
                sink.close();
                false
            }
            Err(e) => {
                warn!(sink = sink.name(), seq = frame.seq(), error = %e, "sink delivery failed");
                true
            }
        });
        stop_requested
    }

    /// Release the source and close every sink. Idempotent.
    fn shutdown(&mut self) {
        match self.state.replace(RunnerState::Stopped) {
            Some(RunnerState::Stopped) => return,
            Some(RunnerState::Streaming { mut source, .. }) => source.release(),
            _ => {}
        }
        self.stop.stop();
        for sink in &mut self.sinks {
            sink.close();
        }
        self.sinks.clear();
        info!("pipeline stopped");
    }
}

impl Drop for PipelineRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
