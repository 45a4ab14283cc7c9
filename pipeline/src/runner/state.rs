use std::fmt;
use std::time::{Duration, Instant};

use crate::source::FrameSource;

pub(crate) enum RunnerState {
    /// Nothing opened yet.
    Idle,
    /// A source is open and being read.
    Streaming {
        source: Box<dyn FrameSource>,
        /// Selector generation the source was opened under.
        generation: u64,
        /// Consecutive failed reads.
        read_failures: u32,
    },
    /// No usable source. The next open attempt is due at `retry_at`, or
    /// immediately once the selector changes.
    AwaitingSource {
        generation: u64,
        backoff: Duration,
        retry_at: Instant,
    },
    Stopped,
}

impl RunnerState {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            RunnerState::Idle => "idle",
            RunnerState::Streaming { .. } => "streaming",
            RunnerState::AwaitingSource { .. } => "awaiting_source",
            RunnerState::Stopped => "stopped",
        }
    }
}

impl fmt::Debug for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerState::Streaming {
                source,
                generation,
                read_failures,
            } => f
                .debug_struct("Streaming")
                .field("selector", &source.selector().to_string())
                .field("generation", generation)
                .field("read_failures", read_failures)
                .finish(),
            RunnerState::AwaitingSource {
                generation,
                backoff,
                ..
            } => f
                .debug_struct("AwaitingSource")
                .field("generation", generation)
                .field("backoff", backoff)
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

pub(crate) fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_cap() {
        let max = Duration::from_millis(1000);
        let mut backoff = Duration::from_millis(250);
        let mut seen = Vec::new();
        for _ in 0..4 {
            backoff = next_backoff(backoff, max);
            seen.push(backoff.as_millis());
        }
        assert_eq!(seen, vec![500, 1000, 1000, 1000]);
    }
}
