//! Runtime configuration shared between the tick loop and request handlers.
//!
//! The filter settings and the source selector live together behind one
//! mutex. Readers copy the whole tuple out in a single critical section, so a
//! tick never sees the filters of one update paired with the selector of
//! another.

use std::sync::{Mutex, MutexGuard};

use frame_enhance_common::config::{ConfigError, FilterConfig};
use frame_enhance_common::selector::{SelectorError, SourceSelector};
use serde::{Deserialize, Serialize};
use tracing::info;

/// The tuple every tick runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveConfig {
    pub filters: FilterConfig,
    pub selector: SourceSelector,
}

impl ActiveConfig {
    pub fn view(&self) -> ConfigView {
        ConfigView {
            clahe: self.filters.clahe,
            unsharp_amount: self.filters.unsharp_amount,
            denoise: self.filters.denoise,
            source: self.selector.to_string(),
        }
    }
}

/// Wire form of the runtime-adjustable settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigView {
    pub clahe: bool,
    pub unsharp_amount: f32,
    pub denoise: bool,
    pub source: String,
}

/// A configuration request. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub clahe: Option<bool>,
    #[serde(default)]
    pub unsharp_amount: Option<f32>,
    #[serde(default)]
    pub denoise: Option<bool>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Copy of the shared state taken at the start of a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub config: ActiveConfig,
    /// Bumped every time the selector changes. A runner holding a source
    /// opened under an older generation must release it before reading.
    pub source_generation: u64,
}

#[derive(Debug)]
pub struct UpdateOutcome {
    pub config: ActiveConfig,
    pub source_changed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("invalid source: {0}")]
    Selector(#[from] SelectorError),
    #[error(transparent)]
    Filters(#[from] ConfigError),
}

type Committed = (UpdateOutcome, Option<(SourceSelector, u64)>);

struct State {
    config: ActiveConfig,
    source_generation: u64,
}

pub struct SharedConfig {
    state: Mutex<State>,
}

impl SharedConfig {
    pub fn new(initial: ActiveConfig) -> Self {
        Self {
            state: Mutex::new(State {
                config: initial,
                source_generation: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // The critical sections only copy or assign whole values, so a
        // poisoned guard still holds a consistent state.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            config: state.config.clone(),
            source_generation: state.source_generation,
        }
    }

    pub fn current(&self) -> ActiveConfig {
        self.lock().config.clone()
    }

    /// Replace the whole tuple. Rejected updates leave the current
    /// configuration untouched.
    pub fn replace(&self, next: ActiveConfig) -> Result<UpdateOutcome, UpdateError> {
        next.filters.validate()?;
        let committed = Self::commit(&mut self.lock(), next);
        Ok(Self::finish(committed))
    }

    /// Merge a partial request into the current configuration and commit it
    /// in one critical section.
    pub fn apply(&self, update: &ConfigUpdate) -> Result<UpdateOutcome, UpdateError> {
        let selector = update
            .source
            .as_deref()
            .map(str::parse::<SourceSelector>)
            .transpose()?;

        let mut state = self.lock();
        let mut next = state.config.clone();
        if let Some(clahe) = update.clahe {
            next.filters.clahe = clahe;
        }
        if let Some(denoise) = update.denoise {
            next.filters.denoise = denoise;
        }
        if let Some(amount) = update.unsharp_amount {
            next.filters.unsharp_amount = amount;
        }
        if let Some(selector) = selector {
            next.selector = selector;
        }
        next.filters.validate()?;
        let committed = Self::commit(&mut state, next);
        drop(state);
        Ok(Self::finish(committed))
    }

    /// Swap in `next`. Returns the outcome and, when the selector moved, the
    /// previous selector with the new generation for logging once the lock
    /// is released.
    fn commit(state: &mut State, next: ActiveConfig) -> Committed {
        let source_changed = next.selector != state.config.selector;
        let previous = std::mem::replace(&mut state.config, next.clone());
        let change = source_changed.then(|| {
            state.source_generation += 1;
            (previous.selector, state.source_generation)
        });
        let outcome = UpdateOutcome {
            config: next,
            source_changed,
        };
        (outcome, change)
    }

    fn finish((outcome, change): Committed) -> UpdateOutcome {
        if let Some((from, generation)) = change {
            info!(
                %from,
                to = %outcome.config.selector,
                generation,
                "source selector changed"
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn initial() -> ActiveConfig {
        ActiveConfig {
            filters: FilterConfig::default(),
            selector: SourceSelector::Device(0),
        }
    }

    #[test]
    fn filter_only_update_keeps_generation() {
        let shared = SharedConfig::new(initial());
        let outcome = shared
            .apply(&ConfigUpdate {
                clahe: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert!(!outcome.source_changed);
        let snap = shared.snapshot();
        assert!(snap.config.filters.clahe);
        assert_eq!(snap.source_generation, 0);
    }

    #[test]
    fn selector_change_bumps_generation() {
        let shared = SharedConfig::new(initial());
        let outcome = shared
            .apply(&ConfigUpdate {
                source: Some("clips/sample.mp4".into()),
                ..Default::default()
            })
            .unwrap();
        assert!(outcome.source_changed);
        assert_eq!(shared.snapshot().source_generation, 1);

        // Same selector again is not a change.
        shared
            .apply(&ConfigUpdate {
                source: Some("clips/sample.mp4".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(shared.snapshot().source_generation, 1);
    }

    #[test]
    fn rejected_update_leaves_state_untouched() {
        let shared = SharedConfig::new(initial());
        let before = shared.snapshot();

        let err = shared
            .apply(&ConfigUpdate {
                clahe: Some(true),
                source: Some("   ".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, UpdateError::Selector(SelectorError::Empty)));

        let err = shared
            .apply(&ConfigUpdate {
                clahe: Some(true),
                unsharp_amount: Some(-1.0),
                source: Some("other.mp4".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, UpdateError::Filters(_)));

        assert_eq!(shared.snapshot(), before);
    }

    /// Records whether the state mutex was held while an event was emitted.
    struct LockWatch {
        shared: Arc<SharedConfig>,
        events: Arc<AtomicUsize>,
        held: Arc<AtomicBool>,
    }

    impl tracing::Subscriber for LockWatch {
        fn enabled(&self, _: &tracing::Metadata<'_>) -> bool {
            true
        }
        fn new_span(&self, _: &tracing::span::Attributes<'_>) -> tracing::span::Id {
            tracing::span::Id::from_u64(1)
        }
        fn record(&self, _: &tracing::span::Id, _: &tracing::span::Record<'_>) {}
        fn record_follows_from(&self, _: &tracing::span::Id, _: &tracing::span::Id) {}
        fn event(&self, _: &tracing::Event<'_>) {
            self.events.fetch_add(1, Ordering::SeqCst);
            if self.shared.state.try_lock().is_err() {
                self.held.store(true, Ordering::SeqCst);
            }
        }
        fn enter(&self, _: &tracing::span::Id) {}
        fn exit(&self, _: &tracing::span::Id) {}
    }

    #[test]
    fn selector_change_logged_after_unlock() {
        let shared = Arc::new(SharedConfig::new(initial()));
        let events = Arc::new(AtomicUsize::new(0));
        let held = Arc::new(AtomicBool::new(false));
        let watch = LockWatch {
            shared: Arc::clone(&shared),
            events: Arc::clone(&events),
            held: Arc::clone(&held),
        };

        tracing::subscriber::with_default(watch, || {
            shared
                .apply(&ConfigUpdate {
                    source: Some("clips/sample.mp4".into()),
                    ..Default::default()
                })
                .unwrap();
            shared
                .replace(ActiveConfig {
                    selector: SourceSelector::Device(2),
                    ..initial()
                })
                .unwrap();
        });

        assert_eq!(events.load(Ordering::SeqCst), 2);
        assert!(!held.load(Ordering::SeqCst));
        assert_eq!(shared.snapshot().source_generation, 2);
    }

    #[test]
    fn view_round_trips_selector_text() {
        let mut config = initial();
        config.selector = SourceSelector::Path("a.mp4".into());
        config.filters.unsharp_amount = 1.5;
        let view = config.view();
        assert_eq!(view.source, "a.mp4");
        assert_eq!(view.unsharp_amount, 1.5);
    }

    #[test]
    fn snapshots_never_mix_updates() {
        let a = ActiveConfig {
            filters: FilterConfig {
                clahe: true,
                unsharp_amount: 1.0,
                ..FilterConfig::default()
            },
            selector: SourceSelector::Path("a.mp4".into()),
        };
        let b = ActiveConfig {
            filters: FilterConfig::default(),
            selector: SourceSelector::Path("b.mp4".into()),
        };
        let shared = Arc::new(SharedConfig::new(a.clone()));
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let shared = Arc::clone(&shared);
            let done = Arc::clone(&done);
            let (a, b) = (a.clone(), b.clone());
            std::thread::spawn(move || {
                for i in 0..2000 {
                    let next = if i % 2 == 0 { b.clone() } else { a.clone() };
                    shared.replace(next).unwrap();
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let mut last_generation = 0;
        while !done.load(Ordering::SeqCst) {
            let snap = shared.snapshot();
            assert!(snap.config == a || snap.config == b, "mixed snapshot: {snap:?}");
            assert!(snap.source_generation >= last_generation);
            last_generation = snap.source_generation;
        }
        writer.join().unwrap();
        assert_eq!(shared.snapshot().source_generation, 2000);
    }
}
