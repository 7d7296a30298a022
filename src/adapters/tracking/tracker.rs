use crate::domain::{AttemptOutcome, DispatchAttempt};
use crate::ports::AttemptObserver;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::time::interval;

/// Per directive kind counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptStats {
    pub connected: u64,
    pub failed: u64,
}

struct Entry {
    attempt: DispatchAttempt,
    at: Instant,
}

#[derive(Default)]
struct State {
    recent: Vec<Entry>,
    stats: BTreeMap<String, AttemptStats>,
}

/// Attempt observer that logs every candidate and keeps the recent ones
pub struct AttemptTracker {
    state: Arc<RwLock<State>>,
    retention: Duration,
}

impl AttemptTracker {
    pub fn new(retention: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            retention,
        }
    }

    /// Start background cleanup task
    pub fn start_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let state = self.state.clone();
        let retention = self.retention;

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(250));

            loop {
                ticker.tick().await;
                let now = Instant::now();
                if let Ok(mut state) = state.write() {
                    state.recent.retain(|entry| now.duration_since(entry.at) < retention);
                }
            }
        })
    }

    /// Attempts still inside the retention window, oldest first.
    pub fn recent(&self) -> Vec<DispatchAttempt> {
        match self.state.read() {
            Ok(state) => state.recent.iter().map(|e| e.attempt.clone()).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Counters keyed by directive keyword (`DIRECT`, `PROXY`, ...).
    pub fn stats(&self) -> BTreeMap<String, AttemptStats> {
        match self.state.read() {
            Ok(state) => state.stats.clone(),
            Err(_) => BTreeMap::new(),
        }
    }
}

impl Default for AttemptTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(4))
    }
}

impl AttemptObserver for AttemptTracker {
    fn on_attempt(&self, attempt: &DispatchAttempt) {
        match &attempt.outcome {
            AttemptOutcome::Connected => log::debug!(
                "{} (via {}) in {:?} [{}]",
                attempt.target, attempt.directive, attempt.elapsed, attempt.dispatch_id
            ),
            AttemptOutcome::Failed(reason) => log::debug!(
                "{} (via {}) failed: {} [{}]",
                attempt.target,
                attempt.directive,
                reason,
                attempt.dispatch_id
            ),
        }

        let Ok(mut state) = self.state.write() else {
            return;
        };
        let counters = state.stats.entry(attempt.directive.keyword().to_string()).or_default();
        if attempt.succeeded() {
            counters.connected += 1;
        } else {
            counters.failed += 1;
        }
        state.recent.push(Entry {
            attempt: attempt.clone(),
            at: Instant::now(),
        });
    }
}
