use crate::domain::DispatchAttempt;

/// Receives every fallback candidate attempt, successful or not.
pub trait AttemptObserver: Send + Sync {
    fn on_attempt(&self, attempt: &DispatchAttempt);
}
