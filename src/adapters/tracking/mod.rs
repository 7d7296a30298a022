mod tracker;

pub use tracker::{AttemptStats, AttemptTracker};
