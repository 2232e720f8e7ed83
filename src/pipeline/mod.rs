//! Pipeline entry points for scheduled work.
//!
//! - `run_due_checks`: Check every active subscription whose interval elapsed

pub mod run;

pub use run::{RunSummary, run_due_checks};
