//! Service layer for the watcher.
//!
//! - Subscription checks and watch creation (`SubscriptionCheckCoordinator`)
//! - Stable selector hints (`SelectorAdvisor`)
//! - Randomness for probabilistic refreshes (`RandomSource`)

mod advisor;
mod coordinator;
mod sampling;

pub use advisor::{HttpAdvisor, NoopAdvisor, SelectorAdvisor, advisor_from_config};
pub use coordinator::SubscriptionCheckCoordinator;
pub use sampling::{FixedRandom, RandomSource, ThreadRandom};
