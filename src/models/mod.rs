// src/models/mod.rs

//! Domain models for the watcher.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod content;
mod history;
mod results;
mod subscription;

// Re-export all public types
pub use config::{
    AdvisorConfig, CheckConfig, Config, ExtractConfig, FetchConfig, PoolConfig, SufficiencyConfig,
};
pub use content::{ContentItem, ContentStatus};
pub use history::{ResolutionStrategy, SubscriptionHistory};
pub use results::{CheckOutcome, ListDiffResult, UrlLookupResult, WatchOutcome, WatchRequest};
pub use subscription::{RenderType, Subscription, SubscriptionStatus};
