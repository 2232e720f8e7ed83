// src/lib.rs

//! listwatch library
//!
//! Watches a list-like region of a web page and reports entries that were
//! not there on the previous check, relocating the region when its markup
//! drifts.

pub mod error;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod pipeline;
pub mod selector;
pub mod services;
pub mod storage;
pub mod utils;
