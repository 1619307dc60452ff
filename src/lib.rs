//! Log dashboard backend.
//!
//! Translates operator filter criteria into structured document-store
//! queries, computes dashboard statistics over a trailing 24h window,
//! serves both through a cache-aside layer with stale fallback, and renders
//! filtered result sets as CSV.

pub mod analytics;
pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod metadata;
pub mod metrics;
pub mod models;
pub mod search;
pub mod state;
pub mod store;

pub use error::{AppError, Result};
