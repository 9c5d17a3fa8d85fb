//! Room listings aggregator.
//!
//! Pulls room-to-rent listings from classified-ad sources, scores each one
//! against the user's preferences, keeps them in a per-source store across
//! runs and renders the best ones into an HTML report.

pub mod config;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod report;
pub mod scoring;
pub mod scrapers;
pub mod store;

pub use config::{FileConfig, Settings};
pub use models::{ListingRecord, Phone, Source};
pub use reconcile::{ReconcileOptions, Reconciler, RunMode, RunSummary};
pub use scoring::{ScoreBreakdown, Scorer};
pub use store::{JsonFileStorage, ListingStore, Storage};
