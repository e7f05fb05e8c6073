//! Client Success Dashboard API Library
//!
//! This library provides the core functionality for the client-success
//! dashboard backend: spreadsheet and Meta Ads ingestion, reconciliation and
//! health scoring, meeting-transcript analysis, and the HTTP handlers that
//! expose them.
//!
//! # Modules
//!
//! - `analysis`: Meeting-transcript analysis pipeline.
//! - `cache`: Time-boxed dataset caching.
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `ingest`: Fathom notetaker webhook ingestion.
//! - `matcher`: Fuzzy client-identity matching.
//! - `meta_ads`: Meta Marketing API adapter.
//! - `metrics`: Health scoring and issue detection.
//! - `models`: Core data models.
//! - `parsers`: Lenient cell parsing and display formatting.
//! - `reconcile`: Cross-source reconciliation.
//! - `sheets`: Published-CSV sheet adapter.
//! - `store`: Postgres persistence for operator data.

pub mod analysis;
pub mod cache;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod ingest;
pub mod matcher;
pub mod meta_ads;
pub mod metrics;
pub mod models;
pub mod parsers;
pub mod reconcile;
pub mod sheets;
pub mod store;
