//! Lead Discovery & Enrichment Engine Library
//!
//! Discovers businesses from several external sources, merges duplicate
//! listings, fills in missing contact and presence data, and ranks the
//! result by opportunity and predicted conversion.
//!
//! # Modules
//!
//! - `ai`: Optional AI-written lead summaries.
//! - `circuit_breaker`: Circuit breakers for enrichment providers.
//! - `config`: Configuration management.
//! - `context`: Per-call deadline, cancellation and tenant.
//! - `db`: Database connection and pool management.
//! - `db_storage`: Postgres lead storage.
//! - `dedup`: Identity resolution and candidate merging.
//! - `engine`: End-to-end discovery pipeline.
//! - `enrichment`: Rate-limited enrichment provider chains.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `models`: Core data models.
//! - `notifier`: High-value lead alerts.
//! - `orchestrator`: Concurrent source fan-out.
//! - `repository`: Lead persistence interface.
//! - `scheduler`: Recurring discovery jobs.
//! - `scoring`: Opportunity and predictive scoring.
//! - `sources`: External source adapters.
//! - `strategy`: Per-industry discovery strategy.
//! - `validation`: Email and phone validation.
//! - `website`: Website fetching, analysis and extraction.

pub mod ai;
pub mod circuit_breaker;
pub mod config;
pub mod context;
pub mod db;
pub mod db_storage;
pub mod dedup;
pub mod engine;
pub mod enrichment;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod notifier;
pub mod orchestrator;
pub mod repository;
pub mod scheduler;
pub mod scoring;
pub mod sources;
pub mod strategy;
pub mod validation;
pub mod website;
