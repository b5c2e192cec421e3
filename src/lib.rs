//! Phone number fraud risk aggregation and scoring engine.
//!
//! Fans a phone number out to external reputation providers, derives
//! discrete risk factors from the collected evidence via a data-driven rule
//! table, aggregates them into a bounded 0-100 risk score, and persists the
//! resulting analysis records behind an HTTP API.

pub mod analyzer;
pub mod builder;
pub mod cache;
pub mod cache_validator;
pub mod circuit_breaker;
pub mod collector;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod providers;
pub mod quota;
pub mod rules;
pub mod scoring;
