//! Peer locator: proximity scan log ingestion and peer multilateration

pub mod config;
pub mod database;
pub mod errors;
pub mod estimator;
pub mod filter;
pub mod geodesy;
pub mod ingest;
pub mod models;
pub mod parser;
pub mod query;
