//! Stockcast Prediction Pipeline Library
//!
//! Daily stock price predictions: rate-limited market data fetches, an
//! expiring prediction cache, confidence scoring, a US trading calendar and
//! the daily batch with accuracy tracking.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod rate_limit;
pub mod retry;
