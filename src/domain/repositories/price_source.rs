//! Price Source Trait
//!
//! Transport seam of the fetch client. Implementations perform exactly one
//! upstream request per call; rate limiting, retries and validation are
//! layered on top by `FetchClient`.

use async_trait::async_trait;

use crate::domain::errors::FetchError;

/// Source of daily closing prices.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Chronological daily closes for `symbol` over `period` (e.g. `1mo`).
    ///
    /// # Arguments
    /// * `symbol` - A ticker already validated by the caller
    /// * `period` - Lookback period understood by the upstream
    async fn daily_closes(&self, symbol: &str, period: &str) -> Result<Vec<f64>, FetchError>;
}
