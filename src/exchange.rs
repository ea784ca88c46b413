pub mod binance;

use chrono::{DateTime, Utc};
use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::ExchangeError;
use crate::model::{Candle, TimeFrame};

/// Source of historical candle data.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn Exchange`).
pub trait Exchange: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the most recent `limit` candles, oldest first.
    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Candle>, Report<ExchangeError>>>;

    /// Fetch every candle opened in `[start_time, end_time)`, oldest first.
    fn fetch_candles_in_range(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Candle>, Report<ExchangeError>>>;
}
