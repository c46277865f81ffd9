//! The narrow surface the pipeline needs from a venue.
//!
//! Transport, authentication and rate limiting live behind these traits.
//! The pipeline only ever sees decoded domain objects and classified errors.

use async_trait::async_trait;

use crate::error::ConnectorError;
use crate::market::market_data::{Bar, Instrument, LiquidationBatch};
use crate::market::streams::LiquidationStream;
use crate::market::timeframe::Timeframe;

/// One venue's market data capability.
#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    /// Venue name used in logs and error context.
    fn venue(&self) -> &str;

    /// Lists every active instrument with its metadata.
    /// Fails with `ConnectorError::CatalogUnavailable`.
    async fn list_instruments(&self) -> Result<Vec<Instrument>, ConnectorError>;

    /// Fetches up to `count` most recent bars, oldest first.
    /// Fails with `ConnectorError::Fetch`.
    async fn fetch_bars(
        &self,
        instrument: &Instrument,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Bar>, ConnectorError>;

    /// Opens a liquidation feed.
    /// Fails with `ConnectorError::Subscription` when the venue rejects it
    /// outright, or `ConnectorError::Transport` when it could not be reached.
    async fn subscribe_liquidations(
        &self,
        stream: &LiquidationStream,
    ) -> Result<Box<dyn LiquidationSubscription>, ConnectorError>;
}

/// A live liquidation feed.
///
/// Receiving is pull-based: nothing is read from the venue until
/// `next_batch` is awaited, so a slow consumer backs up into the socket
/// instead of an in-process queue.
#[async_trait]
pub trait LiquidationSubscription: Send {
    /// Waits for the next feed message and decodes it.
    ///
    /// `ConnectorError::Transport` means the feed dropped and may be
    /// re-established; any other error is terminal.
    async fn next_batch(&mut self) -> Result<LiquidationBatch, ConnectorError>;

    /// Releases the underlying resource. Called exactly once by the owner.
    async fn close(&mut self);
}
