//! MessageParser trait for venue-specific WebSocket message handling.

use crate::error::ConnectorError;
use crate::market::market_data::LiquidationBatch;
use crate::market::streams::LiquidationStream;

// This trait keeps WebSocketSubscription venue-agnostic.
// Each venue implements formatting and parsing, the client handles the socket.
// Adding a venue = implement this trait, no changes to WebSocketSubscription.

/// Venue-specific framing of a liquidation feed.
pub trait MessageParser: Send + Sync + 'static {
    /// Returns the primary WebSocket endpoint URL.
    fn endpoint(&self) -> &str;

    /// Returns a fallback endpoint URL (if primary fails).
    fn fallback_endpoint(&self) -> Option<&str> {
        None
    }

    // Each venue has different JSON formats for subscribe/unsubscribe
    fn format_subscribe(&self, stream: &LiquidationStream) -> String;
    fn format_unsubscribe(&self, stream: &LiquidationStream) -> String;

    /// Parses one text frame.
    ///
    /// `Ok(Some(batch))` for data (possibly empty), `Ok(None)` for control
    /// messages such as subscription acks, `Err` when the payload claims to be
    /// data but cannot be decoded.
    fn parse_message(&self, msg: &str) -> Result<Option<LiquidationBatch>, ConnectorError>;

    fn name(&self) -> &'static str;

    /// Most venues cap a connection at 24h. Default: 23 hours (safe margin).
    fn max_connection_duration_secs(&self) -> u64 {
        23 * 60 * 60
    }
}
