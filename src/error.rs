//! Error taxonomy shared by the connector seam, the snapshot pipeline and the
//! liquidation ingestor.

use std::fmt;

/// Errors raised by an exchange connector.
///
/// The connector classifies every failure; callers never guess whether an
/// error is worth retrying from its message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    #[error("market listing for {venue} unavailable: {reason}")]
    CatalogUnavailable { venue: String, reason: String },

    #[error("bar fetch for {symbol} failed: {reason}")]
    Fetch { symbol: String, reason: String },

    #[error("subscription to {venue} rejected: {reason}")]
    Subscription { venue: String, reason: String },

    /// Network drop or protocol desync. The feed can be re-established.
    #[error("transport error: {0}")]
    Transport(String),

    /// The feed is gone for good (revoked credentials, delisted stream, ...).
    #[error("fatal feed error: {0}")]
    Fatal(String),
}

impl ConnectorError {
    pub fn transport(reason: impl fmt::Display) -> Self {
        Self::Transport(reason.to_string())
    }

    pub fn fatal(reason: impl fmt::Display) -> Self {
        Self::Fatal(reason.to_string())
    }

    /// True for errors that must not end a run: per-instrument fetch
    /// failures and transport drops.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Transport(_))
    }
}

/// A per-instrument fetch failure, recorded next to the partial result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{symbol}: {cause}")]
pub struct FetchError {
    pub symbol: String,
    pub cause: String,
}

impl FetchError {
    pub fn new(symbol: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            cause: cause.into(),
        }
    }
}

/// Fatal errors of the catalog and snapshot pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("market listing for {venue} unavailable: {reason}")]
    CatalogUnavailable { venue: String, reason: String },

    #[error("schema inconsistency for {symbol} during {stage}: {detail}")]
    SchemaInconsistency {
        symbol: String,
        stage: &'static str,
        detail: String,
    },

    #[error("invalid aggregation request: {0}")]
    InvalidRequest(String),
}

/// Terminal faults of the liquidation ingestor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error("subscription to {venue} rejected: {reason}")]
    Subscription { venue: String, reason: String },

    #[error("liquidation feed on {venue} failed: {reason}")]
    Fatal { venue: String, reason: String },

    #[error("gave up on {venue} after {attempts} reconnect attempts")]
    ReconnectExhausted { venue: String, attempts: u32 },
}

impl IngestError {
    /// Maps a non-recoverable connector error onto the ingestor's fault.
    pub(crate) fn from_connector(venue: &str, err: ConnectorError) -> Self {
        match err {
            ConnectorError::Subscription { venue, reason } => Self::Subscription { venue, reason },
            other => Self::Fatal {
                venue: venue.to_string(),
                reason: other.to_string(),
            },
        }
    }
}
