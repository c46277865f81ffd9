//! Instrument catalog: resolve and filter a venue's listing.

use std::sync::Arc;

use crate::error::{ConnectorError, PipelineError};
use crate::market::connector::ExchangeConnector;
use crate::market::market_data::{Instrument, MarketKind};

/// Which instruments to keep from a venue listing.
/// Asset matching is case-insensitive; an empty quote list accepts any quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentFilter {
    pub base: String,
    pub quotes: Vec<String>,
    pub kind: Option<MarketKind>,
}

impl InstrumentFilter {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quotes: Vec::new(),
            kind: None,
        }
    }

    pub fn with_quotes<I, S>(mut self, quotes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.quotes = quotes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_kind(mut self, kind: MarketKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn matches(&self, instrument: &Instrument) -> bool {
        instrument.base.eq_ignore_ascii_case(&self.base)
            && (self.quotes.is_empty() || self.quotes.iter().any(|q| q.eq_ignore_ascii_case(&instrument.quote)))
            && self.kind.is_none_or(|kind| kind == instrument.kind)
    }
}

/// Resolves instruments for one venue through its connector.
pub struct InstrumentCatalog {
    connector: Arc<dyn ExchangeConnector>,
}

impl InstrumentCatalog {
    pub fn new(connector: Arc<dyn ExchangeConnector>) -> Self {
        Self { connector }
    }

    pub fn venue(&self) -> &str {
        self.connector.venue()
    }

    /// Lists the venue and keeps the instruments matching `filter`.
    ///
    /// Callers key on `Instrument::symbol`; the order of the returned
    /// instruments follows the venue listing and is not stable across calls.
    /// No match yields an empty sequence, not an error.
    pub async fn resolve(&self, filter: &InstrumentFilter) -> Result<Vec<Instrument>, PipelineError> {
        let venue = self.connector.venue();
        let listing = self.connector.list_instruments().await.map_err(|err| match err {
            ConnectorError::CatalogUnavailable { venue, reason } => PipelineError::CatalogUnavailable { venue, reason },
            other => PipelineError::CatalogUnavailable {
                venue: venue.to_string(),
                reason: other.to_string(),
            },
        })?;

        let listed = listing.len();
        let matched: Vec<Instrument> = listing.into_iter().filter(|i| filter.matches(i)).collect();
        if matched.is_empty() {
            tracing::warn!(venue, listed, ?filter, "no instrument matches filter");
        } else {
            tracing::info!(venue, listed, matched = matched.len(), "resolved instruments");
        }

        Ok(matched)
    }
}
