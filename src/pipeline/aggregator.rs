//! Snapshot aggregation: scatter bar fetches across instruments, gather,
//! then join metadata and the reference series.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream;

use crate::error::{FetchError, PipelineError};
use crate::market::connector::ExchangeConnector;
use crate::market::market_data::{Bar, Instrument};
use crate::market::timeframe::Timeframe;
use crate::pipeline::frame::{AggregatedFrame, FrameRow, ReferenceSeries};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

/// Fan-out limits for one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Per-instrument deadline; a fetch that misses it becomes an omission.
    pub fetch_timeout: Duration,
    /// Upper bound on in-flight fetches.
    pub max_concurrent: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_concurrent: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }
}

/// Builds aggregated frames from one venue's connector.
pub struct SnapshotAggregator {
    connector: Arc<dyn ExchangeConnector>,
    config: AggregatorConfig,
}

impl SnapshotAggregator {
    pub fn new(connector: Arc<dyn ExchangeConnector>, config: AggregatorConfig) -> Self {
        Self { connector, config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Fetches `bar_count` bars per instrument and joins them into one frame.
    ///
    /// A failing or slow instrument is dropped and recorded in
    /// `AggregatedFrame::omissions`; the rest still aggregate. Rows keep
    /// instrument order, then timestamp order. Rows whose timestamp the
    /// reference lacks are kept with an undefined spread.
    #[tracing::instrument(
        skip(self, instruments),
        fields(venue = self.connector.venue(), instruments = instruments.len())
    )]
    pub async fn aggregate(
        &self,
        instruments: &[Instrument],
        timeframe: Timeframe,
        bar_count: usize,
        reference_symbol: &str,
    ) -> Result<AggregatedFrame, PipelineError> {
        validate_request(instruments, bar_count, reference_symbol)?;

        // 1. Scatter: one isolated fetch per instrument, results in input order
        let fetched: Vec<(&Instrument, Result<Vec<Bar>, FetchError>)> = stream::iter(instruments)
            .map(|instrument| async move {
                let result = self.fetch_one(instrument, timeframe, bar_count).await;
                (instrument, result)
            })
            .buffered(self.config.max_concurrent.max(1))
            .collect()
            .await;

        // 2. Gather and join metadata: every bar must belong to the instrument it was fetched for
        let mut joined: Vec<(Bar, &Instrument)> = Vec::new();
        let mut omissions = Vec::new();
        for (instrument, result) in fetched {
            match result {
                Ok(series) => {
                    if let Some(stray) = series.iter().find(|bar| bar.symbol != instrument.symbol) {
                        return Err(PipelineError::SchemaInconsistency {
                            symbol: stray.symbol.clone(),
                            stage: "metadata join",
                            detail: format!("returned while fetching {}", instrument.symbol),
                        });
                    }
                    joined.extend(series.into_iter().map(|bar| (bar, instrument)));
                }
                Err(omission) => omissions.push(omission),
            }
        }

        // 3. Reference subset
        let reference = ReferenceSeries::extract(reference_symbol, joined.iter().map(|(bar, _)| bar));
        if reference.is_empty() {
            tracing::warn!(reference = reference_symbol, "reference series empty, every spread is undefined");
        }

        // 4. Reference join by timestamp
        let rows: Vec<FrameRow> = joined
            .into_iter()
            .map(|(bar, meta)| FrameRow {
                timestamp: bar.timestamp,
                kind: meta.kind,
                sub_type: meta.sub_type,
                close: bar.close,
                volume: bar.volume,
                spread: reference.spread(bar.timestamp, bar.close),
                symbol: bar.symbol,
            })
            .collect();

        let undefined = rows.iter().filter(|row| row.spread.is_none()).count();
        tracing::info!(
            rows = rows.len(),
            omitted = omissions.len(),
            undefined_spreads = undefined,
            "aggregated snapshot"
        );

        Ok(AggregatedFrame {
            reference_symbol: reference_symbol.to_string(),
            rows,
            omissions,
        })
    }

    async fn fetch_one(
        &self,
        instrument: &Instrument,
        timeframe: Timeframe,
        bar_count: usize,
    ) -> Result<Vec<Bar>, FetchError> {
        let symbol = instrument.symbol.as_str();
        let fetch = self.connector.fetch_bars(instrument, timeframe, bar_count);
        let result = match tokio::time::timeout(self.config.fetch_timeout, fetch).await {
            Ok(Ok(bars)) => Ok(latest_window(bars, bar_count)),
            Ok(Err(err)) => Err(FetchError::new(symbol, err.to_string())),
            Err(_) => Err(FetchError::new(
                symbol,
                format!("timed out after {}ms", self.config.fetch_timeout.as_millis()),
            )),
        };

        match &result {
            Ok(bars) => tracing::debug!(symbol, bars = bars.len(), "fetched bars"),
            Err(err) => tracing::warn!(symbol, cause = %err.cause, "dropping instrument from snapshot"),
        }
        result
    }
}

fn validate_request(instruments: &[Instrument], bar_count: usize, reference_symbol: &str) -> Result<(), PipelineError> {
    if bar_count == 0 {
        return Err(PipelineError::InvalidRequest("bar_count must be positive".to_string()));
    }

    let mut seen = HashSet::with_capacity(instruments.len());
    for instrument in instruments {
        if !seen.insert(instrument.symbol.as_str()) {
            return Err(PipelineError::SchemaInconsistency {
                symbol: instrument.symbol.clone(),
                stage: "catalog",
                detail: "symbol listed twice".to_string(),
            });
        }
    }

    if !seen.contains(reference_symbol) {
        return Err(PipelineError::InvalidRequest(format!(
            "reference {reference_symbol} is not among the requested instruments"
        )));
    }
    Ok(())
}

/// Oldest-first, one bar per timestamp (last received wins), at most `count`
/// most recent bars.
fn latest_window(mut bars: Vec<Bar>, count: usize) -> Vec<Bar> {
    bars.sort_by_key(|bar| bar.timestamp);
    bars.reverse();
    bars.dedup_by_key(|bar| bar.timestamp);
    bars.reverse();
    if bars.len() > count {
        bars.drain(..bars.len() - count);
    }
    bars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::market_data::{MarketKind, SubType};

    #[test]
    fn test_latest_window_sorts_and_truncates() {
        let bars = vec![
            Bar::close_only("BTC/USDT", 3, 103.0, 1.0),
            Bar::close_only("BTC/USDT", 1, 101.0, 1.0),
            Bar::close_only("BTC/USDT", 4, 104.0, 1.0),
            Bar::close_only("BTC/USDT", 2, 102.0, 1.0),
        ];
        let window = latest_window(bars, 3);
        let stamps: Vec<u64> = window.iter().map(|b| b.timestamp).collect();
        assert_eq!(stamps, vec![2, 3, 4]);
    }

    #[test]
    fn test_latest_window_last_duplicate_wins() {
        let bars = vec![
            Bar::close_only("BTC/USDT", 1, 100.0, 1.0),
            Bar::close_only("BTC/USDT", 2, 101.0, 1.0),
            Bar::close_only("BTC/USDT", 2, 101.7, 2.0),
        ];
        let window = latest_window(bars, 10);
        assert_eq!(window.len(), 2);
        assert_eq!(window[1].close, 101.7);
    }

    #[test]
    fn test_validate_rejects_zero_bars() {
        let instruments = vec![Instrument::spot("BTCUSDT", "BTC", "USDT")];
        let err = validate_request(&instruments, 0, "BTC/USDT").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)));
    }

    #[test]
    fn test_validate_rejects_unknown_reference() {
        let instruments = vec![Instrument::spot("BTCUSDT", "BTC", "USDT")];
        let err = validate_request(&instruments, 3, "BTC/USDC").unwrap_err();
        assert!(err.to_string().contains("BTC/USDC"));
    }

    #[test]
    fn test_validate_rejects_duplicate_symbols() {
        let instruments = vec![
            Instrument::spot("BTCUSDT", "BTC", "USDT"),
            Instrument::new("BTC/USDT", "BTCUSDT", "BTC", "USDT", MarketKind::Swap, SubType::Linear),
        ];
        let err = validate_request(&instruments, 3, "BTC/USDT").unwrap_err();
        assert!(matches!(err, PipelineError::SchemaInconsistency { stage: "catalog", .. }));
    }
}
