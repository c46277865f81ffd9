//! The aggregated, time-aligned table handed to downstream consumers.

use std::collections::{BTreeMap, HashMap};

use crate::error::FetchError;
use crate::market::market_data::{Bar, MarketKind, SubType};

/// One row of an aggregated frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRow {
    /// Unix timestamp in milliseconds (bar open time)
    pub timestamp: u64,
    pub symbol: String,
    pub kind: MarketKind,
    pub sub_type: SubType,
    pub close: f64,
    pub volume: f64,
    /// `close - reference close` at the same timestamp.
    /// None when the reference has no bar at this timestamp.
    pub spread: Option<f64>,
}

impl FrameRow {
    /// Legend group id, `"{kind}-{subtype}"`.
    pub fn group_id(&self) -> String {
        format!("{}-{}", self.kind, self.sub_type)
    }
}

/// Reference bars keyed by timestamp for O(1) lookup during the join.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceSeries {
    symbol: String,
    closes: HashMap<u64, f64>,
}

impl ReferenceSeries {
    /// Collects the `symbol` subset of `bars`.
    pub fn extract<'a>(symbol: &str, bars: impl IntoIterator<Item = &'a Bar>) -> Self {
        let closes = bars
            .into_iter()
            .filter(|bar| bar.symbol == symbol)
            .map(|bar| (bar.timestamp, bar.close))
            .collect();
        Self {
            symbol: symbol.to_string(),
            closes,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn close_at(&self, timestamp: u64) -> Option<f64> {
        self.closes.get(&timestamp).copied()
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    /// Spread of `close` against the reference at `timestamp`.
    pub fn spread(&self, timestamp: u64, close: f64) -> Option<f64> {
        self.close_at(timestamp).map(|reference| close - reference)
    }
}

/// Rows of every successfully fetched instrument plus the recorded omissions.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedFrame {
    pub reference_symbol: String,
    pub rows: Vec<FrameRow>,
    /// Instruments dropped because their fetch failed
    pub omissions: Vec<FetchError>,
}

impl AggregatedFrame {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        !self.omissions.is_empty()
    }

    pub fn rows_for<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a FrameRow> + 'a {
        self.rows.iter().filter(move |row| row.symbol == symbol)
    }

    /// Rows grouped per symbol, symbols in sorted order.
    pub fn by_symbol(&self) -> BTreeMap<&str, Vec<&FrameRow>> {
        let mut groups: BTreeMap<&str, Vec<&FrameRow>> = BTreeMap::new();
        for row in &self.rows {
            groups.entry(row.symbol.as_str()).or_default().push(row);
        }
        groups
    }

    /// The reference instrument's `(timestamp, close)` series, oldest first.
    pub fn reference_prices(&self) -> Vec<(u64, f64)> {
        let mut prices: Vec<(u64, f64)> = self
            .rows_for(&self.reference_symbol)
            .map(|row| (row.timestamp, row.close))
            .collect();
        prices.sort_by_key(|(timestamp, _)| *timestamp);
        prices
    }

    /// Total volume per `(kind, subtype)` group.
    pub fn volume_by_group(&self) -> BTreeMap<(MarketKind, SubType), f64> {
        let mut totals = BTreeMap::new();
        for row in &self.rows {
            *totals.entry((row.kind, row.sub_type)).or_insert(0.0) += row.volume;
        }
        totals
    }

    /// Per-timestamp volume stack: `(symbol, volume)` in row order.
    pub fn volume_profile(&self) -> BTreeMap<u64, Vec<(&str, f64)>> {
        let mut profile: BTreeMap<u64, Vec<(&str, f64)>> = BTreeMap::new();
        for row in &self.rows {
            profile
                .entry(row.timestamp)
                .or_default()
                .push((row.symbol.as_str(), row.volume));
        }
        profile
    }
}
