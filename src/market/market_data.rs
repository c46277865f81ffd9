//! Normalized market data types shared by every venue.

use std::fmt;

// Fields use Option<T> when only some venues provide them.
// New venues plug in by leaving venue-specific fields as None.
// Examples: expiry (dated futures only), average_price (Binance forceOrder)

/// Market kind of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MarketKind {
    Spot,
    Future,
    Swap,
}

impl MarketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketKind::Spot => "spot",
            MarketKind::Future => "future",
            MarketKind::Swap => "swap",
        }
    }

    /// Parses the lowercase names used in filters and config.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spot" => Some(MarketKind::Spot),
            "future" | "futures" => Some(MarketKind::Future),
            "swap" | "perp" | "perpetual" => Some(MarketKind::Swap),
            _ => None,
        }
    }
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settlement flavour of a derivative. Spot instruments carry `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubType {
    Linear,
    Inverse,
    None,
}

impl SubType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubType::Linear => "linear",
            SubType::Inverse => "inverse",
            SubType::None => "none",
        }
    }
}

impl fmt::Display for SubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tradable instrument as listed by a venue.
///
/// `symbol` is the unified, venue-unique key (`BTC/USDT`, `BTC/USDT:USDT`).
/// Everything downstream joins on it; `venue_id` is only for talking to the
/// venue again.
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub symbol: String,
    pub venue_id: String,
    pub base: String,
    pub quote: String,
    pub kind: MarketKind,
    pub sub_type: SubType,
    // Option<T> because spot has no settle asset
    pub settle: Option<String>,
    // Option<T> because only dated futures expire (Unix ms)
    pub expiry: Option<u64>,
}

impl Instrument {
    pub fn new(
        symbol: impl Into<String>,
        venue_id: impl Into<String>,
        base: impl Into<String>,
        quote: impl Into<String>,
        kind: MarketKind,
        sub_type: SubType,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            venue_id: venue_id.into(),
            base: base.into(),
            quote: quote.into(),
            kind,
            sub_type,
            settle: None,
            expiry: None,
        }
    }

    /// Spot pair: unified symbol `BASE/QUOTE`.
    pub fn spot(venue_id: impl Into<String>, base: &str, quote: &str) -> Self {
        Self::new(
            format!("{}/{}", base, quote),
            venue_id,
            base,
            quote,
            MarketKind::Spot,
            SubType::None,
        )
    }

    pub fn with_settle(mut self, settle: impl Into<String>) -> Self {
        self.settle = Some(settle.into());
        self
    }

    pub fn with_expiry(mut self, expiry: u64) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn is_derivative(&self) -> bool {
        self.kind != MarketKind::Spot
    }
}

/// One sampled interval of an instrument.
/// Design: Bar has symbol baked in so a concatenated table of many
/// instruments needs no side index.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub symbol: String,
    /// Unix timestamp in milliseconds (bar open time, venue clock)
    pub timestamp: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        symbol: impl Into<String>,
        timestamp: u64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        debug_assert!(high >= low, "bar high must be >= low");

        Self {
            symbol: symbol.into(),
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Bar with only the fields the spread pipeline reads.
    pub fn close_only(symbol: impl Into<String>, timestamp: u64, close: f64, volume: f64) -> Self {
        Self::new(symbol, timestamp, close, close, close, close, volume)
    }
}

/// Side of the forced order that closed a position.
/// `Sell` liquidates a long, `Buy` liquidates a short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidationSide {
    Buy,
    Sell,
}

impl LiquidationSide {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUY" | "Buy" | "buy" => Some(LiquidationSide::Buy),
            "SELL" | "Sell" | "sell" => Some(LiquidationSide::Sell),
            _ => None,
        }
    }
}

/// A forced-close trade reported by a venue's derivatives engine.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidationEvent {
    pub symbol: String,
    pub side: LiquidationSide,
    pub price: f64,
    pub quantity: f64,
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
    // Option<T> because only some venues report the average fill price
    pub average_price: Option<f64>,
    // Option<T> because only some venues report the forced order status
    pub status: Option<String>,
}

impl LiquidationEvent {
    pub fn new(
        symbol: impl Into<String>,
        side: LiquidationSide,
        price: f64,
        quantity: f64,
        timestamp: u64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            price,
            quantity,
            timestamp,
            average_price: None,
            status: None,
        }
    }

    pub fn with_average_price(mut self, average_price: f64) -> Self {
        self.average_price = Some(average_price);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Quote-currency value of the liquidated quantity.
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }
}

/// Events decoded from one feed message. May be empty.
pub type LiquidationBatch = Vec<LiquidationEvent>;
