#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use xvenue::error::ConnectorError;
use xvenue::market::{
    Bar,
    ExchangeConnector,
    Instrument,
    LiquidationBatch,
    LiquidationEvent,
    LiquidationSide,
    LiquidationStream,
    LiquidationSubscription,
    MarketKind,
    SubType,
    Timeframe,
};
use xvenue::streaming::ReconnectConfig;

pub const T1: u64 = 1_700_000_000_000;
pub const T2: u64 = T1 + 3_600_000;
pub const T3: u64 = T2 + 3_600_000;

pub fn spot_btc_usdt() -> Instrument {
    Instrument::spot("BTCUSDT", "BTC", "USDT")
}

pub fn perp_btc_usdt() -> Instrument {
    Instrument::new("BTC/USDT:USDT", "BTCUSDT", "BTC", "USDT", MarketKind::Swap, SubType::Linear).with_settle("USDT")
}

pub fn inverse_btc_usd() -> Instrument {
    Instrument::new("BTC/USD:BTC", "BTCUSD_PERP", "BTC", "USD", MarketKind::Swap, SubType::Inverse).with_settle("BTC")
}

pub fn liquidation(symbol: &str, price: f64, timestamp: u64) -> LiquidationEvent {
    LiquidationEvent::new(symbol, LiquidationSide::Sell, price, 0.5, timestamp)
}

/// Millisecond backoff without jitter.
pub fn fast_reconnect(max_attempts: u32) -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        multiplier: 2.0,
        jitter_factor: 0.0,
        max_attempts,
    }
}

/// One scripted feed message. After the script runs out the feed goes silent.
#[derive(Debug, Clone)]
pub enum FeedStep {
    Batch(LiquidationBatch),
    Fail(ConnectorError),
}

/// In-memory venue with scripted listings, bars and liquidation feeds.
#[derive(Default)]
pub struct MockConnector {
    instruments: Vec<Instrument>,
    catalog_error: Option<ConnectorError>,
    bars: HashMap<String, Vec<Bar>>,
    failures: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    subscriptions: Mutex<VecDeque<Result<Vec<FeedStep>, ConnectorError>>>,
    pub subscribe_calls: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(instruments: Vec<Instrument>) -> Self {
        Self {
            instruments,
            ..Default::default()
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.bars.insert(symbol.to_string(), bars);
        self
    }

    /// Close-only bars at the given `(timestamp, close)` points.
    pub fn with_closes(self, symbol: &str, points: &[(u64, f64)]) -> Self {
        let bars = points
            .iter()
            .map(|(ts, close)| Bar::close_only(symbol, *ts, *close, 10.0))
            .collect();
        self.with_bars(symbol, bars)
    }

    pub fn with_failure(mut self, symbol: &str, reason: &str) -> Self {
        self.failures.insert(symbol.to_string(), reason.to_string());
        self
    }

    pub fn with_delay(mut self, symbol: &str, delay: Duration) -> Self {
        self.delays.insert(symbol.to_string(), delay);
        self
    }

    pub fn with_catalog_error(mut self, err: ConnectorError) -> Self {
        self.catalog_error = Some(err);
        self
    }

    /// Queues the outcome of the next `subscribe_liquidations` call.
    pub fn with_feed(self, steps: Vec<FeedStep>) -> Self {
        self.subscriptions.lock().push_back(Ok(steps));
        self
    }

    pub fn with_subscribe_error(self, err: ConnectorError) -> Self {
        self.subscriptions.lock().push_back(Err(err));
        self
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeConnector for MockConnector {
    fn venue(&self) -> &str {
        "mock"
    }

    async fn list_instruments(&self) -> Result<Vec<Instrument>, ConnectorError> {
        match &self.catalog_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.instruments.clone()),
        }
    }

    async fn fetch_bars(
        &self,
        instrument: &Instrument,
        _timeframe: Timeframe,
        _count: usize,
    ) -> Result<Vec<Bar>, ConnectorError> {
        if let Some(delay) = self.delays.get(&instrument.symbol) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(reason) = self.failures.get(&instrument.symbol) {
            return Err(ConnectorError::Fetch {
                symbol: instrument.symbol.clone(),
                reason: reason.clone(),
            });
        }
        Ok(self.bars.get(&instrument.symbol).cloned().unwrap_or_default())
    }

    async fn subscribe_liquidations(
        &self,
        _stream: &LiquidationStream,
    ) -> Result<Box<dyn LiquidationSubscription>, ConnectorError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        // Suspend like a real handshake so state watchers get to run
        tokio::task::yield_now().await;
        let next = self.subscriptions.lock().pop_front();
        match next {
            Some(Ok(steps)) => Ok(Box::new(ScriptedFeed {
                steps: steps.into(),
                closes: Arc::clone(&self.closes),
                closed: false,
            })),
            Some(Err(err)) => Err(err),
            None => Err(ConnectorError::transport("no scripted feed left")),
        }
    }
}

struct ScriptedFeed {
    steps: VecDeque<FeedStep>,
    closes: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait]
impl LiquidationSubscription for ScriptedFeed {
    async fn next_batch(&mut self) -> Result<LiquidationBatch, ConnectorError> {
        assert!(!self.closed, "read after close");
        tokio::task::yield_now().await;
        match self.steps.pop_front() {
            Some(FeedStep::Batch(batch)) => Ok(batch),
            Some(FeedStep::Fail(err)) => Err(err),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        assert!(!self.closed, "closed twice");
        self.closed = true;
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
