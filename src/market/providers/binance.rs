//! Binance exchange implementation: spot, USDⓈ-M and COIN-M markets.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::ConnectorError;
use crate::market::connector::{ExchangeConnector, LiquidationSubscription};
use crate::market::market_data::{
    Bar, Instrument, LiquidationBatch, LiquidationEvent, LiquidationSide, MarketKind, SubType,
};
use crate::market::message_parser::MessageParser;
use crate::market::providers::binance_types::{ExchangeInfo, ForceOrderEvent, SymbolInfo};
use crate::market::streams::LiquidationStream;
use crate::market::timeframe::Timeframe;
use crate::market::websocket_client::WebSocketSubscription;

pub const BINANCE_SPOT_REST: &str = "https://api.binance.com";
pub const BINANCE_USDM_REST: &str = "https://fapi.binance.com";
pub const BINANCE_COINM_REST: &str = "https://dapi.binance.com";
pub const BINANCE_USDM_WSS_ENDPOINT: &str = "wss://fstream.binance.com/ws";
pub const BINANCE_USDM_WSS_FALLBACK_ENDPOINT: &str = "wss://fstream.binance.com:443/ws";

const VENUE: &str = "binance";

/// Venue id -> unified symbol for USDⓈ-M contracts, refreshed by every listing.
type SymbolMap = Arc<RwLock<HashMap<String, String>>>;

/// Which Binance API family serves an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Market {
    Spot,
    UsdM,
    CoinM,
}

impl Market {
    fn of(instrument: &Instrument) -> Self {
        match (instrument.kind, instrument.sub_type) {
            (MarketKind::Spot, _) => Market::Spot,
            (_, SubType::Inverse) => Market::CoinM,
            _ => Market::UsdM,
        }
    }

    fn exchange_info_url(self) -> String {
        match self {
            Market::Spot => format!("{}/api/v3/exchangeInfo", BINANCE_SPOT_REST),
            Market::UsdM => format!("{}/fapi/v1/exchangeInfo", BINANCE_USDM_REST),
            Market::CoinM => format!("{}/dapi/v1/exchangeInfo", BINANCE_COINM_REST),
        }
    }

    fn klines_url(self) -> String {
        match self {
            Market::Spot => format!("{}/api/v3/klines", BINANCE_SPOT_REST),
            Market::UsdM => format!("{}/fapi/v1/klines", BINANCE_USDM_REST),
            Market::CoinM => format!("{}/dapi/v1/klines", BINANCE_COINM_REST),
        }
    }
}

/// Binance connector over REST (catalog, klines) and the USDⓈ-M WebSocket
/// (liquidations).
pub struct BinanceConnector {
    http: reqwest::Client,
    symbols: SymbolMap,
}

impl BinanceConnector {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            symbols: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn exchange_info(&self, market: Market) -> Result<ExchangeInfo, reqwest::Error> {
        self.http
            .get(market.exchange_info_url())
            .send()
            .await?
            .error_for_status()?
            .json::<ExchangeInfo>()
            .await
    }
}

impl Default for BinanceConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeConnector for BinanceConnector {
    fn venue(&self) -> &str {
        VENUE
    }

    async fn list_instruments(&self) -> Result<Vec<Instrument>, ConnectorError> {
        let mut instruments = Vec::new();
        for market in [Market::Spot, Market::UsdM, Market::CoinM] {
            let info = self.exchange_info(market).await.map_err(|e| {
                ConnectorError::CatalogUnavailable {
                    venue: VENUE.to_string(),
                    reason: format!("{}: {e}", market.exchange_info_url()),
                }
            })?;
            instruments.extend(
                info.symbols
                    .iter()
                    .filter(|s| s.is_trading())
                    .filter_map(|s| to_instrument(market, s)),
            );
        }

        {
            let mut map = self.symbols.write();
            map.clear();
            map.extend(
                instruments
                    .iter()
                    .filter(|i| Market::of(i) == Market::UsdM)
                    .map(|i| (i.venue_id.clone(), i.symbol.clone())),
            );
        }
        tracing::debug!(venue = VENUE, count = instruments.len(), "listed instruments");

        Ok(instruments)
    }

    async fn fetch_bars(
        &self,
        instrument: &Instrument,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Bar>, ConnectorError> {
        let fetch_error = |reason: String| ConnectorError::Fetch {
            symbol: instrument.symbol.clone(),
            reason,
        };
        let url = Market::of(instrument).klines_url();
        let limit = count.to_string();

        let rows: Vec<Vec<Value>> = self
            .http
            .get(&url)
            .query(&[
                ("symbol", instrument.venue_id.as_str()),
                ("interval", timeframe.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| fetch_error(e.to_string()))?
            .json()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        rows.iter()
            .map(|row| {
                kline_to_bar(&instrument.symbol, row)
                    .ok_or_else(|| fetch_error(format!("malformed kline row: {row:?}")))
            })
            .collect()
    }

    async fn subscribe_liquidations(
        &self,
        stream: &LiquidationStream,
    ) -> Result<Box<dyn LiquidationSubscription>, ConnectorError> {
        if matches!(stream, LiquidationStream::Symbols(_)) && self.symbols.read().is_empty() {
            // Symbol streams need the catalog; a listing outage is worth retrying
            self.list_instruments()
                .await
                .map_err(|e| ConnectorError::transport(format!("symbol map refresh failed: {e}")))?;
        }
        let venue_stream = usdm_stream(&self.symbols.read(), stream)?;

        let parser = Arc::new(BinanceParser::with_symbols(Arc::clone(&self.symbols)));
        let subscription = WebSocketSubscription::connect(parser, venue_stream).await?;
        Ok(Box::new(subscription))
    }
}

/// Maps one `exchangeInfo` entry to a unified instrument.
/// Returns None for contract types that are not perpetual or dated futures.
fn to_instrument(market: Market, info: &SymbolInfo) -> Option<Instrument> {
    let base = info.base_asset.as_str();
    let quote = info.quote_asset.as_str();
    if market == Market::Spot {
        return Some(Instrument::spot(&info.symbol, base, quote));
    }

    let settle = info.margin_asset.clone().unwrap_or_else(|| match market {
        Market::CoinM => base.to_string(),
        _ => quote.to_string(),
    });
    let sub_type = if market == Market::CoinM {
        SubType::Inverse
    } else {
        SubType::Linear
    };
    let contract_type = info.contract_type.as_deref().unwrap_or_default();

    if contract_type.contains("PERPETUAL") {
        let symbol = format!("{}/{}:{}", base, quote, settle);
        return Some(
            Instrument::new(symbol, &info.symbol, base, quote, MarketKind::Swap, sub_type).with_settle(settle),
        );
    }
    if contract_type.is_empty() {
        return None;
    }

    // Dated contracts carry their YYMMDD delivery code after the underscore
    let (_, code) = info.symbol.rsplit_once('_')?;
    let symbol = format!("{}/{}:{}-{}", base, quote, settle, code);
    let mut instrument =
        Instrument::new(symbol, &info.symbol, base, quote, MarketKind::Future, sub_type).with_settle(settle);
    if let Some(delivery) = info.delivery_date {
        instrument = instrument.with_expiry(delivery);
    }
    Some(instrument)
}

/// `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`
fn kline_to_bar(symbol: &str, row: &[Value]) -> Option<Bar> {
    let number = |idx: usize| -> Option<f64> {
        match row.get(idx)? {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    };
    let timestamp = row.first()?.as_u64()?;
    let (open, high, low, close, volume) = (number(1)?, number(2)?, number(3)?, number(4)?, number(5)?);

    // Inconsistent rows are rejected here so they surface as fetch failures
    let prices = [open, high, low, close];
    if prices.iter().chain([&volume]).any(|v| !v.is_finite())
        || high < low
        || prices.iter().any(|p| *p < low || *p > high)
        || volume < 0.0
    {
        return None;
    }
    Some(Bar::new(symbol, timestamp, open, high, low, close, volume))
}

/// Rewrites a symbol stream into USDⓈ-M venue ids using the catalog map.
/// Accepts unified symbols or venue ids. Anything else has no liquidation
/// stream on the USDⓈ-M socket and is rejected.
fn usdm_stream(
    symbols: &HashMap<String, String>,
    stream: &LiquidationStream,
) -> Result<LiquidationStream, ConnectorError> {
    let LiquidationStream::Symbols(requested) = stream else {
        return Ok(stream.clone());
    };

    let ids = requested
        .iter()
        .map(|symbol| {
            let upper = symbol.to_ascii_uppercase();
            if symbols.contains_key(&upper) {
                return Ok(upper);
            }
            symbols
                .iter()
                .find(|(_, unified)| *unified == symbol)
                .map(|(id, _)| id.clone())
                .ok_or_else(|| ConnectorError::Subscription {
                    venue: VENUE.to_string(),
                    reason: format!("{symbol} is not a listed USDⓈ-M contract"),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(LiquidationStream::Symbols(ids))
}

/// Binance USDⓈ-M liquidation parser.
/// Implements MessageParser to convert forceOrder JSON -> LiquidationEvent.
#[derive(Debug, Clone, Default)]
pub struct BinanceParser {
    symbols: SymbolMap,
}

impl BinanceParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_symbols(symbols: SymbolMap) -> Self {
        Self { symbols }
    }

    fn stream_names(&self, stream: &LiquidationStream) -> Vec<String> {
        match stream {
            LiquidationStream::AllMarkets => vec!["!forceOrder@arr".to_string()],
            LiquidationStream::Symbols(symbols) => symbols
                .iter()
                .map(|id| format!("{}@forceOrder", id.to_lowercase()))
                .collect(),
        }
    }

    fn format_request(&self, method: &str, stream: &LiquidationStream) -> String {
        serde_json::json!({
            "method": method,
            "params": self.stream_names(stream),
            "id": 1,
        })
        .to_string()
    }

    /// Normalization: venue id back to the unified symbol when the catalog knows it.
    fn unify(&self, venue_id: &str) -> String {
        self.symbols
            .read()
            .get(venue_id)
            .cloned()
            .unwrap_or_else(|| venue_id.to_string())
    }

    fn parse_force_order(&self, payload: Value) -> Result<LiquidationBatch, ConnectorError> {
        let desync = |detail: String| ConnectorError::transport(format!("undecodable forceOrder: {detail}"));
        let event: ForceOrderEvent = serde_json::from_value(payload).map_err(|e| desync(e.to_string()))?;
        let order = event.order;

        let side = LiquidationSide::parse(&order.side).ok_or_else(|| desync(format!("side {:?}", order.side)))?;
        let price: f64 = order.price.parse().map_err(|_| desync(format!("price {:?}", order.price)))?;
        let quantity: f64 = order
            .quantity
            .parse()
            .map_err(|_| desync(format!("quantity {:?}", order.quantity)))?;

        let mut liquidation = LiquidationEvent::new(self.unify(&order.symbol), side, price, quantity, order.trade_time);
        if let Some(avg) = order.average_price.as_deref().and_then(|ap| ap.parse().ok()) {
            liquidation = liquidation.with_average_price(avg);
        }
        if let Some(status) = order.status {
            liquidation = liquidation.with_status(status);
        }
        tracing::trace!(event_time = event.event_time, symbol = %liquidation.symbol, "forceOrder decoded");

        Ok(vec![liquidation])
    }
}

impl MessageParser for BinanceParser {
    fn endpoint(&self) -> &str {
        BINANCE_USDM_WSS_ENDPOINT
    }

    fn fallback_endpoint(&self) -> Option<&str> {
        Some(BINANCE_USDM_WSS_FALLBACK_ENDPOINT)
    }

    fn name(&self) -> &'static str {
        VENUE
    }

    fn format_subscribe(&self, stream: &LiquidationStream) -> String {
        self.format_request("SUBSCRIBE", stream)
    }

    fn format_unsubscribe(&self, stream: &LiquidationStream) -> String {
        self.format_request("UNSUBSCRIBE", stream)
    }

    fn parse_message(&self, msg: &str) -> Result<Option<LiquidationBatch>, ConnectorError> {
        let value: Value = serde_json::from_str(msg)
            .map_err(|e| ConnectorError::transport(format!("invalid JSON frame: {e}")))?;

        // Combined streams wrap the payload as {"stream":..,"data":{..}}
        let value = match value {
            Value::Object(mut obj) if obj.contains_key("stream") => obj.remove("data").unwrap_or(Value::Null),
            other => other,
        };

        if let Some(error) = value.get("error") {
            return Err(ConnectorError::Subscription {
                venue: VENUE.to_string(),
                reason: error.to_string(),
            });
        }

        match value.get("e").and_then(Value::as_str) {
            Some("forceOrder") => self.parse_force_order(value).map(Some),
            // Acks ({"result":null,"id":1}) and other event types
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol_info(json: &str) -> SymbolInfo {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_format_subscribe_all_markets() {
        let parser = BinanceParser::new();
        let msg = parser.format_subscribe(&LiquidationStream::AllMarkets);

        assert!(msg.contains("\"SUBSCRIBE\""));
        assert!(msg.contains("!forceOrder@arr"));
    }

    #[test]
    fn test_format_subscribe_symbols() {
        let parser = BinanceParser::new();
        let stream = LiquidationStream::for_symbols(["BTCUSDT", "ETHUSDT"]);
        let msg = parser.format_subscribe(&stream);

        assert!(msg.contains("btcusdt@forceOrder"));
        assert!(msg.contains("ethusdt@forceOrder"));
    }

    #[test]
    fn test_format_unsubscribe() {
        let parser = BinanceParser::new();
        let msg = parser.format_unsubscribe(&LiquidationStream::AllMarkets);
        assert!(msg.contains("\"UNSUBSCRIBE\""));
    }

    #[test]
    fn test_parse_force_order() {
        let parser = BinanceParser::new();
        parser
            .symbols
            .write()
            .insert("BTCUSDT".to_string(), "BTC/USDT:USDT".to_string());

        let msg = r#"{"e":"forceOrder","E":1568014460893,"o":{"s":"BTCUSDT","S":"SELL","o":"LIMIT","f":"IOC","q":"0.014","p":"9910","ap":"9910","X":"FILLED","l":"0.014","z":"0.014","T":1568014460893}}"#;
        let batch = parser.parse_message(msg).unwrap().unwrap();

        assert_eq!(batch.len(), 1);
        let event = &batch[0];
        assert_eq!(event.symbol, "BTC/USDT:USDT");
        assert_eq!(event.side, LiquidationSide::Sell);
        assert_eq!(event.price, 9910.0);
        assert_eq!(event.quantity, 0.014);
        assert_eq!(event.timestamp, 1568014460893);
        assert_eq!(event.average_price, Some(9910.0));
        assert_eq!(event.status.as_deref(), Some("FILLED"));
    }

    #[test]
    fn test_unknown_venue_id_passes_through() {
        let parser = BinanceParser::new();
        let msg = r#"{"e":"forceOrder","E":1,"o":{"s":"XYZUSDT","S":"BUY","q":"1","p":"2","T":1}}"#;
        let batch = parser.parse_message(msg).unwrap().unwrap();
        assert_eq!(batch[0].symbol, "XYZUSDT");
        assert_eq!(batch[0].side, LiquidationSide::Buy);
        assert!(batch[0].average_price.is_none());
    }

    #[test]
    fn test_parse_subscription_ack() {
        let parser = BinanceParser::new();
        assert_eq!(parser.parse_message(r#"{"result":null,"id":1}"#), Ok(None));
    }

    #[test]
    fn test_parse_error_reply_is_rejection() {
        let parser = BinanceParser::new();
        let err = parser
            .parse_message(r#"{"error":{"code":2,"msg":"Invalid request"},"id":1}"#)
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Subscription { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_malformed_force_order_is_transport_error() {
        let parser = BinanceParser::new();
        let err = parser
            .parse_message(r#"{"e":"forceOrder","E":1,"o":{"s":"BTCUSDT","S":"SELL","q":"abc","p":"1","T":1}}"#)
            .unwrap_err();
        assert!(err.is_recoverable());

        let err = parser.parse_message("not json").unwrap_err();
        assert!(matches!(err, ConnectorError::Transport(_)));
    }

    #[test]
    fn test_to_instrument_spot() {
        let info = symbol_info(r#"{"symbol":"BTCUSDT","status":"TRADING","baseAsset":"BTC","quoteAsset":"USDT"}"#);
        let instrument = to_instrument(Market::Spot, &info).unwrap();
        assert_eq!(instrument.symbol, "BTC/USDT");
        assert_eq!(instrument.kind, MarketKind::Spot);
        assert_eq!(instrument.sub_type, SubType::None);
    }

    #[test]
    fn test_to_instrument_linear_perpetual() {
        let info = symbol_info(
            r#"{"symbol":"BTCUSDT","pair":"BTCUSDT","contractType":"PERPETUAL","deliveryDate":4133404800000,"status":"TRADING","baseAsset":"BTC","quoteAsset":"USDT","marginAsset":"USDT"}"#,
        );
        let instrument = to_instrument(Market::UsdM, &info).unwrap();
        assert_eq!(instrument.symbol, "BTC/USDT:USDT");
        assert_eq!(instrument.kind, MarketKind::Swap);
        assert_eq!(instrument.sub_type, SubType::Linear);
        assert!(instrument.expiry.is_none());
    }

    #[test]
    fn test_to_instrument_inverse_quarterly() {
        let info = symbol_info(
            r#"{"symbol":"BTCUSD_250926","pair":"BTCUSD","contractType":"CURRENT_QUARTER","deliveryDate":1758873600000,"contractStatus":"TRADING","baseAsset":"BTC","quoteAsset":"USD","marginAsset":"BTC"}"#,
        );
        assert!(info.is_trading());
        let instrument = to_instrument(Market::CoinM, &info).unwrap();
        assert_eq!(instrument.symbol, "BTC/USD:BTC-250926");
        assert_eq!(instrument.kind, MarketKind::Future);
        assert_eq!(instrument.sub_type, SubType::Inverse);
        assert_eq!(instrument.expiry, Some(1758873600000));
    }

    #[test]
    fn test_delisted_contract_skipped() {
        let info = symbol_info(
            r#"{"symbol":"BTCUSDT_200925","contractType":"","status":"SETTLING","baseAsset":"BTC","quoteAsset":"USDT"}"#,
        );
        assert!(!info.is_trading());
        assert!(to_instrument(Market::UsdM, &info).is_none());
    }

    #[test]
    fn test_kline_to_bar() {
        let row: Vec<Value> = serde_json::from_str(
            r#"[1499040000000,"0.01634790","0.80000000","0.01575800","0.01577100","148976.11427815",1499644799999,"2434.19055334",308,"1756.87402397","28.46694368","17928899.62484339"]"#,
        )
        .unwrap();
        let bar = kline_to_bar("LTC/BTC", &row).unwrap();
        assert_eq!(bar.timestamp, 1499040000000);
        assert_eq!(bar.close, 0.015771);
        assert_eq!(bar.volume, 148976.11427815);

        assert!(kline_to_bar("LTC/BTC", &row[..3]).is_none());
    }

    #[test]
    fn test_inconsistent_kline_rejected() {
        let rows = [
            r#"[1,"1","1","2","1","1"]"#,
            r#"[1,"5","4","1","2","1"]"#,
            r#"[1,"1","2","1","1","-3"]"#,
            r#"[1,"1","2","1","NaN","1"]"#,
        ];
        for raw in rows {
            let row: Vec<Value> = serde_json::from_str(raw).unwrap();
            assert!(kline_to_bar("X", &row).is_none(), "{raw} accepted");
        }
    }

    fn usdm_map() -> HashMap<String, String> {
        HashMap::from([
            ("BTCUSDT".to_string(), "BTC/USDT:USDT".to_string()),
            ("ETHUSDT_250926".to_string(), "ETH/USDT:USDT-250926".to_string()),
        ])
    }

    #[test]
    fn test_usdm_stream_resolves_through_catalog() {
        let stream = LiquidationStream::for_symbols(["BTC/USDT:USDT", "ethusdt_250926"]);
        let resolved = usdm_stream(&usdm_map(), &stream).unwrap();
        assert_eq!(resolved, LiquidationStream::for_symbols(["BTCUSDT", "ETHUSDT_250926"]));

        let all = usdm_stream(&HashMap::new(), &LiquidationStream::AllMarkets).unwrap();
        assert_eq!(all, LiquidationStream::AllMarkets);
    }

    #[test]
    fn test_usdm_stream_rejects_coinm_symbol() {
        let stream = LiquidationStream::for_symbols(["BTC/USDT:USDT", "BTC/USD:BTC"]);
        let err = usdm_stream(&usdm_map(), &stream).unwrap_err();
        assert!(matches!(err, ConnectorError::Subscription { .. }));
        assert!(err.to_string().contains("BTC/USD:BTC"));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_subscribe_rejects_unlisted_symbol_before_connecting() {
        let connector = BinanceConnector::new();
        connector.symbols.write().extend(usdm_map());

        let stream = LiquidationStream::for_symbols(["BTC/USD:BTC"]);
        let Err(err) = connector.subscribe_liquidations(&stream).await else {
            panic!("COIN-M symbol accepted on the USDⓈ-M socket");
        };
        assert!(matches!(err, ConnectorError::Subscription { .. }));
    }
}
