// Wire types for Binance REST and WebSocket payloads.
// Sources: /api/v3/exchangeInfo, /fapi/v1/exchangeInfo, /dapi/v1/exchangeInfo,
// USDⓈ-M "Liquidation Order Streams" (forceOrder).

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

/// One entry of `exchangeInfo.symbols`. Spot and futures share the core
/// fields; contract fields are absent on spot.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    // spot and USDⓈ-M
    #[serde(default)]
    pub status: Option<String>,
    // COIN-M reports status here instead
    #[serde(default)]
    pub contract_status: Option<String>,
    #[serde(default)]
    pub contract_type: Option<String>,
    #[serde(default)]
    pub delivery_date: Option<u64>,
    #[serde(default)]
    pub margin_asset: Option<String>,
}

impl SymbolInfo {
    pub fn is_trading(&self) -> bool {
        self.status
            .as_deref()
            .or(self.contract_status.as_deref())
            .is_some_and(|s| s == "TRADING")
    }
}

/// `{"e":"forceOrder","E":..,"o":{..}}`
#[derive(Debug, Deserialize)]
pub struct ForceOrderEvent {
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "o")]
    pub order: ForceOrder,
}

#[derive(Debug, Deserialize)]
pub struct ForceOrder {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "ap", default)]
    pub average_price: Option<String>,
    #[serde(rename = "X", default)]
    pub status: Option<String>,
    #[serde(rename = "T")]
    pub trade_time: u64,
}
