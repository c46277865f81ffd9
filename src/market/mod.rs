//! Market data model and the exchange connector seam.

pub mod connector;
pub mod market_data;
pub mod message_parser;
pub mod providers;
pub mod streams;
pub mod timeframe;
pub mod websocket_client;

// Re-exports for convenience
pub use connector::{ExchangeConnector, LiquidationSubscription};
pub use market_data::{
    Bar,
    Instrument,
    LiquidationBatch,
    LiquidationEvent,
    LiquidationSide,
    MarketKind,
    SubType,
};
pub use message_parser::MessageParser;
pub use streams::LiquidationStream;
pub use timeframe::Timeframe;
pub use websocket_client::WebSocketSubscription;

pub use providers::binance::{BinanceConnector, BinanceParser};
