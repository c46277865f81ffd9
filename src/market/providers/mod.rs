//! Exchange provider implementations.

pub mod binance;
pub mod binance_types;

// Re-export for convenience
pub use binance::{BinanceConnector, BinanceParser};
