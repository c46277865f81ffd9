//! Liquidation ingestion.

pub mod ingestor;
pub mod reconnect;

pub use ingestor::{IngestorHandle, IngestorState, LiquidationIngestor};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
