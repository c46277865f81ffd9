//! Cross-venue market data: snapshot aggregation of bars across a venue's
//! instruments, and a reconnecting liquidation feed.

pub mod config;
pub mod error;
pub mod market;
pub mod pipeline;
pub mod streaming;
pub mod telemetry;

pub use error::{ConnectorError, FetchError, IngestError, PipelineError};
