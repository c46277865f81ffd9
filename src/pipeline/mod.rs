//! Snapshot pipeline: catalog -> aggregator -> frame -> legend.

pub mod aggregator;
pub mod catalog;
pub mod frame;
pub mod legend;

pub use aggregator::{AggregatorConfig, SnapshotAggregator};
pub use catalog::{InstrumentCatalog, InstrumentFilter};
pub use frame::{AggregatedFrame, FrameRow, ReferenceSeries};
pub use legend::{LegendEntry, LegendGroup, LegendResolver, SeriesKind, plan_legend};
