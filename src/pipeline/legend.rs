//! Legend grouping: human labels for `(kind, subtype)` groups, each label
//! surfaced once per run.

use std::collections::HashSet;
use std::fmt;

use crate::market::market_data::{Instrument, MarketKind, SubType};
use crate::pipeline::frame::AggregatedFrame;

/// Group id of the reference price series. It is never titled.
pub const REFERENCE_GROUP: &str = "spot-reference";

/// Grouping key of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LegendGroup {
    pub kind: MarketKind,
    pub sub_type: SubType,
}

impl LegendGroup {
    pub fn new(kind: MarketKind, sub_type: SubType) -> Self {
        Self { kind, sub_type }
    }

    pub fn of(instrument: &Instrument) -> Self {
        Self::new(instrument.kind, instrument.sub_type)
    }

    /// Display label, falling back to `"{kind}-{subtype}"`.
    pub fn label(&self) -> String {
        let known = match (self.kind, self.sub_type) {
            (MarketKind::Spot, SubType::None) => Some("Spot"),
            (MarketKind::Future, SubType::Linear) => Some("Futures (Linear)"),
            (MarketKind::Future, SubType::Inverse) => Some("Futures (Inverse)"),
            (MarketKind::Swap, SubType::Linear) => Some("Swap (Linear)"),
            (MarketKind::Swap, SubType::Inverse) => Some("Swap (Inverse)"),
            _ => None,
        };
        known.map_or_else(|| self.to_string(), str::to_string)
    }
}

impl fmt::Display for LegendGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.sub_type)
    }
}

/// Run-scoped label resolver.
///
/// Owns the "already introduced" set; create one per aggregation run so
/// concurrent runs never share it.
#[derive(Debug, Default)]
pub struct LegendResolver {
    introduced: HashSet<LegendGroup>,
}

impl LegendResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label of the instrument's group. Marks the group as introduced.
    pub fn label_for(&mut self, instrument: &Instrument) -> String {
        let group = LegendGroup::of(instrument);
        self.mark_introduced(group);
        group.label()
    }

    pub fn already_introduced(&self, group: LegendGroup) -> bool {
        self.introduced.contains(&group)
    }

    pub fn mark_introduced(&mut self, group: LegendGroup) {
        self.introduced.insert(group);
    }

    /// Returns the group title if this is the group's first appearance.
    pub fn introduce(&mut self, group: LegendGroup) -> Option<String> {
        self.introduced.insert(group).then(|| group.label())
    }
}

/// What a legend entry plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    Spread,
    ReferencePrice,
    Volume,
}

/// One legend entry of a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub symbol: String,
    pub series: SeriesKind,
    pub name: String,
    pub group_id: String,
    /// Present only on the first entry of each group across the plan.
    pub group_title: Option<String>,
}

/// Legend plan for a frame: spread entries for every non-reference symbol,
/// the reference price entry, then volume entries for every symbol. Symbols
/// are visited in sorted order; one resolver spans all passes.
pub fn plan_legend(frame: &AggregatedFrame) -> Vec<LegendEntry> {
    let mut resolver = LegendResolver::new();
    let groups = frame.by_symbol();
    let mut entries = Vec::with_capacity(groups.len() * 2 + 1);

    for (symbol, rows) in &groups {
        if *symbol == frame.reference_symbol {
            continue;
        }
        let group = LegendGroup::new(rows[0].kind, rows[0].sub_type);
        entries.push(LegendEntry {
            symbol: symbol.to_string(),
            series: SeriesKind::Spread,
            name: format!("{} Spread", symbol),
            group_id: group.to_string(),
            group_title: resolver.introduce(group),
        });
    }

    if groups.contains_key(frame.reference_symbol.as_str()) {
        entries.push(LegendEntry {
            symbol: frame.reference_symbol.clone(),
            series: SeriesKind::ReferencePrice,
            name: format!("{} Price", frame.reference_symbol),
            group_id: REFERENCE_GROUP.to_string(),
            group_title: None,
        });
    }

    for (symbol, rows) in &groups {
        let group = LegendGroup::new(rows[0].kind, rows[0].sub_type);
        entries.push(LegendEntry {
            symbol: symbol.to_string(),
            series: SeriesKind::Volume,
            name: format!("{} Vol", symbol),
            group_id: group.to_string(),
            group_title: resolver.introduce(group),
        });
    }

    entries
}
