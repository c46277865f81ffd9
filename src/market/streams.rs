//! Subscription targets for liquidation feeds.

/// Which liquidations a feed subscription covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiquidationStream {
    /// Every liquidation on the venue's derivatives engine
    AllMarkets,
    /// Only the listed instruments (unified symbols or venue ids)
    Symbols(Vec<String>),
}

impl LiquidationStream {
    /// Subscribes to every market when `symbols` is empty.
    pub fn for_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let symbols: Vec<String> = symbols.into_iter().map(Into::into).collect();
        if symbols.is_empty() {
            Self::AllMarkets
        } else {
            Self::Symbols(symbols)
        }
    }

    /// Returns the symbols this stream is restricted to (empty for all markets).
    pub fn symbols(&self) -> &[String] {
        match self {
            LiquidationStream::AllMarkets => &[],
            LiquidationStream::Symbols(symbols) => symbols,
        }
    }
}
