use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::StreamExt;

use xvenue::config::Settings;
use xvenue::market::{BinanceConnector, ExchangeConnector, LiquidationStream};
use xvenue::pipeline::{InstrumentCatalog, SnapshotAggregator, plan_legend};
use xvenue::streaming::LiquidationIngestor;
use xvenue::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env().context("loading settings")?;
    telemetry::init_tracing(&settings.log_filter);

    let connector: Arc<dyn ExchangeConnector> = Arc::new(BinanceConnector::new());

    // Snapshot
    let catalog = InstrumentCatalog::new(Arc::clone(&connector));
    let instruments = catalog.resolve(&settings.filter()).await?;

    if instruments.is_empty() {
        tracing::warn!("nothing to aggregate");
    } else {
        let aggregator = SnapshotAggregator::new(Arc::clone(&connector), settings.aggregator());
        let frame = aggregator
            .aggregate(&instruments, settings.timeframe, settings.bar_count, &settings.reference)
            .await?;

        println!(
            "{} rows over {} instruments, reference {}",
            frame.len(),
            frame.by_symbol().len(),
            frame.reference_symbol
        );
        for omission in &frame.omissions {
            println!("  omitted {omission}");
        }
        for entry in plan_legend(&frame) {
            match &entry.group_title {
                Some(title) => println!("  [{title}] {}", entry.name),
                None => println!("  {}", entry.name),
            }
        }
    }

    // Liquidations until Ctrl-C
    let ingestor = LiquidationIngestor::new(connector, LiquidationStream::AllMarkets, settings.reconnect());
    let handle = ingestor.handle();
    tokio::spawn({
        let handle = handle.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handle.cancel();
            }
        }
    });

    let mut liquidations = ingestor.stream();
    while let Some(item) = liquidations.next().await {
        for event in item? {
            println!(
                "{} {:?} {} @ {} ({:.2} notional)",
                event.symbol,
                event.side,
                event.quantity,
                event.price,
                event.notional()
            );
        }
    }
    tracing::info!(reconnects = handle.reconnects(), state = %handle.state(), "liquidation feed stopped");

    Ok(())
}
