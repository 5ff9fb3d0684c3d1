//! Demo binary: assembles an `Engine` with the simulated executor and
//! submits a handful of orders through the coordinator, printing the
//! resulting event trail. Exercises the same path a real HTTP/CLI adapter
//! would drive; adapters themselves are out of scope, this is a stand-in.

use anyhow::Result;
use bog_core::prelude::*;
use clap::Parser;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "bog-control-core-demo")]
struct Args {
    /// Log as JSON instead of human-readable text.
    #[arg(long)]
    json_logs: bool,

    /// Tracing filter, e.g. "info" or "bog_core=debug".
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level, args.json_logs);

    let executor = Arc::new(SimulatedExecutor::default());
    let engine = Engine::new(executor, EngineConfig::default());

    let request = SubmitRequest {
        client_order_id: Some("demo-1".into()),
        symbol: "AAPL".into(),
        side: Side::Buy,
        quantity: dec!(100),
        limit_price: dec!(150.25),
        strategy: "demo".into(),
    };

    let order_id = match engine.submit(request, "trader1").await? {
        SubmitResponse::Approved { order_id, correlation_id } => {
            tracing::info!(%order_id, %correlation_id, "order approved, executing");
            order_id
        }
        SubmitResponse::Rejected { violations, .. } => {
            tracing::warn!(?violations, "order rejected by risk engine");
            return Ok(());
        }
        SubmitResponse::Duplicate { order_id } => {
            tracing::warn!(%order_id, "duplicate submission");
            return Ok(());
        }
    };

    tokio::time::sleep(Duration::from_millis(100)).await;

    if let Some(order) = engine.order(order_id) {
        tracing::info!(?order, "final order state");
    }
    for event in engine.event_log.by_order(order_id) {
        tracing::info!(event_type = ?event.event_type, timestamp = event.timestamp, "event");
    }

    Ok(())
}
