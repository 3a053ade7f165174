//! `slx ingest`: load a channel feed file into the canonical store.

use anyhow::{Context, Result};
use serde::Deserialize;
use slx_config::ConfigMode;
use slx_db::PgStore;
use slx_schemas::{OrderFee, OrderPayment, RawSaleEvent, WarehouseMovement};
use std::fs;
use tracing::info;

use super::{connect_db, load_for_mode};

const DEFAULT_CONCURRENCY: usize = 5;

/// Feed file layout. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FeedFile {
    pub sales: Vec<RawSaleEvent>,
    pub movements: Vec<WarehouseMovement>,
    pub payments: Vec<OrderPayment>,
    pub fees: Vec<OrderFee>,
}

pub fn read_feed(path: &str) -> Result<FeedFile> {
    let bytes = fs::read(path).with_context(|| format!("read feed file failed: {path}"))?;
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
    serde_json::from_slice(bytes).with_context(|| format!("feed file is not valid JSON: {path}"))
}

pub async fn run_ingest(config_paths: &[String], feed_path: &str) -> Result<()> {
    let (loaded, secrets) = load_for_mode(config_paths, ConfigMode::Ingest)?;
    let concurrency = loaded
        .config_json
        .pointer("/pipeline/concurrency")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(DEFAULT_CONCURRENCY);

    let feed = read_feed(feed_path)?;
    let store = PgStore::new(connect_db(&secrets).await?);

    let report = slx_ingest::ingest_batch(&store, &feed.sales, concurrency).await?;

    for m in &feed.movements {
        store.upsert_movement(m).await?;
    }
    for p in &feed.payments {
        store.upsert_payment(p).await?;
    }
    for f in &feed.fees {
        store.upsert_fee(f).await?;
    }
    info!(
        movements = feed.movements.len(),
        payments = feed.payments.len(),
        fees = feed.fees.len(),
        "order companions loaded"
    );

    println!("config_hash={}", loaded.config_hash);
    println!("sales_created={}", report.created);
    println!("sales_updated={}", report.updated);
    println!("sales_skipped={}", report.skipped);
    println!("sales_malformed={}", report.malformed);
    println!("movements={}", feed.movements.len());
    println!("payments={}", feed.payments.len());
    println!("fees={}", feed.fees.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_sections_default_to_empty() {
        let feed: FeedFile = serde_json::from_str(
            r#"{"fees":[{"order_code":"SO-1","fee_code":"SHIP","amount":15000}]}"#,
        )
        .unwrap();
        assert!(feed.sales.is_empty());
        assert!(feed.movements.is_empty());
        assert_eq!(feed.fees[0].amount, 15000);
    }
}
