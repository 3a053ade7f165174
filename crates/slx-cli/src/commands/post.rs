//! `slx post` and `slx retry-failed`: drive the posting pipeline against
//! the ledger over HTTP, with the database as order source, tracker and
//! audit store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use slx_audit::{AuditSink, FanoutAuditSink, JsonlAuditSink};
use slx_config::ConfigMode;
use slx_db::PgStore;
use slx_ledger_http::{HttpLedger, LedgerTimeouts};
use slx_posting::{BatchSummary, Collaborators, EngineConfig, PostingPipeline};

use super::{connect_db, load_for_mode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostMode {
    Range,
    RetryFailed,
}

pub async fn run_post(
    config_paths: &[String],
    from: NaiveDate,
    to: NaiveDate,
    audit_jsonl: Option<PathBuf>,
    mode: PostMode,
) -> Result<()> {
    if from > to {
        anyhow::bail!("invalid range: --from {from} is after --to {to}");
    }

    let (loaded, secrets) = load_for_mode(config_paths, ConfigMode::Post)?;
    let engine = EngineConfig::from_config_json(&loaded.config_json)?;

    let ledger_url = secrets
        .ledger_url
        .clone()
        .context("ledger url not resolved")?;
    let ledger = Arc::new(HttpLedger::new(
        ledger_url,
        secrets.ledger_token.clone(),
        LedgerTimeouts {
            lookup: engine.pipeline.lookup_timeout(),
            posting: engine.pipeline.posting_timeout(),
        },
    )?);

    let store = Arc::new(PgStore::new(connect_db(&secrets).await?));
    let audit: Arc<dyn AuditSink> = match audit_jsonl {
        Some(path) => {
            let jsonl = JsonlAuditSink::open(&path, true)?;
            let sinks: Vec<Arc<dyn AuditSink>> = vec![store.clone(), Arc::new(jsonl)];
            Arc::new(FanoutAuditSink::new(sinks))
        }
        None => store.clone(),
    };

    let pipeline = PostingPipeline::new(
        Collaborators {
            source: store.clone(),
            tracker: store.clone(),
            ledger: ledger.clone(),
            audit,
            catalog: ledger.clone(),
            branches: ledger.clone(),
            promotions: ledger,
        },
        Arc::new(engine),
    );

    let summary = match mode {
        PostMode::Range => pipeline.post_range(from, to).await?,
        PostMode::RetryFailed => pipeline.retry_failed(from, to).await?,
    };

    println!("config_hash={}", loaded.config_hash);
    print_summary(&summary);
    Ok(())
}

pub fn print_summary(summary: &BatchSummary) {
    println!("total={}", summary.total);
    println!("success={}", summary.success);
    println!("failed={}", summary.failed);
    for e in &summary.errors {
        println!("error order_code={} reason={}", e.order_code, e.error);
    }
    if summary.errors_omitted > 0 {
        println!("errors_omitted={}", summary.errors_omitted);
    }
}
