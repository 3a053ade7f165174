//! Posting pipeline.
//!
//! Drives each order through customer -> sales order -> invoice -> payment
//! -> warehouse against the ledger. Steps of one order run strictly in
//! sequence; orders run concurrently up to the configured ceiling.
//!
//! Every ledger call is audited before the pipeline acts on its result. A
//! failure stops that order only; the batch carries on with the next one.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use slx_audit::{new_record, AuditSink};
use slx_ingest::{prefetch_lookups, BranchDirectory, Catalog, DistinctCodes, LookupCache, PromotionDirectory};
use slx_reconcile::{explode_order, group_transfers, LineContext};
use slx_rules::{resolve, AccountingResolution, OrderCategory, ResolveInput};
use slx_schemas::{AuditStatus, BranchInfo, CanonicalSale, ProductType};
use tracing::{debug, info, warn};

use crate::client::LedgerClient;
use crate::outcome::{into_call_result, DuplicateDetector, LedgerCallError};
use crate::payload::{assemble_order, AssemblyInput, OrderAssembly, PaymentPayload, ResolvedSale};
use crate::settings::{DocumentType, EngineConfig};
use crate::source::{OrderBundle, OrderSource, PostingTracker};
use crate::state::{OrderProgress, PostingEvent, PostingState, PostingStep};

// ---------------------------------------------------------------------------
// Failures + reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineFailure {
    /// Missing linkage or configuration; fix upstream, no automatic retry.
    Validation { step: PostingStep, reason: String },
    /// The ledger answered with a non-duplicate failure.
    Rejected { step: PostingStep, message: String },
    /// No answer from the ledger (or a collaborator) in time.
    Transport { step: PostingStep, message: String },
    /// The audit record could not be written; the order stops there.
    Audit { step: PostingStep, message: String },
}

impl PipelineFailure {
    pub fn step(&self) -> PostingStep {
        match self {
            PipelineFailure::Validation { step, .. }
            | PipelineFailure::Rejected { step, .. }
            | PipelineFailure::Transport { step, .. }
            | PipelineFailure::Audit { step, .. } => *step,
        }
    }

    fn validation(step: PostingStep, reason: impl Into<String>) -> Self {
        PipelineFailure::Validation {
            step,
            reason: reason.into(),
        }
    }

    fn from_call(step: PostingStep, err: LedgerCallError) -> Self {
        match err {
            LedgerCallError::Transport(message) => PipelineFailure::Transport { step, message },
            LedgerCallError::Rejected { message, .. } => PipelineFailure::Rejected { step, message },
        }
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineFailure::Validation { step, reason } => {
                write!(f, "validation failed at {}: {reason}", step.as_str())
            }
            PipelineFailure::Rejected { step, message } => {
                write!(f, "ledger rejected {}: {message}", step.as_str())
            }
            PipelineFailure::Transport { step, message } => {
                write!(f, "transport error at {}: {message}", step.as_str())
            }
            PipelineFailure::Audit { step, message } => {
                write!(f, "audit write failed at {}: {message}", step.as_str())
            }
        }
    }
}

impl std::error::Error for PipelineFailure {}

/// One audited ledger call as seen by the order report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: PostingStep,
    pub status: AuditStatus,
    /// Real response for success/error, synthesized one for duplicates.
    pub response: Value,
}

/// Furthest state an order reached plus what was accomplished on the way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReport {
    pub order_code: String,
    pub order_date: Option<NaiveDate>,
    pub final_state: PostingState,
    pub failure: Option<PipelineFailure>,
    pub steps: Vec<StepRecord>,
}

impl OrderReport {
    pub fn is_done(&self) -> bool {
        self.final_state == PostingState::Done
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderError {
    pub order_code: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    /// At most `error_list_limit` entries.
    pub errors: Vec<OrderError>,
    /// Failures beyond the bound.
    pub errors_omitted: usize,
}

impl BatchSummary {
    pub fn from_reports(reports: &[OrderReport], error_limit: usize) -> Self {
        let mut summary = BatchSummary {
            total: reports.len(),
            ..Default::default()
        };
        for r in reports {
            if r.is_done() {
                summary.success += 1;
                continue;
            }
            summary.failed += 1;
            if summary.errors.len() < error_limit {
                summary.errors.push(OrderError {
                    order_code: r.order_code.clone(),
                    error: r
                        .failure
                        .as_ref()
                        .map(|f| f.to_string())
                        .unwrap_or_else(|| format!("stopped at {}", r.final_state.as_label())),
                });
            } else {
                summary.errors_omitted += 1;
            }
        }
        summary
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// External collaborators the pipeline drives.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn OrderSource>,
    pub tracker: Arc<dyn PostingTracker>,
    pub ledger: Arc<dyn LedgerClient>,
    pub audit: Arc<dyn AuditSink>,
    pub catalog: Arc<dyn Catalog>,
    pub branches: Arc<dyn BranchDirectory>,
    pub promotions: Arc<dyn PromotionDirectory>,
}

pub struct PostingPipeline {
    deps: Collaborators,
    config: Arc<EngineConfig>,
    duplicates: DuplicateDetector,
}

/// Mutable per-order bookkeeping while the steps run.
struct OrderRun {
    progress: OrderProgress,
    order_date: Option<NaiveDate>,
    steps: Vec<StepRecord>,
}

impl OrderRun {
    fn new(bundle: &OrderBundle) -> Self {
        Self {
            progress: OrderProgress::new(bundle.order_code.clone()),
            order_date: bundle.order_date(),
            steps: Vec::new(),
        }
    }

    fn order_code(&self) -> &str {
        &self.progress.order_code
    }

    fn advance(&mut self, event: PostingEvent, step: PostingStep) -> Result<(), PipelineFailure> {
        let event_id = format!("{}:{event:?}", self.progress.order_code);
        self.progress
            .apply(event, Some(&event_id))
            .map_err(|e| PipelineFailure::validation(step, e.to_string()))
    }

    fn into_report(mut self, failure: Option<PipelineFailure>) -> OrderReport {
        if let Some(f) = &failure {
            let event = if self.progress.state.next_step() == Some(f.step()) {
                PostingEvent::StepFailed(f.step())
            } else {
                PostingEvent::CheckFailed(f.step())
            };
            if let Err(err) = self.progress.apply(event, None) {
                warn!(order_code = %self.progress.order_code, error = %err, "could not record failed step");
            }
        }
        OrderReport {
            order_code: self.progress.order_code,
            order_date: self.order_date,
            final_state: self.progress.state,
            failure,
            steps: self.steps,
        }
    }
}

impl PostingPipeline {
    pub fn new(deps: Collaborators, config: Arc<EngineConfig>) -> Self {
        let duplicates = DuplicateDetector::new(config.pipeline.duplicate_patterns.clone());
        Self {
            deps,
            config,
            duplicates,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Post every unposted order dated in `[from, to]`.
    pub async fn post_range(&self, from: NaiveDate, to: NaiveDate) -> Result<BatchSummary> {
        let codes = self
            .deps
            .source
            .orders_in_range(from, to)
            .await
            .with_context(|| format!("list orders {from}..{to}"))?;
        info!(%from, %to, orders = codes.len(), "posting range");
        self.post_codes(&codes).await
    }

    /// Re-post only the orders whose tracked state is `FAILED`.
    pub async fn retry_failed(&self, from: NaiveDate, to: NaiveDate) -> Result<BatchSummary> {
        let codes = self
            .deps
            .tracker
            .failed_orders(from, to)
            .await
            .with_context(|| format!("list failed orders {from}..{to}"))?;
        info!(%from, %to, orders = codes.len(), "retrying failed orders");
        self.post_codes(&codes).await
    }

    pub async fn post_codes(&self, codes: &[String]) -> Result<BatchSummary> {
        let bundles = self
            .deps
            .source
            .load_orders(codes)
            .await
            .context("load order bundles")?;
        let reports = self.post_bundles(bundles).await;
        let summary = BatchSummary::from_reports(&reports, self.config.pipeline.error_list_limit);
        info!(
            total = summary.total,
            success = summary.success,
            failed = summary.failed,
            "posting batch complete"
        );
        Ok(summary)
    }

    /// Pre-fetch lookups for the bundles, then post them. Reports come back
    /// sorted by order code.
    pub async fn post_bundles(&self, bundles: Vec<OrderBundle>) -> Vec<OrderReport> {
        let mut codes = DistinctCodes::default();
        for s in bundles.iter().flat_map(|b| b.sales.iter()) {
            codes.materials.insert(s.item_code.clone());
            codes.branches.insert(s.branch_code.clone());
        }
        let lookups = prefetch_lookups(
            self.deps.catalog.as_ref(),
            self.deps.branches.as_ref(),
            &codes,
            self.config.pipeline.prefetch(),
        )
        .await;
        self.post_orders(&bundles, &lookups).await
    }

    pub async fn post_orders(&self, bundles: &[OrderBundle], lookups: &LookupCache) -> Vec<OrderReport> {
        let mut reports: Vec<OrderReport> = stream::iter(bundles.iter())
            .map(|b| self.post_order(b, lookups))
            .buffer_unordered(self.config.pipeline.concurrency.max(1))
            .collect()
            .await;
        reports.sort_by(|a, b| a.order_code.cmp(&b.order_code));
        reports
    }

    /// Drive one order as far as it goes. Never returns an error: the
    /// report carries the furthest state and the failure, if any.
    pub async fn post_order(&self, bundle: &OrderBundle, lookups: &LookupCache) -> OrderReport {
        let mut run = OrderRun::new(bundle);
        let failure = self.run_steps(&mut run, bundle, lookups).await.err();

        if let Some(f) = &failure {
            warn!(order_code = %bundle.order_code, step = f.step().as_str(), error = %f, "order failed");
        }
        let report = run.into_report(failure);

        if report.is_done() {
            if let Err(err) = self.deps.source.mark_posted(&report.order_code).await {
                warn!(order_code = %report.order_code, error = %format!("{err:#}"), "mark posted failed");
            }
        }
        if let Err(err) = self.deps.tracker.record_outcome(&report).await {
            warn!(order_code = %report.order_code, error = %format!("{err:#}"), "tracking write failed");
        }
        info!(order_code = %report.order_code, state = %report.final_state.as_label(), "order finished");
        report
    }

    async fn run_steps(
        &self,
        run: &mut OrderRun,
        bundle: &OrderBundle,
        lookups: &LookupCache,
    ) -> Result<(), PipelineFailure> {
        let assembly = self.prepare(bundle, lookups)?;
        // Promotion codes travel in the sales order and the invoice alike.
        self.validate_promotions(&assembly).await?;

        // Customer.
        let req = to_request(PostingStep::Customer, &assembly.customer)?;
        self.call_step(run, PostingStep::Customer, req, self.deps.ledger.create_customer(&assembly.customer))
            .await?;
        run.advance(PostingEvent::StepSucceeded(PostingStep::Customer), PostingStep::Customer)?;

        // Sales order.
        let req = to_request(PostingStep::SalesOrder, &assembly.order)?;
        self.call_step(run, PostingStep::SalesOrder, req.clone(), self.deps.ledger.submit_sales_order(&assembly.order))
            .await?;
        run.advance(PostingEvent::StepSucceeded(PostingStep::SalesOrder), PostingStep::SalesOrder)?;

        // Invoice.
        self.call_step(run, PostingStep::Invoice, req, self.deps.ledger.submit_invoice(&assembly.order))
            .await?;
        run.advance(PostingEvent::StepSucceeded(PostingStep::Invoice), PostingStep::Invoice)?;

        // Payment.
        let routed = self.route_payments(&assembly.payments)?;
        for (doc_type, payment) in routed {
            let req = to_request(PostingStep::Payment, payment)?;
            match doc_type {
                DocumentType::Cash => {
                    self.call_step(run, PostingStep::Payment, req, self.deps.ledger.submit_cash_receipt(payment))
                        .await?
                }
                DocumentType::Bank => {
                    self.call_step(run, PostingStep::Payment, req, self.deps.ledger.submit_bank_receipt(payment))
                        .await?
                }
            };
        }
        run.advance(PostingEvent::StepSucceeded(PostingStep::Payment), PostingStep::Payment)?;

        // Warehouse, only with something to move.
        if assembly.has_stock_work() {
            if let Some(issue) = &assembly.stock_issue {
                let req = to_request(PostingStep::Warehouse, issue)?;
                self.call_step(run, PostingStep::Warehouse, req, self.deps.ledger.post_stock_issue(issue))
                    .await?;
            }
            for transfer in &assembly.transfers {
                let req = to_request(PostingStep::Warehouse, transfer)?;
                self.call_step(run, PostingStep::Warehouse, req, self.deps.ledger.post_transfer(transfer))
                    .await?;
            }
            run.advance(PostingEvent::StepSucceeded(PostingStep::Warehouse), PostingStep::Warehouse)?;
        } else {
            debug!(order_code = %run.order_code(), "no stock to post; skipping warehouse step");
        }

        run.advance(PostingEvent::Complete, PostingStep::Warehouse)
    }

    /// Lookups, resolution, explosion and assembly. Failures here stop the
    /// order before any ledger call.
    fn prepare(&self, bundle: &OrderBundle, lookups: &LookupCache) -> Result<OrderAssembly, PipelineFailure> {
        let step = PostingStep::Customer;
        let cfg = &self.config;
        let first = bundle
            .sales
            .first()
            .ok_or_else(|| PipelineFailure::validation(step, format!("order '{}' has no sale lines", bundle.order_code)))?;

        let mut resolutions: Vec<AccountingResolution> = Vec::with_capacity(bundle.sales.len());
        let mut products = Vec::with_capacity(bundle.sales.len());
        for sale in &bundle.sales {
            let product = lookups.product(&sale.item_code).ok_or_else(|| {
                PipelineFailure::validation(step, format!("material '{}' not found in catalog", sale.item_code))
            })?;
            let input = ResolveInput::for_sale(sale, product, &bundle.payments, &bundle.fees);
            resolutions.push(resolve(&input, &cfg.rules));
            products.push(product);
        }

        let lines: Vec<(CanonicalSale, LineContext)> = bundle
            .sales
            .iter()
            .zip(products.iter().zip(resolutions.iter()))
            .map(|(sale, (product, res))| {
                (
                    sale.clone(),
                    LineContext {
                        material_code: Some(product.material_code.clone()),
                        card_split: res.category == OrderCategory::CardSplit,
                    },
                )
            })
            .collect();
        let posting_lines = explode_order(&bundle.order_code, &lines, &bundle.movements, &cfg.warehouse_map);
        let transfers = group_transfers(&bundle.movements, &cfg.warehouse_map);

        if cfg.pipeline.require_stock_codes {
            let cancellation = bundle.sales.iter().any(|s| s.is_cancellation);
            let has_goods = products.iter().any(|p| p.product_type == ProductType::Goods);
            let has_codes = posting_lines.iter().any(|l| l.warehouse_code.is_some());
            if has_goods && !has_codes && !cancellation {
                return Err(PipelineFailure::validation(
                    step,
                    format!("order '{}' has goods but no warehouse code", bundle.order_code),
                ));
            }
        }

        let sales: Vec<ResolvedSale<'_>> = bundle
            .sales
            .iter()
            .zip(products.iter().zip(resolutions.iter()))
            .map(|(sale, (product, resolution))| ResolvedSale {
                sale,
                product,
                resolution,
            })
            .collect();

        let default_branch = BranchInfo::default();
        let branch = lookups.branch(&first.branch_code).unwrap_or(&default_branch);

        assemble_order(&AssemblyInput {
            order_code: &bundle.order_code,
            branch,
            sales: &sales,
            posting_lines: &posting_lines,
            transfers: &transfers,
            payments: &bundle.payments,
            customer_name: first.descriptive.customer_name.as_deref(),
            settings: &cfg.pipeline,
        })
        .map_err(|e| PipelineFailure::validation(step, e.to_string()))
    }

    async fn validate_promotions(&self, assembly: &OrderAssembly) -> Result<(), PipelineFailure> {
        let step = PostingStep::Invoice;
        let timeout = self.config.pipeline.lookup_timeout();
        for code in &assembly.promotion_codes {
            let found = tokio::time::timeout(timeout, self.deps.promotions.get_promotion(code))
                .await
                .map_err(|_| PipelineFailure::Transport {
                    step,
                    message: format!("promotion lookup '{code}' timed out"),
                })?
                .map_err(|e| PipelineFailure::Transport {
                    step,
                    message: format!("promotion lookup '{code}' failed: {e:#}"),
                })?;
            if found.is_none() {
                return Err(PipelineFailure::validation(step, format!("unknown promotion code '{code}'")));
            }
        }
        Ok(())
    }

    /// Every payment needs a declared document type before any is sent.
    fn route_payments<'a>(
        &self,
        payments: &'a [PaymentPayload],
    ) -> Result<Vec<(DocumentType, &'a PaymentPayload)>, PipelineFailure> {
        let table: &BTreeMap<String, DocumentType> = &self.config.pipeline.payment_doc_types;
        payments
            .iter()
            .map(|p| {
                table.get(&p.method_code).map(|d| (*d, p)).ok_or_else(|| {
                    PipelineFailure::validation(
                        PostingStep::Payment,
                        format!("payment method '{}' has no document type", p.method_code),
                    )
                })
            })
            .collect()
    }

    /// Run one ledger call: bounded wait, normalise, tolerate duplicates,
    /// audit, then hand back the effective result.
    async fn call_step<F>(
        &self,
        run: &mut OrderRun,
        step: PostingStep,
        request: Value,
        call: F,
    ) -> Result<Value, PipelineFailure>
    where
        F: Future<Output = Result<Value, LedgerCallError>>,
    {
        let timeout = self.config.pipeline.posting_timeout();
        let result = match tokio::time::timeout(timeout, call).await {
            Ok(r) => r.and_then(into_call_result),
            Err(_) => Err(LedgerCallError::Transport(format!(
                "no answer within {} ms",
                timeout.as_millis()
            ))),
        };

        let (status, audited_response, error_message, effective) = match result {
            Ok(body) => (AuditStatus::Success, body.clone(), None, Ok(body)),
            Err(err) if self.duplicates.is_duplicate(&err) => (
                AuditStatus::Duplicate,
                err.response(),
                Some(err.message().to_string()),
                Ok(DuplicateDetector::synthesized_success()),
            ),
            Err(err) => (
                AuditStatus::Error,
                err.response(),
                Some(err.message().to_string()),
                Err(err),
            ),
        };

        let rec = new_record(
            run.order_code(),
            step.as_str(),
            request,
            audited_response.clone(),
            status,
            error_message,
        );
        self.deps.audit.record(&rec).await.map_err(|e| PipelineFailure::Audit {
            step,
            message: format!("{e:#}"),
        })?;

        match status {
            AuditStatus::Error => {
                warn!(order_code = %run.order_code(), step = step.as_str(), status = status.as_str(), "ledger call failed")
            }
            _ => info!(order_code = %run.order_code(), step = step.as_str(), status = status.as_str(), "ledger call"),
        }

        run.steps.push(StepRecord {
            step,
            status,
            response: match &effective {
                Ok(v) => v.clone(),
                Err(_) => audited_response,
            },
        });
        effective.map_err(|e| PipelineFailure::from_call(step, e))
    }
}

fn to_request<T: Serialize>(step: PostingStep, payload: &T) -> Result<Value, PipelineFailure> {
    serde_json::to_value(payload)
        .map_err(|e| PipelineFailure::validation(step, format!("serialize request: {e}")))
}
