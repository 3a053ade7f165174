use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use chrono::NaiveDate;
use slx_audit::AuditSink;
use slx_ingest::{BranchDirectory, Catalog, IngestOutcome, PromotionDirectory, SaleStore};
use slx_posting::{OrderBundle, OrderReport, OrderSource, PostingTracker};
use slx_schemas::{
    AuditRecord, BranchInfo, CanonicalSale, OrderFee, OrderPayment, ProductInfo, PromotionInfo,
    WarehouseMovement,
};

fn locked<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock().map_err(|_| anyhow!("testkit state lock poisoned"))
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedOrder {
    pub order_date: Option<NaiveDate>,
    pub state: String,
    pub attempts: u32,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct StoreState {
    sales: BTreeMap<String, CanonicalSale>,
    movements: Vec<WarehouseMovement>,
    payments: Vec<OrderPayment>,
    fees: Vec<OrderFee>,
    tracking: BTreeMap<String, TrackedOrder>,
}

/// Sale store, order source and posting tracker over plain maps. Same
/// upsert semantics as the database store.
#[derive(Default)]
pub struct MemStore {
    state: Mutex<StoreState>,
}

impl MemStore {
    pub fn add_movement(&self, m: WarehouseMovement) -> Result<()> {
        let mut st = locked(&self.state)?;
        st.movements.retain(|x| x.movement_id != m.movement_id);
        st.movements.push(m);
        Ok(())
    }

    pub fn add_payment(&self, p: OrderPayment) -> Result<()> {
        locked(&self.state)?.payments.push(p);
        Ok(())
    }

    pub fn add_fee(&self, f: OrderFee) -> Result<()> {
        locked(&self.state)?.fees.push(f);
        Ok(())
    }

    pub fn sale_count(&self) -> usize {
        self.state.lock().map(|st| st.sales.len()).unwrap_or(0)
    }

    pub fn sale(&self, natural_key: &str) -> Option<CanonicalSale> {
        self.state
            .lock()
            .ok()
            .and_then(|st| st.sales.get(natural_key).cloned())
    }

    /// `natural_key -> posted` for every stored sale.
    pub fn posted_flags(&self) -> BTreeMap<String, bool> {
        self.state
            .lock()
            .map(|st| st.sales.iter().map(|(k, s)| (k.clone(), s.posted)).collect())
            .unwrap_or_default()
    }

    pub fn tracked(&self, order_code: &str) -> Option<TrackedOrder> {
        self.state
            .lock()
            .ok()
            .and_then(|st| st.tracking.get(order_code).cloned())
    }
}

#[async_trait::async_trait]
impl SaleStore for MemStore {
    async fn upsert_sale(&self, sale: &CanonicalSale) -> Result<IngestOutcome> {
        let mut st = locked(&self.state)?;
        match st.sales.get_mut(&sale.natural_key) {
            None => {
                let mut fresh = sale.clone();
                fresh.posted = false;
                st.sales.insert(sale.natural_key.clone(), fresh);
                Ok(IngestOutcome::Created)
            }
            Some(existing) if existing.descriptive != sale.descriptive => {
                existing.descriptive = sale.descriptive.clone();
                Ok(IngestOutcome::Updated)
            }
            Some(_) => Ok(IngestOutcome::Skipped),
        }
    }
}

#[async_trait::async_trait]
impl OrderSource for MemStore {
    async fn orders_in_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<String>> {
        let st = locked(&self.state)?;
        let codes: BTreeSet<String> = st
            .sales
            .values()
            .filter(|s| !s.posted && s.order_date >= from && s.order_date <= to)
            .map(|s| s.order_code.clone())
            .collect();
        Ok(codes.into_iter().collect())
    }

    async fn load_orders(&self, codes: &[String]) -> Result<Vec<OrderBundle>> {
        let st = locked(&self.state)?;
        let wanted: BTreeSet<&str> = codes.iter().map(String::as_str).collect();
        let mut out = Vec::new();
        for code in wanted {
            let mut sales: Vec<CanonicalSale> = st
                .sales
                .values()
                .filter(|s| s.order_code == code)
                .cloned()
                .collect();
            if sales.is_empty() {
                continue;
            }
            sales.sort_by(|a, b| {
                (a.position_index, &a.natural_key).cmp(&(b.position_index, &b.natural_key))
            });
            out.push(OrderBundle {
                order_code: code.to_string(),
                sales,
                movements: st.movements.iter().filter(|m| m.order_code == code).cloned().collect(),
                payments: st.payments.iter().filter(|p| p.order_code == code).cloned().collect(),
                fees: st.fees.iter().filter(|f| f.order_code == code).cloned().collect(),
            });
        }
        Ok(out)
    }

    async fn mark_posted(&self, order_code: &str) -> Result<u64> {
        let mut st = locked(&self.state)?;
        let mut changed = 0;
        for s in st.sales.values_mut() {
            if s.order_code == order_code && !s.posted {
                s.posted = true;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[async_trait::async_trait]
impl PostingTracker for MemStore {
    async fn record_outcome(&self, report: &OrderReport) -> Result<()> {
        let mut st = locked(&self.state)?;
        let entry = st
            .tracking
            .entry(report.order_code.clone())
            .or_insert_with(|| TrackedOrder {
                order_date: report.order_date,
                state: String::new(),
                attempts: 0,
                last_error: None,
            });
        entry.state = report.final_state.as_label();
        entry.attempts += 1;
        entry.last_error = report.failure.as_ref().map(|f| f.to_string());
        if report.order_date.is_some() {
            entry.order_date = report.order_date;
        }
        Ok(())
    }

    async fn failed_orders(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<String>> {
        let st = locked(&self.state)?;
        Ok(st
            .tracking
            .iter()
            .filter(|(_, t)| t.state.starts_with("FAILED:"))
            .filter(|(_, t)| t.order_date.is_some_and(|d| d >= from && d <= to))
            .map(|(code, _)| code.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

/// Catalog, branch and promotion directory. Counts calls per lookup kind.
#[derive(Default)]
pub struct MemDirectory {
    materials: BTreeMap<String, ProductInfo>,
    branches: BTreeMap<String, BranchInfo>,
    promotions: BTreeMap<String, PromotionInfo>,
    material_calls: AtomicUsize,
    branch_calls: AtomicUsize,
    promotion_calls: AtomicUsize,
}

impl MemDirectory {
    pub fn with_material(mut self, item_code: &str, product: ProductInfo) -> Self {
        self.materials.insert(item_code.to_string(), product);
        self
    }

    pub fn with_branch(mut self, code: &str, branch: BranchInfo) -> Self {
        self.branches.insert(code.to_string(), branch);
        self
    }

    pub fn with_promotion(mut self, code: &str, promotion: PromotionInfo) -> Self {
        self.promotions.insert(code.to_string(), promotion);
        self
    }

    pub fn material_calls(&self) -> usize {
        self.material_calls.load(Ordering::SeqCst)
    }

    pub fn branch_calls(&self) -> usize {
        self.branch_calls.load(Ordering::SeqCst)
    }

    pub fn promotion_calls(&self) -> usize {
        self.promotion_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Catalog for MemDirectory {
    async fn get_material(&self, code: &str) -> Result<Option<ProductInfo>> {
        self.material_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.materials.get(code).cloned())
    }
}

#[async_trait::async_trait]
impl BranchDirectory for MemDirectory {
    async fn get_branch(&self, code: &str) -> Result<Option<BranchInfo>> {
        self.branch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.branches.get(code).cloned())
    }
}

#[async_trait::async_trait]
impl PromotionDirectory for MemDirectory {
    async fn get_promotion(&self, code: &str) -> Result<Option<PromotionInfo>> {
        self.promotion_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.promotions.get(code).cloned())
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemAuditSink {
    records: Mutex<Vec<AuditRecord>>,
    failing: AtomicBool,
}

impl MemAuditSink {
    /// Make every further write fail.
    pub fn fail_writes(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn for_order(&self, order_code: &str) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.order_code == order_code)
            .collect()
    }
}

#[async_trait::async_trait]
impl AuditSink for MemAuditSink {
    async fn record(&self, rec: &AuditRecord) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("audit store unavailable");
        }
        locked(&self.records)?.push(rec.clone());
        Ok(())
    }
}
