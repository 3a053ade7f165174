//! slx-db
//!
//! PostgreSQL persistence. [`PgStore`] implements every storage seam the
//! engine drives: [`SaleStore`] for ingestion, [`OrderSource`] and
//! [`PostingTracker`] for posting, and [`AuditSink`] for the call trail.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use slx_audit::AuditSink;
use slx_ingest::{IngestOutcome, SaleStore};
use slx_posting::{OrderBundle, OrderReport, OrderSource, PostingTracker};
use slx_schemas::{
    AuditRecord, AuditStatus, CanonicalSale, MovementKind, OrderFee, OrderPayment, PaymentKind,
    SaleAmounts, SaleDescriptive, WarehouseMovement,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;

pub use sqlx::PgPool;

pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_sales_table: bool,
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='canonical_sales'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_sales_table: exists,
    })
}

/// Sales already posted to the ledger. Zero when the schema is not there yet.
pub async fn count_posted_sales(pool: &PgPool) -> Result<i64> {
    if !status(pool).await?.has_sales_table {
        return Ok(0);
    }
    let (n,): (i64,) =
        sqlx::query_as::<_, (i64,)>("select count(*) from canonical_sales where posted")
            .fetch_one(pool)
            .await
            .context("count_posted_sales failed")?;
    Ok(n)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Warehouse feed load. Re-loading a movement id overwrites it.
    pub async fn upsert_movement(&self, m: &WarehouseMovement) -> Result<()> {
        sqlx::query(
            r#"
            insert into warehouse_movements (
              movement_id, order_code, material_code, quantity, batch, serial,
              kind, warehouse_code, related_warehouse_code
            ) values ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            on conflict (movement_id) do update set
              order_code = excluded.order_code,
              material_code = excluded.material_code,
              quantity = excluded.quantity,
              batch = excluded.batch,
              serial = excluded.serial,
              kind = excluded.kind,
              warehouse_code = excluded.warehouse_code,
              related_warehouse_code = excluded.related_warehouse_code
            "#,
        )
        .bind(&m.movement_id)
        .bind(&m.order_code)
        .bind(&m.material_code)
        .bind(m.quantity)
        .bind(&m.batch)
        .bind(&m.serial)
        .bind(m.kind.as_str())
        .bind(&m.warehouse_code)
        .bind(&m.related_warehouse_code)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert movement {} failed", m.movement_id))?;
        Ok(())
    }

    pub async fn upsert_payment(&self, p: &OrderPayment) -> Result<()> {
        sqlx::query(
            r#"
            insert into order_payments (order_code, method_code, kind, amount)
            values ($1,$2,$3,$4)
            on conflict (order_code, method_code, kind) do update set
              amount = excluded.amount
            "#,
        )
        .bind(&p.order_code)
        .bind(&p.method_code)
        .bind(p.kind.as_str())
        .bind(p.amount)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert payment {}/{} failed", p.order_code, p.method_code))?;
        Ok(())
    }

    pub async fn upsert_fee(&self, f: &OrderFee) -> Result<()> {
        sqlx::query(
            r#"
            insert into order_fees (order_code, fee_code, amount)
            values ($1,$2,$3)
            on conflict (order_code, fee_code) do update set
              amount = excluded.amount
            "#,
        )
        .bind(&f.order_code)
        .bind(&f.fee_code)
        .bind(f.amount)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert fee {}/{} failed", f.order_code, f.fee_code))?;
        Ok(())
    }

    /// Audit rows of one order in write order.
    pub async fn audit_for_order(&self, order_code: &str) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(
            r#"
            select record_id, order_code, step, request_payload, response_payload,
                   status, error_message, ts_utc
            from posting_audit
            where order_code = $1
            order by ts_utc asc, record_id asc
            "#,
        )
        .bind(order_code)
        .fetch_all(&self.pool)
        .await
        .context("audit_for_order query failed")?;

        rows.iter().map(audit_from_row).collect()
    }

    /// Tracked state label of one order, if any.
    pub async fn tracked_state(&self, order_code: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("select state from posting_tracking where order_code = $1")
                .bind(order_code)
                .fetch_optional(&self.pool)
                .await
                .context("tracked_state query failed")?;
        Ok(row.map(|(s,)| s))
    }

    pub async fn sales_for_order(&self, order_code: &str) -> Result<Vec<CanonicalSale>> {
        let rows = sqlx::query(SELECT_SALES_FOR_ORDERS)
            .bind(vec![order_code.to_string()])
            .fetch_all(&self.pool)
            .await
            .context("sales_for_order query failed")?;
        rows.iter().map(sale_from_row).collect()
    }
}

const SELECT_SALES_FOR_ORDERS: &str = r#"
    select natural_key, source, source_native_id, position_index, order_code, order_date,
           branch_code, item_code, quantity, unit_price, revenue, subtotal, line_total,
           amounts, order_type_label, brand, is_wholesale, is_gift, is_marketplace,
           is_cancellation, promotion_code, serial, customer_id, channel_code, tax_rate,
           discount_account, expense_account, fee_code, item_name, category_tags,
           customer_name, posted
    from canonical_sales
    where order_code = any($1)
    order by order_code asc, position_index asc, natural_key asc
"#;

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn sale_from_row(r: &PgRow) -> Result<CanonicalSale> {
    let position_index: i64 = r.try_get("position_index").context("canonical_sales.position_index")?;
    let tax_rate: Option<i64> = r.try_get("tax_rate").context("canonical_sales.tax_rate")?;
    let amounts: Json<SaleAmounts> = r.try_get("amounts").context("canonical_sales.amounts")?;
    let tags: Json<Vec<String>> = r
        .try_get("category_tags")
        .context("canonical_sales.category_tags")?;

    Ok(CanonicalSale {
        natural_key: r.try_get("natural_key").context("canonical_sales.natural_key")?,
        source: r.try_get("source").context("canonical_sales.source")?,
        source_native_id: r.try_get("source_native_id").context("canonical_sales.source_native_id")?,
        position_index: u32::try_from(position_index)
            .with_context(|| format!("position_index out of range: {position_index}"))?,
        order_code: r.try_get("order_code").context("canonical_sales.order_code")?,
        order_date: r.try_get("order_date").context("canonical_sales.order_date")?,
        branch_code: r.try_get("branch_code").context("canonical_sales.branch_code")?,
        item_code: r.try_get("item_code").context("canonical_sales.item_code")?,
        quantity: r.try_get("quantity").context("canonical_sales.quantity")?,
        unit_price: r.try_get("unit_price").context("canonical_sales.unit_price")?,
        revenue: r.try_get("revenue").context("canonical_sales.revenue")?,
        subtotal: r.try_get("subtotal").context("canonical_sales.subtotal")?,
        line_total: r.try_get("line_total").context("canonical_sales.line_total")?,
        amounts: amounts.0,
        order_type_label: r.try_get("order_type_label").context("canonical_sales.order_type_label")?,
        brand: r.try_get("brand").context("canonical_sales.brand")?,
        is_wholesale: r.try_get("is_wholesale").context("canonical_sales.is_wholesale")?,
        is_gift: r.try_get("is_gift").context("canonical_sales.is_gift")?,
        is_marketplace: r.try_get("is_marketplace").context("canonical_sales.is_marketplace")?,
        is_cancellation: r.try_get("is_cancellation").context("canonical_sales.is_cancellation")?,
        promotion_code: r.try_get("promotion_code").context("canonical_sales.promotion_code")?,
        serial: r.try_get("serial").context("canonical_sales.serial")?,
        customer_id: r.try_get("customer_id").context("canonical_sales.customer_id")?,
        channel_code: r.try_get("channel_code").context("canonical_sales.channel_code")?,
        tax_rate: tax_rate
            .map(u32::try_from)
            .transpose()
            .context("tax_rate out of range")?,
        discount_account: r.try_get("discount_account").context("canonical_sales.discount_account")?,
        expense_account: r.try_get("expense_account").context("canonical_sales.expense_account")?,
        fee_code: r.try_get("fee_code").context("canonical_sales.fee_code")?,
        descriptive: SaleDescriptive {
            item_name: r.try_get("item_name").context("canonical_sales.item_name")?,
            category_tags: tags.0,
            customer_name: r.try_get("customer_name").context("canonical_sales.customer_name")?,
        },
        posted: r.try_get("posted").context("canonical_sales.posted")?,
    })
}

fn movement_from_row(r: &PgRow) -> Result<WarehouseMovement> {
    let kind: String = r.try_get("kind").context("warehouse_movements.kind")?;
    Ok(WarehouseMovement {
        movement_id: r.try_get("movement_id").context("warehouse_movements.movement_id")?,
        order_code: r.try_get("order_code").context("warehouse_movements.order_code")?,
        material_code: r.try_get("material_code").context("warehouse_movements.material_code")?,
        quantity: r.try_get("quantity").context("warehouse_movements.quantity")?,
        batch: r.try_get("batch").context("warehouse_movements.batch")?,
        serial: r.try_get("serial").context("warehouse_movements.serial")?,
        kind: MovementKind::parse(&kind).ok_or_else(|| anyhow!("invalid movement kind: {kind}"))?,
        warehouse_code: r.try_get("warehouse_code").context("warehouse_movements.warehouse_code")?,
        related_warehouse_code: r
            .try_get("related_warehouse_code")
            .context("warehouse_movements.related_warehouse_code")?,
    })
}

fn payment_from_row(r: &PgRow) -> Result<OrderPayment> {
    let kind: String = r.try_get("kind").context("order_payments.kind")?;
    Ok(OrderPayment {
        order_code: r.try_get("order_code").context("order_payments.order_code")?,
        method_code: r.try_get("method_code").context("order_payments.method_code")?,
        kind: PaymentKind::parse(&kind).ok_or_else(|| anyhow!("invalid payment kind: {kind}"))?,
        amount: r.try_get("amount").context("order_payments.amount")?,
    })
}

fn fee_from_row(r: &PgRow) -> Result<OrderFee> {
    Ok(OrderFee {
        order_code: r.try_get("order_code").context("order_fees.order_code")?,
        fee_code: r.try_get("fee_code").context("order_fees.fee_code")?,
        amount: r.try_get("amount").context("order_fees.amount")?,
    })
}

fn audit_from_row(r: &PgRow) -> Result<AuditRecord> {
    let status: String = r.try_get("status").context("posting_audit.status")?;
    let request: Json<serde_json::Value> = r.try_get("request_payload").context("posting_audit.request_payload")?;
    let response: Json<serde_json::Value> = r
        .try_get("response_payload")
        .context("posting_audit.response_payload")?;
    Ok(AuditRecord {
        record_id: r.try_get("record_id").context("posting_audit.record_id")?,
        order_code: r.try_get("order_code").context("posting_audit.order_code")?,
        step: r.try_get("step").context("posting_audit.step")?,
        request_payload: request.0,
        response_payload: response.0,
        status: AuditStatus::parse(&status).ok_or_else(|| anyhow!("invalid audit status: {status}"))?,
        error_message: r.try_get("error_message").context("posting_audit.error_message")?,
        timestamp: r.try_get("ts_utc").context("posting_audit.ts_utc")?,
    })
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl SaleStore for PgStore {
    /// `xmax = 0` on the returned row means it was inserted. No returned row
    /// means the key existed with identical descriptive columns.
    async fn upsert_sale(&self, s: &CanonicalSale) -> Result<IngestOutcome> {
        let inserted: Option<(bool,)> = sqlx::query_as(
            r#"
            insert into canonical_sales (
              natural_key, source, source_native_id, position_index, order_code, order_date,
              branch_code, item_code, quantity, unit_price, revenue, subtotal, line_total,
              amounts, order_type_label, brand, is_wholesale, is_gift, is_marketplace,
              is_cancellation, promotion_code, serial, customer_id, channel_code, tax_rate,
              discount_account, expense_account, fee_code, item_name, category_tags,
              customer_name, posted
            ) values (
              $1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,
              $21,$22,$23,$24,$25,$26,$27,$28,$29,$30,$31,false
            )
            on conflict (natural_key) do update set
              item_name = excluded.item_name,
              category_tags = excluded.category_tags,
              customer_name = excluded.customer_name,
              updated_at_utc = now()
            where (canonical_sales.item_name, canonical_sales.category_tags, canonical_sales.customer_name)
              is distinct from (excluded.item_name, excluded.category_tags, excluded.customer_name)
            returning (xmax = 0)
            "#,
        )
        .bind(&s.natural_key)
        .bind(&s.source)
        .bind(&s.source_native_id)
        .bind(i64::from(s.position_index))
        .bind(&s.order_code)
        .bind(s.order_date)
        .bind(&s.branch_code)
        .bind(&s.item_code)
        .bind(s.quantity)
        .bind(s.unit_price)
        .bind(s.revenue)
        .bind(s.subtotal)
        .bind(s.line_total)
        .bind(Json(&s.amounts))
        .bind(&s.order_type_label)
        .bind(&s.brand)
        .bind(s.is_wholesale)
        .bind(s.is_gift)
        .bind(s.is_marketplace)
        .bind(s.is_cancellation)
        .bind(&s.promotion_code)
        .bind(&s.serial)
        .bind(&s.customer_id)
        .bind(&s.channel_code)
        .bind(s.tax_rate.map(i64::from))
        .bind(&s.discount_account)
        .bind(&s.expense_account)
        .bind(&s.fee_code)
        .bind(&s.descriptive.item_name)
        .bind(Json(&s.descriptive.category_tags))
        .bind(&s.descriptive.customer_name)
        .fetch_optional(&self.pool)
        .await
        .context("upsert canonical_sales failed")?;

        Ok(match inserted {
            Some((true,)) => IngestOutcome::Created,
            Some((false,)) => IngestOutcome::Updated,
            None => IngestOutcome::Skipped,
        })
    }
}

#[async_trait::async_trait]
impl OrderSource for PgStore {
    async fn orders_in_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            select distinct order_code
            from canonical_sales
            where order_date >= $1 and order_date <= $2 and not posted
            order by order_code asc
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .context("orders_in_range query failed")?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    async fn load_orders(&self, codes: &[String]) -> Result<Vec<OrderBundle>> {
        let codes = codes.to_vec();

        let sales = sqlx::query(SELECT_SALES_FOR_ORDERS)
            .bind(&codes)
            .fetch_all(&self.pool)
            .await
            .context("load sales query failed")?;
        let movements = sqlx::query(
            r#"
            select movement_id, order_code, material_code, quantity, batch, serial,
                   kind, warehouse_code, related_warehouse_code
            from warehouse_movements
            where order_code = any($1)
            order by order_code asc, movement_id asc
            "#,
        )
        .bind(&codes)
        .fetch_all(&self.pool)
        .await
        .context("load movements query failed")?;
        let payments = sqlx::query(
            r#"
            select order_code, method_code, kind, amount
            from order_payments
            where order_code = any($1)
            order by order_code asc, method_code asc, kind asc
            "#,
        )
        .bind(&codes)
        .fetch_all(&self.pool)
        .await
        .context("load payments query failed")?;
        let fees = sqlx::query(
            r#"
            select order_code, fee_code, amount
            from order_fees
            where order_code = any($1)
            order by order_code asc, fee_code asc
            "#,
        )
        .bind(&codes)
        .fetch_all(&self.pool)
        .await
        .context("load fees query failed")?;

        let mut bundles: BTreeMap<String, OrderBundle> = BTreeMap::new();
        for r in &sales {
            let sale = sale_from_row(r)?;
            bundles
                .entry(sale.order_code.clone())
                .or_insert_with(|| OrderBundle {
                    order_code: sale.order_code.clone(),
                    sales: Vec::new(),
                    movements: Vec::new(),
                    payments: Vec::new(),
                    fees: Vec::new(),
                })
                .sales
                .push(sale);
        }
        for r in &movements {
            let m = movement_from_row(r)?;
            if let Some(b) = bundles.get_mut(&m.order_code) {
                b.movements.push(m);
            }
        }
        for r in &payments {
            let p = payment_from_row(r)?;
            if let Some(b) = bundles.get_mut(&p.order_code) {
                b.payments.push(p);
            }
        }
        for r in &fees {
            let f = fee_from_row(r)?;
            if let Some(b) = bundles.get_mut(&f.order_code) {
                b.fees.push(f);
            }
        }
        Ok(bundles.into_values().collect())
    }

    async fn mark_posted(&self, order_code: &str) -> Result<u64> {
        let res = sqlx::query(
            r#"
            update canonical_sales
            set posted = true, updated_at_utc = now()
            where order_code = $1 and not posted
            "#,
        )
        .bind(order_code)
        .execute(&self.pool)
        .await
        .with_context(|| format!("mark_posted {order_code} failed"))?;
        Ok(res.rows_affected())
    }
}

#[async_trait::async_trait]
impl PostingTracker for PgStore {
    async fn record_outcome(&self, report: &OrderReport) -> Result<()> {
        sqlx::query(
            r#"
            insert into posting_tracking (order_code, order_date, state, last_error, attempts, updated_at_utc)
            values ($1, $2, $3, $4, 1, now())
            on conflict (order_code) do update set
              order_date = coalesce(excluded.order_date, posting_tracking.order_date),
              state = excluded.state,
              last_error = excluded.last_error,
              attempts = posting_tracking.attempts + 1,
              updated_at_utc = now()
            "#,
        )
        .bind(&report.order_code)
        .bind(report.order_date)
        .bind(report.final_state.as_label())
        .bind(report.failure.as_ref().map(|f| f.to_string()))
        .execute(&self.pool)
        .await
        .with_context(|| format!("record_outcome {} failed", report.order_code))?;
        Ok(())
    }

    async fn failed_orders(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            select order_code
            from posting_tracking
            where state like 'FAILED:%'
              and order_date >= $1 and order_date <= $2
            order by order_code asc
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .context("failed_orders query failed")?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }
}

#[async_trait::async_trait]
impl AuditSink for PgStore {
    async fn record(&self, rec: &AuditRecord) -> Result<()> {
        sqlx::query(
            r#"
            insert into posting_audit (
              record_id, order_code, step, request_payload, response_payload,
              status, error_message, ts_utc
            ) values ($1,$2,$3,$4,$5,$6,$7,$8)
            "#,
        )
        .bind(rec.record_id)
        .bind(&rec.order_code)
        .bind(&rec.step)
        .bind(Json(&rec.request_payload))
        .bind(Json(&rec.response_payload))
        .bind(rec.status.as_str())
        .bind(&rec.error_message)
        .bind(rec.timestamp)
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert posting_audit {} failed", rec.record_id))?;
        Ok(())
    }
}
