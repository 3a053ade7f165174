//! Per-order posting state machine.
//!
//! ```text
//! PENDING -> CUSTOMER_OK -> ORDER_SUBMITTED -> INVOICE_SUBMITTED
//!         -> PAYMENT_PROCESSED -> WAREHOUSE_POSTED -> DONE
//!                              \------(no stock)------> DONE
//! any non-terminal state --StepFailed(next step)--> FAILED(step)
//! any non-terminal state --CheckFailed(next step or later)--> FAILED(step)
//! ```
//!
//! Steps run strictly in sequence: the ledger needs the customer before the
//! order and the order before the invoice. A step's call can only fail while
//! it is the next step. A check guarding a later step may fail earlier, before
//! anything reaches the ledger. Replaying an already-applied event id is a
//! no-op.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ---------------------------------------------------------------------------
// Steps + states
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostingStep {
    Customer,
    SalesOrder,
    Invoice,
    Payment,
    Warehouse,
}

impl PostingStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostingStep::Customer => "customer",
            PostingStep::SalesOrder => "sales_order",
            PostingStep::Invoice => "invoice",
            PostingStep::Payment => "payment",
            PostingStep::Warehouse => "warehouse",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "customer" => Some(PostingStep::Customer),
            "sales_order" => Some(PostingStep::SalesOrder),
            "invoice" => Some(PostingStep::Invoice),
            "payment" => Some(PostingStep::Payment),
            "warehouse" => Some(PostingStep::Warehouse),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostingState {
    Pending,
    CustomerOk,
    OrderSubmitted,
    InvoiceSubmitted,
    PaymentProcessed,
    WarehousePosted,
    Done,
    /// Absorbing. Carries the step that failed.
    Failed(PostingStep),
}

impl PostingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PostingState::Done | PostingState::Failed(_))
    }

    /// Step that moves this state forward; `None` once terminal.
    pub fn next_step(&self) -> Option<PostingStep> {
        match self {
            PostingState::Pending => Some(PostingStep::Customer),
            PostingState::CustomerOk => Some(PostingStep::SalesOrder),
            PostingState::OrderSubmitted => Some(PostingStep::Invoice),
            PostingState::InvoiceSubmitted => Some(PostingStep::Payment),
            PostingState::PaymentProcessed => Some(PostingStep::Warehouse),
            PostingState::WarehousePosted | PostingState::Done | PostingState::Failed(_) => None,
        }
    }

    /// `FAILED` states render as `FAILED:<step>`.
    pub fn as_label(&self) -> String {
        match self {
            PostingState::Pending => "PENDING".to_string(),
            PostingState::CustomerOk => "CUSTOMER_OK".to_string(),
            PostingState::OrderSubmitted => "ORDER_SUBMITTED".to_string(),
            PostingState::InvoiceSubmitted => "INVOICE_SUBMITTED".to_string(),
            PostingState::PaymentProcessed => "PAYMENT_PROCESSED".to_string(),
            PostingState::WarehousePosted => "WAREHOUSE_POSTED".to_string(),
            PostingState::Done => "DONE".to_string(),
            PostingState::Failed(step) => format!("FAILED:{}", step.as_str()),
        }
    }

    pub fn parse_label(s: &str) -> Option<Self> {
        if let Some(step) = s.strip_prefix("FAILED:") {
            return PostingStep::parse(step).map(PostingState::Failed);
        }
        match s {
            "PENDING" => Some(PostingState::Pending),
            "CUSTOMER_OK" => Some(PostingState::CustomerOk),
            "ORDER_SUBMITTED" => Some(PostingState::OrderSubmitted),
            "INVOICE_SUBMITTED" => Some(PostingState::InvoiceSubmitted),
            "PAYMENT_PROCESSED" => Some(PostingState::PaymentProcessed),
            "WAREHOUSE_POSTED" => Some(PostingState::WarehousePosted),
            "DONE" => Some(PostingState::Done),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingEvent {
    /// The step's ledger call succeeded or was tolerated as a duplicate.
    StepSucceeded(PostingStep),
    StepFailed(PostingStep),
    /// A check owned by a step at or after the next one failed ahead of
    /// that step's call.
    CheckFailed(PostingStep),
    /// Close the order. Legal after the warehouse step, or straight after
    /// payment when the order moves no stock.
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: PostingState,
    pub event: String,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "illegal posting transition: {} + {}",
            self.from.as_label(),
            self.event
        )
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// OrderProgress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OrderProgress {
    pub order_code: String,
    pub state: PostingState,
    applied: HashSet<String>,
}

impl OrderProgress {
    pub fn new(order_code: impl Into<String>) -> Self {
        Self {
            order_code: order_code.into(),
            state: PostingState::Pending,
            applied: HashSet::new(),
        }
    }

    /// Apply `event`. A previously applied `event_id` returns `Ok(())`
    /// without touching state.
    pub fn apply(
        &mut self,
        event: PostingEvent,
        event_id: Option<&str>,
    ) -> Result<(), TransitionError> {
        if let Some(id) = event_id {
            if self.applied.contains(id) {
                return Ok(());
            }
        }

        self.do_transition(event)?;

        if let Some(id) = event_id {
            self.applied.insert(id.to_string());
        }
        Ok(())
    }

    fn do_transition(&mut self, event: PostingEvent) -> Result<(), TransitionError> {
        use PostingEvent::*;
        use PostingState::*;
        use PostingStep as S;

        let next = match (self.state, event) {
            (Pending, StepSucceeded(S::Customer)) => CustomerOk,
            (CustomerOk, StepSucceeded(S::SalesOrder)) => OrderSubmitted,
            (OrderSubmitted, StepSucceeded(S::Invoice)) => InvoiceSubmitted,
            (InvoiceSubmitted, StepSucceeded(S::Payment)) => PaymentProcessed,
            (PaymentProcessed, StepSucceeded(S::Warehouse)) => WarehousePosted,

            (PaymentProcessed | WarehousePosted, Complete) => Done,

            (state, StepFailed(step)) if state.next_step() == Some(step) => Failed(step),
            (state, CheckFailed(step)) if state.next_step().is_some_and(|n| n <= step) => Failed(step),

            (state, ev) => {
                return Err(TransitionError {
                    from: state,
                    event: format!("{ev:?}"),
                })
            }
        };
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PostingEvent::*;
    use PostingStep as S;

    #[test]
    fn full_happy_path_reaches_done() {
        let mut p = OrderProgress::new("SO-1");
        for step in [S::Customer, S::SalesOrder, S::Invoice, S::Payment, S::Warehouse] {
            p.apply(StepSucceeded(step), None).unwrap();
        }
        assert_eq!(p.state, PostingState::WarehousePosted);
        p.apply(Complete, None).unwrap();
        assert_eq!(p.state, PostingState::Done);
        assert!(p.state.is_terminal());
    }

    #[test]
    fn warehouse_can_be_skipped() {
        let mut p = OrderProgress::new("SO-1");
        for step in [S::Customer, S::SalesOrder, S::Invoice, S::Payment] {
            p.apply(StepSucceeded(step), None).unwrap();
        }
        p.apply(Complete, None).unwrap();
        assert_eq!(p.state, PostingState::Done);
    }

    #[test]
    fn steps_cannot_be_skipped() {
        let mut p = OrderProgress::new("SO-1");
        let err = p.apply(StepSucceeded(S::Invoice), None).unwrap_err();
        assert_eq!(err.from, PostingState::Pending);
        assert_eq!(p.state, PostingState::Pending);
        assert!(p.apply(Complete, None).is_err());
    }

    #[test]
    fn only_the_next_step_can_fail() {
        let mut p = OrderProgress::new("SO-1");
        p.apply(StepSucceeded(S::Customer), None).unwrap();
        assert!(p.apply(StepFailed(S::Invoice), None).is_err());
        p.apply(StepFailed(S::SalesOrder), None).unwrap();
        assert_eq!(p.state, PostingState::Failed(S::SalesOrder));
        // Absorbing.
        assert!(p.apply(StepSucceeded(S::SalesOrder), None).is_err());
    }

    #[test]
    fn check_for_a_later_step_can_fail_early() {
        let mut p = OrderProgress::new("SO-1");
        p.apply(StepSucceeded(S::Customer), None).unwrap();
        assert!(p.apply(CheckFailed(S::Customer), None).is_err());
        p.apply(CheckFailed(S::Invoice), None).unwrap();
        assert_eq!(p.state, PostingState::Failed(S::Invoice));
        assert!(p.apply(CheckFailed(S::Payment), None).is_err());
    }

    #[test]
    fn replayed_event_id_is_a_noop() {
        let mut p = OrderProgress::new("SO-1");
        p.apply(StepSucceeded(S::Customer), Some("e1")).unwrap();
        p.apply(StepSucceeded(S::Customer), Some("e1")).unwrap();
        assert_eq!(p.state, PostingState::CustomerOk);
    }

    #[test]
    fn labels_round_trip() {
        for s in [
            PostingState::Pending,
            PostingState::InvoiceSubmitted,
            PostingState::Done,
            PostingState::Failed(S::Payment),
        ] {
            assert_eq!(PostingState::parse_label(&s.as_label()), Some(s));
        }
        assert_eq!(PostingState::parse_label("FAILED:nope"), None);
    }
}
