//! slx-reconcile
//!
//! Stock movement reconciler. Explodes each sale line into posting lines
//! matched against the warehouse feed's movements for the same order.
//!
//! - Match on (order code, material code), falling back to (order code, raw
//!   item code) when the material match finds nothing.
//! - Card-split lines additionally require equal signed quantity.
//! - Quantity is conserved: the posting lines of a sale sum to its quantity.
//!   No match gives exactly one unmatched line carrying the original quantity.
//! - Transfer movements are not matched to lines; they are grouped per order
//!   into one multi-line transfer request.
//!
//! Deterministic, pure logic. No IO.

mod explode;
mod types;

pub use explode::{explode, explode_order, group_transfers, MovementPool};
pub use types::*;
