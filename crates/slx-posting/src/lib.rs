//! slx-posting
//!
//! Idempotent posting pipeline. Takes stored orders, resolves accounting
//! for every line, explodes lines against warehouse movements, assembles the
//! ledger payloads and drives each order through the per-order state
//! machine ([`state`]).
//!
//! External systems sit behind traits: [`LedgerClient`], [`OrderSource`],
//! [`PostingTracker`], plus the lookup traits from `slx-ingest` and the
//! audit sink from `slx-audit`.

pub mod client;
pub mod outcome;
pub mod payload;
pub mod pipeline;
pub mod settings;
pub mod source;
pub mod state;

pub use client::LedgerClient;
pub use outcome::{normalize_response, CallOutcome, DuplicateDetector, LedgerCallError};
pub use payload::{
    assemble_order, AssemblyError, AssemblyInput, CustomerPayload, DetailLine, LedgerOrderPayload,
    OrderAssembly, OrderHeader, PaymentPayload, ResolvedSale, StockIssuePayload, StockLine,
    TransferPayload,
};
pub use pipeline::{
    BatchSummary, Collaborators, OrderError, OrderReport, PipelineFailure, PostingPipeline,
    StepRecord,
};
pub use settings::{DocumentType, EngineConfig, PipelineSettings};
pub use source::{OrderBundle, OrderSource, PostingTracker};
pub use state::{OrderProgress, PostingEvent, PostingState, PostingStep, TransitionError};
