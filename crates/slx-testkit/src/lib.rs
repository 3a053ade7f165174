//! slx-testkit
//!
//! In-memory collaborators and fixture builders for driving ingestion and
//! the posting pipeline end to end without a database or a ledger.
//!
//! - [`MemStore`]: sale store, order source and posting tracker.
//! - [`MemDirectory`]: catalog, branch and promotion lookups with call counts.
//! - [`MemAuditSink`]: captures audit records; can be told to fail.
//! - [`ScriptedLedger`]: answers `status: 1` unless a reply is scripted.
//! - [`Harness`]: all of the above wired into a [`PostingPipeline`].

mod fixtures;
mod ledger;
mod memory;

pub use fixtures::*;
pub use ledger::{Endpoint, LedgerCall, Scripted, ScriptedLedger};
pub use memory::{MemAuditSink, MemDirectory, MemStore, TrackedOrder};

use std::sync::Arc;

use slx_posting::{Collaborators, EngineConfig, PostingPipeline};

/// Shared in-memory collaborators. Build several pipelines over the same
/// state to simulate re-runs.
#[derive(Clone)]
pub struct Harness {
    pub store: Arc<MemStore>,
    pub ledger: Arc<ScriptedLedger>,
    pub audit: Arc<MemAuditSink>,
    pub directory: Arc<MemDirectory>,
}

impl Harness {
    pub fn new(directory: MemDirectory) -> Self {
        Self {
            store: Arc::new(MemStore::default()),
            ledger: Arc::new(ScriptedLedger::default()),
            audit: Arc::new(MemAuditSink::default()),
            directory: Arc::new(directory),
        }
    }

    pub fn pipeline(&self, config: EngineConfig) -> PostingPipeline {
        PostingPipeline::new(
            Collaborators {
                source: self.store.clone(),
                tracker: self.store.clone(),
                ledger: self.ledger.clone(),
                audit: self.audit.clone(),
                catalog: self.directory.clone(),
                branches: self.directory.clone(),
                promotions: self.directory.clone(),
            },
            Arc::new(config),
        )
    }
}
