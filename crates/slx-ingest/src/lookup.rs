//! Collaborator lookups (catalog, branch, promotion) and bulk pre-fetch.
//!
//! Lookups are resolved once per distinct code before per-line work starts.
//! Branch and catalog lookups are best-effort: a failure or timeout leaves
//! the entry empty and is logged, never aborting the batch.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use anyhow::Result;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use slx_schemas::{BranchInfo, ProductInfo, PromotionInfo};
use tracing::warn;

#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    async fn get_material(&self, code: &str) -> Result<Option<ProductInfo>>;
}

#[async_trait::async_trait]
pub trait BranchDirectory: Send + Sync {
    async fn get_branch(&self, code: &str) -> Result<Option<BranchInfo>>;
}

#[async_trait::async_trait]
pub trait PromotionDirectory: Send + Sync {
    /// `Ok(None)` means the code is not known.
    async fn get_promotion(&self, code: &str) -> Result<Option<PromotionInfo>>;
}

/// Distinct codes seen in a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinctCodes {
    pub materials: BTreeSet<String>,
    pub branches: BTreeSet<String>,
}

impl DistinctCodes {
    pub fn merge(&mut self, other: &DistinctCodes) {
        self.materials.extend(other.materials.iter().cloned());
        self.branches.extend(other.branches.iter().cloned());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchSettings {
    pub concurrency: usize,
    pub timeout: Duration,
}

impl Default for PrefetchSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            timeout: Duration::from_secs(3),
        }
    }
}

/// Per-batch lookup cache. Built fresh for each run, never shared.
#[derive(Debug, Clone, Default)]
pub struct LookupCache {
    pub products: BTreeMap<String, ProductInfo>,
    /// Every requested branch has an entry; unresolved ones are empty.
    pub branches: BTreeMap<String, BranchInfo>,
}

impl LookupCache {
    pub fn product(&self, code: &str) -> Option<&ProductInfo> {
        self.products.get(code)
    }

    pub fn branch(&self, code: &str) -> Option<&BranchInfo> {
        self.branches.get(code)
    }
}

async fn bounded<F, T>(what: &'static str, code: &str, timeout: Duration, fut: F) -> Option<T>
where
    F: std::future::Future<Output = Result<Option<T>>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(found)) => found,
        Ok(Err(err)) => {
            warn!(lookup = what, code, error = %err, "lookup failed; using empty result");
            None
        }
        Err(_) => {
            warn!(lookup = what, code, timeout_ms = timeout.as_millis() as u64, "lookup timed out; using empty result");
            None
        }
    }
}

/// Resolve every distinct material and branch once, at most
/// `settings.concurrency` calls in flight.
pub async fn prefetch_lookups(
    catalog: &dyn Catalog,
    branches: &dyn BranchDirectory,
    codes: &DistinctCodes,
    settings: PrefetchSettings,
) -> LookupCache {
    let concurrency = settings.concurrency.max(1);

    let products: BTreeMap<String, ProductInfo> = stream::iter(codes.materials.iter())
        .map(|code| async move {
            let found = bounded("material", code, settings.timeout, catalog.get_material(code)).await;
            (code.clone(), found)
        })
        .buffer_unordered(concurrency)
        .filter_map(|(code, found)| async move { found.map(|p| (code, p)) })
        .collect()
        .await;

    let branch_map: BTreeMap<String, BranchInfo> = stream::iter(codes.branches.iter())
        .map(|code| async move {
            let found = bounded("branch", code, settings.timeout, branches.get_branch(code)).await;
            (code.clone(), found.unwrap_or_default())
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    LookupCache {
        products,
        branches: branch_map,
    }
}
