//! Command handler modules for slx-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod ingest;
pub mod post;

use anyhow::{Context, Result};
use slx_config::secrets::{resolve_secrets_for_mode, ResolvedSecrets};
use slx_config::{
    report_unused_keys, ConfigMode, LoadedConfig, UnusedKeyPolicy,
};
use slx_db::PgPool;
use tracing::warn;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Load layered config for `mode`, warn on keys the mode never reads, and
/// resolve the env-backed secrets it needs.
pub fn load_for_mode(paths: &[String], mode: ConfigMode) -> Result<(LoadedConfig, ResolvedSecrets)> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = slx_config::load_layered_yaml(&path_refs)?;

    let report = report_unused_keys(mode, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    for pointer in &report.unused_leaf_pointers {
        warn!(mode = mode.as_str(), pointer = %pointer, "config key not read in this mode");
    }

    let secrets = resolve_secrets_for_mode(&loaded.config_json, mode)?;
    Ok((loaded, secrets))
}

pub async fn connect_db(secrets: &ResolvedSecrets) -> Result<PgPool> {
    let url = secrets
        .database_url
        .as_deref()
        .context("database url not resolved")?;
    slx_db::connect(url).await
}

/// Connect using the default database env var, for commands that take no config.
pub async fn connect_db_from_env() -> Result<PgPool> {
    let var = slx_config::secrets::DEFAULT_DATABASE_URL_ENV;
    let url = std::env::var(var).with_context(|| format!("{var} is not set"))?;
    slx_db::connect(&url).await
}
