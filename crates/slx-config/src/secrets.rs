//! Runtime secret resolution.
//!
//! Config YAML stores only env var NAMES under `/secrets`:
//!
//! ```yaml
//! secrets:
//!   database_url_env: SLX_DATABASE_URL
//!   ledger_url_env: SLX_LEDGER_URL
//!   ledger_token_env: SLX_LEDGER_TOKEN
//! ```
//!
//! Callers resolve once at startup and pass [`ResolvedSecrets`] into
//! constructors. `Debug` redacts values; errors name the variable, never
//! its value.
//!
//! | Mode   | Required                     |
//! |--------|------------------------------|
//! | INGEST | database url                 |
//! | POST   | database url, ledger url     |
//!
//! The ledger token is optional in every mode.

use anyhow::{bail, Result};
use serde_json::Value;

use crate::ConfigMode;

pub const DEFAULT_DATABASE_URL_ENV: &str = "SLX_DATABASE_URL";
pub const DEFAULT_LEDGER_URL_ENV: &str = "SLX_LEDGER_URL";
pub const DEFAULT_LEDGER_TOKEN_ENV: &str = "SLX_LEDGER_TOKEN";

#[derive(Clone)]
pub struct ResolvedSecrets {
    pub database_url: Option<String>,
    pub ledger_url: Option<String>,
    pub ledger_token: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "<REDACTED>"),
            )
            .field("ledger_url", &self.ledger_url.as_ref().map(|_| "<REDACTED>"))
            .field(
                "ledger_token",
                &self.ledger_token.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

struct SecretEnvNames {
    database_url_var: String,
    ledger_url_var: String,
    ledger_token_var: String,
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn parse_env_names(config_json: &Value) -> SecretEnvNames {
    SecretEnvNames {
        database_url_var: read_str_at(config_json, "/secrets/database_url_env")
            .unwrap_or_else(|| DEFAULT_DATABASE_URL_ENV.to_string()),
        ledger_url_var: read_str_at(config_json, "/secrets/ledger_url_env")
            .unwrap_or_else(|| DEFAULT_LEDGER_URL_ENV.to_string()),
        ledger_token_var: read_str_at(config_json, "/secrets/ledger_token_env")
            .unwrap_or_else(|| DEFAULT_LEDGER_TOKEN_ENV.to_string()),
    }
}

/// Resolve secrets for `mode`, failing closed on the first missing required
/// variable.
pub fn resolve_secrets_for_mode(config_json: &Value, mode: ConfigMode) -> Result<ResolvedSecrets> {
    let names = parse_env_names(config_json);

    let database_url = resolve_env(&names.database_url_var);
    let ledger_url = resolve_env(&names.ledger_url_var);
    let ledger_token = resolve_env(&names.ledger_token_var);

    if database_url.is_none() {
        bail!(
            "SECRETS_MISSING mode={}: required env var '{}' (database url) is not set or empty",
            mode.as_str(),
            names.database_url_var,
        );
    }
    if mode == ConfigMode::Post && ledger_url.is_none() {
        bail!(
            "SECRETS_MISSING mode=POST: required env var '{}' (ledger url) is not set or empty",
            names.ledger_url_var,
        );
    }

    Ok(ResolvedSecrets {
        database_url,
        ledger_url,
        ledger_token,
    })
}
