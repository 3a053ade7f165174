//! Ledger call outcomes.
//!
//! The ledger answers with either a single object or an array of objects,
//! each carrying a numeric `status` (1 = success) and a `message`. Both
//! shapes collapse to one success/failure decision here.
//!
//! [`DuplicateDetector`] is the only place that inspects message text for
//! "already exists" errors.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

// ---------------------------------------------------------------------------
// Call errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCallError {
    /// The call never produced a ledger answer (connect, timeout, decode).
    Transport(String),
    /// The ledger answered with a failure status.
    Rejected { message: String, response: Value },
}

impl LedgerCallError {
    pub fn message(&self) -> &str {
        match self {
            LedgerCallError::Transport(m) => m,
            LedgerCallError::Rejected { message, .. } => message,
        }
    }

    /// Raw response to audit; transport errors have none.
    pub fn response(&self) -> Value {
        match self {
            LedgerCallError::Transport(_) => Value::Null,
            LedgerCallError::Rejected { response, .. } => response.clone(),
        }
    }
}

impl fmt::Display for LedgerCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerCallError::Transport(m) => write!(f, "ledger transport error: {m}"),
            LedgerCallError::Rejected { message, .. } => write!(f, "ledger rejected call: {message}"),
        }
    }
}

impl std::error::Error for LedgerCallError {}

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure { message: String },
}

fn element_ok(v: &Value) -> bool {
    match v.get("status") {
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        Some(Value::String(s)) => s.trim() == "1",
        _ => false,
    }
}

fn element_message(v: &Value) -> String {
    match v.get("message") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "no message".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Success only if every element reports status 1. An empty array or a
/// non-object body is a failure.
pub fn normalize_response(body: &Value) -> CallOutcome {
    match body {
        Value::Array(items) if items.is_empty() => CallOutcome::Failure {
            message: "empty response".to_string(),
        },
        Value::Array(items) => match items.iter().find(|v| !element_ok(v)) {
            None => CallOutcome::Success,
            Some(bad) => CallOutcome::Failure {
                message: element_message(bad),
            },
        },
        Value::Object(_) if element_ok(body) => CallOutcome::Success,
        Value::Object(_) => CallOutcome::Failure {
            message: element_message(body),
        },
        other => CallOutcome::Failure {
            message: format!("unexpected response shape: {other}"),
        },
    }
}

/// Turn a raw ledger body into the call result the pipeline sees.
pub fn into_call_result(body: Value) -> Result<Value, LedgerCallError> {
    match normalize_response(&body) {
        CallOutcome::Success => Ok(body),
        CallOutcome::Failure { message } => Err(LedgerCallError::Rejected {
            message,
            response: body,
        }),
    }
}

// ---------------------------------------------------------------------------
// Duplicate detection
// ---------------------------------------------------------------------------

pub fn default_duplicate_patterns() -> Vec<String> {
    ["đã tồn tại", "already exist", "duplicate key", "đã được tạo"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Case-insensitive substring match against known "already exists"
/// messages. The list is not assumed complete; it is configurable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateDetector {
    patterns: Vec<String>,
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(default_duplicate_patterns())
    }
}

impl DuplicateDetector {
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            patterns: patterns.into_iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    pub fn is_duplicate_message(&self, message: &str) -> bool {
        let lowered = message.to_lowercase();
        self.patterns
            .iter()
            .any(|p| !p.is_empty() && lowered.contains(p.as_str()))
    }

    /// Transport errors are never duplicates.
    pub fn is_duplicate(&self, err: &LedgerCallError) -> bool {
        match err {
            LedgerCallError::Transport(_) => false,
            LedgerCallError::Rejected { message, .. } => self.is_duplicate_message(message),
        }
    }

    /// Stand-in result for a tolerated duplicate; the real identifier is
    /// not recoverable from the error body.
    pub fn synthesized_success() -> Value {
        json!({
            "status": 1,
            "message": "synthesized: duplicate tolerated",
            "duplicate": true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_and_array_shapes_agree() {
        assert_eq!(
            normalize_response(&json!({"status": 1, "message": "ok"})),
            CallOutcome::Success
        );
        assert_eq!(
            normalize_response(&json!([{"status": 1}, {"status": "1"}])),
            CallOutcome::Success
        );
        assert_eq!(
            normalize_response(&json!([{"status": 1}, {"status": 0, "message": "bad line"}])),
            CallOutcome::Failure {
                message: "bad line".to_string()
            }
        );
        assert_eq!(
            normalize_response(&json!({"status": 0, "message": "nope"})),
            CallOutcome::Failure {
                message: "nope".to_string()
            }
        );
    }

    #[test]
    fn odd_shapes_fail() {
        assert!(matches!(normalize_response(&json!([])), CallOutcome::Failure { .. }));
        assert!(matches!(normalize_response(&json!("ok")), CallOutcome::Failure { .. }));
        assert!(matches!(normalize_response(&json!({"message": "x"})), CallOutcome::Failure { .. }));
    }

    #[test]
    fn rejected_body_is_kept() {
        let err = into_call_result(json!({"status": 2, "message": "Mã hóa đơn đã tồn tại"})).unwrap_err();
        assert_eq!(err.message(), "Mã hóa đơn đã tồn tại");
        assert_eq!(err.response()["status"], 2);
    }

    #[test]
    fn duplicate_patterns_are_case_insensitive() {
        let d = DuplicateDetector::default();
        assert!(d.is_duplicate_message("Invoice ALREADY EXISTS in ledger"));
        assert!(d.is_duplicate_message("Số chứng từ đã tồn tại"));
        assert!(!d.is_duplicate_message("customer code invalid"));
        assert!(!d.is_duplicate(&LedgerCallError::Transport("already exists".to_string())));
    }

    #[test]
    fn synthesized_success_normalizes_as_success() {
        assert_eq!(
            normalize_response(&DuplicateDetector::synthesized_success()),
            CallOutcome::Success
        );
    }
}
