//! Deterministic classification of fetch and dispatch failures.
//!
//! Classification only picks the user-facing wording. Callers log the full
//! underlying error regardless of the class returned here.

use std::sync::LazyLock;

use regex::Regex;

/// User-facing failure category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    /// The remote host refused the request (HTTP 403).
    Forbidden,
    /// The referenced script does not exist (HTTP 404).
    NotFound,
    /// Connecting or reading timed out.
    Timeout,
    /// Anything else, carrying the original message verbatim.
    Unknown(String),
}

static FORBIDDEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b403\b").expect("valid forbidden pattern"));
static NOT_FOUND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b404\b").expect("valid not-found pattern"));
static TIMEOUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\btimed?\s*out\b").expect("valid timeout pattern"));

/// Classify a raw error message.
///
/// Checked in order: 403, 404, timeout. The first match wins.
pub fn classify(raw: &str) -> ErrorClass {
    if FORBIDDEN_RE.is_match(raw) {
        ErrorClass::Forbidden
    } else if NOT_FOUND_RE.is_match(raw) {
        ErrorClass::NotFound
    } else if TIMEOUT_RE.is_match(raw) {
        ErrorClass::Timeout
    } else {
        ErrorClass::Unknown(raw.to_string())
    }
}

impl ErrorClass {
    /// Message catalog key describing this class, or `None` for [`ErrorClass::Unknown`].
    pub fn message_key(&self) -> Option<&'static str> {
        match self {
            ErrorClass::Forbidden => Some("error-forbidden"),
            ErrorClass::NotFound => Some("error-not-found"),
            ErrorClass::Timeout => Some("error-timeout"),
            ErrorClass::Unknown(_) => None,
        }
    }
}
