//! Log Redaction Layer
//!
//! Scrubs API keys, bearer tokens and the plugin magic cookie from strings prior to logging.

use regex::Regex;
use std::sync::LazyLock;

static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(sk-[a-zA-Z0-9]{32,})|(Bearer\s+[a-zA-Z0-9\-\._~+/]+=*)").unwrap()
});
static COOKIE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(magic_cookie[a-z_]*\s*[=:]\s*)\S+").unwrap());

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = API_KEY_RE.replace_all(input, "[REDACTED_TOKEN]");
    COOKIE_RE
        .replace_all(&redacted, "${1}[REDACTED]")
        .to_string()
}

/// Mask a known secret value, keeping a short prefix for recognition.
pub fn redact_secret(secret: &str) -> String {
    if secret.len() <= 4 {
        return "****".to_string();
    }
    let prefix: String = secret.chars().take(2).collect();
    format!("{prefix}****")
}
