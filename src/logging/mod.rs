//! Structured logging and span-based correlation context.
//!
//! Initializes `tracing`/`tracing-subscriber` once at startup and provides a
//! redaction helper so secret material (private keys, enrollment-token
//! plaintext, pkcs12 passwords) never reaches a log field even by accident.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

/// Initialize the global tracing subscriber.
///
/// Production uses JSON output for log-aggregator ingestion; dev mode uses a
/// human-readable formatter. Both honor `RUST_LOG`/`LOG_LEVEL`.
pub fn init(log_level: &str, dev_mode: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gridkeep={log_level},info")));

    let registry = tracing_subscriber::registry().with(filter);

    if dev_mode {
        registry.with(fmt::layer().pretty()).init();
    } else {
        registry.with(fmt::layer().json().with_current_span(true)).init();
    }
}

/// Redacts a value before it is placed into a structured log field.
/// Used for fields that might accidentally carry secret material (private
/// key bytes, enrollment-token plaintext, pkcs12 passwords).
pub fn redact(_value: &str) -> &'static str {
    "[redacted]"
}

/// A short, log-friendly correlation id. Full ids are kept in structured
/// fields; this truncated form is for human-readable summaries.
pub fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_is_eight_chars() {
        let id = Uuid::new_v4();
        assert_eq!(short_id(id).len(), 8);
    }
}
