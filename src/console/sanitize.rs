//! Inbound operator-command sanitization (§4.H).
//!
//! Rust's `regex` crate is already immune to catastrophic backtracking (it
//! compiles to a finite automaton rather than backtracking), but the
//! bounded-match-timeout requirement is carried anyway so a pathological
//! pattern added to the blocklist at runtime can't wedge a dispatch task.

use std::sync::Arc;
use std::time::Duration;

use regex::RegexSet;

use crate::types::{ErrorCode, GridkeepError, Result};

pub struct CommandSanitizer {
    max_len: usize,
    blocked_patterns: Arc<RegexSet>,
    match_timeout: Duration,
}

impl CommandSanitizer {
    pub fn new(max_len: usize, patterns: &[String], match_timeout: Duration) -> Result<Self> {
        let blocked_patterns = RegexSet::new(patterns)
            .map_err(|e| GridkeepError::Config(format!("invalid dangerous-command pattern: {e}")))?;
        Ok(Self {
            max_len,
            blocked_patterns: Arc::new(blocked_patterns),
            match_timeout,
        })
    }

    /// Checks a raw operator command against the length cap and blocklist.
    /// Matching runs on a blocking thread so a pattern that somehow runs
    /// long doesn't stall the async runtime past `match_timeout`.
    pub async fn check(&self, raw_command: &str) -> Result<()> {
        if raw_command.len() > self.max_len {
            return Err(GridkeepError::typed(
                ErrorCode::BlockedPattern,
                format!("command is {} bytes, max is {}", raw_command.len(), self.max_len),
            ));
        }

        let patterns = self.blocked_patterns.clone();
        let command = raw_command.to_string();
        let matched = tokio::time::timeout(
            self.match_timeout,
            tokio::task::spawn_blocking(move || patterns.is_match(&command)),
        )
        .await
        .map_err(|_| GridkeepError::typed(ErrorCode::BlockedPattern, "pattern match timed out".to_string()))?
        .map_err(|e| GridkeepError::Internal(format!("sanitizer task panicked: {e}")))?;

        if matched {
            return Err(GridkeepError::typed(
                ErrorCode::BlockedPattern,
                "command matches a blocked dangerous pattern".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitizer() -> CommandSanitizer {
        CommandSanitizer::new(
            64,
            &["rm\\s+-rf\\s+/".to_string(), "(?i)shutdown\\s+-h".to_string()],
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn allows_ordinary_command() {
        assert!(sanitizer().check("say hello world").await.is_ok());
    }

    #[tokio::test]
    async fn blocks_dangerous_pattern() {
        assert!(sanitizer().check("rm -rf /").await.is_err());
    }

    #[tokio::test]
    async fn blocks_dangerous_pattern_case_insensitively() {
        assert!(sanitizer().check("SHUTDOWN -h now").await.is_err());
    }

    #[tokio::test]
    async fn rejects_overlong_command() {
        let long = "x".repeat(100);
        assert!(sanitizer().check(&long).await.is_err());
    }
}
