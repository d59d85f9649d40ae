//! Command handler registry (§4.E).
//!
//! A case-insensitive mapping from command-type tag to handler, built once
//! at startup. Registering an empty tag or a duplicate is a startup fault.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::context::Cancellation;
use crate::types::{ErrorCode, GridkeepError, Result};

pub struct HandlerContext {
    pub node_id: Uuid,
    pub tenant_id: Uuid,
    pub correlation_id: Uuid,
    pub cancellation: Cancellation,
}

pub type HandlerOutput = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
pub type Handler = Arc<dyn Fn(HandlerContext, JsonValue) -> HandlerOutput + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under `command_type`, normalized to lowercase.
    /// Panics on an empty tag or a duplicate registration — both are
    /// programmer errors discovered at startup, never at runtime (§4.E).
    pub fn register<F, Fut>(&mut self, command_type: &str, handler: F)
    where
        F: Fn(HandlerContext, JsonValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let tag = command_type.to_ascii_lowercase();
        if tag.is_empty() {
            panic!("cannot register a handler under an empty command type");
        }
        if self.handlers.contains_key(&tag) {
            panic!("duplicate handler registration for command type '{tag}'");
        }
        self.handlers
            .insert(tag, Arc::new(move |ctx, payload| Box::pin(handler(ctx, payload))));
    }

    pub fn get(&self, command_type: &str) -> Option<Handler> {
        self.handlers.get(&command_type.to_ascii_lowercase()).cloned()
    }

    pub fn resolve(&self, command_type: &str) -> Result<Handler> {
        self.get(command_type).ok_or_else(|| {
            GridkeepError::typed(ErrorCode::UnknownCommandType, format!("no handler registered for '{command_type}'"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_case_insensitive() {
        let mut registry = HandlerRegistry::new();
        registry.register("RestartServer", |_ctx, _payload| async { Ok(()) });
        assert!(registry.get("restartserver").is_some());
        assert!(registry.get("RESTARTSERVER").is_some());
    }

    #[test]
    #[should_panic(expected = "empty command type")]
    fn rejects_empty_tag() {
        let mut registry = HandlerRegistry::new();
        registry.register("", |_ctx, _payload| async { Ok(()) });
    }

    #[test]
    #[should_panic(expected = "duplicate handler registration")]
    fn rejects_duplicate_tag() {
        let mut registry = HandlerRegistry::new();
        registry.register("stop", |_ctx, _payload| async { Ok(()) });
        registry.register("Stop", |_ctx, _payload| async { Ok(()) });
    }

    #[test]
    fn resolve_reports_unknown_command_type() {
        let registry = HandlerRegistry::new();
        assert!(registry.resolve("nope").is_err());
    }
}
