//! Tenant, correlation, and cancellation context.
//!
//! Dependency-injected singletons in the source map to explicit values
//! threaded through call sites instead (§9). Every public operation in this
//! crate takes a `&RequestContext` rather than reaching for ambient state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identifies the tenant and operator behind a request, as consumed from a
/// validated operator credential (never from client-supplied headers) or
/// from a node's mTLS leaf certificate subject.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub operator_id: Option<Uuid>,
    pub node_id: Option<Uuid>,
}

impl TenantContext {
    pub fn for_operator(tenant_id: Uuid, operator_id: Uuid) -> Self {
        Self {
            tenant_id,
            operator_id: Some(operator_id),
            node_id: None,
        }
    }

    pub fn for_node(tenant_id: Uuid, node_id: Uuid) -> Self {
        Self {
            tenant_id,
            operator_id: None,
            node_id: Some(node_id),
        }
    }

    /// Returns whether this context's tenant matches the given tenant.
    /// Mismatches must always be handled as `TenantMismatch`, never a silent
    /// empty result (§3 Ownership).
    pub fn owns_tenant(&self, tenant_id: Uuid) -> bool {
        self.tenant_id == tenant_id
    }
}

/// Carries a correlation id through logs, spans, and bus messages.
#[derive(Debug, Clone)]
pub struct CorrelationContext {
    pub correlation_id: Uuid,
}

impl CorrelationContext {
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
        }
    }

    pub fn from_id(correlation_id: Uuid) -> Self {
        Self { correlation_id }
    }
}

impl Default for CorrelationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A cancellation handle threaded into every public operation (§5
/// Suspension points). Handlers that observe cancellation mid-execution
/// return `Cancelled` rather than unwinding via a panic or exception.
#[derive(Debug, Clone)]
pub struct Cancellation(CancellationToken);

impl Cancellation {
    pub fn new() -> Self {
        Self(CancellationToken::new())
    }

    pub fn token(&self) -> &CancellationToken {
        &self.0
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn child(&self) -> Self {
        Self(self.0.child_token())
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// The full request context bundle: tenant identity, correlation id, and a
/// cancellation handle. Cheap to clone (`Arc`-backed token, `Copy` uuids).
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant: TenantContext,
    pub correlation: CorrelationContext,
    pub cancellation: Cancellation,
}

impl RequestContext {
    pub fn new(tenant: TenantContext) -> Self {
        Self {
            tenant,
            correlation: CorrelationContext::new(),
            cancellation: Cancellation::new(),
        }
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation = CorrelationContext::from_id(correlation_id);
        self
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation.correlation_id
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant.tenant_id
    }
}

/// Shared process-wide identity: this control-plane instance's own id, used
/// for lock-holder fencing tokens and log provenance.
#[derive(Debug, Clone)]
pub struct InstanceId(pub Arc<str>);

impl InstanceId {
    pub fn generate() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_context_detects_mismatch() {
        let ctx = TenantContext::for_operator(Uuid::new_v4(), Uuid::new_v4());
        assert!(!ctx.owns_tenant(Uuid::new_v4()));
        assert!(ctx.owns_tenant(ctx.tenant_id));
    }

    #[test]
    fn cancellation_child_propagates() {
        let parent = Cancellation::new();
        let child = parent.child();
        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
    }
}
