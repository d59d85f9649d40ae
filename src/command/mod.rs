pub mod dispatcher;
pub mod envelope;
pub mod rate_limit;
pub mod registry;

pub use dispatcher::{CommandDispatcher, DispatchOutcome};
pub use envelope::{CommandEnvelope, ValidatedCommand};
pub use rate_limit::RateLimiter;
pub use registry::{HandlerContext, HandlerRegistry};
