//! Redis-backed caching: connection wrapper, distributed lock, console
//! session registry, console hot-tier history ring, and command
//! replay-suppression (§4.E, §4.F, §4.G).

pub mod console_history;
pub mod lock;
pub mod redis;
pub mod replay;
pub mod session_registry;

pub use self::redis::RedisCache;
pub use console_history::{ConsoleHistoryStore, ConsoleLine};
pub use lock::DistributedLock;
pub use replay::ReplayCache;
pub use session_registry::SessionRegistry;
