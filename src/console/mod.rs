pub mod hub;
pub mod sanitize;

pub use hub::{ConsoleHub, HubEvent};
pub use sanitize::CommandSanitizer;
