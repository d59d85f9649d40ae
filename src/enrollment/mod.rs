pub mod coordinator;
pub mod token;

pub use coordinator::{EnrollmentCoordinator, EnrollmentResult};
