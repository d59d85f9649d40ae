//! Postgres row types and repositories for gridkeep's relational entities.
//!
//! One module per entity family, mirroring the table layout in
//! `migrations/0001_init.sql`. Each repository takes a `&PgPool` borrow
//! rather than owning one, so callers can construct them cheaply per request.

mod audit_record;
mod command_result;
mod console_archive;
mod enrollment_token;
mod leaf_certificate;
mod node;

pub use audit_record::{AuditOutcome, AuditRecord, AuditRepository};
pub use command_result::{CommandResultRecord, CommandResultRepository, CommandStatus};
pub use console_archive::{ConsoleArchiveLine, ConsoleArchiveRepository};
pub use enrollment_token::{EnrollmentTokenRecord, EnrollmentTokenRepository};
pub use leaf_certificate::{LeafCertificateRecord, LeafCertificateRepository};
pub use node::{normalize_tags, HealthTrend, NodeRecord, NodeRepository, NodeStatus, Platform};
