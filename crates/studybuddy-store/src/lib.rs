//! studybuddy-store — Storage backends for the Study Buddy service.
//!
//! [`SqliteStore`] persists every store trait from `studybuddy-core` in a
//! SQLite database; [`MemoryStore`] keeps the same data in process memory.
//! Course reference data is loaded from a TOML catalog.

pub mod audit;
pub mod catalog;
pub mod memory;
pub mod sqlite;

pub use audit::TracingAuditSink;
pub use catalog::{load_course_catalog, parse_catalog_str, validate_catalog, CatalogWarning};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
