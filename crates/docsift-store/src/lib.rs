//! DocSift Store — persistence for pipeline results.
//!
//! The pipeline itself is stateless; callers hand finished results to a
//! [`ResultRepository`].

pub mod memory;
pub mod repository;
pub mod schema;
pub mod sqlite;

pub use memory::InMemoryResultStore;
pub use repository::{ResultRepository, StoredResult};
pub use sqlite::SqliteResultStore;
