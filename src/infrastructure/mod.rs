// Infrastructure modules
pub mod database;        // Store interface and transaction wrapper
pub mod id_generator;    // Record id generation
pub mod sqlite_database; // SQLite store implementation
pub mod viewer;          // Viewer context

pub use database::{EntityStore, StoreTransaction};
pub use id_generator::IdGenerator;
pub use sqlite_database::SqliteStore;
pub use viewer::ViewerContext;
