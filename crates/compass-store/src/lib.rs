pub mod db;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::Store;
