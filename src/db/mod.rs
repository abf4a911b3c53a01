pub mod entities;
pub mod enums;
pub mod memory_store;
pub mod models;
pub mod pg_store;
pub mod store;

pub use memory_store::{Fixture, MemoryStore};
pub use pg_store::PgStore;
pub use store::{MonitorStore, StoreError};
