//! Order placement and catalog lookup stores.

pub mod in_memory;
pub mod postgres;
mod r#trait;

pub use in_memory::InMemoryOrderStore;
pub use postgres::{PostgresOrderStore, map_sqlx_error};
pub use r#trait::{OrderStore, ProductCatalog, StoreError};
