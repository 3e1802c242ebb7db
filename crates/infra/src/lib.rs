//! Infrastructure layer: database pool, schema and order/catalog stores.

pub mod db;
pub mod order_store;
