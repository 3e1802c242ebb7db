//! Product catalog domain module.
//!
//! Order placement only consumes the catalog: it looks products up by id and
//! decrements their stock. Creating products and categories and uploading
//! images happen elsewhere.

pub mod category;
pub mod product;

pub use category::Category;
pub use product::{Product, Stock};
