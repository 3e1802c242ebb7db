//! `eshop-core`: identifiers and errors shared by the shop domain crates.
//!
//! Nothing in here touches storage or HTTP.

pub mod error;
pub mod id;

pub use error::DomainError;
pub use id::{CategoryId, OrderId, ProductId, UserId};
