use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use eshop_core::{CategoryId, ProductId, UserId};
use eshop_orders::{OrderDetails, PlaceOrder, PlaceOrderError, PlacedOrder};
use eshop_products::{Category, Product};

/// Infrastructure failure outside of order placement (reads, pool lifecycle).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The database rejected or failed a statement.
    #[error("database error in {operation}: {message}")]
    Database {
        operation: String,
        message: String,
        /// SQLSTATE, when the server reported one.
        code: Option<String>,
    },

    /// No connection became free within the pool's acquire timeout.
    #[error("connection pool exhausted in {operation}")]
    PoolExhausted { operation: String },

    /// The pool was closed (shutdown in progress).
    #[error("connection pool closed in {operation}")]
    PoolClosed { operation: String },

    /// The placement transaction ran past its deadline and was rolled back.
    #[error("order transaction exceeded {0:?} and was rolled back")]
    Timeout(Duration),

    /// A stored row did not satisfy a domain invariant.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<StoreError> for PlaceOrderError {
    fn from(value: StoreError) -> Self {
        PlaceOrderError::StorageFailure(value.to_string())
    }
}

/// Places orders atomically and reads them back.
///
/// Implementations must:
/// - process `PlaceOrder::lines()` sequentially, in the given order
/// - never commit a stock decrement that would leave a product below zero
/// - persist the order, all its items and all decrements, or none of them
/// - release any connection they checked out on every path
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Run one placement attempt in its own transaction.
    async fn place_order(&self, cmd: &PlaceOrder) -> Result<PlacedOrder, PlaceOrderError>;

    /// All orders of a user with their items, newest first.
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<OrderDetails>, StoreError>;
}

/// Read-only product lookup.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Every product, optionally restricted to one category, ordered by id.
    async fn list_products(&self, category_id: Option<CategoryId>) -> Result<Vec<Product>, StoreError>;

    /// Every category, ordered by id.
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError>;
}

#[async_trait]
impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    async fn place_order(&self, cmd: &PlaceOrder) -> Result<PlacedOrder, PlaceOrderError> {
        (**self).place_order(cmd).await
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<OrderDetails>, StoreError> {
        (**self).orders_for_user(user_id).await
    }
}

#[async_trait]
impl<S> ProductCatalog for Arc<S>
where
    S: ProductCatalog + ?Sized,
{
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).get_product(id).await
    }

    async fn list_products(&self, category_id: Option<CategoryId>) -> Result<Vec<Product>, StoreError> {
        (**self).list_products(category_id).await
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        (**self).list_categories().await
    }
}
