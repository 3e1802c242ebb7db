//! Order placement: the validated command, its outcome and its failure taxonomy.
//!
//! A placement attempt moves through [`PlacementState`]:
//! `Started → Validating(0..n) → Failed(reason) | Committed(order_id)`.
//! Validation of the request shape happens in [`PlaceOrder::new`], before any
//! store (and therefore any transaction) is touched.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use eshop_core::{DomainError, OrderId, ProductId, UserId};

use crate::order::{OrderItem, OrderStatus};

/// Why a placement attempt did not commit.
///
/// Every variant except `InvalidRequest` is produced after a transaction was
/// opened, and always implies that the transaction was rolled back.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaceOrderError {
    /// Caller error. No transaction was opened.
    #[error("{0}")]
    InvalidRequest(String),

    /// A referenced product does not exist.
    #[error("Product not found: {product_id}")]
    ProductNotFound { product_id: ProductId },

    /// The requested quantity exceeds what is left for this product.
    #[error("Not enough stock for product ID: {product_id} (requested {requested}, available {available})")]
    InsufficientStock {
        product_id: ProductId,
        requested: i32,
        available: i32,
    },

    /// Connection, pool, timeout or unclassified database failure.
    #[error("{0}")]
    StorageFailure(String),
}

impl PlaceOrderError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageFailure(msg.into())
    }

    /// Stable machine-readable reason, used in logs and placement state.
    pub fn kind(&self) -> &'static str {
        match self {
            PlaceOrderError::InvalidRequest(_) => "invalid_request",
            PlaceOrderError::ProductNotFound { .. } => "product_not_found",
            PlaceOrderError::InsufficientStock { .. } => "insufficient_stock",
            PlaceOrderError::StorageFailure(_) => "storage_failure",
        }
    }

    /// Business-rule or caller rejections, as opposed to infrastructure failures.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, PlaceOrderError::StorageFailure(_))
    }

    /// The product a stock-related rejection refers to.
    pub fn product_id(&self) -> Option<ProductId> {
        match self {
            PlaceOrderError::ProductNotFound { product_id }
            | PlaceOrderError::InsufficientStock { product_id, .. } => Some(*product_id),
            _ => None,
        }
    }
}

impl From<DomainError> for PlaceOrderError {
    fn from(value: DomainError) -> Self {
        Self::InvalidRequest(value.detail().to_string())
    }
}

/// One requested line: a product and a positive quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    product_id: ProductId,
    quantity: i32,
}

impl OrderLine {
    pub fn new(product_id: ProductId, quantity: i32) -> Result<Self, PlaceOrderError> {
        if quantity <= 0 {
            return Err(PlaceOrderError::invalid(format!(
                "quantity for product ID {product_id} must be a positive integer (got {quantity})"
            )));
        }
        Ok(Self { product_id, quantity })
    }

    /// Build a line from unchecked wire values.
    pub fn from_raw(product_id: i64, quantity: i64) -> Result<Self, PlaceOrderError> {
        let product_id = ProductId::new(product_id)?;
        let quantity = i32::try_from(quantity).map_err(|_| {
            PlaceOrderError::invalid(format!(
                "quantity for product ID {product_id} is out of range (got {quantity})"
            ))
        })?;
        Self::new(product_id, quantity)
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> i32 {
        self.quantity
    }
}

/// A validated request to place an order.
///
/// Holding one of these means the request shape is fine: a user is named,
/// there is at least one line, every quantity is positive. Lines keep the
/// caller's order; stores must process them in that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrder {
    user_id: UserId,
    lines: Vec<OrderLine>,
    status: OrderStatus,
}

impl PlaceOrder {
    pub fn new(
        user_id: UserId,
        lines: Vec<OrderLine>,
        status: Option<OrderStatus>,
    ) -> Result<Self, PlaceOrderError> {
        if lines.is_empty() {
            return Err(PlaceOrderError::invalid("Order must include user_id and items."));
        }
        Ok(Self {
            user_id,
            lines,
            status: status.unwrap_or_default(),
        })
    }

    /// Validate a request as it arrives on the wire, where every field may be missing.
    pub fn from_parts(
        user_id: Option<i64>,
        items: Option<Vec<(i64, i64)>>,
        status: Option<&str>,
    ) -> Result<Self, PlaceOrderError> {
        let (Some(user_id), Some(items)) = (user_id, items) else {
            return Err(PlaceOrderError::invalid("Order must include user_id and items."));
        };
        if items.is_empty() {
            return Err(PlaceOrderError::invalid("Order must include user_id and items."));
        }

        let user_id = UserId::new(user_id)?;
        let lines = items
            .into_iter()
            .map(|(product_id, quantity)| OrderLine::from_raw(product_id, quantity))
            .collect::<Result<Vec<_>, _>>()?;
        let status = status.map(str::parse::<OrderStatus>).transpose()?;

        Self::new(user_id, lines, status)
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| i64::from(l.quantity)).sum()
    }
}

/// Outcome of a committed placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
}

/// Knobs a store applies to every placement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementPolicy {
    /// Reject orders for users that do not exist. Off by default: identity is
    /// established by the HTTP/auth layer in front of this service.
    pub verify_user_exists: bool,
    /// Upper bound on one placement transaction, connection checkout excluded.
    pub transaction_timeout: Duration,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self {
            verify_user_exists: false,
            transaction_timeout: Duration::from_secs(5),
        }
    }
}

/// Progress of a single placement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementState {
    Started,
    Validating { index: usize },
    Failed { reason: &'static str },
    Committed { order_id: OrderId },
}

impl PlacementState {
    /// Move on to the item at `index`. Terminal states do not move.
    pub fn validating(self, index: usize) -> Self {
        if self.is_terminal() {
            return self;
        }
        PlacementState::Validating { index }
    }

    pub fn fail(self, err: &PlaceOrderError) -> Self {
        if self.is_terminal() {
            return self;
        }
        PlacementState::Failed { reason: err.kind() }
    }

    pub fn commit(self, order_id: OrderId) -> Self {
        if self.is_terminal() {
            return self;
        }
        PlacementState::Committed { order_id }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlacementState::Failed { .. } | PlacementState::Committed { .. }
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlacementState::Started => "started",
            PlacementState::Validating { .. } => "validating",
            PlacementState::Failed { .. } => "failed",
            PlacementState::Committed { .. } => "committed",
        }
    }
}
