use serde::{Deserialize, Serialize};

use eshop_core::{CategoryId, DomainError, ProductId};

/// Units of a product available for purchase.
///
/// Never negative. Decrements go through [`Stock::take`], which refuses to
/// go below zero instead of clamping.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Stock(i32);

impl Stock {
    pub const ZERO: Stock = Stock(0);

    pub fn new(units: i32) -> Result<Self, DomainError> {
        if units < 0 {
            return Err(DomainError::invariant(format!(
                "stock cannot be negative (got {units})"
            )));
        }
        Ok(Self(units))
    }

    pub fn units(self) -> i32 {
        self.0
    }

    pub fn covers(self, quantity: i32) -> bool {
        quantity <= self.0
    }

    /// Remove `quantity` units, or `None` when not enough are left.
    pub fn take(self, quantity: i32) -> Option<Stock> {
        if quantity < 0 || !self.covers(quantity) {
            return None;
        }
        Some(Stock(self.0 - quantity))
    }
}

impl TryFrom<i32> for Stock {
    type Error = DomainError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Stock> for i32 {
    fn from(value: Stock) -> Self {
        value.0
    }
}

impl core::fmt::Display for Stock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Catalog product as seen by the storefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    /// Price in CZK, smallest currency unit.
    pub price_kc: i64,
    /// Price in EUR, smallest currency unit.
    pub price_eur: i64,
    pub category_id: Option<CategoryId>,
    pub stock: Stock,
    pub image_url: Option<String>,
}

impl Product {
    /// Minimal product used by seeds and tests; prices and stock are set by the caller.
    pub fn new(id: ProductId, name: impl Into<String>, price_kc: i64, stock: Stock) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            price_kc,
            price_eur: 0,
            category_id: None,
            stock,
            image_url: None,
        }
    }

    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn in_category(&self, category_id: CategoryId) -> bool {
        self.category_id == Some(category_id)
    }
}
