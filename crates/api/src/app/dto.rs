use serde::{Deserialize, Serialize};

use eshop_orders::{PlaceOrder, PlaceOrderError, PlacedOrder};

// -------------------------
// Request DTOs
// -------------------------

/// `POST /orders` body. Every field is optional on the wire so that missing
/// fields surface as a validation message instead of a deserialization error.
#[derive(Debug, Default, Deserialize)]
pub struct PlaceOrderRequest {
    pub user_id: Option<i64>,
    pub items: Option<Vec<OrderItemRequest>>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: i64,
    pub quantity: i64,
}

impl PlaceOrderRequest {
    pub fn into_command(self) -> Result<PlaceOrder, PlaceOrderError> {
        let items = self.items.map(|items| {
            items
                .into_iter()
                .map(|i| (i.product_id, i.quantity))
                .collect::<Vec<_>>()
        });
        PlaceOrder::from_parts(self.user_id, items, self.status.as_deref())
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductsQuery {
    pub category_id: Option<i64>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct OrderCreatedResponse {
    pub message: &'static str,
    #[serde(rename = "orderId")]
    pub order_id: i64,
}

impl From<&PlacedOrder> for OrderCreatedResponse {
    fn from(value: &PlacedOrder) -> Self {
        Self {
            message: "Order created successfully",
            order_id: value.order_id.get(),
        }
    }
}
