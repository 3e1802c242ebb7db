use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use eshop_core::{CategoryId, OrderId, ProductId, UserId};
use eshop_orders::{
    Order, OrderDetails, OrderItem, OrderItemDetails, PlaceOrder, PlaceOrderError, PlacedOrder,
    PlacementPolicy, PlacementState,
};
use eshop_products::{Category, Product, Stock};

use super::r#trait::{OrderStore, ProductCatalog, StoreError};

#[derive(Debug, Default)]
struct State {
    users: HashSet<UserId>,
    products: BTreeMap<ProductId, Product>,
    categories: BTreeMap<CategoryId, Category>,
    orders: Vec<Order>,
    items: Vec<OrderItem>,
    last_order_id: i64,
}

/// In-memory order store.
///
/// Intended for tests/dev. A placement holds the write lock for its whole
/// run and stages stock changes aside, so a failed attempt leaves nothing
/// behind and concurrent attempts are serialized.
///
/// Differences from [`super::PostgresOrderStore`]:
/// - users are only known once registered. While none are, any `user_id` is
///   accepted; after the first [`register_user`](Self::register_user) an
///   unknown user fails as `StorageFailure`, like the foreign key on
///   `orders.user_id` does.
/// - `policy.transaction_timeout` is not applied. Placement never waits on
///   anything but the lock, and the lock is never held across an await.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    state: RwLock<State>,
    policy: PlacementPolicy,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: PlacementPolicy) -> Self {
        Self {
            state: RwLock::default(),
            policy,
        }
    }

    /// Add or replace a catalog product.
    pub fn upsert_product(&self, product: Product) -> Result<(), StoreError> {
        self.write()?.products.insert(product.id, product);
        Ok(())
    }

    pub fn upsert_category(&self, category: Category) -> Result<(), StoreError> {
        self.write()?.categories.insert(category.id, category);
        Ok(())
    }

    pub fn register_user(&self, user_id: UserId) -> Result<(), StoreError> {
        self.write()?.users.insert(user_id);
        Ok(())
    }

    pub fn stock_of(&self, product_id: ProductId) -> Option<Stock> {
        let state = self.state.read().ok()?;
        state.products.get(&product_id).map(|p| p.stock)
    }

    pub fn order_count(&self) -> usize {
        self.state.read().map(|s| s.orders.len()).unwrap_or(0)
    }

    pub fn item_count(&self) -> usize {
        self.state.read().map(|s| s.items.len()).unwrap_or(0)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Corrupt("in-memory store lock poisoned".to_string()))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Corrupt("in-memory store lock poisoned".to_string()))
    }

    fn place_sync(&self, cmd: &PlaceOrder) -> Result<PlacedOrder, PlaceOrderError> {
        let mut state = self.write()?;

        let user_known = state.users.contains(&cmd.user_id());
        if self.policy.verify_user_exists && !user_known {
            return Err(PlaceOrderError::invalid(format!(
                "unknown user ID: {}",
                cmd.user_id()
            )));
        }
        if !state.users.is_empty() && !user_known {
            return Err(PlaceOrderError::storage(format!(
                "insert_order: user {} does not exist",
                cmd.user_id()
            )));
        }

        // Staged stock levels; only written back on commit.
        let mut staged: HashMap<ProductId, Stock> = HashMap::new();
        let mut lines = Vec::with_capacity(cmd.lines().len());
        let mut progress = PlacementState::Started;

        for (index, line) in cmd.lines().iter().enumerate() {
            progress = progress.validating(index);
            let product_id = line.product_id();

            let current = match staged.get(&product_id) {
                Some(stock) => *stock,
                None => match state.products.get(&product_id) {
                    Some(product) => product.stock,
                    None => {
                        let err = PlaceOrderError::ProductNotFound { product_id };
                        tracing::debug!(index, state = progress.fail(&err).as_str(), "rolled back");
                        return Err(err);
                    }
                },
            };

            let Some(rest) = current.take(line.quantity()) else {
                let err = PlaceOrderError::InsufficientStock {
                    product_id,
                    requested: line.quantity(),
                    available: current.units(),
                };
                tracing::debug!(index, state = progress.fail(&err).as_str(), "rolled back");
                return Err(err);
            };

            staged.insert(product_id, rest);
            lines.push((product_id, line.quantity()));
        }

        // Commit.
        state.last_order_id += 1;
        let order_id = OrderId::from_db(state.last_order_id);
        let items: Vec<OrderItem> = lines
            .into_iter()
            .map(|(product_id, quantity)| OrderItem {
                order_id,
                product_id,
                quantity,
            })
            .collect();

        for (product_id, stock) in staged {
            if let Some(product) = state.products.get_mut(&product_id) {
                product.stock = stock;
            }
        }
        state.orders.push(Order {
            id: order_id,
            user_id: cmd.user_id(),
            status: cmd.status(),
            created_at: Utc::now(),
        });
        state.items.extend(items.iter().cloned());

        tracing::debug!(state = progress.commit(order_id).as_str(), %order_id, "committed");
        Ok(PlacedOrder {
            order_id,
            user_id: cmd.user_id(),
            status: cmd.status(),
            items,
        })
    }
}

#[cfg(test)]
impl InMemoryOrderStore {
    /// Panic while holding the write lock.
    pub(crate) fn poison_lock(&self) {
        let _guard = self.state.write();
        panic!("poisoning the in-memory store lock");
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn place_order(&self, cmd: &PlaceOrder) -> Result<PlacedOrder, PlaceOrderError> {
        self.place_sync(cmd)
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<OrderDetails>, StoreError> {
        let state = self.read()?;

        let mut orders: Vec<OrderDetails> = state
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .map(|order| OrderDetails {
                order: order.clone(),
                items: state
                    .items
                    .iter()
                    .filter(|i| i.order_id == order.id)
                    .filter_map(|i| {
                        let product = state.products.get(&i.product_id)?;
                        Some(OrderItemDetails {
                            product_id: i.product_id,
                            quantity: i.quantity,
                            name: product.name.clone(),
                            price_kc: product.price_kc,
                            price_eur: product.price_eur,
                        })
                    })
                    .collect(),
            })
            .collect();

        orders.sort_by(|a, b| b.order.id.cmp(&a.order.id));
        Ok(orders)
    }
}

#[async_trait]
impl ProductCatalog for InMemoryOrderStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let state = self.read()?;
        Ok(state.products.get(&id).cloned())
    }

    async fn list_products(&self, category_id: Option<CategoryId>) -> Result<Vec<Product>, StoreError> {
        let state = self.read()?;
        Ok(state
            .products
            .values()
            .filter(|p| category_id.is_none_or(|c| p.in_category(c)))
            .cloned()
            .collect())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let state = self.read()?;
        Ok(state.categories.values().cloned().collect())
    }
}
