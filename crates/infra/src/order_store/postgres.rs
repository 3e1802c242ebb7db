//! Postgres-backed order store.
//!
//! ## Placement transaction
//!
//! One placement = one pooled connection = one transaction:
//!
//! 1. `BEGIN`, bound the transaction with a local `statement_timeout`
//! 2. optionally check the user exists
//! 3. `INSERT INTO orders ... RETURNING id`
//! 4. per line, in caller order:
//!    `UPDATE products SET stock = stock - q WHERE id = p AND stock >= q RETURNING stock`.
//!    The update takes the row lock, so two concurrent orders cannot both see
//!    enough stock. No row back means either no such product or too little
//!    stock; a follow-up read inside the same transaction tells which.
//!    Then `INSERT INTO order_items`.
//! 5. `COMMIT`, or `ROLLBACK` on the first failure.
//!
//! The whole of steps 1-5 runs under `tokio::time::timeout`. On expiry the
//! transaction is dropped, which makes sqlx roll it back before the
//! connection goes back to the pool.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError | Scenario |
//! |------------|------------|----------|
//! | Database | `Database` (with SQLSTATE) | constraint violation, FK to missing user, ... |
//! | PoolTimedOut | `PoolExhausted` | every connection checked out for `acquire_timeout` |
//! | PoolClosed | `PoolClosed` | shutdown in progress |
//! | Other | `Database` | network errors, protocol errors |
//!
//! Inside placement every `StoreError` surfaces as `PlaceOrderError::StorageFailure`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::{Span, field, instrument};

use eshop_core::{CategoryId, OrderId, ProductId, UserId};
use eshop_orders::{
    Order, OrderDetails, OrderItem, OrderItemDetails, OrderStatus, PlaceOrder, PlaceOrderError,
    PlacedOrder, PlacementPolicy, PlacementState,
};
use eshop_products::{Category, Product, Stock};

use super::r#trait::{OrderStore, ProductCatalog, StoreError};

/// Postgres order store over the shared connection pool.
#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
    policy: PlacementPolicy,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_policy(pool, PlacementPolicy::default())
    }

    pub fn with_policy(pool: PgPool, policy: PlacementPolicy) -> Self {
        Self { pool, policy }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[instrument(
        skip(self, cmd),
        fields(
            user_id = %cmd.user_id(),
            lines = cmd.lines().len(),
            units = cmd.total_quantity(),
            order_id = field::Empty,
            state = field::Empty,
        )
    )]
    async fn place_order(&self, cmd: &PlaceOrder) -> Result<PlacedOrder, PlaceOrderError> {
        let span = Span::current();
        let deadline = self.policy.transaction_timeout;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let outcome =
            tokio::time::timeout(deadline, place_in_transaction(&mut tx, cmd, self.policy)).await;

        let result: Result<PlacedOrder, PlaceOrderError> = match outcome {
            Ok(Ok(placed)) => match tx.commit().await {
                Ok(()) => Ok(placed),
                Err(e) => Err(map_sqlx_error("commit_transaction", e).into()),
            },
            Ok(Err(err)) => {
                rollback(tx).await;
                Err(err)
            }
            Err(_elapsed) => {
                // A statement may still be in flight; dropping the transaction
                // lets sqlx roll back and reset the connection itself.
                drop(tx);
                Err(StoreError::Timeout(deadline).into())
            }
        };

        match &result {
            Ok(placed) => {
                span.record("order_id", placed.order_id.get());
                span.record("state", "committed");
                tracing::info!(items = placed.items.len(), "order committed");
            }
            Err(err) if err.is_rejection() => {
                span.record("state", "failed");
                tracing::info!(reason = err.kind(), error = %err, "order rejected");
            }
            Err(err) => {
                span.record("state", "failed");
                tracing::error!(reason = err.kind(), error = %err, "order placement failed");
            }
        }

        result
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<OrderDetails>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, status, created_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_orders", e))?;

        let orders = rows
            .iter()
            .map(order_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        if orders.is_empty() {
            return Ok(vec![]);
        }

        let order_ids: Vec<i64> = orders.iter().map(|o| o.id.get()).collect();
        let item_rows = sqlx::query(
            r#"
            SELECT oi.order_id, oi.product_id, oi.quantity, p.name, p.price_kc, p.price_eur
            FROM order_items oi
            JOIN products p ON oi.product_id = p.id
            WHERE oi.order_id = ANY($1)
            ORDER BY oi.id ASC
            "#,
        )
        .bind(&order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_order_items", e))?;

        let mut items_by_order: HashMap<i64, Vec<OrderItemDetails>> = HashMap::new();
        for row in &item_rows {
            let order_id: i64 = get(row, "order_id")?;
            items_by_order.entry(order_id).or_default().push(OrderItemDetails {
                product_id: ProductId::from_db(get(row, "product_id")?),
                quantity: get(row, "quantity")?,
                name: get(row, "name")?,
                price_kc: get(row, "price_kc")?,
                price_eur: get(row, "price_eur")?,
            });
        }

        Ok(orders
            .into_iter()
            .map(|order| OrderDetails {
                items: items_by_order.remove(&order.id.get()).unwrap_or_default(),
                order,
            })
            .collect())
    }
}

#[async_trait]
impl ProductCatalog for PostgresOrderStore {
    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, price_kc, price_eur, category_id, stock, image_url
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_product", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_products(&self, category_id: Option<CategoryId>) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, price_kc, price_eur, category_id, stock, image_url
            FROM products
            WHERE $1::BIGINT IS NULL OR category_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(category_id.map(|c| c.get()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows = sqlx::query("SELECT id, name FROM categories ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_categories", e))?;

        rows.iter()
            .map(|row| -> Result<Category, StoreError> {
                Ok(Category {
                    id: CategoryId::from_db(get(row, "id")?),
                    name: get(row, "name")?,
                })
            })
            .collect()
    }
}

/// Steps 1-4 of the placement; the caller owns commit/rollback.
async fn place_in_transaction(
    tx: &mut Transaction<'static, Postgres>,
    cmd: &PlaceOrder,
    policy: PlacementPolicy,
) -> Result<PlacedOrder, PlaceOrderError> {
    let conn: &mut PgConnection = tx;
    let mut progress = PlacementState::Started;

    // Server-side bound as well, so a stuck statement does not outlive us.
    sqlx::query("SELECT set_config('statement_timeout', $1, true)")
        .bind(policy.transaction_timeout.as_millis().to_string())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("set_statement_timeout", e))?;

    if policy.verify_user_exists {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(cmd.user_id().get())
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("check_user", e))?;
        if !exists {
            return Err(PlaceOrderError::invalid(format!(
                "unknown user ID: {}",
                cmd.user_id()
            )));
        }
    }

    let order_id: i64 = sqlx::query_scalar(
        "INSERT INTO orders (user_id, status) VALUES ($1, $2) RETURNING id",
    )
    .bind(cmd.user_id().get())
    .bind(cmd.status().as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_order", e))?;
    let order_id = OrderId::from_db(order_id);

    let mut items = Vec::with_capacity(cmd.lines().len());
    for (index, line) in cmd.lines().iter().enumerate() {
        progress = progress.validating(index);
        let product_id = line.product_id();
        let quantity = line.quantity();

        let remaining: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = stock - $1
            WHERE id = $2 AND stock >= $1
            RETURNING stock
            "#,
        )
        .bind(quantity)
        .bind(product_id.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("decrement_stock", e))?;

        if remaining.is_none() {
            let available: Option<i32> =
                sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
                    .bind(product_id.get())
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(|e| map_sqlx_error("read_stock", e))?;

            let err = match available {
                None => PlaceOrderError::ProductNotFound { product_id },
                Some(available) => PlaceOrderError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available,
                },
            };
            tracing::debug!(index, state = progress.fail(&err).as_str(), "line rejected");
            return Err(err);
        }

        sqlx::query("INSERT INTO order_items (order_id, product_id, quantity) VALUES ($1, $2, $3)")
            .bind(order_id.get())
            .bind(product_id.get())
            .bind(quantity)
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("insert_order_item", e))?;

        items.push(OrderItem {
            order_id,
            product_id,
            quantity,
        });
    }

    tracing::debug!(state = progress.commit(order_id).as_str(), "all lines reserved");
    Ok(PlacedOrder {
        order_id,
        user_id: cmd.user_id(),
        status: cmd.status(),
        items,
    })
}

async fn rollback(tx: Transaction<'static, Postgres>) {
    if let Err(e) = tx.rollback().await {
        // The connection is discarded by the pool; the server aborts the
        // transaction when it goes away.
        tracing::warn!(error = %e, "rollback failed");
    }
}

/// Map SQLx errors to StoreError.
pub fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => StoreError::Database {
            operation: operation.to_string(),
            message: db_err.message().to_string(),
            code: db_err.code().map(|c| c.into_owned()),
        },
        sqlx::Error::PoolTimedOut => StoreError::PoolExhausted {
            operation: operation.to_string(),
        },
        sqlx::Error::PoolClosed => StoreError::PoolClosed {
            operation: operation.to_string(),
        },
        other => StoreError::Database {
            operation: operation.to_string(),
            message: other.to_string(),
            code: None,
        },
    }
}

fn get<'r, T>(row: &'r sqlx::postgres::PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("failed to read {column}: {e}")))
}

fn order_from_row(row: &sqlx::postgres::PgRow) -> Result<Order, StoreError> {
    let status: String = get(row, "status")?;
    let status = status
        .parse::<OrderStatus>()
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let created_at: DateTime<Utc> = get(row, "created_at")?;

    Ok(Order {
        id: OrderId::from_db(get(row, "id")?),
        user_id: UserId::from_db(get(row, "user_id")?),
        status,
        created_at,
    })
}

fn product_from_row(row: &sqlx::postgres::PgRow) -> Result<Product, StoreError> {
    let stock: i32 = get(row, "stock")?;
    let stock = Stock::new(stock).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let description: Option<String> = get(row, "description")?;
    let category_id: Option<i64> = get(row, "category_id")?;

    Ok(Product {
        id: ProductId::from_db(get(row, "id")?),
        name: get(row, "name")?,
        description: description.unwrap_or_default(),
        price_kc: get(row, "price_kc")?,
        price_eur: get(row, "price_eur")?,
        category_id: category_id.map(CategoryId::from_db),
        stock,
        image_url: get(row, "image_url")?,
    })
}
