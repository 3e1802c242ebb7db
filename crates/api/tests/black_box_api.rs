use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use eshop_api::app::{AppServices, build_app};
use eshop_core::{CategoryId, ProductId, UserId};
use eshop_infra::order_store::{InMemoryOrderStore, OrderStore, ProductCatalog, StoreError};
use eshop_orders::{OrderDetails, PlaceOrder, PlaceOrderError, PlacedOrder};
use eshop_products::{Category, Product, Stock};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(services: AppServices) -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = build_app(Arc::new(services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    async fn with_store(store: Arc<InMemoryOrderStore>) -> Self {
        Self::spawn(AppServices::in_memory(store)).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn pid(raw: i64) -> ProductId {
    ProductId::new(raw).unwrap()
}

fn seeded_store() -> Arc<InMemoryOrderStore> {
    let store = Arc::new(InMemoryOrderStore::new());
    let kitchen = CategoryId::new(1).unwrap();
    store.upsert_category(Category::new(kitchen, "Kitchen")).unwrap();
    store
        .upsert_product(Product::new(pid(1), "Mug", 100, Stock::new(5).unwrap()).with_category(kitchen))
        .unwrap();
    store
        .upsert_product(Product::new(pid(2), "Plate", 250, Stock::new(1).unwrap()))
        .unwrap();
    store
}

/// Store whose every operation fails like a lost database connection.
struct BrokenStore;

#[async_trait]
impl OrderStore for BrokenStore {
    async fn place_order(&self, _cmd: &PlaceOrder) -> Result<PlacedOrder, PlaceOrderError> {
        Err(PlaceOrderError::storage("connection reset by peer"))
    }

    async fn orders_for_user(&self, _user_id: UserId) -> Result<Vec<OrderDetails>, StoreError> {
        Err(StoreError::PoolClosed {
            operation: "load_orders".to_string(),
        })
    }
}

#[async_trait]
impl ProductCatalog for BrokenStore {
    async fn get_product(&self, _id: ProductId) -> Result<Option<Product>, StoreError> {
        Err(StoreError::PoolClosed {
            operation: "get_product".to_string(),
        })
    }

    async fn list_products(&self, _category_id: Option<CategoryId>) -> Result<Vec<Product>, StoreError> {
        Err(StoreError::PoolClosed {
            operation: "list_products".to_string(),
        })
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        Err(StoreError::PoolClosed {
            operation: "list_categories".to_string(),
        })
    }
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::with_store(seeded_store()).await;
    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn placing_an_order_returns_created_and_decrements_stock() {
    let store = seeded_store();
    let srv = TestServer::with_store(store.clone()).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/orders", srv.base_url))
        .json(&json!({ "user_id": 1, "items": [{ "product_id": 1, "quantity": 3 }] }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Order created successfully");
    assert!(body["orderId"].as_i64().unwrap() > 0);
    assert_eq!(store.stock_of(pid(1)).unwrap().units(), 2);
}

#[tokio::test]
async fn insufficient_stock_is_a_bad_request_naming_the_product() {
    let store = seeded_store();
    let srv = TestServer::with_store(store.clone()).await;
    let client = reqwest::Client::new();
    let order = json!({ "user_id": 1, "items": [{ "product_id": 1, "quantity": 3 }] });

    let first = client
        .post(format!("{}/orders", srv.base_url))
        .json(&order)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = client
        .post(format!("{}/orders", srv.base_url))
        .json(&order)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = second.json().await.unwrap();
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("Not enough stock for product ID: 1")
    );
    assert_eq!(store.stock_of(pid(1)).unwrap().units(), 2);
    assert_eq!(store.order_count(), 1);
}

#[tokio::test]
async fn partial_failure_leaves_stock_untouched() {
    let store = seeded_store();
    let srv = TestServer::with_store(store.clone()).await;

    let res = reqwest::Client::new()
        .post(format!("{}/orders", srv.base_url))
        .json(&json!({
            "user_id": 1,
            "items": [
                { "product_id": 1, "quantity": 2 },
                { "product_id": 2, "quantity": 2 }
            ]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.stock_of(pid(1)).unwrap().units(), 5);
    assert_eq!(store.stock_of(pid(2)).unwrap().units(), 1);
    assert_eq!(store.order_count(), 0);
}

#[tokio::test]
async fn invalid_requests_are_rejected_with_a_message() {
    let store = seeded_store();
    let srv = TestServer::with_store(store.clone()).await;
    let client = reqwest::Client::new();

    for body in [
        json!({ "user_id": 1, "items": [] }),
        json!({ "items": [{ "product_id": 1, "quantity": 1 }] }),
        json!({ "user_id": 1 }),
        json!({ "user_id": 1, "items": [{ "product_id": 1, "quantity": 0 }] }),
        json!({ "user_id": 1, "items": [{ "product_id": 1, "quantity": 1 }], "status": "lost" }),
    ] {
        let res = client
            .post(format!("{}/orders", srv.base_url))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "body: {body}");
        let reply: serde_json::Value = res.json().await.unwrap();
        assert!(reply["message"].is_string());
    }

    let res = client
        .post(format!("{}/orders", srv.base_url))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    assert_eq!(store.order_count(), 0);
    assert_eq!(store.stock_of(pid(1)).unwrap().units(), 5);
}

#[tokio::test]
async fn unknown_product_is_a_bad_request() {
    let srv = TestServer::with_store(seeded_store()).await;

    let res = reqwest::Client::new()
        .post(format!("{}/orders", srv.base_url))
        .json(&json!({ "user_id": 1, "items": [{ "product_id": 42, "quantity": 1 }] }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Product not found: 42");
}

#[tokio::test]
async fn storage_failures_are_server_errors_without_details() {
    let srv = TestServer::spawn(AppServices::from_store(Arc::new(BrokenStore))).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/orders", srv.base_url))
        .json(&json!({ "user_id": 1, "items": [{ "product_id": 1, "quantity": 1 }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = res.json().await.unwrap();
    let error = body["error"].as_str().unwrap();
    assert!(!error.contains("connection reset"));

    let res = client
        .get(format!("{}/orders/1", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn order_history_lists_orders_with_items() {
    let store = seeded_store();
    let srv = TestServer::with_store(store).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/orders/1", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    client
        .post(format!("{}/orders", srv.base_url))
        .json(&json!({
            "user_id": 1,
            "items": [
                { "product_id": 1, "quantity": 2 },
                { "product_id": 2, "quantity": 1 }
            ]
        }))
        .send()
        .await
        .unwrap();

    let res = client
        .get(format!("{}/orders/1", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let orders: serde_json::Value = res.json().await.unwrap();
    let orders = orders.as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["status"], "pending");
    assert_eq!(orders[0]["user_id"], 1);
    assert_eq!(orders[0]["items"].as_array().unwrap().len(), 2);
    assert_eq!(orders[0]["items"][0]["name"], "Mug");

    let res = client
        .get(format!("{}/orders/abc", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn products_can_be_listed_and_fetched() {
    let srv = TestServer::with_store(seeded_store()).await;
    let client = reqwest::Client::new();

    let all: serde_json::Value = client
        .get(format!("{}/products", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.as_array().unwrap().len(), 2);

    let mugs: serde_json::Value = client
        .get(format!("{}/products?category_id=1", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mugs.as_array().unwrap().len(), 1);
    assert_eq!(mugs[0]["stock"], 5);

    let res = client
        .get(format!("{}/products/99", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn categories_are_listed() {
    let srv = TestServer::with_store(seeded_store()).await;

    let res = reqwest::get(format!("{}/categories", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let categories: serde_json::Value = res.json().await.unwrap();
    assert_eq!(categories, json!([{ "id": 1, "name": "Kitchen" }]));

    let broken = TestServer::spawn(AppServices::from_store(Arc::new(BrokenStore))).await;
    let res = reqwest::get(format!("{}/categories", broken.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn concurrent_orders_for_the_whole_stock_commit_once() {
    let store = Arc::new(InMemoryOrderStore::new());
    store
        .upsert_product(Product::new(pid(1), "Last one", 100, Stock::new(3).unwrap()))
        .unwrap();
    let srv = TestServer::with_store(store.clone()).await;
    let client = reqwest::Client::new();

    let send = |user: i64| {
        let client = client.clone();
        let url = format!("{}/orders", srv.base_url);
        async move {
            client
                .post(url)
                .json(&json!({ "user_id": user, "items": [{ "product_id": 1, "quantity": 3 }] }))
                .send()
                .await
                .unwrap()
                .status()
        }
    };

    let (a, b) = tokio::join!(send(1), send(2));
    let mut statuses = vec![a, b];
    statuses.sort();

    assert_eq!(statuses, vec![StatusCode::CREATED, StatusCode::BAD_REQUEST]);
    assert_eq!(store.stock_of(pid(1)).unwrap().units(), 0);
}
