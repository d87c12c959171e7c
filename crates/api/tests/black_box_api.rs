use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

use std::sync::Arc;

use stockroom_api::app::{build_app, AppServices};
use stockroom_auth::{Account, Hs256JwtValidator, JwtClaims};
use stockroom_core::{ProductId, UserId};
use stockroom_infra::{InMemoryStore, Store};
use stockroom_inventory::Product;

const JWT_SECRET: &str = "test-secret";
const PRICE: u64 = 12_000;

struct TestServer {
    base_url: String,
    store: InMemoryStore,
    customer: UserId,
    admin: UserId,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let store = InMemoryStore::new();
        let customer = Account::customer(UserId::new(), "Katherine", "Johnson", "kj@example.com");
        let admin = Account::admin(UserId::new(), "admin@example.com");
        store.put_account(&customer).await.unwrap();
        store.put_account(&admin).await.unwrap();

        // Same router as prod, bound to an ephemeral port.
        let jwt = Hs256JwtValidator::new(JWT_SECRET).with_max_lifetime(ChronoDuration::days(30));
        let app = build_app(AppServices::new(Arc::new(store.clone())), jwt);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            store,
            customer: customer.id,
            admin: admin.id,
            handle,
        }
    }

    async fn seed_product(&self, size: &str, stock: u32) -> ProductId {
        let product = Product::new(ProductId::new(), "Air Glide", PRICE).with_size(size, stock);
        self.store.put_product(&product).await.unwrap();
        product.id_typed()
    }

    async fn stock(&self, id: ProductId, size: &str) -> u32 {
        self.store
            .get_product(id)
            .await
            .unwrap()
            .and_then(|p| p.stock_of(size))
            .unwrap()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(sub: UserId) -> String {
    let claims = JwtClaims::new(sub, Utc::now(), ChronoDuration::minutes(10));

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn order_body(product: ProductId, size: &str, quantity: u32) -> Value {
    json!({
        "items": [{ "product": product.to_string(), "quantity": quantity, "size": size }],
        "shippingAddress": {
            "fullName": "Katherine Johnson",
            "email": "kj@example.com",
            "address": "400 Langley Blvd",
            "city": "Hampton",
            "state": "VA",
            "zipCode": "23681",
            "country": "USA",
            "phoneNumber": "757-555-0199"
        },
        "totalAmount": PRICE * u64::from(quantity),
    })
}

async fn place_order(
    client: &reqwest::Client,
    srv: &TestServer,
    token: &str,
    product: ProductId,
    quantity: u32,
) -> String {
    let res = client
        .post(srv.url("/orders"))
        .bearer_auth(token)
        .json(&order_body(product, "42", quantity))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    body["order"]["id"].as_str().unwrap().to_string()
}

async fn set_status(client: &reqwest::Client, srv: &TestServer, id: &str, status: &str) {
    let res = client
        .put(srv.url(&format!("/orders/{id}/status")))
        .bearer_auth(mint_jwt(srv.admin))
        .json(&json!({ "status": status }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK, "status update to {status}");
}

#[tokio::test]
async fn health_is_public_and_orders_require_auth() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/orders/my-orders")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn tokens_for_unknown_accounts_or_wrong_secret_are_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(mint_jwt(UserId::new()))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let forged = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &JwtClaims::new(srv.customer, Utc::now(), ChronoDuration::minutes(10)),
        &EncodingKey::from_secret(b"other-secret"),
    )
    .unwrap();
    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(forged)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn whoami_reflects_the_account() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(mint_jwt(srv.admin))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user_id"], srv.admin.to_string());
    assert_eq!(body["is_admin"], true);
}

#[tokio::test]
async fn placing_an_order_reserves_stock() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(srv.customer);
    let product = srv.seed_product("42", 10).await;

    let res = client
        .post(srv.url("/orders"))
        .bearer_auth(&token)
        .json(&order_body(product, "42", 3))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["order"]["status"], "Pending");
    assert_eq!(body["order"]["totalAmount"], PRICE * 3);
    assert_eq!(body["order"]["items"][0]["unitPriceAtPurchase"], PRICE);
    assert_eq!(srv.stock(product, "42").await, 7);

    let res = client
        .get(srv.url("/orders/my-orders"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn out_of_stock_and_invalid_requests_are_400() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(srv.customer);
    let product = srv.seed_product("42", 2).await;

    let res = client
        .post(srv.url("/orders"))
        .bearer_auth(&token)
        .json(&order_body(product, "42", 3))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "out_of_stock");
    assert!(body["message"].as_str().unwrap().contains("Available: 2"));
    assert_eq!(srv.stock(product, "42").await, 2);

    let mut missing_address = order_body(product, "42", 1);
    missing_address.as_object_mut().unwrap().remove("shippingAddress");
    let res = client
        .post(srv.url("/orders"))
        .bearer_auth(&token)
        .json(&missing_address)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(srv.url("/orders"))
        .bearer_auth(&token)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(srv.url("/orders"))
        .bearer_auth(&token)
        .json(&order_body(ProductId::new(), "42", 1))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
    assert_eq!(srv.stock(product, "42").await, 2);
}

#[tokio::test]
async fn admin_routes_are_forbidden_for_customers() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(srv.customer);
    let product = srv.seed_product("42", 5).await;
    let id = place_order(&client, &srv, &token, product, 1).await;

    let res = client
        .patch(srv.url(&format!("/orders/admin/cancel/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .put(srv.url(&format!("/orders/{id}/status")))
        .bearer_auth(&token)
        .json(&json!({ "status": "Processing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(srv.url("/orders/admin"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .delete(srv.url(&format!("/users/{}", srv.customer)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn processing_order_cancel_restores_stock_once() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(srv.admin);
    let product = srv.seed_product("42", 10).await;
    let id = place_order(&client, &srv, &mint_jwt(srv.customer), product, 3).await;
    set_status(&client, &srv, &id, "Processing").await;

    let res = client
        .patch(srv.url(&format!("/orders/admin/cancel/{id}")))
        .bearer_auth(&admin)
        .json(&json!({ "reason": "warehouse damage" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["order"]["status"], "Cancelled");
    assert_eq!(body["order"]["cancellationReason"], "warehouse damage");
    assert!(body["message"].as_str().unwrap().contains("inventory restored"));
    assert_eq!(srv.stock(product, "42").await, 10);

    let res = client
        .put(srv.url(&format!("/orders/admin/cancel/{id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(srv.stock(product, "42").await, 10);
}

#[tokio::test]
async fn pending_order_cancel_keeps_stock_reserved() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product = srv.seed_product("42", 10).await;
    let id = place_order(&client, &srv, &mint_jwt(srv.customer), product, 3).await;

    let res = client
        .patch(srv.url(&format!("/orders/admin/cancel/{id}")))
        .bearer_auth(mint_jwt(srv.admin))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Order cancelled successfully");
    assert_eq!(body["order"]["cancellationReason"], "Cancelled by admin");
    assert_eq!(srv.stock(product, "42").await, 7);
}

#[tokio::test]
async fn status_updates_follow_the_lifecycle() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(srv.admin);
    let product = srv.seed_product("42", 10).await;
    let id = place_order(&client, &srv, &mint_jwt(srv.customer), product, 1).await;

    let res = client
        .put(srv.url(&format!("/orders/{id}/status")))
        .bearer_auth(&admin)
        .json(&json!({ "status": "Delivered" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .put(srv.url(&format!("/orders/{id}/status")))
        .bearer_auth(&admin)
        .json(&json!({ "status": "Misplaced" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    for status in ["Processing", "Shipped", "Delivered"] {
        set_status(&client, &srv, &id, status).await;
    }

    let res = client
        .patch(srv.url(&format!("/orders/admin/cancel/{id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let unknown = stockroom_core::OrderId::new();
    let res = client
        .put(srv.url(&format!("/orders/{unknown}/status")))
        .bearer_auth(&admin)
        .json(&json!({ "status": "Processing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(srv.url("/orders/admin?status=delivered"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["count"], 1);
    assert_eq!(body["orders"][0]["id"], id);
}

#[tokio::test]
async fn orders_are_private_to_their_owner() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product = srv.seed_product("42", 10).await;
    let id = place_order(&client, &srv, &mint_jwt(srv.customer), product, 1).await;

    let stranger = Account::customer(UserId::new(), "Dorothy", "Vaughan", "dv@example.com");
    srv.store.put_account(&stranger).await.unwrap();

    let res = client
        .get(srv.url(&format!("/orders/{id}")))
        .bearer_auth(mint_jwt(stranger.id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(srv.url(&format!("/orders/{id}")))
        .bearer_auth(mint_jwt(srv.admin))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn deleting_a_user_restores_shipped_stock() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(srv.admin);
    let customer = mint_jwt(srv.customer);
    let product = srv.seed_product("42", 5).await;
    let id = place_order(&client, &srv, &customer, product, 2).await;
    set_status(&client, &srv, &id, "Processing").await;
    set_status(&client, &srv, &id, "Shipped").await;
    assert_eq!(srv.stock(product, "42").await, 3);

    let res = client
        .delete(srv.url(&format!("/users/{}", srv.customer)))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["restoredInventory"], true);
    assert_eq!(srv.stock(product, "42").await, 5);

    // The account is gone, so its token no longer authenticates.
    let res = client
        .get(srv.url("/orders/my-orders"))
        .bearer_auth(&customer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .delete(srv.url(&format!("/users/{}", srv.customer)))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(srv.stock(product, "42").await, 5);

    let res = client
        .delete(srv.url(&format!("/users/{}", srv.admin)))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_listing_accepts_all_sort_and_paging() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(srv.admin);
    let customer = mint_jwt(srv.customer);
    let product = srv.seed_product("42", 10).await;
    for quantity in [1, 3, 2] {
        place_order(&client, &srv, &customer, product, quantity).await;
    }

    let res = client
        .get(srv.url("/orders/admin?status=all&sort=highest&page=1&limit=2"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["count"], 2);
    assert_eq!(body["totalOrders"], 3);
    assert_eq!(body["totalPages"], 2);
    assert_eq!(body["currentPage"], 1);
    assert_eq!(body["orders"][0]["totalAmount"], 3 * PRICE);
    assert_eq!(body["orders"][1]["totalAmount"], 2 * PRICE);

    let res = client
        .get(srv.url("/orders/admin?sort=highest&page=2&limit=2"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["count"], 1);
    assert_eq!(body["currentPage"], 2);
    assert_eq!(body["orders"][0]["totalAmount"], PRICE);

    for query in ["sort=cheapest", "page=0", "limit=abc"] {
        let res = client
            .get(srv.url(&format!("/orders/admin?{query}")))
            .bearer_auth(&admin)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{query}");
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "validation");
    }
}
