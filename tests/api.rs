//! Black-box tests driving the real router over the in-memory store.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use istore::auth::AuthService;
use istore::domain::aggregates::Account;
use istore::domain::role::Role;
use istore::store::{AccountStore, CatalogStore, MemoryStore, OrderStore, Page};
use istore::{router, AppConfig, AppState};

const SESSION_SECRET: &str = "test-session-secret-0123456789abcdef";
const PROVIDER_SECRET: &str = "provider-secret";

struct TestApp {
    router: Router,
    state: AppState,
    store: Arc<MemoryStore>,
}

impl TestApp {
    fn new() -> Self {
        let config = AppConfig::from_lookup(|key| {
            let value = match key {
                "DATABASE_URL" => "postgres://localhost/unused",
                "SESSION_SECRET" => SESSION_SECRET,
                "AUTH_PROVIDER_SECRET" => PROVIDER_SECRET,
                "BASE_URL" => "https://shop.example",
                _ => return None,
            };
            Some(value.to_string())
        })
        .unwrap();
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(config, store.clone(), None);
        Self { router: router(state.clone()), state, store }
    }

    async fn token_for(&self, role: Role) -> String {
        let mut account = Account::from_provider("google", role.as_str(), &format!("{role}@example.com"));
        account.role = role;
        self.store.insert_account(&account).await.unwrap();
        self.state.sessions().issue(&account, Utc::now()).unwrap()
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>, token: Option<&str>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(request(method, uri, body, token, &[])).await;
        (status, body)
    }
}

fn request(method: Method, uri: &str, body: Option<Value>, token: Option<&str>, extra: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    for (name, value) in extra {
        builder = builder.header(*name, *value);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn macbook(name: &str) -> Value {
    json!({
        "name": name,
        "category": "MacBook",
        "basePrice": "1000",
        "colorVariants": [{"id": 1, "colorLabel": "Midnight", "imageRef": "mba-midnight.png", "priceDelta": "50"}],
        "storageVariants": [{"id": 1, "label": "512GB", "priceDelta": "200"}],
        "regionVariants": [{"name": "USA", "priceDelta": "30"}],
        "details": [{"label": "Chip", "value": "M3"}],
        "stockQuantity": 5
    })
}

fn order_body(total: &str) -> Value {
    json!({
        "customer": {
            "firstName": "Rahim", "lastName": "Uddin", "mobile": "+8801712345678",
            "email": "rahim@example.com", "address": "House 12, Road 5",
            "district": "Dhaka", "upazila": "Dhanmondi"
        },
        "items": [
            {"productName": "iPhone 15", "price": "1200", "quantity": 2, "color": "Black", "storage": "256GB"},
            {"productName": "AirPods", "price": "199.99", "quantity": 1}
        ],
        "total": total
    })
}

fn decimal(value: &Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn health_check() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn created_product_gets_derived_slug_and_is_found_by_it() {
    let app = TestApp::new();
    let admin = app.token_for(Role::Admin).await;

    let (status, created) = app.call(Method::POST, "/products", Some(macbook("MacBook Air M3")), Some(&admin)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["slug"], "macbook-air-m3");
    assert_eq!(created["productlinkname"], "macbook-air-m3");

    let (status, product) = app.call(Method::GET, "/products/by-slug/macbook-air-m3", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(product["id"], created["id"]);
    assert_eq!(product["productlinkname"], "macbook-air-m3");
    assert_eq!(product["name"], "MacBook Air M3");
    assert_eq!(product["category"], "macbook");

    let (status, listed) = app.call(Method::GET, "/products/macbook?page=1&per_page=10", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["productlinkname"], "macbook-air-m3");

    // Same name again: derived slug is disambiguated
    let (status, second) = app.call(Method::POST, "/products", Some(macbook("MacBook Air M3")), Some(&admin)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["slug"], "macbook-air-m3-2");
}

#[tokio::test]
async fn slug_lookup_falls_back_to_name() {
    let app = TestApp::new();
    let admin = app.token_for(Role::Admin).await;
    app.call(Method::POST, "/products", Some(macbook("iPhone 15 Pro")), Some(&admin)).await;

    let (status, _) = app.call(Method::GET, "/products/by-slug/old-link", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, product) = app.call(Method::GET, "/products/by-slug/old-link?name=iPhone%2015%20Pro", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(product["slug"], "iphone-15-pro");
}

#[tokio::test]
async fn duplicate_sku_is_a_conflict_without_second_record() {
    let app = TestApp::new();
    let admin = app.token_for(Role::Admin).await;

    let mut first = macbook("MacBook Air M3");
    first["sku"] = json!("MBA-M3");
    let (status, _) = app.call(Method::POST, "/products", Some(first), Some(&admin)).await;
    assert_eq!(status, StatusCode::CREATED);

    let mut second = macbook("MacBook Air M3 Midnight");
    second["sku"] = json!("mba-m3");
    let (status, body) = app.call(Method::POST, "/products", Some(second), Some(&admin)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
    assert_eq!(app.store.count_products().await.unwrap(), 1);
}

#[tokio::test]
async fn explicit_slug_collision_is_a_conflict() {
    let app = TestApp::new();
    let admin = app.token_for(Role::Admin).await;

    let mut first = macbook("MacBook Pro");
    first["productlinkname"] = json!("mbp");
    let (status, created) = app.call(Method::POST, "/products", Some(first), Some(&admin)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["slug"], "mbp");

    let mut second = macbook("MacBook Pro 16");
    second["slug"] = json!("MBP");
    let (status, _) = app.call(Method::POST, "/products", Some(second), Some(&admin)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_product_is_rejected() {
    let app = TestApp::new();
    let admin = app.token_for(Role::Admin).await;

    let mut negative = macbook("iPad Air");
    negative["storageVariants"][0]["priceDelta"] = json!("-10");
    let (status, body) = app.call(Method::POST, "/products", Some(negative), Some(&admin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = app.call(Method::POST, "/products", Some(json!({"name": "iPad"})), Some(&admin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut fractional = macbook("iPad Pro");
    fractional["basePrice"] = json!("999.999");
    let (status, body) = app.call(Method::POST, "/products", Some(fractional), Some(&admin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("basePrice"));

    let mut oversized = macbook("iPad mini");
    oversized["regionVariants"][0]["priceDelta"] = json!("1000000000000");
    let (status, _) = app.call(Method::POST, "/products", Some(oversized), Some(&admin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.store.count_products().await.unwrap(), 0);
}

#[tokio::test]
async fn catalog_writes_require_admin() {
    let app = TestApp::new();
    let user = app.token_for(Role::User).await;
    let management = app.token_for(Role::Management).await;

    let (status, _) = app.call(Method::POST, "/products", Some(macbook("iMac")), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.call(Method::POST, "/products", Some(macbook("iMac")), Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call(Method::POST, "/products", Some(macbook("iMac")), Some(&management)).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn update_and_delete_product() {
    let app = TestApp::new();
    let admin = app.token_for(Role::Admin).await;
    let (_, created) = app.call(Method::POST, "/products", Some(macbook("MacBook Air M3")), Some(&admin)).await;
    let id = created["id"].as_str().unwrap().to_string();

    let mut edit = macbook("MacBook Air M3 (2024)");
    edit["basePrice"] = json!("1099");
    let (status, updated) = app.call(Method::PUT, &format!("/products/{id}"), Some(edit), Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "MacBook Air M3 (2024)");
    assert_eq!(updated["slug"], "macbook-air-m3");
    assert_eq!(decimal(&updated["basePrice"]), Decimal::from(1099));

    let (status, _) = app.call(Method::DELETE, &format!("/products/{id}"), None, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.call(Method::DELETE, &format!("/products/{id}"), None, Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let missing = uuid::Uuid::now_v7();
    let (status, _) = app.call(Method::PUT, &format!("/products/{missing}"), Some(macbook("Gone")), Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn order_total_is_validated() {
    let app = TestApp::new();

    let (status, body) = app.call(Method::POST, "/orders", Some(order_body("2500.00")), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "unprocessable");

    let (status, placed) = app.call(Method::POST, "/orders", Some(order_body("2599.99")), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(placed["orderNumber"].as_str().unwrap().starts_with("ORD-"));

    let (orders, total) = app.store.list_orders(None, Page::new(None, None)).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(orders[0].total(), Decimal::new(259999, 2));
}

#[tokio::test]
async fn oversized_order_amounts_are_rejected() {
    let app = TestApp::new();
    let single = |price: &str, quantity: u64, total: &str| {
        let mut body = order_body(total);
        body["items"] = json!([{"productName": "Mac Pro", "price": price, "quantity": quantity}]);
        body
    };

    let cases = [
        single("100000000000000000000", 4_000_000_000, "1"),
        single("1200", 1, "-79228162514264337593543950335"),
        single("999999999999.99", 2, "1"),
        single("0.001", 1, "0"),
    ];
    for body in cases {
        let (status, body) = app.call(Method::POST, "/orders", Some(body), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(body["error"], "validation_error");
    }
    assert_eq!(app.store.count_orders(None).await.unwrap(), 0);
}

#[tokio::test]
async fn order_with_bad_customer_is_rejected() {
    let app = TestApp::new();
    let mut body = order_body("2599.99");
    body["customer"]["mobile"] = json!("12345");
    let (status, _) = app.call(Method::POST, "/orders", Some(body), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut body = order_body("2599.99");
    body["items"][0]["quantity"] = json!(0);
    let (status, _) = app.call(Method::POST, "/orders", Some(body), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn repeated_idempotency_key_returns_original_order() {
    let app = TestApp::new();
    let key = [("idempotency-key", "checkout-42")];

    let (status, _, first) = app.send(request(Method::POST, "/orders", Some(order_body("2599.99")), None, &key)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _, second) = app.send(request(Method::POST, "/orders", Some(order_body("2599.99")), None, &key)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["id"], second["id"]);
    assert_eq!(first["orderNumber"], second["orderNumber"]);

    let (_, total) = app.store.list_orders(None, Page::new(None, None)).await.unwrap();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn admin_manages_order_lifecycle() {
    let app = TestApp::new();
    let admin = app.token_for(Role::Admin).await;
    let user = app.token_for(Role::User).await;
    let (_, placed) = app.call(Method::POST, "/orders", Some(order_body("2599.99")), None).await;
    let id = placed["id"].as_str().unwrap().to_string();

    let (status, _) = app.call(Method::GET, "/orders", None, Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call(Method::GET, &format!("/orders/{id}"), None, Some(&user)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, listed) = app.call(Method::GET, "/orders?status=pending", None, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["total"], 1);
    let (status, _) = app.call(Method::GET, "/orders?status=lost", None, Some(&admin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let status_uri = format!("/orders/{id}/status");
    let (status, _) = app.call(Method::PATCH, &status_uri, Some(json!({"status": "shipped"})), Some(&admin)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, order) = app.call(Method::PATCH, &status_uri, Some(json!({"status": "confirmed"})), Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "confirmed");

    let payment_uri = format!("/orders/{id}/payment");
    let (status, _) = app.call(Method::PATCH, &payment_uri, Some(json!({"paymentStatus": "refunded"})), Some(&admin)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, order) = app.call(Method::PATCH, &payment_uri, Some(json!({"paymentStatus": "paid"})), Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["paymentStatus"], "paid");
}

#[tokio::test]
async fn dashboard_redirects_anonymous_visitors_to_login() {
    let app = TestApp::new();

    let (status, headers, _) = app.send(request(Method::GET, "/dashboard/summary", None, None, &[])).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers[header::LOCATION], "/login?callbackUrl=%2Fdashboard%2Fsummary");

    let (status, headers, _) = app.send(request(Method::POST, "/checkout/quote", Some(json!({"items": []})), Some("garbage"), &[])).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers[header::LOCATION], "/login?callbackUrl=%2Fcheckout%2Fquote");
}

#[tokio::test]
async fn dashboard_requires_admin_role() {
    let app = TestApp::new();
    let user = app.token_for(Role::User).await;
    let admin = app.token_for(Role::Admin).await;
    app.call(Method::POST, "/products", Some(macbook("Mac mini")), Some(&admin)).await;
    app.call(Method::POST, "/orders", Some(order_body("2599.99")), None).await;

    let (status, _) = app.call(Method::GET, "/dashboard/summary", None, Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, summary) = app.call(Method::GET, "/dashboard/summary", None, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary, json!({"products": 1, "orders": 1, "pendingOrders": 1}));
}

#[tokio::test]
async fn admin_changes_user_role() {
    let app = TestApp::new();
    let admin = app.token_for(Role::Admin).await;
    let mut staff = Account::from_provider("google", "kai", "kai@example.com");
    staff.role = Role::User;
    app.store.insert_account(&staff).await.unwrap();

    let (status, users) = app.call(Method::GET, "/dashboard/users?per_page=1", None, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users["total"], 2);
    assert_eq!(users["data"].as_array().unwrap().len(), 1);

    let uri = format!("/dashboard/users/{}/role", staff.id);
    let (status, _) = app.call(Method::PATCH, &uri, Some(json!({"role": "owner"})), Some(&admin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, account) = app.call(Method::PATCH, &uri, Some(json!({"role": "management"})), Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(account["role"], "management");
    assert_eq!(app.store.account_by_id(staff.id).await.unwrap().unwrap().role, Role::Management);
}

#[tokio::test]
async fn checkout_quote_prices_from_catalog() {
    let app = TestApp::new();
    let admin = app.token_for(Role::Admin).await;
    let user = app.token_for(Role::User).await;
    app.call(Method::POST, "/products", Some(macbook("MacBook Air M3")), Some(&admin)).await;

    let quote = json!({"items": [
        {"slug": "macbook-air-m3", "colorId": 1, "storageId": 1, "quantity": 1},
        {"slug": "macbook-air-m3", "colorId": 1, "storageId": 1, "quantity": 1},
        {"slug": "macbook-air-m3", "regionName": "usa", "colorId": 99, "quantity": 1}
    ]});
    let (status, body) = app.call(Method::POST, "/checkout/quote", Some(quote), Some(&user)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["items"][0]["quantity"], 2);
    assert_eq!(decimal(&body["subtotal"]), Decimal::from(2500 + 1030));
    assert_eq!(body["lineItems"][0]["color"], "Midnight");
    assert_eq!(body["available"], true);

    let missing = json!({"items": [{"slug": "vision-pro", "quantity": 1}]});
    let (status, _) = app.call(Method::POST, "/checkout/quote", Some(missing), Some(&user)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn back_in_stock_subscriptions() {
    let app = TestApp::new();
    let admin = app.token_for(Role::Admin).await;
    let mut sold_out = macbook("iPad Pro");
    sold_out["stockQuantity"] = json!(0);
    let (_, created) = app.call(Method::POST, "/products", Some(sold_out), Some(&admin)).await;
    let id = created["id"].as_str().unwrap().to_string();
    let notify = format!("/products/{id}/notify");

    let (status, _) = app.call(Method::POST, &notify, Some(json!({"email": "fan@example.com"})), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = app.call(Method::POST, &notify, Some(json!({"email": "FAN@example.com"})), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], false);
    let (status, _) = app.call(Method::POST, &notify, Some(json!({"email": "not-an-email"})), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let unknown = format!("/products/{}/notify", uuid::Uuid::now_v7());
    let (status, _) = app.call(Method::POST, &unknown, Some(json!({"email": "fan@example.com"})), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let stock = format!("/products/{id}/stock");
    let (status, _) = app.call(Method::PATCH, &stock, Some(json!({"quantity": 3})), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, level) = app.call(Method::PATCH, &stock, Some(json!({"quantity": 3})), Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(level["stockQuantity"], 3);
    assert_eq!(level["notified"], 1);

    let (_, level) = app.call(Method::PATCH, &stock, Some(json!({"quantity": 5})), Some(&admin)).await;
    assert_eq!(level["notified"], 0);
    let (status, _) = app.call(Method::PATCH, &stock, Some(json!({"quantity": -1})), Some(&admin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn signup_requires_verification_before_login() {
    let app = TestApp::new();
    let signup = json!({"username": "mina", "email": "Mina@Example.com", "password": "s3cret-pass"});

    let (status, account) = app.call(Method::POST, "/auth/signup", Some(signup.clone()), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(account["email"], "mina@example.com");
    assert_eq!(account["isVerified"], false);
    assert!(account.get("passwordHash").is_none());

    let (status, _) = app.call(Method::POST, "/auth/signup", Some(signup), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let login = json!({"email": "mina@example.com", "password": "s3cret-pass"});
    let (status, _) = app.call(Method::POST, "/auth/login", Some(login), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let wrong = json!({"email": "mina@example.com", "password": "wrong-pass"});
    let (status, _) = app.call(Method::POST, "/auth/login", Some(wrong), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let short = json!({"username": "kai", "email": "kai@example.com", "password": "short"});
    let (status, _) = app.call(Method::POST, "/auth/signup", Some(short), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn verification_link_activates_account() {
    let app = TestApp::new();
    let auth = AuthService::new(app.store.as_ref(), Duration::hours(24));
    let (_, token) = auth.register_with_password("mina", "mina@example.com", "s3cret-pass", Utc::now()).await.unwrap();

    let (status, _, _) = app.send(request(Method::GET, "/auth/verify-email?token=bogus", None, None, &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/auth/verify-email?token={token}");
    let (status, headers, _) = app.send(request(Method::GET, &uri, None, None, &[])).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers[header::LOCATION], "https://shop.example/login?verified=true");

    let (status, _, _) = app.send(request(Method::GET, &uri, None, None, &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let login = json!({"email": "mina@example.com", "password": "s3cret-pass"});
    let (status, session) = app.call(Method::POST, "/auth/login", Some(login), None).await;
    assert_eq!(status, StatusCode::OK);
    let token = session["token"].as_str().unwrap();

    let (status, me) = app.call(Method::GET, "/account", None, Some(token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["isVerified"], true);
    let (status, _) = app.call(Method::GET, "/account", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_verification_link_is_rejected() {
    let app = TestApp::new();
    let auth = AuthService::new(app.store.as_ref(), Duration::hours(24));
    let issued = Utc::now() - Duration::hours(25);
    let (_, token) = auth.register_with_password("mina", "mina@example.com", "s3cret-pass", issued).await.unwrap();

    let (status, body) = app.call(Method::GET, &format!("/auth/verify-email?token={token}"), None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "verification token has expired");
}

#[tokio::test]
async fn signed_in_shopper_sees_own_orders() {
    let app = TestApp::new();
    let exchange = json!({"provider": "google", "email": "rahim@example.com", "username": "rahim"});
    let secret = [("x-provider-secret", PROVIDER_SECRET)];
    let (status, _, session) = app.send(request(Method::POST, "/auth/provider", Some(exchange), None, &secret)).await;
    assert_eq!(status, StatusCode::OK);
    let token = session["token"].as_str().unwrap().to_string();

    let (status, placed) = app.call(Method::POST, "/orders", Some(order_body("2599.99")), Some(&token)).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = placed["id"].as_str().unwrap();

    let (status, mine) = app.call(Method::GET, "/account/orders", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);
    let (status, _) = app.call(Method::GET, &format!("/orders/{id}"), None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn provider_exchange_requires_shared_secret() {
    let app = TestApp::new();
    let body = json!({"provider": "google", "email": "mina@example.com", "username": "mina"});

    let (status, _, _) = app.send(request(Method::POST, "/auth/provider", Some(body.clone()), None, &[])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let wrong = [("x-provider-secret", "guess")];
    let (status, _, _) = app.send(request(Method::POST, "/auth/provider", Some(body.clone()), None, &wrong)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let right = [("x-provider-secret", PROVIDER_SECRET)];
    let (status, _, session) = app.send(request(Method::POST, "/auth/provider", Some(body), None, &right)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["account"]["isVerified"], true);
    assert_eq!(session["account"]["provider"], "google");
}

#[tokio::test]
async fn catalog_reads_are_open_to_any_origin() {
    let app = TestApp::new();
    let evil = [("origin", "https://elsewhere.example")];

    let (_, headers, _) = app.send(request(Method::GET, "/products/iphone", None, None, &evil)).await;
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://elsewhere.example");

    let (_, headers, _) = app.send(request(Method::POST, "/orders", Some(order_body("2599.99")), None, &evil)).await;
    assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

    let storefront = [("origin", "https://shop.example")];
    let (_, headers, _) = app.send(request(Method::POST, "/orders", Some(order_body("2599.99")), None, &storefront)).await;
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://shop.example");
}
