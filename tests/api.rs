//! End-to-end API tests against the in-memory store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{json, Value};
use tower::ServiceExt;

use storefront_api::auth::TokenService;
use storefront_api::config::AdminBootstrap;
use storefront_api::services::mail::{EmailMessage, MailError, Mailer};
use storefront_api::services::payments::{
    sign_payload, verify_signature, IntentRequest, PaymentError, PaymentGateway, PaymentIntent, WebhookEvent,
};
use storefront_api::services::EventPublisher;
use storefront_api::store::MemoryDocumentStore;
use storefront_api::AppState;

const WEBHOOK_SECRET: &str = "whsec_integration";
const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "admin-password";

#[derive(Default)]
struct FakeGateway {
    created: Mutex<Vec<String>>,
    refunds: Mutex<Vec<String>>,
    cancelled: Mutex<Vec<String>>,
    statuses: Mutex<HashMap<String, String>>,
}

impl FakeGateway {
    fn set_status(&self, intent_id: &str, status: &str) {
        self.statuses.lock().unwrap().insert(intent_id.to_string(), status.to_string());
    }
}

fn intent(id: String, amount: i64) -> PaymentIntent {
    PaymentIntent {
        client_secret: Some(format!("{id}_secret")),
        id,
        status: "requires_payment_method".into(),
        amount,
        currency: "usd".into(),
        metadata: HashMap::new(),
        last_payment_error: None,
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, PaymentError> {
        let mut created = self.created.lock().unwrap();
        let id = format!("pi_{}_{}", request.order_id.simple(), created.len());
        created.push(id.clone());
        Ok(intent(id, request.amount.cents()))
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        let mut found = intent(intent_id.to_string(), 0);
        if let Some(status) = self.statuses.lock().unwrap().get(intent_id) {
            found.status = status.clone();
        }
        Ok(found)
    }

    async fn refund(&self, intent_id: &str) -> Result<(), PaymentError> {
        self.refunds.lock().unwrap().push(intent_id.to_string());
        Ok(())
    }

    async fn cancel_intent(&self, intent_id: &str) -> Result<(), PaymentError> {
        self.cancelled.lock().unwrap().push(intent_id.to_string());
        self.set_status(intent_id, "canceled");
        Ok(())
    }

    fn verify_webhook(&self, payload: &[u8], signature_header: &str) -> Result<WebhookEvent, PaymentError> {
        verify_signature(payload, signature_header, WEBHOOK_SECRET, Utc::now().timestamp())?;
        Ok(serde_json::from_slice(payload)?)
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    fn subjects_for(&self, to: &str) -> Vec<String> {
        self.sent.lock().unwrap().iter().filter(|(t, _)| t == to).map(|(_, s)| s.clone()).collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, message: &EmailMessage) -> Result<(), MailError> {
        self.sent.lock().unwrap().push((to.to_string(), message.subject.clone()));
        Ok(())
    }
}

struct TestApp {
    router: Router,
    gateway: Arc<FakeGateway>,
    mailer: Arc<RecordingMailer>,
}

impl TestApp {
    async fn new() -> Self {
        let gateway = Arc::new(FakeGateway::default());
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState {
            store: Arc::new(MemoryDocumentStore::new()),
            tokens: Arc::new(TokenService::new(b"integration-secret-integration-secret", Duration::hours(1))),
            payments: gateway.clone(),
            mailer: mailer.clone(),
            events: EventPublisher::disabled(),
        };
        let admin = AdminBootstrap { email: ADMIN_EMAIL.into(), password: SecretString::from(ADMIN_PASSWORD.to_string()) };
        state.bootstrap_admin(&admin).await.unwrap();
        Self { router: storefront_api::app(state, None), gateway, mailer }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
        (status, body)
    }

    async fn request(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    async fn register(&self, name: &str, email: &str) -> String {
        let (status, body) = self
            .post("/api/auth/register", None, json!({ "name": name, "email": email, "password": "correct-horse" }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    async fn admin_token(&self) -> String {
        let (status, body) = self
            .post("/api/auth/login", None, json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    async fn create_product(&self, admin: &str, body: Value) -> Value {
        let (status, product) = self.post("/api/products", Some(admin), body).await;
        assert_eq!(status, StatusCode::CREATED, "{product}");
        product
    }

    async fn stock_of(&self, admin: &str, product_id: &str) -> i64 {
        let (_, product) = self.get(&format!("/api/products/{product_id}"), Some(admin)).await;
        product["stock"].as_i64().unwrap()
    }
}

fn address() -> Value {
    json!({ "full_name": "Ann Lee", "street": "1 Main St", "city": "Springfield", "postal_code": "12345", "country": "US" })
}

fn signed_webhook(event_type: &str, object: Value) -> Request<Body> {
    let payload = json!({ "id": "evt_test", "type": event_type, "data": { "object": object } }).to_string();
    let signature = sign_payload(payload.as_bytes(), WEBHOOK_SECRET, Utc::now().timestamp()).unwrap();
    Request::builder()
        .method(Method::POST)
        .uri("/api/payments/webhook")
        .header("stripe-signature", signature)
        .body(Body::from(payload))
        .unwrap()
}

fn assert_money(value: &Value, expected: f64) {
    let actual = value.as_f64().unwrap_or_else(|| panic!("not a number: {value}"));
    assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
}

#[tokio::test]
async fn test_register_login_and_profile() {
    let app = TestApp::new().await;
    let token = app.register("Ann", "Ann@Example.com").await;

    let (status, body) = app
        .post("/api/auth/register", None, json!({ "name": "Ann", "email": "ann@example.com", "password": "another-pass" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Email is already registered");

    let (status, _) = app.post("/api/auth/login", None, json!({ "email": "ann@example.com", "password": "wrong-pass" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.post("/api/auth/login", None, json!({ "email": "ann@example.com", "password": "correct-horse" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["user"]["last_login_at"].is_string());

    let (status, me) = app.get("/api/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "ann@example.com");
    assert_eq!(me["role"], "customer");
    assert!(me.get("password_hash").is_none());
    assert_eq!(app.mailer.subjects_for("ann@example.com").len(), 1);
}

#[tokio::test]
async fn test_register_rejects_short_password() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post("/api/auth/register", None, json!({ "name": "Bo", "email": "bo@example.com", "password": "short" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "password must be at least 8 characters");
}

#[tokio::test]
async fn test_change_password_requires_current_password() {
    let app = TestApp::new().await;
    let token = app.register("Cy", "cy@example.com").await;

    let (status, _) = app
        .post("/api/auth/change-password", Some(&token), json!({ "current_password": "nope-nope", "new_password": "new-password" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/api/auth/change-password", Some(&token), json!({ "current_password": "correct-horse", "new_password": "new-password" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.post("/api/auth/login", None, json!({ "email": "cy@example.com", "password": "new-password" })).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let app = TestApp::new().await;
    let customer = app.register("Dee", "dee@example.com").await;
    let product = json!({ "name": "Mug", "price": 10.0 });

    let (status, _) = app.post("/api/products", None, product.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = app.post("/api/products", Some(&customer), product).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Admin access required");
    let (status, _) = app.get("/api/admin/stats", Some(&customer)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_order_totals_and_stock_decrement() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let customer = app.register("Eve", "eve@example.com").await;
    let product = app.create_product(&admin, json!({ "name": "Mug", "price": 25.0, "stock": 5, "status": "active" })).await;
    let id = product["id"].as_str().unwrap();

    let (status, order) = app
        .post("/api/orders", Some(&customer), json!({ "items": [{ "product_id": id, "quantity": 2 }], "shipping_address": address() }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["status"], "pending");
    assert_eq!(order["payment_status"], "pending");
    assert_money(&order["totals"]["subtotal"], 50.0);
    assert_money(&order["totals"]["shipping"], 9.99);
    assert_money(&order["totals"]["tax"], 4.0);
    assert_money(&order["totals"]["total"], 63.99);
    assert_eq!(order["tracking"].as_array().unwrap().len(), 1);

    assert_eq!(app.stock_of(&admin, id).await, 3);
    let subjects = app.mailer.subjects_for("eve@example.com");
    assert!(subjects.iter().any(|s| s.ends_with("confirmed")), "{subjects:?}");
}

#[tokio::test]
async fn test_discounted_order_over_threshold_ships_free() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let customer = app.register("Fay", "fay@example.com").await;
    let product = app
        .create_product(&admin, json!({ "name": "Lamp", "price": 60.0, "discount_percent": 10, "stock": 10, "status": "active" }))
        .await;

    let (status, order) = app
        .post(
            "/api/orders",
            Some(&customer),
            json!({ "items": [{ "product_id": product["id"], "quantity": 2 }], "shipping_address": address() }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_money(&order["totals"]["subtotal"], 120.0);
    assert_money(&order["totals"]["discount"], 12.0);
    assert_money(&order["totals"]["shipping"], 0.0);
    assert_money(&order["totals"]["tax"], 8.64);
    assert_money(&order["totals"]["total"], 116.64);
}

#[tokio::test]
async fn test_order_rejects_bad_input_and_insufficient_stock() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let customer = app.register("Gus", "gus@example.com").await;
    let product = app.create_product(&admin, json!({ "name": "Kettle", "price": 30.0, "stock": 1, "status": "active" })).await;
    let id = product["id"].as_str().unwrap();

    let (status, body) = app.post("/api/orders", Some(&customer), json!({ "shipping_address": address() })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "order has no items");

    let (status, _) = app
        .post("/api/orders", Some(&customer), json!({ "items": [{ "product_id": id, "quantity": 0 }], "shipping_address": address() }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post("/api/orders", Some(&customer), json!({ "items": [{ "product_id": id, "quantity": 2 }], "shipping_address": address() }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().unwrap().contains("Kettle"));
    assert_eq!(app.stock_of(&admin, id).await, 1);

    let (_, orders) = app.get("/api/orders", Some(&customer)).await;
    assert_eq!(orders["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_customer_cancel_restocks() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let customer = app.register("Hal", "hal@example.com").await;
    let product = app.create_product(&admin, json!({ "name": "Bowl", "price": 12.0, "stock": 4, "status": "active" })).await;
    let id = product["id"].as_str().unwrap();

    let (_, order) = app
        .post("/api/orders", Some(&customer), json!({ "items": [{ "product_id": id, "quantity": 3 }], "shipping_address": address() }))
        .await;
    assert_eq!(app.stock_of(&admin, id).await, 1);

    let cancel = format!("/api/orders/{}/cancel", order["id"].as_str().unwrap());
    let (status, cancelled) = app.post(&cancel, Some(&customer), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(app.stock_of(&admin, id).await, 4);

    let (status, _) = app.post(&cancel, Some(&customer), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_status_workflow() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let customer = app.register("Ivy", "ivy@example.com").await;
    let product = app.create_product(&admin, json!({ "name": "Vase", "price": 40.0, "stock": 3, "status": "active" })).await;
    let (_, order) = app
        .post(
            "/api/orders",
            Some(&customer),
            json!({ "items": [{ "product_id": product["id"], "quantity": 1 }], "shipping_address": address() }),
        )
        .await;
    let status_uri = format!("/api/admin/orders/{}/status", order["id"].as_str().unwrap());

    let (status, body) = app.request(Method::PATCH, &status_uri, Some(&admin), Some(json!({ "status": "shipped" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "cannot change order status from pending to shipped");

    let (status, _) = app.request(Method::PATCH, &status_uri, Some(&admin), Some(json!({ "status": "processing" }))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, shipped) = app
        .request(Method::PATCH, &status_uri, Some(&admin), Some(json!({ "status": "shipped", "tracking_number": "1Z999", "note": "UPS" })))
        .await;
    assert_eq!(shipped["tracking_number"], "1Z999");
    let (status, delivered) = app.request(Method::PATCH, &status_uri, Some(&admin), Some(json!({ "status": "delivered" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(delivered["tracking"].as_array().unwrap().len(), 4);

    let (status, _) = app.request(Method::PATCH, &status_uri, Some(&admin), Some(json!({ "status": "cancelled" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.request(Method::PATCH, &status_uri, Some(&admin), Some(json!({ "status": "lost" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let updates = app.mailer.subjects_for("ivy@example.com").iter().filter(|s| s.contains(" is ")).count();
    assert_eq!(updates, 3);
}

#[tokio::test]
async fn test_order_access_is_owner_or_admin() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let owner = app.register("Jo", "jo@example.com").await;
    let other = app.register("Kit", "kit@example.com").await;
    let product = app.create_product(&admin, json!({ "name": "Tray", "price": 15.0, "stock": 2, "status": "active" })).await;
    let (_, order) = app
        .post("/api/orders", Some(&owner), json!({ "items": [{ "product_id": product["id"], "quantity": 1 }], "shipping_address": address() }))
        .await;
    let uri = format!("/api/orders/{}", order["id"].as_str().unwrap());

    assert_eq!(app.get(&uri, Some(&owner)).await.0, StatusCode::OK);
    assert_eq!(app.get(&uri, Some(&admin)).await.0, StatusCode::OK);
    assert_eq!(app.get(&uri, Some(&other)).await.0, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_order_from_cart_clears_cart() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let customer = app.register("Lu", "lu@example.com").await;
    let a = app.create_product(&admin, json!({ "name": "Spoon", "price": 3.5, "stock": 10, "status": "active" })).await;
    let b = app.create_product(&admin, json!({ "name": "Fork", "price": 4.0, "stock": 10, "status": "active" })).await;

    app.post("/api/cart/items", Some(&customer), json!({ "product_id": a["id"], "quantity": 2 })).await;
    app.post("/api/cart/items", Some(&customer), json!({ "product_id": a["id"], "quantity": 1 })).await;
    let (status, cart) = app.post("/api/cart/items", Some(&customer), json!({ "product_id": b["id"] })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"].as_array().unwrap().len(), 2);
    assert_eq!(cart["item_count"], 4);
    assert_money(&cart["totals"]["subtotal"], 14.5);

    let (status, order) = app.post("/api/orders", Some(&customer), json!({ "shipping_address": address() })).await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["items"].as_array().unwrap().len(), 2);

    let (_, cart) = app.get("/api/cart", Some(&customer)).await;
    assert!(cart["items"].as_array().unwrap().is_empty());
    assert_eq!(app.stock_of(&admin, a["id"].as_str().unwrap()).await, 7);
}

#[tokio::test]
async fn test_cart_quantity_is_capped_by_stock() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let customer = app.register("Max", "max@example.com").await;
    let product = app.create_product(&admin, json!({ "name": "Plate", "price": 8.0, "stock": 2, "status": "active" })).await;
    let id = product["id"].as_str().unwrap();

    let (status, _) = app.post("/api/cart/items", Some(&customer), json!({ "product_id": id, "quantity": 3 })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.post("/api/cart/items", Some(&customer), json!({ "product_id": id, "quantity": 2 })).await;
    let item_uri = format!("/api/cart/items/{id}");
    let (status, _) = app.request(Method::PUT, &item_uri, Some(&customer), Some(json!({ "quantity": 5 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, cart) = app.request(Method::PUT, &item_uri, Some(&customer), Some(json!({ "quantity": 0 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(cart["items"].as_array().unwrap().is_empty());
    let (status, _) = app.request(Method::DELETE, &item_uri, Some(&customer), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_catalog_pagination_and_visibility() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    for i in 0..15 {
        app.create_product(&admin, json!({ "name": format!("Item {i}"), "price": 5.0 + f64::from(i), "stock": 1, "status": "active" }))
            .await;
    }
    app.create_product(&admin, json!({ "name": "Secret Draft Mug", "price": 9.0, "stock": 1 })).await;

    let (status, page) = app.get("/api/shop/products?page=2&limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["data"].as_array().unwrap().len(), 5);
    assert_eq!(page["pagination"]["total"], 15);
    assert_eq!(page["pagination"]["total_pages"], 2);

    let (_, clamped) = app.get("/api/shop/products?limit=500", None).await;
    assert_eq!(clamped["pagination"]["limit"], 100);

    let (_, cheap) = app.get("/api/shop/products?max_price=7&sort=price_asc", None).await;
    let names: Vec<&str> = cheap["data"].as_array().unwrap().iter().map(|p| p["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["Item 0", "Item 1", "Item 2"]);

    let (_, search) = app.get("/api/shop/products?search=secret", None).await;
    assert_eq!(search["pagination"]["total"], 0);
    let (_, admin_list) = app.get("/api/products?search=secret", Some(&admin)).await;
    assert_eq!(admin_list["pagination"]["total"], 1);

    let (status, _) = app.get("/api/shop/products/secret-draft-mug", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, detail) = app.get("/api/shop/products/item-3", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["name"], "Item 3");
}

#[tokio::test]
async fn test_payment_intent_and_webhook() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let customer = app.register("Ned", "ned@example.com").await;
    let product = app.create_product(&admin, json!({ "name": "Clock", "price": 20.0, "stock": 5, "status": "active" })).await;
    let (_, order) = app
        .post("/api/orders", Some(&customer), json!({ "items": [{ "product_id": product["id"], "quantity": 1 }], "shipping_address": address() }))
        .await;
    let order_id = order["id"].as_str().unwrap();

    let (status, intent) = app.post("/api/payments/intent", Some(&customer), json!({ "order_id": order_id })).await;
    assert_eq!(status, StatusCode::OK, "{intent}");
    let intent_id = intent["payment_intent_id"].as_str().unwrap().to_string();
    assert_eq!(intent["client_secret"], format!("{intent_id}_secret"));

    let (_, again) = app.post("/api/payments/intent", Some(&customer), json!({ "order_id": order_id })).await;
    assert_eq!(again["payment_intent_id"], intent_id.as_str());
    assert_eq!(app.gateway.created.lock().unwrap().len(), 1);

    let payload = json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": intent_id, "status": "succeeded", "amount": 3159, "currency": "usd" } }
    })
    .to_string();
    let webhook = |signature: String| {
        Request::builder()
            .method(Method::POST)
            .uri("/api/payments/webhook")
            .header("stripe-signature", signature)
            .body(Body::from(payload.clone()))
            .unwrap()
    };

    let (status, _) = app.send(webhook("t=1,v1=deadbeef".into())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let signature = sign_payload(payload.as_bytes(), WEBHOOK_SECRET, Utc::now().timestamp()).unwrap();
    let (status, body) = app.send(webhook(signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);

    let (_, paid) = app.get(&format!("/api/orders/{order_id}"), Some(&customer)).await;
    assert_eq!(paid["payment_status"], "paid");
    assert_eq!(paid["status"], "processing");
    let (_, payment) = app.get(&format!("/api/payments/order/{order_id}"), Some(&customer)).await;
    assert_eq!(payment["status"], "succeeded");

    let (status, _) = app.post("/api/payments/intent", Some(&customer), json!({ "order_id": order_id })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, cancelled) = app
        .request(Method::PATCH, &format!("/api/admin/orders/{order_id}/status"), Some(&admin), Some(json!({ "status": "cancelled" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["payment_status"], "refunded");
    assert_eq!(*app.gateway.refunds.lock().unwrap(), vec![intent_id]);
}

#[tokio::test]
async fn test_reviews_update_rating() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let ann = app.register("Ann", "ann@example.com").await;
    let bob = app.register("Bob", "bob@example.com").await;
    let product = app.create_product(&admin, json!({ "name": "Chair", "price": 80.0, "stock": 2, "status": "active" })).await;
    let id = product["id"].as_str().unwrap();

    let (status, _) = app.post("/api/reviews", Some(&ann), json!({ "product_id": id, "rating": 6, "comment": "Great" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, review) = app.post("/api/reviews", Some(&ann), json!({ "product_id": id, "rating": 5, "comment": "Great" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(review["author"], "Ann");
    let (status, _) = app.post("/api/reviews", Some(&ann), json!({ "product_id": id, "rating": 4, "comment": "Again" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    app.post("/api/reviews", Some(&bob), json!({ "product_id": id, "rating": 4, "comment": "Solid" })).await;

    let (_, detail) = app.get(&format!("/api/shop/products/{id}"), None).await;
    assert_eq!(detail["rating"]["count"], 2);
    assert_money(&detail["rating"]["average"], 4.5);

    let review_uri = format!("/api/reviews/{}", review["id"].as_str().unwrap());
    assert_eq!(app.request(Method::DELETE, &review_uri, Some(&bob), None).await.0, StatusCode::FORBIDDEN);
    assert_eq!(app.request(Method::DELETE, &review_uri, Some(&ann), None).await.0, StatusCode::NO_CONTENT);

    let (_, reviews) = app.get(&format!("/api/products/{id}/reviews"), None).await;
    assert_eq!(reviews["pagination"]["total"], 1);
}

#[tokio::test]
async fn test_wishlist_add_is_idempotent_and_moves_to_cart() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let customer = app.register("Oli", "oli@example.com").await;
    let product = app.create_product(&admin, json!({ "name": "Rug", "price": 50.0, "stock": 1, "status": "active" })).await;
    let id = product["id"].as_str().unwrap();

    app.post("/api/wishlist/items", Some(&customer), json!({ "product_id": id })).await;
    let (status, wishlist) = app.post("/api/wishlist/items", Some(&customer), json!({ "product_id": id })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wishlist["items"].as_array().unwrap().len(), 1);

    let (status, moved) = app.post(&format!("/api/wishlist/items/{id}/move-to-cart"), Some(&customer), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{moved}");
    assert!(moved["wishlist"]["items"].as_array().unwrap().is_empty());
    assert_eq!(moved["cart"]["items"][0]["quantity"], 1);

    let (status, _) = app.request(Method::DELETE, &format!("/api/wishlist/items/{id}"), Some(&customer), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_category_delete_refused_while_in_use() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (status, category) = app.post("/api/categories", Some(&admin), json!({ "name": "Home & Garden" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(category["slug"], "home-garden");
    let (status, _) = app.post("/api/categories", Some(&admin), json!({ "name": "Home & Garden" })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let category_id = category["id"].as_str().unwrap();
    let product = app
        .create_product(&admin, json!({ "name": "Hose", "price": 19.0, "stock": 3, "status": "active", "category_id": category_id }))
        .await;

    let (_, listed) = app.get("/api/shop/products?category=home-garden", None).await;
    assert_eq!(listed["pagination"]["total"], 1);
    let (_, categories) = app.get("/api/categories", None).await;
    assert_eq!(categories[0]["product_count"], 1);

    let uri = format!("/api/categories/{category_id}");
    assert_eq!(app.request(Method::DELETE, &uri, Some(&admin), None).await.0, StatusCode::CONFLICT);
    let product_uri = format!("/api/products/{}", product["id"].as_str().unwrap());
    assert_eq!(app.request(Method::DELETE, &product_uri, Some(&admin), None).await.0, StatusCode::NO_CONTENT);
    assert_eq!(app.request(Method::DELETE, &uri, Some(&admin), None).await.0, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_product_images_round_trip_as_bytes() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let product = app
        .create_product(
            &admin,
            json!({
                "name": "Poster", "price": 12.0, "stock": 1, "status": "active",
                "images": [{ "content_type": "image/png", "alt": "front", "data": "data:image/png;base64,iVBORw0KGgo=" }]
            }),
        )
        .await;
    let url = product["images"][0]["url"].as_str().unwrap().to_string();

    let response = app.router.clone().oneshot(Request::get(&url).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"\x89PNG\r\n\x1a\n");

    let (status, _) = app
        .post(&format!("/api/products/{}/images", product["id"].as_str().unwrap()), Some(&admin), json!({ "content_type": "text/plain", "data": "aGk=" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_stats_and_customers() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let customer = app.register("Pat", "pat@example.com").await;
    let product = app.create_product(&admin, json!({ "name": "Candle", "price": 10.0, "stock": 4, "status": "active" })).await;
    app.post("/api/orders", Some(&customer), json!({ "items": [{ "product_id": product["id"], "quantity": 1 }], "shipping_address": address() }))
        .await;

    let (status, stats) = app.get("/api/admin/stats", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_orders"], 1);
    assert_eq!(stats["orders_by_status"]["pending"], 1);
    assert_eq!(stats["customer_count"], 1);
    assert_eq!(stats["low_stock"][0]["name"], "Candle");
    assert_money(&stats["revenue"], 0.0);

    let (_, customers) = app.get("/api/admin/customers?search=pat", Some(&admin)).await;
    assert_eq!(customers["pagination"]["total"], 1);
    let customer_id = customers["data"][0]["id"].as_str().unwrap();
    let (_, detail) = app.get(&format!("/api/admin/customers/{customer_id}"), Some(&admin)).await;
    assert_eq!(detail["order_count"], 1);
    assert_eq!(detail["email"], "pat@example.com");
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_profile_update_and_avatar() {
    let app = TestApp::new().await;
    let token = app.register("Quinn", "quinn@example.com").await;

    let (status, profile) = app
        .request(
            Method::PUT,
            "/api/users/me",
            Some(&token),
            Some(json!({
                "phone": "555-0100",
                "default_address": address(),
                "notifications": { "order_updates": false, "promotions": true, "newsletter": false }
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{profile}");
    assert_eq!(profile["phone"], "555-0100");
    assert_eq!(profile["notifications"]["order_updates"], false);
    assert!(profile["avatar_url"].is_null());

    let (status, profile) = app
        .request(Method::PUT, "/api/users/me/avatar", Some(&token), Some(json!({ "content_type": "image/gif", "data": "R0lGODlh" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let avatar_url = profile["avatar_url"].as_str().unwrap().to_string();

    let response = app.router.clone().oneshot(Request::get(&avatar_url).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/gif");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"GIF89a");

    // Orders placed without an address fall back to the saved one; no
    // confirmation mail goes out once order updates are switched off.
    let admin = app.admin_token().await;
    let product = app.create_product(&admin, json!({ "name": "Frame", "price": 9.0, "stock": 2, "status": "active" })).await;
    let (status, order) = app.post("/api/orders", Some(&token), json!({ "items": [{ "product_id": product["id"], "quantity": 1 }] })).await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["shipping_address"]["city"], "Springfield");
    assert_eq!(app.mailer.subjects_for("quinn@example.com").len(), 1);
}

impl TestApp {
    async fn place_order(&self, customer: &str, product_id: &Value, quantity: u32) -> String {
        let (status, order) = self
            .post("/api/orders", Some(customer), json!({ "items": [{ "product_id": product_id, "quantity": quantity }], "shipping_address": address() }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{order}");
        order["id"].as_str().unwrap().to_string()
    }

    async fn start_payment(&self, customer: &str, order_id: &str) -> String {
        let (status, intent) = self.post("/api/payments/intent", Some(customer), json!({ "order_id": order_id })).await;
        assert_eq!(status, StatusCode::OK, "{intent}");
        intent["payment_intent_id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_demoted_admin_token_loses_admin_access() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    app.register("Rae", "rae@example.com").await;
    let (_, customers) = app.get("/api/admin/customers?search=rae", Some(&admin)).await;
    let role_uri = format!("/api/admin/customers/{}/role", customers["data"][0]["id"].as_str().unwrap());

    let (status, _) = app.request(Method::PATCH, &role_uri, Some(&admin), Some(json!({ "role": "admin" }))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, login) = app.post("/api/auth/login", None, json!({ "email": "rae@example.com", "password": "correct-horse" })).await;
    let promoted = login["token"].as_str().unwrap().to_string();
    assert_eq!(app.get("/api/admin/stats", Some(&promoted)).await.0, StatusCode::OK);

    let (status, _) = app.request(Method::PATCH, &role_uri, Some(&admin), Some(json!({ "role": "customer" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.get("/api/admin/stats", Some(&promoted)).await.0, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_payment_after_cancel_is_refunded() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let customer = app.register("Sam", "sam@example.com").await;
    let product = app.create_product(&admin, json!({ "name": "Kettle", "price": 30.0, "stock": 2, "status": "active" })).await;
    let order_id = app.place_order(&customer, &product["id"], 1).await;
    let intent_id = app.start_payment(&customer, &order_id).await;

    let (status, _) = app.post(&format!("/api/orders/{order_id}/cancel"), Some(&customer), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(*app.gateway.cancelled.lock().unwrap(), vec![intent_id.clone()]);
    let (_, payment) = app.get(&format!("/api/payments/order/{order_id}"), Some(&customer)).await;
    assert_eq!(payment["status"], "canceled");

    let (status, _) = app.send(signed_webhook("payment_intent.succeeded", json!({ "id": intent_id, "status": "succeeded", "amount": 3000, "currency": "usd" }))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, order) = app.get(&format!("/api/orders/{order_id}"), Some(&customer)).await;
    assert_eq!(order["status"], "cancelled");
    assert_eq!(order["payment_status"], "refunded");
    assert_eq!(*app.gateway.refunds.lock().unwrap(), vec![intent_id.clone()]);
    assert_eq!(app.stock_of(&admin, product["id"].as_str().unwrap()).await, 2);

    app.send(signed_webhook("payment_intent.succeeded", json!({ "id": intent_id, "status": "succeeded", "amount": 3000, "currency": "usd" }))).await;
    assert_eq!(app.gateway.refunds.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_intent_in_flight_is_not_replaced() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let customer = app.register("Tia", "tia@example.com").await;
    let product = app.create_product(&admin, json!({ "name": "Lamp", "price": 45.0, "stock": 2, "status": "active" })).await;
    let order_id = app.place_order(&customer, &product["id"], 1).await;
    let intent_id = app.start_payment(&customer, &order_id).await;

    for status in ["succeeded", "processing"] {
        app.gateway.set_status(&intent_id, status);
        let (code, _) = app.post("/api/payments/intent", Some(&customer), json!({ "order_id": order_id })).await;
        assert_eq!(code, StatusCode::CONFLICT, "{status}");
    }
    assert_eq!(app.gateway.created.lock().unwrap().len(), 1);

    app.gateway.set_status(&intent_id, "canceled");
    let (code, _) = app.post("/api/payments/intent", Some(&customer), json!({ "order_id": order_id })).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(app.gateway.created.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_payment_and_unmatched_webhooks() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let customer = app.register("Uma", "uma@example.com").await;
    let product = app.create_product(&admin, json!({ "name": "Rug", "price": 60.0, "stock": 2, "status": "active" })).await;
    let order_id = app.place_order(&customer, &product["id"], 1).await;
    let intent_id = app.start_payment(&customer, &order_id).await;

    let failed = json!({
        "id": intent_id,
        "status": "requires_payment_method",
        "amount": 6480,
        "currency": "usd",
        "last_payment_error": { "message": "Your card was declined." }
    });
    let (status, body) = app.send(signed_webhook("payment_intent.payment_failed", failed)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    let (_, payment) = app.get(&format!("/api/payments/order/{order_id}"), Some(&customer)).await;
    assert_eq!(payment["status"], "failed");
    assert_eq!(payment["failure_message"], "Your card was declined.");
    let (_, order) = app.get(&format!("/api/orders/{order_id}"), Some(&customer)).await;
    assert_eq!(order["payment_status"], "failed");
    assert_eq!(order["status"], "pending");

    let (status, body) = app.send(signed_webhook("charge.dispute.created", json!({ "id": "dp_1" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    let (status, body) = app.send(signed_webhook("payment_intent.succeeded", json!({ "id": "pi_unknown", "status": "succeeded", "amount": 100, "currency": "usd" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
}

#[tokio::test]
async fn test_related_products_share_the_category() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (_, kitchen) = app.post("/api/categories", Some(&admin), json!({ "name": "Kitchen" })).await;
    let (_, garden) = app.post("/api/categories", Some(&admin), json!({ "name": "Garden" })).await;
    let mut kitchen_ids = Vec::new();
    for n in 0..6 {
        let product = app
            .create_product(&admin, json!({ "name": format!("Pan {n}"), "price": 15.0, "stock": 1, "status": "active", "category_id": kitchen["id"] }))
            .await;
        kitchen_ids.push(product["id"].as_str().unwrap().to_string());
    }
    app.create_product(&admin, json!({ "name": "Spade", "price": 25.0, "stock": 1, "status": "active", "category_id": garden["id"] }))
        .await;

    let (status, related) = app.get(&format!("/api/shop/products/{}/related", kitchen_ids[0]), None).await;
    assert_eq!(status, StatusCode::OK);
    let related = related.as_array().unwrap();
    assert_eq!(related.len(), 4);
    for product in related {
        let id = product["id"].as_str().unwrap();
        assert_ne!(id, kitchen_ids[0]);
        assert!(kitchen_ids.iter().any(|k| k == id), "{product}");
    }
}

#[tokio::test]
async fn test_category_parent_cycles_are_rejected() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (_, a) = app.post("/api/categories", Some(&admin), json!({ "name": "Outdoor" })).await;
    let (_, b) = app.post("/api/categories", Some(&admin), json!({ "name": "Camping", "parent_id": a["id"] })).await;
    let (_, c) = app.post("/api/categories", Some(&admin), json!({ "name": "Tents", "parent_id": b["id"] })).await;
    let a_uri = format!("/api/categories/{}", a["id"].as_str().unwrap());

    for descendant in [&b, &c] {
        let (status, body) = app.request(Method::PUT, &a_uri, Some(&admin), Some(json!({ "parent_id": descendant["id"] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    }
    let (status, _) = app.request(Method::PUT, &a_uri, Some(&admin), Some(json!({ "parent_id": a["id"] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, other) = app.post("/api/categories", Some(&admin), json!({ "name": "Sports" })).await;
    let (status, moved) = app.request(Method::PUT, &a_uri, Some(&admin), Some(json!({ "parent_id": other["id"] }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["parent_id"], other["id"]);
}

