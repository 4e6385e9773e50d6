use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use order_dispatch::api::rest::router;
use order_dispatch::config::{Config, PaymentConfig};
use order_dispatch::engine::queue::MatchRequest;
use order_dispatch::geo::GeoPoint;
use order_dispatch::integrations::identity::JwtIdentityProvider;
use order_dispatch::models::catalog::{MenuItem, Restaurant};
use order_dispatch::models::driver::{DriverProfile, VehicleType, VerificationStatus};
use order_dispatch::models::identity::Role;
use order_dispatch::state::AppState;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

const LAGOS_KITCHEN: GeoPoint = GeoPoint {
    lat: 6.5744,
    lng: 3.4292,
};
const ABUJA_KITCHEN: GeoPoint = GeoPoint {
    lat: 9.0765,
    lng: 7.3986,
};

struct TestApp {
    app: Router,
    state: Arc<AppState>,
    tokens: JwtIdentityProvider,
    _match_rx: mpsc::Receiver<MatchRequest>,
}

impl TestApp {
    fn new() -> Self {
        let config = Config {
            payments: PaymentConfig {
                settlement_delay_ms: 0,
                ..PaymentConfig::default()
            },
            ..Config::default()
        };
        let (state, match_rx) = AppState::new(&config, Arc::new(JwtIdentityProvider::new("test-secret")));
        let state = Arc::new(state);

        Self {
            app: router(Arc::clone(&state)),
            state,
            tokens: JwtIdentityProvider::new("test-secret"),
            _match_rx: match_rx,
        }
    }

    fn token(&self, user_id: Uuid, role: Role) -> String {
        self.tokens.issue(user_id, role).unwrap()
    }

    /// Adds a restaurant with a 1099 and a 399 item; returns (restaurant, items).
    fn restaurant_at(&self, owner_id: Uuid, location: GeoPoint) -> (Uuid, Uuid, Uuid) {
        let restaurant_id = Uuid::new_v4();
        self.state.store.insert_restaurant(Restaurant {
            id: restaurant_id,
            owner_id,
            name: "Mama Put Kitchen".to_string(),
            address: "12 Marina Road".to_string(),
            location,
        });

        let mut ids = [Uuid::nil(); 2];
        for (slot, (name, price)) in ids.iter_mut().zip([("Jollof Rice", 1099), ("Plantain", 399)]) {
            *slot = Uuid::new_v4();
            self.state.store.insert_menu_item(MenuItem {
                id: *slot,
                restaurant_id,
                name: name.to_string(),
                price,
                available: true,
            });
        }
        (restaurant_id, ids[0], ids[1])
    }

    fn verified_driver(&self, user_id: Uuid, location: GeoPoint) -> Uuid {
        let now = Utc::now();
        self.state
            .store
            .insert_driver(DriverProfile {
                id: Uuid::new_v4(),
                user_id,
                vehicle_type: VehicleType::Motorcycle,
                vehicle_plate: "LND-482-KJ".to_string(),
                license_number: "LAG-DL-100233".to_string(),
                verification: VerificationStatus::Verified,
                is_online: true,
                location: Some(location),
                location_updated_at: Some(now),
                created_at: now,
            })
            .unwrap()
            .id
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }
}

fn authed(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"));

    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn advance(test: &TestApp, order_id: &str, owner_token: &str, statuses: &[&str]) {
    for status in statuses {
        let (code, body) = test
            .send(authed(
                "PATCH",
                &format!("/orders/{order_id}/status"),
                owner_token,
                Some(json!({ "status": status })),
            ))
            .await;
        assert_eq!(code, StatusCode::OK, "moving to {status}: {body}");
        assert_eq!(body["status"], *status);
    }
}

#[tokio::test]
async fn health_returns_ok() {
    let test = TestApp::new();
    let (status, body) = test.send(get_request("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["orders"], 0);
    assert_eq!(body["connections"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let test = TestApp::new();
    let response = test.app.clone().oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(body.contains("orders_placed_total"));
}

#[tokio::test]
async fn requests_without_token_are_rejected() {
    let test = TestApp::new();
    let (status, body) = test.send(get_request("/orders")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn websocket_requires_a_valid_token() {
    let test = TestApp::new();

    let (status, body) = test.send(get_request("/ws")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = test.send(get_request("/ws?token=not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pickup_order_totals_line_items() {
    let test = TestApp::new();
    let (restaurant_id, jollof, plantain) = test.restaurant_at(Uuid::new_v4(), LAGOS_KITCHEN);
    let customer = test.token(Uuid::new_v4(), Role::Customer);

    let (status, body) = test
        .send(authed(
            "POST",
            "/orders",
            &customer,
            Some(json!({
                "restaurant_id": restaurant_id,
                "items": [
                    { "menu_item_id": jollof, "quantity": 2 },
                    { "menu_item_id": plantain, "quantity": 1 }
                ]
            })),
        ))
        .await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["subtotal"], 2597);
    assert_eq!(body["delivery_fee"], 0);
    assert_eq!(body["total"], 2597);
    assert_eq!(body["status"], "PENDING");
    assert!(body["delivery_id"].is_null());

    let (status, mine) = test.send(authed("GET", "/orders", &customer, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn out_of_range_address_creates_nothing() {
    let test = TestApp::new();
    let (restaurant_id, jollof, _) = test.restaurant_at(Uuid::new_v4(), ABUJA_KITCHEN);
    let customer = test.token(Uuid::new_v4(), Role::Customer);

    let (status, body) = test
        .send(authed(
            "POST",
            "/orders",
            &customer,
            Some(json!({
                "restaurant_id": restaurant_id,
                "items": [{ "menu_item_id": jollof, "quantity": 1 }],
                "delivery_address": "4 Awolowo Road, Ikoyi, Lagos"
            })),
        ))
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "OUT_OF_RANGE");
    assert!(test.state.store.orders.is_empty());
    assert!(test.state.store.deliveries.is_empty());
}

#[tokio::test]
async fn unknown_menu_item_is_rejected() {
    let test = TestApp::new();
    let (restaurant_id, _, _) = test.restaurant_at(Uuid::new_v4(), LAGOS_KITCHEN);
    let customer = test.token(Uuid::new_v4(), Role::Customer);

    let (status, body) = test
        .send(authed(
            "POST",
            "/orders",
            &customer,
            Some(json!({
                "restaurant_id": restaurant_id,
                "items": [{ "menu_item_id": Uuid::new_v4(), "quantity": 1 }]
            })),
        ))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "ITEM_NOT_FOUND");
}

#[tokio::test]
async fn customer_cannot_cancel_once_preparing_but_owner_can() {
    let test = TestApp::new();
    let owner_id = Uuid::new_v4();
    let (restaurant_id, jollof, _) = test.restaurant_at(owner_id, LAGOS_KITCHEN);
    let customer = test.token(Uuid::new_v4(), Role::Customer);
    let owner = test.token(owner_id, Role::Kitchen);

    let (_, order) = test
        .send(authed(
            "POST",
            "/orders",
            &customer,
            Some(json!({
                "restaurant_id": restaurant_id,
                "items": [{ "menu_item_id": jollof, "quantity": 1 }]
            })),
        ))
        .await;
    let order_id = order["id"].as_str().unwrap().to_string();

    advance(&test, &order_id, &owner, &["CONFIRMED", "PREPARING"]).await;

    let (status, body) = test
        .send(authed("DELETE", &format!("/orders/{order_id}"), &customer, None))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, body) = test
        .send(authed("DELETE", &format!("/orders/{order_id}"), &owner, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CANCELLED");
    assert_eq!(body["total"], body["subtotal"].as_i64().unwrap() + body["delivery_fee"].as_i64().unwrap());

    let (status, body) = test
        .send(authed("DELETE", &format!("/orders/{order_id}"), &owner, None))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_TERMINAL");
}

#[tokio::test]
async fn skipping_a_status_is_rejected() {
    let test = TestApp::new();
    let owner_id = Uuid::new_v4();
    let (restaurant_id, jollof, _) = test.restaurant_at(owner_id, LAGOS_KITCHEN);
    let customer = test.token(Uuid::new_v4(), Role::Customer);
    let owner = test.token(owner_id, Role::Kitchen);

    let (_, order) = test
        .send(authed(
            "POST",
            "/orders",
            &customer,
            Some(json!({
                "restaurant_id": restaurant_id,
                "items": [{ "menu_item_id": jollof, "quantity": 1 }]
            })),
        ))
        .await;
    let order_id = order["id"].as_str().unwrap();

    let (status, body) = test
        .send(authed(
            "PATCH",
            &format!("/orders/{order_id}/status"),
            &owner,
            Some(json!({ "status": "READY" })),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_TRANSITION");

    let (status, _) = test
        .send(authed(
            "PATCH",
            &format!("/orders/{order_id}/status"),
            &customer,
            Some(json!({ "status": "CONFIRMED" })),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn delivery_flow_moves_order_to_delivered() {
    let test = TestApp::new();
    let owner_id = Uuid::new_v4();
    let driver_user = Uuid::new_v4();
    let (restaurant_id, jollof, _) = test.restaurant_at(owner_id, LAGOS_KITCHEN);
    test.verified_driver(driver_user, LAGOS_KITCHEN);
    let customer = test.token(Uuid::new_v4(), Role::Customer);
    let owner = test.token(owner_id, Role::Kitchen);
    let driver = test.token(driver_user, Role::Driver);

    let (status, order) = test
        .send(authed(
            "POST",
            "/orders",
            &customer,
            Some(json!({
                "restaurant_id": restaurant_id,
                "items": [{ "menu_item_id": jollof, "quantity": 1 }],
                "delivery_address": "4 Awolowo Road, Ikoyi, Lagos"
            })),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    let fee = order["delivery_fee"].as_i64().unwrap();
    assert!((500..=2000).contains(&fee));
    assert_eq!(order["total"].as_i64().unwrap(), 1099 + fee);

    let order_id = order["id"].as_str().unwrap().to_string();
    let delivery_id = order["delivery_id"].as_str().unwrap().to_string();

    let (status, available) = test
        .send(authed("GET", "/drivers/orders/available", &driver, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(available[0]["id"], delivery_id.as_str());

    let (status, delivery) = test
        .send(authed("POST", &format!("/drivers/orders/{delivery_id}/accept"), &driver, None))
        .await;
    assert_eq!(status, StatusCode::OK, "{delivery}");
    assert_eq!(delivery["status"], "ASSIGNED");

    let (status, body) = test
        .send(authed("POST", &format!("/drivers/orders/{delivery_id}/accept"), &driver, None))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    advance(&test, &order_id, &owner, &["CONFIRMED", "PREPARING", "READY"]).await;

    let (status, body) = test
        .send(authed(
            "PATCH",
            &format!("/orders/{order_id}/status"),
            &owner,
            Some(json!({ "status": "OUT_FOR_DELIVERY" })),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["code"], "INVALID_TRANSITION");

    for (delivery_status, order_status) in [("IN_TRANSIT", "OUT_FOR_DELIVERY"), ("DELIVERED", "DELIVERED")] {
        let (status, body) = test
            .send(authed(
                "PUT",
                &format!("/drivers/orders/{delivery_id}/status"),
                &driver,
                Some(json!({ "status": delivery_status })),
            ))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"], delivery_status);

        let (_, order) = test
            .send(authed("GET", &format!("/orders/{order_id}"), &customer, None))
            .await;
        assert_eq!(order["status"], order_status);
    }
}

#[tokio::test]
async fn another_courier_cannot_move_a_claimed_delivery() {
    let test = TestApp::new();
    let owner_id = Uuid::new_v4();
    let (restaurant_id, jollof, _) = test.restaurant_at(owner_id, LAGOS_KITCHEN);
    let holder_user = Uuid::new_v4();
    let rival_user = Uuid::new_v4();
    test.verified_driver(holder_user, LAGOS_KITCHEN);
    test.verified_driver(rival_user, LAGOS_KITCHEN);
    let customer = test.token(Uuid::new_v4(), Role::Customer);
    let owner = test.token(owner_id, Role::Kitchen);
    let holder = test.token(holder_user, Role::Driver);
    let rival = test.token(rival_user, Role::Driver);

    let (_, order) = test
        .send(authed(
            "POST",
            "/orders",
            &customer,
            Some(json!({
                "restaurant_id": restaurant_id,
                "items": [{ "menu_item_id": jollof, "quantity": 1 }],
                "delivery_address": "4 Awolowo Road, Ikoyi, Lagos"
            })),
        ))
        .await;
    let order_id = order["id"].as_str().unwrap().to_string();
    let delivery_id = order["delivery_id"].as_str().unwrap().to_string();

    let (status, _) = test
        .send(authed("POST", &format!("/drivers/orders/{delivery_id}/accept"), &holder, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    advance(&test, &order_id, &owner, &["CONFIRMED", "PREPARING", "READY"]).await;

    let (status, body) = test
        .send(authed(
            "PUT",
            &format!("/drivers/orders/{delivery_id}/status"),
            &rival,
            Some(json!({ "status": "IN_TRANSIT" })),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    assert_eq!(body["code"], "NOT_YOUR_DELIVERY");

    let delivery_uuid: Uuid = delivery_id.parse().unwrap();
    let delivery = test.state.store.delivery(&delivery_uuid).unwrap();
    assert_eq!(delivery.status.as_str(), "ASSIGNED");
    let (_, order) = test
        .send(authed("GET", &format!("/orders/{order_id}"), &customer, None))
        .await;
    assert_eq!(order["status"], "READY");
}

#[tokio::test]
async fn courier_cannot_start_transit_before_food_is_ready() {
    let test = TestApp::new();
    let driver_user = Uuid::new_v4();
    let (restaurant_id, jollof, _) = test.restaurant_at(Uuid::new_v4(), LAGOS_KITCHEN);
    test.verified_driver(driver_user, LAGOS_KITCHEN);
    let customer = test.token(Uuid::new_v4(), Role::Customer);
    let driver = test.token(driver_user, Role::Driver);

    let (_, order) = test
        .send(authed(
            "POST",
            "/orders",
            &customer,
            Some(json!({
                "restaurant_id": restaurant_id,
                "items": [{ "menu_item_id": jollof, "quantity": 1 }],
                "delivery_address": "4 Awolowo Road, Ikoyi, Lagos"
            })),
        ))
        .await;
    let delivery_id = order["delivery_id"].as_str().unwrap().to_string();

    test.send(authed("POST", &format!("/drivers/orders/{delivery_id}/accept"), &driver, None))
        .await;
    let (status, body) = test
        .send(authed(
            "PUT",
            &format!("/drivers/orders/{delivery_id}/status"),
            &driver,
            Some(json!({ "status": "IN_TRANSIT" })),
        ))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_TRANSITION");
    let delivery = test
        .state
        .store
        .delivery(&delivery_id.parse().unwrap())
        .unwrap();
    assert_eq!(delivery.status.as_str(), "ASSIGNED");
}

#[tokio::test]
async fn unknown_settlement_reference_is_not_found() {
    let test = TestApp::new();

    let request = Request::builder()
        .method("POST")
        .uri("/payments/webhook")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "reference": "REF-0-missing", "status": "SUCCESS" }).to_string(),
        ))
        .unwrap();
    let (status, body) = test.send(request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn repeated_success_callback_is_idempotent() {
    let test = TestApp::new();
    let customer_id = Uuid::new_v4();
    let (restaurant_id, jollof, _) = test.restaurant_at(Uuid::new_v4(), LAGOS_KITCHEN);
    let customer = test.token(customer_id, Role::Customer);

    let (_, order) = test
        .send(authed(
            "POST",
            "/orders",
            &customer,
            Some(json!({
                "restaurant_id": restaurant_id,
                "items": [{ "menu_item_id": jollof, "quantity": 1 }]
            })),
        ))
        .await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, payment) = test
        .send(authed(
            "POST",
            "/payments/initiate",
            &customer,
            Some(json!({ "order_id": order_id, "method": "USSD" })),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{payment}");
    assert_eq!(payment["status"], "PENDING");
    assert_eq!(payment["instructions"], "Dial *737*000*10# to pay");
    let reference = payment["reference"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let request = Request::builder()
            .method("POST")
            .uri("/payments/webhook")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({ "reference": reference, "status": "SUCCESS" }).to_string(),
            ))
            .unwrap();
        let (status, body) = test.send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "SUCCESS");
    }

    let (status, body) = test
        .send(authed("GET", &format!("/payments/{order_id}"), &customer, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "SUCCESS");

    let (_, order) = test
        .send(authed("GET", &format!("/orders/{order_id}"), &customer, None))
        .await;
    assert_eq!(order["status"], "CONFIRMED");
}

#[tokio::test]
async fn driver_registration_and_verification() {
    let test = TestApp::new();
    let driver_user = Uuid::new_v4();
    let driver = test.token(driver_user, Role::Driver);
    let admin = test.token(Uuid::new_v4(), Role::Admin);

    let (status, profile) = test
        .send(authed(
            "POST",
            "/drivers/register",
            &driver,
            Some(json!({
                "vehicle_type": "BICYCLE",
                "vehicle_plate": "BK-001",
                "license_number": "LAG-DL-2"
            })),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{profile}");
    assert_eq!(profile["verification"], "PENDING");
    let driver_id = profile["id"].as_str().unwrap().to_string();

    let (status, _) = test
        .send(authed(
            "POST",
            "/drivers/register",
            &driver,
            Some(json!({
                "vehicle_type": "BICYCLE",
                "vehicle_plate": "BK-001",
                "license_number": "LAG-DL-2"
            })),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = test
        .send(authed(
            "PATCH",
            &format!("/admin/drivers/{driver_id}/verification"),
            &driver,
            Some(json!({ "status": "VERIFIED" })),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, profile) = test
        .send(authed(
            "PATCH",
            &format!("/admin/drivers/{driver_id}/verification"),
            &admin,
            Some(json!({ "status": "VERIFIED" })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["verification"], "VERIFIED");

    let (status, profile) = test
        .send(authed(
            "PUT",
            "/drivers/me/status",
            &driver,
            Some(json!({ "is_online": true, "lat": 6.57, "lng": 3.43 })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["is_online"], true);
    assert_eq!(profile["location"]["lat"], 6.57);
}
