//! HTTP integration tests against the in-memory backend.
//!
//! Each test binds the full application to an ephemeral port and drives it
//! with `reqwest`, the way the auth proxy and the mobile clients would.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use serde_json::{Value, json};

use ecopoints_ledger::app_state::AppState;
use ecopoints_ledger::build_app;
use ecopoints_ledger::config::LedgerConfig;
use ecopoints_ledger::domain::{Clock, ManualClock};
use ecopoints_ledger::persistence::{InMemoryAttemptCache, InMemoryLedgerStore};

struct TestServer {
    base: String,
    store: InMemoryLedgerStore,
    clock: Arc<ManualClock>,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let store = InMemoryLedgerStore::new();
        let clock = Arc::new(ManualClock::default());
        let mut config = LedgerConfig::in_memory();
        config.session_ttl_secs = 60;
        let state = AppState::new(
            Arc::new(store.clone()),
            Arc::new(InMemoryAttemptCache::new()),
            Arc::clone(&clock) as Arc<dyn Clock>,
            &config,
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, build_app(state))
                .await
                .expect("server runs");
        });
        Self {
            base: format!("http://{addr}"),
            store,
            clock,
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, path: &str, role: &str, id: i64, body: &Value) -> (u16, Value) {
        let response = self
            .client
            .post(format!("{}{path}", self.base))
            .header("x-caller-id", id.to_string())
            .header("x-caller-role", role)
            .json(body)
            .send()
            .await
            .expect("request sent");
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }
}

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::start().await;
    let response = server
        .client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .expect("request sent");
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store_reachable"], true);
}

#[tokio::test]
async fn direct_redemption_happy_path_and_shortfall() {
    let server = TestServer::start().await;
    let user = server.store.seed_user("ana", 500).await;
    let poor = server.store.seed_user("luis", 100).await;
    let shop = server.store.seed_store("Eco Market").await;
    let product = server.store.seed_product(shop, "Tote bag", 150, 5).await;

    let (status, body) = server
        .post(
            "/api/v1/redemptions",
            "user",
            user.get(),
            &json!({ "product_id": product.get(), "quantity": 2 }),
        )
        .await;
    assert_eq!(status, 201, "{body}");
    assert_eq!(body["new_balance"], 200);
    assert_eq!(body["remaining_stock"], 3);
    assert_eq!(body["redemption"]["points_spent"], 300);

    let (status, body) = server
        .post(
            "/api/v1/redemptions",
            "user",
            poor.get(),
            &json!({ "product_id": product.get(), "quantity": 1 }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["kind"], "insufficient_points");
    assert_eq!(server.store.product(product).await.expect("product").stock, 3);
}

#[tokio::test]
async fn missing_caller_headers_are_rejected() {
    let server = TestServer::start().await;
    let response = server
        .client
        .post(format!("{}/api/v1/redemptions", server.base))
        .json(&json!({ "product_id": 1 }))
        .send()
        .await
        .expect("request sent");
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn qr_redemption_session_round_trip() {
    let server = TestServer::start().await;
    let user = server.store.seed_user("ana", 500).await;
    let shop = server.store.seed_store("Eco Market").await;
    let product = server.store.seed_product(shop, "Tote bag", 150, 5).await;

    let (status, session) = server
        .post(
            "/api/v1/sessions/redemption",
            "store",
            shop.get(),
            &json!({ "product_id": product.get(), "quantity": 2 }),
        )
        .await;
    assert_eq!(status, 201, "{session}");
    assert_eq!(session["state"], "PENDING");
    assert_eq!(session["points_required"], 300);
    let token = session["id"].as_str().expect("token").to_string();
    let confirm_path = format!("/api/v1/sessions/redemption/{token}/confirm");
    let claim = json!({ "store_id": shop.get(), "product_id": product.get(), "quantity": 2 });

    let (status, body) = server.post(&confirm_path, "user", user.get(), &claim).await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["session"]["state"], "CONFIRMED");
    assert_eq!(body["receipt"]["new_balance"], 200);

    let (status, body) = server.post(&confirm_path, "user", user.get(), &claim).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["kind"], "session_not_pending");
}

#[tokio::test]
async fn expired_qr_session_answers_gone() {
    let server = TestServer::start().await;
    let user = server.store.seed_user("ana", 500).await;
    let shop = server.store.seed_store("Eco Market").await;
    let glass = server.store.seed_object_type("Glass", 10.0).await;

    let (status, session) = server
        .post(
            "/api/v1/sessions/recycling",
            "store",
            shop.get(),
            &json!({ "object_type_id": glass.get(), "weight": 3.7 }),
        )
        .await;
    assert_eq!(status, 201, "{session}");
    assert_eq!(session["points_required"], 37);
    let token = session["id"].as_str().expect("token").to_string();

    server.clock.advance(chrono::Duration::minutes(2));
    let (status, body) = server
        .post(
            &format!("/api/v1/sessions/recycling/{token}/confirm"),
            "user",
            user.get(),
            &json!({ "object_type_id": glass.get(), "weight": 3.7 }),
        )
        .await;
    assert_eq!(status, 410, "{body}");
    assert_eq!(body["session"]["state"], "EXPIRED");
    assert!(body["receipt"].is_null());
    assert_eq!(server.store.user(user).await.expect("user").points_balance, 500);
}

#[tokio::test]
async fn booking_overlap_over_http() {
    let server = TestServer::start().await;
    let guide_user = server.store.seed_user("guia", 0).await;
    let client_user = server.store.seed_user("cliente", 0).await;
    let guide = server.store.seed_guide_profile(guide_user).await;
    let client = server.store.seed_client_profile(client_user).await;

    let book = |start: &str, end: &str| {
        json!({
            "guide_profile_id": guide.get(),
            "client_profile_id": client.get(),
            "start_time": start,
            "end_time": end,
            "base_amount": "100.00",
        })
    };

    let (status, first) = server
        .post(
            "/api/v1/reservations",
            "user",
            client_user.get(),
            &book("2025-06-01T10:00:00Z", "2025-06-01T11:00:00Z"),
        )
        .await;
    assert_eq!(status, 201, "{first}");
    assert_eq!(first["state"], "Pendiente");
    assert_eq!(first["fees"]["total_amount"], "102.50");

    let (status, body) = server
        .post(
            "/api/v1/reservations",
            "user",
            client_user.get(),
            &book("2025-06-01T10:30:00Z", "2025-06-01T11:30:00Z"),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["kind"], "overlap_conflict");

    let (status, _) = server
        .post(
            "/api/v1/reservations",
            "user",
            client_user.get(),
            &book("2025-06-01T11:00:00Z", "2025-06-01T12:00:00Z"),
        )
        .await;
    assert_eq!(status, 201);

    let id = first["id"].as_i64().expect("id");
    let (status, accepted) = server
        .post(
            &format!("/api/v1/reservations/{id}/accept"),
            "user",
            guide_user.get(),
            &json!({}),
        )
        .await;
    assert_eq!(status, 200, "{accepted}");
    assert_eq!(accepted["state"], "Confirmada");
}

#[tokio::test]
async fn login_lockout_over_http() {
    let server = TestServer::start().await;
    let attempt = json!({ "email": "ana@mail.com", "ip": "10.0.0.1" });

    for _ in 0..5 {
        let (status, _) = server
            .post("/api/v1/login-attempts/failure", "service", 0, &attempt)
            .await;
        assert_eq!(status, 200);
    }
    let (status, body) = server
        .post("/api/v1/login-attempts/check", "service", 0, &attempt)
        .await;
    assert_eq!(status, 429);
    assert_eq!(body["error"]["kind"], "rate_limited");
}

#[tokio::test]
async fn login_attempts_require_the_auth_service() {
    let server = TestServer::start().await;
    let attempt = json!({ "email": "ana@mail.com", "ip": "10.0.0.1" });

    for _ in 0..5 {
        let (status, _) = server
            .post("/api/v1/login-attempts/failure", "service", 0, &attempt)
            .await;
        assert_eq!(status, 200);
    }

    let anonymous = server
        .client
        .post(format!("{}/api/v1/login-attempts/success", server.base))
        .json(&attempt)
        .send()
        .await
        .expect("request sent");
    assert_eq!(anonymous.status().as_u16(), 403);

    let (status, body) = server
        .post("/api/v1/login-attempts/success", "user", 7, &attempt)
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["kind"], "forbidden");

    // The lockout survives both rejected resets.
    let (status, _) = server
        .post("/api/v1/login-attempts/check", "service", 0, &attempt)
        .await;
    assert_eq!(status, 429);
}
