use std::sync::Arc;
use std::time::Duration;

use altis_api::{app, metrics::ApiMetrics, middleware::auth::CustomerClaims, stream::FanoutSink, AppState, AuthConfig};
use altis_core::{CabinCapacities, SystemClock};
use altis_seating::{SeatingContext, SeatingPolicy};
use altis_store::{InMemoryHoldStore, InMemoryInventory, InMemorySeatStore};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test-secret";

async fn seeded() -> (Router, Uuid) {
    let (sse_tx, _) = tokio::sync::broadcast::channel(16);
    let ctx = SeatingContext {
        seats: Arc::new(InMemorySeatStore::new()),
        holds: Arc::new(InMemoryHoldStore::new()),
        inventory: Arc::new(InMemoryInventory::new()),
        events: Arc::new(FanoutSink::new(None, sse_tx.clone())),
        clock: Arc::new(SystemClock),
        policy: SeatingPolicy::default(),
    };
    let state = AppState::new(
        ctx,
        Duration::from_secs(30),
        sse_tx,
        AuthConfig {
            secret: SECRET.to_string(),
            expiration: 3600,
        },
        Arc::new(ApiMetrics::new().unwrap()),
    );

    let capacities = CabinCapacities {
        first: 4,
        business: 8,
        economy: 60,
    };
    let flight = state.flights.publish("AL310", capacities).await.unwrap();
    (app(state), flight.id)
}

fn bearer(role: &str, sub: &str) -> String {
    let claims = CustomerClaims {
        sub: sub.to_string(),
        email: None,
        role: role.to_string(),
        exp: (Utc::now().timestamp() + 600) as usize,
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();
    format!("Bearer {}", token)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

fn post(uri: &str, auth: (&str, &str), body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(auth.0, auth.1)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, auth: (&str, &str)) -> Request<Body> {
    Request::builder().method("GET").uri(uri).header(auth.0, auth.1).body(Body::empty()).unwrap()
}

fn seat_state(map: &Value, seat: &str) -> String {
    map["seats"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["seatNumber"] == seat)
        .map(|s| s["displayState"].as_str().unwrap().to_string())
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = seeded().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_guest_lock_shows_per_requester_state() {
    let (app, flight_id) = seeded().await;
    let alice = ("X-Session-Id", "session-alice");
    let bob = ("X-Session-Id", "session-bob");

    let (status, body) = send(
        &app,
        post(&format!("/v1/flights/{}/seats/lock", flight_id), alice, json!({ "seatNumbers": ["12a"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["token"].is_string());
    assert!(body["expiresAt"].is_string());

    let (_, mine) = send(&app, get(&format!("/v1/flights/{}/seats", flight_id), alice)).await;
    let (_, theirs) = send(&app, get(&format!("/v1/flights/{}/seats", flight_id), bob)).await;
    assert_eq!(seat_state(&mine, "12A"), "selected-by-you");
    assert_eq!(seat_state(&theirs, "12A"), "unavailable");
    assert_eq!(seat_state(&theirs, "12B"), "available");

    let (status, _) = send(
        &app,
        post(&format!("/v1/flights/{}/seats/lock", flight_id), bob, json!({ "seatNumbers": ["12A", "12B"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, locks) = send(&app, get(&format!("/v1/flights/{}/seats/my-locks", flight_id), alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(locks[0]["seatNumbers"], json!(["12A"]));
}

#[tokio::test]
async fn test_book_requires_signed_in_owner() {
    let (app, flight_id) = seeded().await;
    let customer = bearer("CUSTOMER", "cust-42");
    let me = ("Authorization", customer.as_str());

    let (_, lock) = send(
        &app,
        post(&format!("/v1/flights/{}/seats/lock", flight_id), me, json!({ "seatNumbers": ["12A"] })),
    )
    .await;
    let token = lock["token"].clone();
    let book_uri = format!("/v1/flights/{}/seats/book", flight_id);

    let guest = ("X-Session-Id", "cust-42");
    let (status, _) = send(&app, post(&book_uri, guest, json!({ "token": token, "bookingId": "BKG-1" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let other = bearer("CUSTOMER", "cust-7");
    let (status, _) = send(
        &app,
        post(&book_uri, ("Authorization", other.as_str()), json!({ "token": token, "bookingId": "BKG-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, booked) = send(&app, post(&book_uri, me, json!({ "token": token, "bookingId": "BKG-1" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(booked["bookingId"], "BKG-1");
    assert_eq!(booked["seats"], json!(["12A"]));

    let (status, replay) = send(&app, post(&book_uri, me, json!({ "token": token, "bookingId": "BKG-1" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay, booked);

    let (_, map) = send(&app, get(&format!("/v1/flights/{}/seats", flight_id), me)).await;
    assert_eq!(seat_state(&map, "12A"), "booked");
    let economy = map["availability"].as_array().unwrap().iter().find(|c| c["cabinClass"] == "ECONOMY").unwrap();
    assert_eq!(economy["remaining"], 59);
}

#[tokio::test]
async fn test_session_header_cannot_act_as_customer() {
    let (app, flight_id) = seeded().await;
    let customer = bearer("CUSTOMER", "cust-42");
    let me = ("Authorization", customer.as_str());
    let imposter = ("X-Session-Id", "cust-42");

    let (status, lock) = send(
        &app,
        post(&format!("/v1/flights/{}/seats/lock", flight_id), me, json!({ "seatNumbers": ["12A"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = lock["token"].clone();

    let locks_uri = format!("/v1/flights/{}/seats/my-locks", flight_id);
    let (status, theirs) = send(&app, get(&locks_uri, imposter)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(theirs, json!([]));

    let (_, map) = send(&app, get(&format!("/v1/flights/{}/seats", flight_id), imposter)).await;
    assert_eq!(seat_state(&map, "12A"), "unavailable");

    let (status, _) = send(
        &app,
        post(&format!("/v1/flights/{}/seats/release", flight_id), imposter, json!({ "token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(
        &app,
        post(&format!("/v1/flights/{}/seats/extend", flight_id), imposter, json!({ "token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, mine) = send(&app, get(&locks_uri, me)).await;
    assert_eq!(mine[0]["token"], token);
    let (_, map) = send(&app, get(&format!("/v1/flights/{}/seats", flight_id), me)).await;
    assert_eq!(seat_state(&map, "12A"), "selected-by-you");
    let cabin = map["cabins"].as_array().unwrap().iter().find(|c| c["cabinClass"] == "ECONOMY").unwrap();
    assert_eq!(cabin["selectedByYou"], 1);
}

#[tokio::test]
async fn test_guest_token_and_session_header_share_owner() {
    let (app, flight_id) = seeded().await;
    let login = Request::builder().method("POST").uri("/v1/auth/guest").body(Body::empty()).unwrap();
    let (_, body) = send(&app, login).await;
    let guest = format!("Bearer {}", body["token"].as_str().unwrap());
    let session = body["session_id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        post(
            &format!("/v1/flights/{}/seats/lock", flight_id),
            ("Authorization", guest.as_str()),
            json!({ "seatNumbers": ["20F"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, map) = send(&app, get(&format!("/v1/flights/{}/seats", flight_id), ("X-Session-Id", session.as_str()))).await;
    assert_eq!(seat_state(&map, "20F"), "selected-by-you");
}

#[tokio::test]
async fn test_released_token_is_gone() {
    let (app, flight_id) = seeded().await;
    let customer = bearer("CUSTOMER", "cust-1");
    let me = ("Authorization", customer.as_str());

    let (_, lock) = send(
        &app,
        post(&format!("/v1/flights/{}/seats/lock", flight_id), me, json!({ "seatNumbers": ["14C"] })),
    )
    .await;
    let token = lock["token"].clone();

    let release_uri = format!("/v1/flights/{}/seats/release", flight_id);
    let (status, _) = send(&app, post(&release_uri, me, json!({ "token": token }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, post(&release_uri, me, json!({ "token": token }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(
        &app,
        post(&format!("/v1/flights/{}/seats/book", flight_id), me, json!({ "token": token, "bookingId": "BKG-2" })),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_invalid_requests() {
    let (app, flight_id) = seeded().await;
    let alice = ("X-Session-Id", "session-alice");
    let lock_uri = format!("/v1/flights/{}/seats/lock", flight_id);

    let (status, _) = send(&app, post(&lock_uri, alice, json!({ "seatNumbers": ["A12"] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, post(&lock_uri, alice, json!({ "seatNumbers": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, post(&lock_uri, alice, json!({ "seatNumbers": ["12A"], "ttlSeconds": 999999 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, post(&format!("/v1/flights/{}/seats/lock", Uuid::new_v4()), alice, json!({ "seatNumbers": ["12A"] }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let anonymous = Request::builder()
        .uri(format!("/v1/flights/{}/seats", flight_id))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, get(&format!("/v1/flights/{}/seats", flight_id), ("Authorization", "Bearer nope"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_and_service_routes() {
    let (app, flight_id) = seeded().await;
    let admin = bearer("ADMIN", "ops-1");
    let service = bearer("SERVICE", "booking-svc");
    let customer = bearer("CUSTOMER", "cust-9");

    let flight = json!({ "flightNumber": "AL999", "capacities": { "first": 0, "business": 4, "economy": 12 } });
    let (status, _) = send(&app, post("/v1/admin/flights", ("Authorization", customer.as_str()), flight.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, created) = send(&app, post("/v1/admin/flights", ("Authorization", admin.as_str()), flight)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["flightNumber"], "AL999");

    let oversized = json!({ "flightNumber": "AL998", "capacities": { "first": 4294967295u32, "business": 1, "economy": 0 } });
    let (status, _) = send(&app, post("/v1/admin/flights", ("Authorization", admin.as_str()), oversized)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let me = ("Authorization", customer.as_str());
    let (_, lock) = send(
        &app,
        post(&format!("/v1/flights/{}/seats/lock", flight_id), me, json!({ "seatNumbers": ["12A", "12B"] })),
    )
    .await;
    send(
        &app,
        post(
            &format!("/v1/flights/{}/seats/book", flight_id),
            me,
            json!({ "token": lock["token"], "bookingId": "BKG-3" }),
        ),
    )
    .await;

    let cancel_uri = format!("/v1/flights/{}/bookings/BKG-3/cancel", flight_id);
    let (status, _) = send(&app, post(&cancel_uri, me, json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, cancelled) = send(&app, post(&cancel_uri, ("Authorization", service.as_str()), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["released"], json!(["12A", "12B"]));

    let retire = Request::builder()
        .method("DELETE")
        .uri(format!("/v1/admin/flights/{}", flight_id))
        .header("Authorization", admin.as_str())
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, retire).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_guest_login_and_metrics() {
    let (app, flight_id) = seeded().await;
    let login = Request::builder().method("POST").uri("/v1/auth/guest").body(Body::empty()).unwrap();
    let (status, body) = send(&app, login).await;
    assert_eq!(status, StatusCode::OK);
    let guest = format!("Bearer {}", body["token"].as_str().unwrap());

    let (status, _) = send(
        &app,
        post(
            &format!("/v1/flights/{}/seats/lock", flight_id),
            ("Authorization", guest.as_str()),
            json!({ "seatNumbers": ["15D"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().unwrap();
    assert!(text.contains(r#"seat_operations_total{operation="lock",outcome="ok"} 1"#));
    assert!(text.contains("reaper_sweeps 0"));
}
