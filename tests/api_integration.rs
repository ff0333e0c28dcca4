//! Integration tests for the HTTP + session WebSocket surface.
//!
//! Each test spins up the full Axum app on a random port backed by an
//! in-memory database, and drives it with reqwest and tokio-tungstenite.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use shutdown_log::auth::LocalAuth;
use shutdown_log::clock::{Clock, FixedClock};
use shutdown_log::logs::LogService;
use shutdown_log::server::{AppState, build_router};
use shutdown_log::store::{Database, LibSqlBackend};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Start the app on a random port, return the base HTTP URL and the port.
async fn start_server() -> (String, u16) {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let clock: Arc<dyn Clock> =
        Arc::new(FixedClock::new(NaiveDate::from_ymd_opt(2024, 6, 5).unwrap()));
    let state = AppState {
        auth: Arc::new(LocalAuth::new(
            Arc::clone(&db),
            Arc::clone(&clock),
            Duration::from_secs(3600),
        )
        .with_hash_iterations(1_000)),
        logs: Arc::new(LogService::new(db, clock)),
    };
    let app = build_router(state, None).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{port}"), port)
}

/// Helper: register and sign in, returning the bearer token.
async fn sign_up_and_in(client: &reqwest::Client, base: &str, email: &str) -> String {
    let creds = json!({"email": email, "password": "secret1"});
    let resp = client
        .post(format!("{base}/api/auth/signup"))
        .json(&creds)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    sign_in(client, base, email).await
}

async fn sign_in(client: &reqwest::Client, base: &str, email: &str) -> String {
    let resp = client
        .post(format!("{base}/api/auth/signin"))
        .json(&json!({"email": email, "password": "secret1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

/// Helper: parse a WS text message as JSON.
fn parse_ws_json(msg: &Message) -> Value {
    match msg {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("Expected text message, got {other:?}"),
    }
}

#[tokio::test]
async fn rest_health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start_server().await;

        let resp = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn signed_out_caller_gets_401_today_and_empty_history() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start_server().await;

        let resp = reqwest::get(format!("{base}/api/logs/today")).await.unwrap();
        assert_eq!(resp.status(), 401);

        let resp = reqwest::get(format!("{base}/api/logs")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: Vec<Value> = resp.json().await.unwrap();
        assert!(body.is_empty());

        let resp = reqwest::get(format!("{base}/api/auth/me")).await.unwrap();
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, Value::Null);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn daily_log_round_trip() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start_server().await;
        let client = reqwest::Client::new();
        let token = sign_up_and_in(&client, &base, "alice@example.com").await;

        // First access creates today's record with the default payload.
        let today: Value = client
            .get(format!("{base}/api/logs/today"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(today["date"], "2024-06-05");
        assert_eq!(today["revision"], 1);
        assert_eq!(today["log_data"]["accomplished"], json!([]));
        let id = today["id"].as_str().unwrap().to_string();

        // Second access returns the same record.
        let again: Value = client
            .get(format!("{base}/api/logs/today"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(again["id"], today["id"]);

        let mut log_data = today["log_data"].clone();
        log_data["accomplished"] = json!(["shipped feature X"]);
        let resp = client
            .put(format!("{base}/api/logs/{id}"))
            .bearer_auth(&token)
            .json(&json!({"log_data": log_data}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let fetched: Value = client
            .get(format!("{base}/api/logs/{id}"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(fetched["log_data"]["accomplished"], json!(["shipped feature X"]));
        assert_eq!(fetched["log_data"]["shutdown_ritual"], "");
        assert_eq!(fetched["revision"], 2);

        let history: Vec<Value> = client
            .get(format!("{base}/api/logs"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["id"], id.as_str());
        assert_eq!(history[0]["accomplished"], json!(["shipped feature X"]));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn other_users_logs_are_hidden() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start_server().await;
        let client = reqwest::Client::new();
        let alice = sign_up_and_in(&client, &base, "alice@example.com").await;
        let bob = sign_up_and_in(&client, &base, "bob@example.com").await;

        let today: Value = client
            .get(format!("{base}/api/logs/today"))
            .bearer_auth(&alice)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let id = today["id"].as_str().unwrap();

        let resp = client
            .get(format!("{base}/api/logs/{id}"))
            .bearer_auth(&bob)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let resp = client
            .post(format!("{base}/api/logs/{id}/actions"))
            .bearer_auth(&bob)
            .json(&json!({"action": "set_shutdown_ritual", "text": "hijacked"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let history: Vec<Value> = client
            .get(format!("{base}/api/logs"))
            .bearer_auth(&bob)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(history.is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn stale_revision_is_a_conflict() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start_server().await;
        let client = reqwest::Client::new();
        let token = sign_up_and_in(&client, &base, "alice@example.com").await;

        let today: Value = client
            .get(format!("{base}/api/logs/today"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let id = today["id"].as_str().unwrap();

        let first = client
            .patch(format!("{base}/api/logs/{id}"))
            .bearer_auth(&token)
            .json(&json!({"tomorrow_priorities": ["review PR"], "expected_revision": 1}))
            .send()
            .await
            .unwrap();
        assert_eq!(first.status(), 200);

        let second = client
            .patch(format!("{base}/api/logs/{id}"))
            .bearer_auth(&token)
            .json(&json!({"tomorrow_priorities": ["something else"], "expected_revision": 1}))
            .send()
            .await
            .unwrap();
        assert_eq!(second.status(), 409);
        let body: Value = second.json().await.unwrap();
        assert_eq!(body["revision"], 2);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_anonymous_receives_null_session_state() {
    timeout(TEST_TIMEOUT, async {
        let (_, port) = start_server().await;

        let (mut ws, _resp) = connect_async(format!("ws://127.0.0.1:{port}/ws/session"))
            .await
            .expect("WS connect failed");

        let msg = ws.next().await.unwrap().unwrap();
        let json = parse_ws_json(&msg);
        assert_eq!(json["type"], "session_state");
        assert_eq!(json["user"], Value::Null);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_sign_out_reaches_only_the_signed_out_session() {
    timeout(TEST_TIMEOUT, async {
        let (base, port) = start_server().await;
        let client = reqwest::Client::new();
        let laptop = sign_up_and_in(&client, &base, "alice@example.com").await;
        let phone = sign_in(&client, &base, "alice@example.com").await;

        let (mut laptop_ws, _) =
            connect_async(format!("ws://127.0.0.1:{port}/ws/session?token={laptop}"))
                .await
                .unwrap();
        let (mut phone_ws, _) =
            connect_async(format!("ws://127.0.0.1:{port}/ws/session?token={phone}"))
                .await
                .unwrap();

        let state = parse_ws_json(&laptop_ws.next().await.unwrap().unwrap());
        assert_eq!(state["type"], "session_state");
        assert_eq!(state["user"]["email"], "alice@example.com");
        let phone_state = parse_ws_json(&phone_ws.next().await.unwrap().unwrap());
        assert_eq!(phone_state["user"]["email"], "alice@example.com");

        let resp = client
            .post(format!("{base}/api/auth/signout"))
            .bearer_auth(&phone)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 204);

        let event = parse_ws_json(&phone_ws.next().await.unwrap().unwrap());
        assert_eq!(event["type"], "signed_out");
        assert_eq!(event["user_id"], state["user"]["id"]);

        // The laptop session is still valid and hears nothing.
        assert!(
            timeout(Duration::from_millis(200), laptop_ws.next())
                .await
                .is_err(),
            "laptop socket should not receive the phone's sign-out"
        );
        let me: Value = client
            .get(format!("{base}/api/auth/me"))
            .bearer_auth(&laptop)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(me["email"], "alice@example.com");

        // Its own sign-out does arrive.
        client
            .post(format!("{base}/api/auth/signout"))
            .bearer_auth(&laptop)
            .send()
            .await
            .unwrap();
        let event = parse_ws_json(&laptop_ws.next().await.unwrap().unwrap());
        assert_eq!(event["type"], "signed_out");
    })
    .await
    .expect("test timed out");
}
