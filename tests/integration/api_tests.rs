//! API integration tests against a running server
//!
//! Requires a server on localhost:8080 backed by a migrated database with
//! catalog item 1. Tokens are minted with `JWT_SECRET`.

use lendtrack_server::models::{Role, UserClaims};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080/api/v1";

fn token(user_id: i32, role: Role) -> String {
    let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| "change-this-secret-in-production".into());
    UserClaims::new(user_id, role, 1)
        .create_token(&secret)
        .expect("Failed to sign token")
}

fn unique_admission_no() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("IT{}", &suffix[..9])
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_readiness_reaches_database() {
    let client = Client::new();

    let response = client
        .get(format!("{}/ready", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore]
async fn test_unauthorized_access() {
    let client = Client::new();

    let response = client
        .get(format!("{}/admin/borrow-requests", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_borrow_and_return_round() {
    let client = Client::new();
    let admin = token(1, Role::Admin);

    let response = client
        .post(format!("{}/users", BASE_URL))
        .bearer_auth(&admin)
        .json(&json!({
            "full_name": "Integration Student",
            "role": "student",
            "admission_no": unique_admission_no()
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.expect("Failed to parse response");
    let user_id = body["id"].as_i64().expect("No user id") as i32;
    let student = token(user_id, Role::Student);

    let response = client
        .post(format!("{}/users/{}/loans", BASE_URL, user_id))
        .bearer_auth(&student)
        .json(&json!({ "item_id": 1, "return_date": "2099-01-01T00:00:00Z" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let loan_uri = format!("{}/users/{}/loans/1", BASE_URL, user_id);

    let response = client
        .put(format!("{}/accept", loan_uri))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .post(format!("{}/return", loan_uri))
        .bearer_auth(&student)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .put(format!("{}/return", loan_uri))
        .bearer_auth(&admin)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["archived"], true);

    let response = client
        .get(format!("{}/users/{}/history", BASE_URL, user_id))
        .bearer_auth(&student)
        .send()
        .await
        .expect("Failed to send request");
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}
