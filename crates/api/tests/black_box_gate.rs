//! Black-box tests of the verification gate and auth routes: the real
//! router, a real listener, a real HTTP client.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use masthead_api::app::{AppState, build_app};
use masthead_api::config::AppConfig;
use masthead_api::directory::InMemoryUserDirectory;
use masthead_auth::{AccessClaims, Hs256TokenKeys};
use masthead_core::{Role, UserRecord};

const SECRET: &str = "gate-test-secret";

struct TestServer {
    base_url: String,
    directory: Arc<InMemoryUserDirectory>,
    admin: UserRecord,
    carol: UserRecord,
    ivan: UserRecord,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let directory = Arc::new(InMemoryUserDirectory::new());

        let admin = UserRecord::new("admin", Role::Admin);
        let carol = UserRecord::new("carol", Role::User);
        let mut ivan = UserRecord::new("ivan", Role::User);
        ivan.is_active = false;

        directory.seed(admin.clone(), "admin-pass");
        directory.seed(carol.clone(), "carol-pass");
        directory.seed(ivan.clone(), "ivan-pass");

        let state = AppState {
            keys: Arc::new(Hs256TokenKeys::new(SECRET.as_bytes())),
            directory: directory.clone(),
            credentials: directory.clone(),
            config: Arc::new(AppConfig::for_tests(SECRET)),
        };

        // Same router as prod, bound to an ephemeral port.
        let app = build_app(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            directory,
            admin,
            carol,
            ivan,
            handle,
        }
    }

    fn token_for(&self, user: &UserRecord) -> String {
        mint(AccessClaims::for_user(user, Utc::now(), ChronoDuration::minutes(10)))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint(claims: AccessClaims) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn body(res: reqwest::Response) -> Value {
    res.json().await.unwrap()
}

fn assert_error_shape(body: &Value, code: &str, kind: &str) {
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!(code));
    assert_eq!(body["type"], json!(kind));
    assert!(body["error"].is_string());
    assert!(body["timestamp"].is_string());
    assert!(body["details"].is_object());
}

#[tokio::test]
async fn missing_header_is_token_missing() {
    let server = TestServer::spawn().await;
    let res = reqwest::get(format!("{}/auth/me", server.base_url)).await.unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_error_shape(&body(res).await, "TOKEN_MISSING", "authentication");
}

#[tokio::test]
async fn wrong_scheme_is_token_malformed() {
    let server = TestServer::spawn().await;
    let res = reqwest::Client::new()
        .get(format!("{}/auth/me", server.base_url))
        .header("Authorization", "Token abc")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_error_shape(&body(res).await, "TOKEN_MALFORMED", "authentication");
}

#[tokio::test]
async fn empty_bearer_token_is_token_missing() {
    let server = TestServer::spawn().await;
    let res = reqwest::Client::new()
        .get(format!("{}/auth/me", server.base_url))
        .header("Authorization", "Bearer ")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_error_shape(&body(res).await, "TOKEN_MISSING", "authentication");
}

#[tokio::test]
async fn expired_token_reports_expiry_detail() {
    let server = TestServer::spawn().await;
    // Expired one second ago; the gate runs with zero leeway.
    let issued = Utc::now() - ChronoDuration::seconds(3601);
    let token = mint(AccessClaims::for_user(
        &server.carol,
        issued,
        ChronoDuration::seconds(3600),
    ));

    let res = reqwest::Client::new()
        .get(format!("{}/auth/me", server.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body = body(res).await;
    assert_error_shape(&body, "TOKEN_EXPIRED", "authentication");
    assert!(body["details"]["expiry"].is_string());
}

#[tokio::test]
async fn garbage_token_is_token_invalid() {
    let server = TestServer::spawn().await;
    let res = reqwest::Client::new()
        .get(format!("{}/auth/me", server.base_url))
        .bearer_auth("definitely.not.a-jwt")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_error_shape(&body(res).await, "TOKEN_INVALID", "authentication");
}

#[tokio::test]
async fn wrong_signature_is_token_invalid() {
    let server = TestServer::spawn().await;
    let claims = AccessClaims::for_user(&server.carol, Utc::now(), ChronoDuration::minutes(10));
    let forged = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"some-other-secret"),
    )
    .unwrap();

    let res = reqwest::Client::new()
        .get(format!("{}/auth/me", server.base_url))
        .bearer_auth(forged)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body = body(res).await;
    assert_error_shape(&body, "TOKEN_INVALID", "authentication");
    assert_eq!(body["details"]["reason"], json!("invalid_signature"));
}

#[tokio::test]
async fn unknown_subject_is_user_not_found() {
    let server = TestServer::spawn().await;
    // Valid signature, but the account was never registered.
    let ghost = UserRecord::new("ghost", Role::User);
    let token = server.token_for(&ghost);

    let res = reqwest::Client::new()
        .get(format!("{}/auth/me", server.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_error_shape(&body(res).await, "USER_NOT_FOUND", "authentication");
}

#[tokio::test]
async fn inactive_account_is_user_inactive() {
    let server = TestServer::spawn().await;
    let token = server.token_for(&server.ivan);

    let res = reqwest::Client::new()
        .get(format!("{}/auth/me", server.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_error_shape(&body(res).await, "USER_INACTIVE", "authentication");
}

#[tokio::test]
async fn directory_outage_is_authentication_error_not_a_token_code() {
    let server = TestServer::spawn().await;
    let token = server.token_for(&server.carol);
    server.directory.set_unavailable(true);

    let res = reqwest::Client::new()
        .get(format!("{}/auth/me", server.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_error_shape(&body(res).await, "AUTHENTICATION_ERROR", "internal");
}

#[tokio::test]
async fn regular_user_cannot_create_accounts() {
    let server = TestServer::spawn().await;
    let token = server.token_for(&server.carol);

    let res = reqwest::Client::new()
        .post(format!("{}/users", server.base_url))
        .bearer_auth(token)
        .json(&json!({"username": "newcomer", "role": "user"}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body = body(res).await;
    assert_error_shape(&body, "PERMISSION_DENIED", "authorization");
    assert_eq!(body["details"]["currentRole"], json!("user"));
    assert_eq!(body["details"]["required"], json!("users:create"));
}

#[tokio::test]
async fn admin_can_create_and_list_accounts() {
    let server = TestServer::spawn().await;
    let token = server.token_for(&server.admin);
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/users", server.base_url))
        .bearer_auth(&token)
        .json(&json!({"username": "newcomer", "role": "department_admin"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created = body(res).await;
    assert_eq!(created["user"]["username"], json!("newcomer"));

    let res = client
        .get(format!("{}/users", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let listing = body(res).await;
    let usernames: Vec<&str> = listing["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|user| user["username"].as_str().unwrap())
        .collect();
    assert!(usernames.contains(&"newcomer"));
}

#[tokio::test]
async fn login_validate_and_refresh_round_trip() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    // Wrong password first.
    let res = client
        .post(format!("{}/auth/login", server.base_url))
        .json(&json!({"username": "carol", "password": "nope"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body(res).await["code"], json!("INVALID_CREDENTIALS"));

    // Real login.
    let res = client
        .post(format!("{}/auth/login", server.base_url))
        .json(&json!({"username": "carol", "password": "carol-pass"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let login = body(res).await;
    assert_eq!(login["success"], json!(true));
    let token = login["token"].as_str().unwrap().to_string();
    let expires_at: DateTime<Utc> = login["expires_at"].as_str().unwrap().parse().unwrap();
    assert!(expires_at > Utc::now());

    // The issued token passes the gate.
    let res = client
        .get(format!("{}/auth/validate", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body(res).await["user"]["username"], json!("carol"));

    // And can be traded for a fresh one.
    let res = client
        .post(format!("{}/auth/refresh", server.base_url))
        .json(&json!({"token": token}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let refreshed = body(res).await;
    let new_token = refreshed["token"].as_str().unwrap();

    let res = client
        .get(format!("{}/auth/me", server.base_url))
        .bearer_auth(new_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn refresh_accepts_recently_expired_tokens_only_within_grace() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    // Expired an hour ago: well inside the 7-day grace window.
    let recent = mint(AccessClaims::for_user(
        &server.carol,
        Utc::now() - ChronoDuration::hours(2),
        ChronoDuration::hours(1),
    ));
    let res = client
        .post(format!("{}/auth/refresh", server.base_url))
        .json(&json!({"token": recent}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Expired a month ago: outside the grace window.
    let ancient = mint(AccessClaims::for_user(
        &server.carol,
        Utc::now() - ChronoDuration::days(31),
        ChronoDuration::hours(1),
    ));
    let res = client
        .post(format!("{}/auth/refresh", server.base_url))
        .json(&json!({"token": ancient}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body(res).await["code"], json!("TOKEN_EXPIRED"));
}

#[tokio::test]
async fn refresh_rechecks_account_state() {
    let server = TestServer::spawn().await;
    let token = server.token_for(&server.ivan);

    let res = reqwest::Client::new()
        .post(format!("{}/auth/refresh", server.base_url))
        .json(&json!({"token": token}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body(res).await["code"], json!("USER_INACTIVE"));
}

#[tokio::test]
async fn health_needs_no_credentials() {
    let server = TestServer::spawn().await;
    let res = reqwest::get(format!("{}/health", server.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}
