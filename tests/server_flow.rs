//! End-to-end tests for the reference server
//!
//! Each test starts a server on an ephemeral port with an in-memory store and
//! drives it over HTTP, the way a consuming service or browser would.

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use warden::auth::{HashPolicy, Role};
use warden::gate::RoleRule;
use warden::server::{serve, AppState};
use warden::store::{CredentialStore, InMemoryCredentialStore, StoredCredential};
use warden::SecuritySettings;

const SECRET: &str = "server-flow-test-secret-0123456789abcdef";

fn settings() -> SecuritySettings {
    SecuritySettings {
        service_name: "auth-service".into(),
        jwt_secret: Some(SECRET.into()),
        hash_policy: HashPolicy {
            work_factor: 1,
            memory_kib: 1024,
            max_password_length: 50,
        },
        service_keys: vec![("medical-service".into(), "medical-key".into())],
        role_rules: vec![RoleRule {
            prefix: "/admin".into(),
            roles: [Role::Admin].into(),
        }],
        ..SecuritySettings::default()
    }
}

struct TestServer {
    base: String,
    store: Arc<InMemoryCredentialStore>,
    state: Arc<AppState>,
    client: reqwest::Client,
}

async fn start() -> TestServer {
    let store = Arc::new(InMemoryCredentialStore::new());
    let state = Arc::new(AppState::new(&settings(), store.clone()).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(serve(listener, Arc::clone(&state)));

    TestServer {
        base,
        store,
        state,
        client: reqwest::Client::new(),
    }
}

impl TestServer {
    async fn register(&self, email: &str, password: &str, role: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/auth/register", self.base))
            .json(&json!({"email": email, "password": password, "role": role}))
            .send()
            .await
            .unwrap()
    }

    async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/auth/login", self.base))
            .json(&json!({"email": email, "password": password}))
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, path: &str, token: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(format!("{}{}", self.base, path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.unwrap()
    }

    /// Register and log in, returning the login envelope's data
    async fn session(&self, email: &str, role: &str) -> Value {
        let response = self.register(email, "Correct.Horse.9", role).await;
        assert_eq!(response.status(), 201);
        let body: Value = self.login(email, "Correct.Horse.9").await.json().await.unwrap();
        body["data"].clone()
    }
}

#[tokio::test]
async fn test_health_is_public() {
    let server = start().await;
    let response = server.get("/health", None).await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["healthy"], true);
    assert_eq!(body["components"]["tokens"], "HS256");
    assert_eq!(body["components"]["service_keys"], 1);
}

#[tokio::test]
async fn test_protected_route_without_token() {
    let server = start().await;
    let response = server.get("/profile", None).await;
    assert_eq!(response.status(), 401);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["errors"][0], "missing authorization");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_unknown_protected_path_is_still_gated() {
    let server = start().await;
    assert_eq!(server.get("/nowhere", None).await.status(), 401);
}

#[tokio::test]
async fn test_register_login_and_profile() {
    let server = start().await;
    let data = server.session("jane@hospital.com", "CLINICIAN").await;

    assert_eq!(data["token_type"], "bearer");
    assert_eq!(data["expires_in"], 30 * 60);
    assert_eq!(data["user"]["role"], "CLINICIAN");

    let token = data["access_token"].as_str().unwrap();
    let response = server.get("/profile", Some(token)).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["email"], "jane@hospital.com");
    assert_eq!(body["data"]["role"], "CLINICIAN");

    let response = server.get("/auth/me", Some(token)).await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_login_failures_look_identical() {
    let server = start().await;
    server.register("jane@hospital.com", "Correct.Horse.9", "PATIENT").await;

    let wrong_password = server.login("jane@hospital.com", "Wrong.Horse.9").await;
    let unknown_user = server.login("nobody@hospital.com", "Correct.Horse.9").await;
    assert_eq!(wrong_password.status(), 401);
    assert_eq!(unknown_user.status(), 401);

    let a: Value = wrong_password.json().await.unwrap();
    let b: Value = unknown_user.json().await.unwrap();
    assert_eq!(a["message"], b["message"]);
    assert_eq!(a["errors"], b["errors"]);
}

#[tokio::test]
async fn test_register_validation() {
    let server = start().await;

    assert_eq!(server.register("not-an-email", "Correct.Horse.9", "PATIENT").await.status(), 400);
    assert_eq!(server.register("a@b.c", "Correct.Horse.9", "PATIENT").await.status(), 400);
    assert_eq!(server.register("a@b.com", "short", "PATIENT").await.status(), 400);
    assert_eq!(server.register("a@b.com", "aaaaaaaa", "PATIENT").await.status(), 400);
    assert_eq!(server.register("a@b.com", &"x".repeat(51), "PATIENT").await.status(), 400);
    assert_eq!(server.register("a@b.com", "Correct.Horse.9", "ADMIN").await.status(), 403);
    assert_eq!(server.register("a@b.com", "Correct.Horse.9", "ROOT").await.status(), 400);

    assert_eq!(server.register("a@b.com", "Correct.Horse.9", "PATIENT").await.status(), 201);
    assert_eq!(server.register("A@B.com", "Correct.Horse.9", "PATIENT").await.status(), 400);
}

#[tokio::test]
async fn test_role_enforcement() {
    let server = start().await;
    let patient = server.session("pat@hospital.com", "PATIENT").await;
    let patient_token = patient["access_token"].as_str().unwrap();

    // Gate rule on /admin
    assert_eq!(server.get("/admin/overview", Some(patient_token)).await.status(), 403);

    // Role dependency on a public-prefix route
    assert_eq!(server.get("/auth/admin-only", Some(patient_token)).await.status(), 403);
    assert_eq!(server.get("/auth/admin-only", None).await.status(), 401);

    // Administrators are provisioned directly in the store
    let admin = server
        .state
        .security
        .passwords()
        .hash("admin-password")
        .unwrap();
    server
        .store
        .insert(StoredCredential {
            subject_id: "user-admin".into(),
            email: "admin@hospital.com".into(),
            password_hash: admin,
            role: Role::Admin,
            active: true,
        })
        .await
        .unwrap();

    let body: Value = server
        .login("admin@hospital.com", "admin-password")
        .await
        .json()
        .await
        .unwrap();
    let admin_token = body["data"]["access_token"].as_str().unwrap();
    assert_eq!(server.get("/auth/admin-only", Some(admin_token)).await.status(), 200);
    // Past the gate; no handler mounted there
    assert_eq!(server.get("/admin/overview", Some(admin_token)).await.status(), 404);
}

#[tokio::test]
async fn test_refresh_flow() {
    let server = start().await;
    let data = server.session("jane@hospital.com", "PATIENT").await;
    let access = data["access_token"].as_str().unwrap();
    let refresh = data["refresh_token"].as_str().unwrap();

    // A refresh token is not a bearer credential
    assert_eq!(server.get("/profile", Some(refresh)).await.status(), 401);

    // An access token cannot be exchanged
    let response = server
        .client
        .post(format!("{}/auth/refresh", server.base))
        .json(&json!({"refresh_token": access}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = server
        .client
        .post(format!("{}/auth/refresh", server.base))
        .json(&json!({"refresh_token": refresh}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let new_access = body["data"]["access_token"].as_str().unwrap();
    assert_eq!(server.get("/profile", Some(new_access)).await.status(), 200);
}

#[tokio::test]
async fn test_verify_token_endpoint() {
    let server = start().await;
    let data = server.session("jane@hospital.com", "PATIENT").await;
    let access = data["access_token"].as_str().unwrap();

    let response = server
        .get(&format!("/auth/verify-token?token={}", access), None)
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["token_valid"], true);
    assert_eq!(body["data"]["is_expired"], false);
    assert_eq!(body["data"]["payload"]["type"], "access");
    assert_eq!(body["data"]["payload"]["email"], "jane@hospital.com");

    let response = server.get("/auth/verify-token?token=garbage", None).await;
    assert_eq!(response.status(), 401);

    let response = server.get("/auth/verify-token", None).await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_dot_segments_rejected() {
    let server = start().await;
    // reqwest normalizes dot segments in URLs, so write the request by hand
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let addr = server.base.trim_start_matches("http://");
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /auth/../admin/overview HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    assert!(raw.starts_with("HTTP/1.1 400"), "unexpected response: {raw}");
}

#[tokio::test]
async fn test_service_routes_use_api_key() {
    let server = start().await;
    let url = format!("{}/internal/ping", server.base);

    let response = server.client.get(&url).send().await.unwrap();
    assert_eq!(response.status(), 403);

    let response = server
        .client
        .get(&url)
        .header("X-API-Key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let response = server
        .client
        .get(&url)
        .header("X-API-Key", "medical-key")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["caller"], "medical-service");
    assert_eq!(body["data"]["service"], "auth-service");
}

#[tokio::test]
async fn test_cors_preflight() {
    let server = start().await;
    let response = server
        .client
        .request(reqwest::Method::OPTIONS, format!("{}/profile", server.base))
        .header("Origin", "https://app.example")
        .header("Access-Control-Request-Method", "GET")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 204);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "https://app.example"
    );
}
