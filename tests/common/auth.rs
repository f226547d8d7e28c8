use axum::http::Method;
use axum::Router;

use super::http::{request, response_json};

pub const TEST_PASSWORD: &str = "Passw0rd!";

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub token: String,
}

/// Registers a fresh user and returns its access token.
pub async fn register_user(app: &Router) -> TestUser {
    let email = format!("aluno-{}@ufam.edu.br", uuid::Uuid::new_v4().simple());

    let response = request(
        app,
        Method::POST,
        "/api/auth/register",
        Some(serde_json::json!({
            "email": email,
            "displayName": "Aluno Teste",
            "password": TEST_PASSWORD,
        })),
        &[],
    )
    .await;

    let (status, _, body) = response_json(response).await;
    assert!(status.is_success(), "register failed: {body}");

    TestUser {
        id: body["data"]["user"]["id"]
            .as_str()
            .expect("user id in register response")
            .to_string(),
        email,
        token: body["data"]["accessToken"]
            .as_str()
            .expect("access token in register response")
            .to_string(),
    }
}

pub async fn login_and_get_token(app: &Router) -> String {
    register_user(app).await.token
}

pub fn auth_header(token: &str) -> String {
    format!("Bearer {token}")
}

pub fn bearer(token: &str) -> Vec<(&'static str, String)> {
    vec![("authorization", auth_header(token))]
}
