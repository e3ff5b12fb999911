use std::sync::Arc;

use account_service::app::build_app;
use account_service::config::AppConfig;
use account_service::state::AppState;
use account_service::storage::MemoryStorage;
use account_service::users::memory::MemoryUserStore;
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};

pub const BOUNDARY: &str = "X-TEST-BOUNDARY";

/// Test app backed by the in-memory user store and object storage.
#[allow(dead_code)]
pub fn create_test_app() -> (Router, Arc<MemoryStorage>) {
    create_test_app_with(AppConfig::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with(config: AppConfig) -> (Router, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let state = AppState::from_parts(config, Arc::new(MemoryUserStore::new()), storage.clone())
        .expect("test state");
    (build_app(state), storage)
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File(name, mime, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{name}.png\"\r\n\
                         Content-Type: {mime}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(method: &str, uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

#[allow(dead_code)]
pub fn register_request(username: &str, email: &str, password: &str) -> Request<Body> {
    multipart_request(
        "POST",
        "/api/v1/users/register",
        &[
            Part::Text("username", username),
            Part::Text("email", email),
            Part::Text("fullName", "Test User"),
            Part::Text("password", password),
            Part::File("avatar", "image/png", b"\x89PNG avatar bytes"),
        ],
    )
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[allow(dead_code)]
pub fn login_request(username: &str, password: &str) -> Request<Body> {
    json_request(
        "POST",
        "/api/v1/users/login",
        serde_json::json!({ "username": username, "password": password }),
    )
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn set_cookie_headers(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

pub fn find_cookie(headers: &[String], name: &str) -> String {
    headers
        .iter()
        .find(|value| value.starts_with(&format!("{name}=")))
        .cloned()
        .unwrap_or_else(|| panic!("missing Set-Cookie header for {name}: {headers:?}"))
}

/// Value part of a `Set-Cookie` header.
#[allow(dead_code)]
pub fn cookie_value(set_cookie: &str) -> String {
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(_, value)| value.to_string())
        .unwrap_or_default()
}
