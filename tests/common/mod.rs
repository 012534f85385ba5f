#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use lettre::{AsyncSmtpTransport, Tokio1Executor};
use serde_json::{json, Value};
use studentclubportal_server::{config::MailConfig, email::Mailer, trim_trailing_slashes};
use tower::ServiceExt;

/// A mailer whose transport points at a local relay that is never reached.
pub fn test_mailer() -> Mailer {
    Mailer::with_transport(
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous("localhost").build(),
        &MailConfig {
            smtp_host: "localhost".to_string(),
            smtp_port: 25,
            smtp_username: "portal".to_string(),
            smtp_password: "portal".to_string(),
            from_address: "noreply@example.org".to_string(),
            from_display: "Student Club Portal".to_string(),
            frontend_host: "http://localhost:3000".to_string(),
        },
    )
    .unwrap()
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = trim_trailing_slashes(router.clone())
        .oneshot(request)
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

pub async fn get(router: &Router, uri: &str, token: Option<&str>) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::COOKIE, format!("token={token}"));
    }
    send(router, builder.body(Body::empty()).unwrap()).await
}

pub async fn post(
    router: &Router,
    uri: &str,
    form: &str,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(token) = token {
        builder = builder.header(header::COOKIE, format!("token={token}"));
    }
    let (status, _, body) = send(router, builder.body(Body::from(form.to_string())).unwrap()).await;
    (status, body)
}

pub fn error(code: &str) -> Value {
    json!({ "status": "error", "error": code })
}

pub fn issued_token(headers: &HeaderMap) -> Option<String> {
    let cookie = headers.get(header::SET_COOKIE)?.to_str().ok()?;
    cookie
        .split(';')
        .next()?
        .strip_prefix("token=")
        .map(str::to_string)
}
