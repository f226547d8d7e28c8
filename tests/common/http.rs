use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tower::util::ServiceExt;

/// Larger than any body the API produces, smaller than a runaway one.
const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

/// Success envelope shared by every handler.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

async fn send(
    app: &Router,
    method: Method,
    path: &str,
    body: Option<String>,
    headers: &[(&str, String)],
) -> Response {
    let mut builder = Request::builder().method(method).uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }

    let req = match body {
        Some(raw) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(raw)),
        None => builder.body(Body::empty()),
    }
    .expect("build request");

    app.clone().oneshot(req).await.unwrap_or_else(|never| match never {})
}

pub async fn request(
    app: &Router,
    method: Method,
    path: &str,
    body: Option<Value>,
    headers: &[(&str, String)],
) -> Response {
    send(app, method, path, body.map(|v| v.to_string()), headers).await
}

/// Sends `raw` verbatim as a JSON body, for payloads that are not valid JSON.
pub async fn send_raw(
    app: &Router,
    method: Method,
    path: &str,
    raw: &str,
    headers: &[(&str, String)],
) -> Response {
    send(app, method, path, Some(raw.to_string()), headers).await
}

/// Status, headers and body; an empty body reads as `Value::Null`.
pub async fn response_json(resp: Response) -> (StatusCode, HeaderMap, Value) {
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = to_bytes(resp.into_body(), MAX_RESPONSE_BYTES)
        .await
        .expect("read body bytes");

    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes).expect("parse json body")
    };

    (status, headers, json)
}

/// Asserts `expected` and decodes the envelope's `data` into `T`.
pub async fn read_data<T: DeserializeOwned>(resp: Response, expected: StatusCode) -> T {
    let (status, _, body) = response_json(resp).await;
    assert_eq!(status, expected, "{body}");
    let envelope: Envelope<T> = serde_json::from_value(body).expect("decode envelope");
    assert!(envelope.success);
    envelope.data
}

/// Error envelope: `{success: false, code, message, traceId}`.
pub fn assert_json_error(body: &Value, code: &str) {
    assert_eq!(body["success"], false, "{body}");
    assert_eq!(body["code"], code, "{body}");
    assert!(body["message"].is_string(), "{body}");
    assert!(body["traceId"].is_string(), "{body}");
}

pub fn assert_status_ok_json(status: StatusCode, body: &Value) {
    assert!(status.is_success(), "{status}: {body}");
    assert_eq!(body["success"], true);
    assert!(body.get("data").is_some());
}
