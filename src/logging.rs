//! Middleware for logging requests and responses.

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{HeaderMap, HeaderValue, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::webhook::WEBHOOK_SECRET_HEADER;

/// Bodies longer than this many bytes are truncated in `info` logs.
pub const LOG_BODY_LENGTH_LIMIT: usize = 64;

const REDACTED: &str = "********";

/// JSON keys whose values never appear in the logs.
const SECRET_KEYS: [&str; 3] = ["access_token", "public_token", "secret"];

/// Log the request and response for each request.
///
/// Both the request and response are logged at the `info` level.
/// If a body is longer than [LOG_BODY_LENGTH_LIMIT] bytes, it is
/// truncated and the full body is logged at the `debug` level.
/// Plaid tokens and the webhook secret are redacted before logging.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let body_bytes = match read_body(body).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::error!("Could not read request body: {error}");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let logged_uri = redact_uri(&parts.uri);
    let logged_headers = redact_headers(&parts.headers);
    let logged_body = redact_body(&body_bytes);
    log_body(
        &format!(
            "Received request: {} {logged_uri}\nheaders: {logged_headers:#?}",
            parts.method
        ),
        &logged_body,
    );

    let request = Request::from_parts(parts, Body::from(body_bytes));
    let response = next.run(request).await;

    let (parts, body) = response.into_parts();
    let body_bytes = match read_body(body).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::error!("Could not read response body: {error}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    log_body(
        &format!("Sending response: {}", parts.status),
        &redact_body(&body_bytes),
    );

    Response::from_parts(parts, Body::from(body_bytes))
}

async fn read_body(body: Body) -> Result<Bytes, axum::Error> {
    axum::body::to_bytes(body, usize::MAX).await
}

fn log_body(message: &str, body: &str) {
    if body.len() > LOG_BODY_LENGTH_LIMIT {
        tracing::info!("{message}\nbody: {}...", truncate(body, LOG_BODY_LENGTH_LIMIT));
        tracing::debug!("Full body: {body:?}");
    } else {
        tracing::info!("{message}\nbody: {body:?}");
    }
}

/// Cut `text` to at most `limit` bytes without splitting a character.
fn truncate(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }

    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }

    &text[..end]
}

fn redact_body(body: &[u8]) -> String {
    match serde_json::from_slice::<Value>(body) {
        Ok(mut json) => {
            redact_json(&mut json);
            json.to_string()
        }
        Err(_) => String::from_utf8_lossy(body).to_string(),
    }
}

fn redact_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                if SECRET_KEYS.contains(&key.as_str()) {
                    *value = Value::String(REDACTED.to_owned());
                } else {
                    redact_json(value);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_json),
        _ => {}
    }
}

fn redact_headers(headers: &HeaderMap) -> HeaderMap {
    let mut headers = headers.clone();

    if headers.contains_key(WEBHOOK_SECRET_HEADER) {
        headers.insert(WEBHOOK_SECRET_HEADER, HeaderValue::from_static(REDACTED));
    }

    headers
}

fn redact_uri(uri: &Uri) -> String {
    let Some(query) = uri.query() else {
        return uri.to_string();
    };

    let query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if SECRET_KEYS.contains(&key) => format!("{key}={REDACTED}"),
            _ => pair.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("&");

    format!("{}?{query}", uri.path())
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue, Uri};
    use serde_json::{Value, json};

    use crate::webhook::WEBHOOK_SECRET_HEADER;

    use super::{redact_body, redact_headers, redact_uri, truncate};

    #[test]
    fn redacts_nested_tokens() {
        let body = json!({
            "public_token": "public-sandbox-123",
            "institution": {"name": "First Bank", "access_token": "access-123"},
            "items": [{"secret": "shh", "id": 1}]
        });

        let redacted = redact_body(body.to_string().as_bytes());

        assert!(!redacted.contains("public-sandbox-123"));
        assert!(!redacted.contains("access-123"));
        assert!(!redacted.contains("shh"));
        let redacted: Value = serde_json::from_str(&redacted).unwrap();
        assert_eq!(redacted["institution"]["name"], "First Bank");
        assert_eq!(redacted["items"][0]["id"], 1);
    }

    #[test]
    fn leaves_non_json_bodies_alone() {
        assert_eq!(redact_body(b"plain text"), "plain text");
    }

    #[test]
    fn redacts_webhook_secret_header() {
        let mut headers = HeaderMap::new();
        headers.insert(WEBHOOK_SECRET_HEADER, HeaderValue::from_static("s3cret"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let redacted = redact_headers(&headers);

        assert_eq!(redacted[WEBHOOK_SECRET_HEADER], "********");
        assert_eq!(redacted["content-type"], "application/json");
    }

    #[test]
    fn redacts_secret_query_parameter() {
        let uri: Uri = "/api/plaid/webhook?secret=s3cret&x=1".parse().unwrap();

        assert_eq!(redact_uri(&uri), "/api/plaid/webhook?secret=********&x=1");
    }

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("hello", 10), "hello");
    }
}
