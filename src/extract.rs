//! Request extractors whose rejections are rendered as [Error] responses.
//!
//! These wrap axum's `Json`, `Query` and `Path` so a malformed body, query
//! string or path parameter gets the same `{"error": ...}` body and 400
//! status as any other validation failure.

use axum::{
    extract::{
        FromRequest, FromRequestParts, OptionalFromRequest, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    response::{IntoResponse, Response},
};
use serde::{Serialize, de::DeserializeOwned};

use crate::Error;

/// A JSON request body or response.
#[derive(Debug, Clone, Copy, Default, FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct Json<T>(pub T);

/// A deserialized query string.
#[derive(Debug, Clone, Copy, Default, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(Error))]
pub struct Query<T>(pub T);

/// Deserialized path parameters.
#[derive(Debug, Clone, Copy, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(Error))]
pub struct Path<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// A body is optional when the request has no JSON content type.
impl<T, S> OptionalFromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(request: Request, state: &S) -> Result<Option<Self>, Self::Rejection> {
        let body =
            <axum::Json<T> as OptionalFromRequest<S>>::from_request(request, state).await?;

        Ok(body.map(|axum::Json(value)| Json(value)))
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use crate::{endpoints, test_utils::test_server};

    #[track_caller]
    fn assert_error_envelope(body: &Value) {
        assert!(
            body["error"].as_str().is_some_and(|message| !message.is_empty()),
            "want an error message, got {body}"
        );
    }

    #[tokio::test]
    async fn malformed_json_is_a_json_bad_request() {
        let (server, _) = test_server();

        let response = server
            .post(endpoints::SPENDING_CATEGORIES)
            .content_type("application/json")
            .text("{not json")
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_error_envelope(&response.json());
    }

    #[tokio::test]
    async fn wrongly_typed_json_is_a_json_bad_request() {
        let (server, _) = test_server();

        let response = server
            .post(endpoints::SPENDING_CATEGORIES)
            .json(&json!({"color": 5}))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_error_envelope(&response.json());
    }

    #[tokio::test]
    async fn non_numeric_path_id_is_a_json_bad_request() {
        let (server, _) = test_server();

        let response = server.get("/api/spending-categories/abc").await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_error_envelope(&response.json());
    }

    #[tokio::test]
    async fn invalid_query_is_a_json_bad_request() {
        let (server, _) = test_server();

        let response = server
            .get(endpoints::MONTHLY_SPENDING_REPORT)
            .add_query_param("month", "june")
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_error_envelope(&response.json());
    }
}
