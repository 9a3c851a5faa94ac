//! Request body extraction with JSON error bodies.

use axum::Json;
use axum::extract::{FromRequest, Request};
use axum::extract::rejection::JsonRejection;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// `Json<T>` whose rejections answer 400 with an `{"error": …}` body
/// instead of axum's plain-text 415/422 responses.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(status = %rejection.status(), "rejected request body");
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{StatusCode, header};
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct QtyBody {
        qty: i64,
    }

    fn request(content_type: &str, body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn valid_body_is_extracted() {
        let req = request("application/json", r#"{"qty": 3}"#);
        let JsonBody(body) = JsonBody::<QtyBody>::from_request(req, &()).await.unwrap();
        assert_eq!(body.qty, 3);
    }

    #[tokio::test]
    async fn missing_field_is_bad_request() {
        let err = JsonBody::<QtyBody>::from_request(request("application/json", "{}"), &())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("qty"));
    }

    #[tokio::test]
    async fn syntax_error_and_wrong_content_type_are_bad_requests() {
        let err = JsonBody::<QtyBody>::from_request(request("application/json", "{"), &())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = JsonBody::<QtyBody>::from_request(request("text/plain", r#"{"qty": 3}"#), &())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
