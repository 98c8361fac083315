use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use core::error::{ConnectionError, ErrorKind};
use serde_json::json;

/// Wraps a [`ConnectionError`] so it can be returned directly from an axum handler.
///
/// Maps `NotSupportedForVersion` onto a `409` with a `Location` header pointing at the
/// same resource under the highest version that does support the transport; every other
/// kind maps straight through [`ErrorKind::http_status`].
pub struct ApiError {
    pub inner: ConnectionError,
    pub path_after_version: Option<String>,
}

impl ApiError {
    pub fn new(inner: ConnectionError) -> Self {
        Self {
            inner,
            path_after_version: None,
        }
    }

    pub fn with_path(inner: ConnectionError, path_after_version: impl Into<String>) -> Self {
        Self {
            inner,
            path_after_version: Some(path_after_version.into()),
        }
    }
}

impl From<ConnectionError> for ApiError {
    fn from(inner: ConnectionError) -> Self {
        Self::new(inner)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.kind.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = (status, Json(json!({ "error": self.inner.message }))).into_response();

        if self.inner.kind == ErrorKind::NotSupportedForVersion {
            if let (Some(version), Some(path)) = (self.inner.redirect_version, &self.path_after_version) {
                let location = format!("/x-nmos/connection/{version}/{path}");
                if let Ok(value) = HeaderValue::from_str(&location) {
                    response.headers_mut().insert(axum::http::header::LOCATION, value);
                }
            }
        }

        response
    }
}
