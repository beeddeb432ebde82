//! HTTP rendering of portfolio errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chainfolio_common::error::PortfolioError;

/// A [`PortfolioError`] answered as `{ "ok": false, "error": {...} }` with the
/// status of its category.
#[derive(Debug)]
pub struct ApiError(pub PortfolioError);

impl From<PortfolioError> for ApiError {
    fn from(err: PortfolioError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(code = %self.0.code(), "{}", self.0);
        }
        (status, Json(self.0.to_json())).into_response()
    }
}
