use crate::error::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub(crate) struct CaptureError(anyhow::Error);

impl IntoResponse for CaptureError {
    fn into_response(self) -> Response {
        let any_err = self.0;
        tracing::warn!("request not captured: {any_err:#}");
        let status = match any_err.downcast_ref::<Error>() {
            Some(Error::BodyRead(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "error": format!("{any_err}"),
        }));
        (status, body).into_response()
    }
}

impl<E> From<E> for CaptureError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
