use agora_api::Error as ApiError;
use axum::http::header;

/// Error returned by the handlers, always answered with a structured body
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(#[from] pub ApiError);

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let Error(err) = self;
        let status = err.status_code();
        if status.is_server_error() {
            tracing::error!(code = err.code(), "failed serving request: {err}");
        } else {
            tracing::info!(code = err.code(), "returning error to client: {err}");
        }
        (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            err.contents(),
        )
            .into_response()
    }
}
