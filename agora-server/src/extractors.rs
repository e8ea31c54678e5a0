use std::{str::FromStr, sync::Arc};

use agora_api::{Error as ApiError, Service};
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Path},
    http::{request, Request},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::Error;

pub struct AppState<D> {
    pub service: Arc<Service<D>>,
}

impl<D> Clone for AppState<D> {
    fn clone(&self) -> AppState<D> {
        AppState {
            service: self.service.clone(),
        }
    }
}

/// Identifier taken from the single path parameter of the route
pub struct IdPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for IdPath<T>
where
    S: Send + Sync,
    T: FromStr<Err = ApiError> + Send,
{
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &S) -> Result<IdPath<T>, Error> {
        let Path(raw) = Path::<String>::from_request_parts(req, state)
            .await
            .map_err(|e| ApiError::InvalidIdentifier(e.to_string()))?;
        Ok(IdPath(raw.parse()?))
    }
}

/// Subject and comment identifiers, in this order
pub struct CommentPath<S, C>(pub S, pub C);

#[async_trait]
impl<St, S, C> FromRequestParts<St> for CommentPath<S, C>
where
    St: Send + Sync,
    S: FromStr<Err = ApiError> + Send,
    C: FromStr<Err = ApiError> + Send,
{
    type Rejection = Error;

    async fn from_request_parts(
        req: &mut request::Parts,
        state: &St,
    ) -> Result<CommentPath<S, C>, Error> {
        let Path((subject, comment)) = Path::<(String, String)>::from_request_parts(req, state)
            .await
            .map_err(|e| ApiError::InvalidIdentifier(e.to_string()))?;
        Ok(CommentPath(subject.parse()?, comment.parse()?))
    }
}

/// JSON request and response body. Undecodable requests are answered with a
/// structured error: `InvalidIdentifier` when an id does not parse, and
/// `IllegalOperation` for any other malformed body.
pub struct Json<T>(pub T);

#[async_trait]
impl<S, B, T> FromRequest<S, B> for Json<T>
where
    axum::Json<T>: FromRequest<S, B, Rejection = JsonRejection>,
    S: Send + Sync,
    B: Send + 'static,
{
    type Rejection = Error;

    async fn from_request(req: Request<B>, state: &S) -> Result<Json<T>, Error> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(v)) => Ok(Json(v)),
            Err(rej) => Err(Error(body_error(rej))),
        }
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

fn body_error(rej: JsonRejection) -> ApiError {
    let msg = rej.body_text();
    match rej {
        // ids are uuids, whose parse failures carry this prefix
        JsonRejection::JsonDataError(_) if msg.contains("UUID parsing failed") => {
            ApiError::InvalidIdentifier(msg)
        }
        _ => ApiError::IllegalOperation(msg),
    }
}
