//! Thin wrappers over axum's extractors so malformed input is reported with
//! the usual `{error:{code,message}}` body instead of axum's plain text.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{
    FromRequest, FromRequestParts, OptionalFromRequest, Path, Query, Request,
};
use axum::http::{StatusCode, request::Parts};
use serde::de::DeserializeOwned;

use crate::error::EverwellError;

fn rejected(status: StatusCode, text: String) -> EverwellError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        EverwellError::PayloadTooLarge
    } else {
        EverwellError::InvalidInput(text)
    }
}

pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = EverwellError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = <Json<T> as FromRequest<S>>::from_request(req, state)
            .await
            .map_err(|r| rejected(r.status(), r.body_text()))?;
        Ok(Self(value))
    }
}

/// `Option<ApiJson<T>>` is `None` when the request carries no `Content-Type` at all.
impl<S, T> OptionalFromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = EverwellError;

    async fn from_request(req: Request, state: &S) -> Result<Option<Self>, Self::Rejection> {
        let value = <Json<T> as OptionalFromRequest<S>>::from_request(req, state)
            .await
            .map_err(|r| rejected(r.status(), r.body_text()))?;
        Ok(value.map(|Json(value)| Self(value)))
    }
}

pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = EverwellError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|r| rejected(r.status(), r.body_text()))?;
        Ok(Self(value))
    }
}

pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = EverwellError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|r| rejected(r.status(), r.body_text()))?;
        Ok(Self(value))
    }
}

/// A raw UTF-8 text body, bounded by the route's `DefaultBodyLimit`.
pub struct TextBody(pub String);

impl<S> FromRequest<S> for TextBody
where
    S: Send + Sync,
{
    type Rejection = EverwellError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|r| rejected(r.status(), r.body_text()))?;
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|_| EverwellError::invalid("request body must be UTF-8 text"))?;
        Ok(Self(text))
    }
}
