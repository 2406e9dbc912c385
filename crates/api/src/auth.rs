//! Caller identity forwarded by the authentication gateway.
//!
//! The gateway authenticates the request and passes the result in two
//! headers: `x-user-id` (UUID) and `x-user-role`.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::UserId;
use domain::{Caller, Role};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Extractor for an authenticated caller. Rejects with 401 when the
/// identity headers are missing or malformed.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated(pub Caller);

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, ApiError> {
    headers
        .get(name)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {name} header")))?
        .to_str()
        .map(str::trim)
        .map_err(|_| ApiError::Unauthorized(format!("malformed {name} header")))
}

/// Reads the caller from request headers.
pub fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, ApiError> {
    let user_id: UserId = header(headers, USER_ID_HEADER)?
        .parse()
        .map_err(|_| ApiError::Unauthorized(format!("invalid {USER_ID_HEADER} header")))?;
    let role: Role = header(headers, USER_ROLE_HEADER)?
        .parse()
        .map_err(ApiError::Unauthorized)?;
    Ok(Caller::new(user_id, role))
}

impl<S: Send + Sync> FromRequestParts<S> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        caller_from_headers(&parts.headers).map(Authenticated)
    }
}
