use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use bank::models::{Store, User};
use serde::de::DeserializeOwned;

use crate::{
    database::{session_user, user_by_id},
    error::AppError::{self, MalformedPayload},
    state::AppState,
};

pub fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|_| MalformedPayload)
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

pub fn confirm_owner(store: &Store, user: &User) -> Result<(), AppError> {
    if store.is_owned_by(user.id) {
        Ok(())
    } else {
        Err(AppError::NotOwner)
    }
}

/// The logged-in user behind the request's bearer session token.
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or(AppError::Unauthorized)?
            .to_string();

        let mut conn = state.redis_connection.clone();
        let id = session_user(&mut conn, &token)
            .await?
            .ok_or(AppError::Unauthorized)?;
        let user = user_by_id(&mut conn, id)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(Self { user, token })
    }
}
