use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::AppState;
use super::response::ApiError;
use crate::branch_control::Session;

pub const USER_HEADER: &str = "x-systables-user";
pub const HOST_HEADER: &str = "x-systables-host";
pub const BRANCH_HEADER: &str = "x-systables-branch";

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_BRANCH: &str = "main";

/// The session of the calling user, as asserted by the authenticating proxy
/// in front of the server.
pub struct Caller(pub Session);

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let user = header(parts, USER_HEADER).ok_or_else(|| ApiError::unauthorized("Caller identity required"))?;
        let host = header(parts, HOST_HEADER).unwrap_or(DEFAULT_HOST);
        let branch = header(parts, BRANCH_HEADER).unwrap_or(DEFAULT_BRANCH);

        Ok(Caller(
            Session::new(user, host).on(state.database.name(), branch),
        ))
    }
}
