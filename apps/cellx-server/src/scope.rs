use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use cellx_store::UserScope;

use crate::AppState;

/// User key assumed when the request carries no user header.
pub(crate) const ANONYMOUS_USER: &str = "anonymous";

/// The caller's storage scope, derived once per request from the configured
/// user header and the dataset name.
#[derive(Debug, Clone)]
pub(crate) struct Scope {
    pub scope: UserScope,
    /// Whether the user header was present.
    pub identified: bool,
}

impl FromRequestParts<AppState> for Scope {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = state.config().scope.user_header.as_str();
        let user = parts
            .headers
            .get(header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let scope = UserScope::derive(user.unwrap_or(ANONYMOUS_USER), state.dataset().name());
        Ok(Scope {
            scope,
            identified: user.is_some(),
        })
    }
}
