use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;

use crate::state::AppState;

/// Extractor that validates the static gateway token, when one is
/// configured. Accepts `Authorization: Bearer <token>` or a `?token=`
/// query parameter (the latter for WebSocket clients that cannot set
/// headers).
pub struct Authenticated;

impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = StatusCode;

    fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let expected = state.config.token.clone();

        let bearer = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(|s| s.to_string());

        let query_token = parts
            .uri
            .query()
            .and_then(|q| {
                q.split('&')
                    .find_map(|pair| pair.strip_prefix("token="))
            })
            .map(|s| s.to_string());

        async move {
            match expected {
                None => Ok(Authenticated),
                Some(expected) => {
                    let supplied = bearer.or(query_token);
                    if supplied.as_deref() == Some(expected.as_str()) {
                        Ok(Authenticated)
                    } else {
                        Err(StatusCode::UNAUTHORIZED)
                    }
                }
            }
        }
    }
}
