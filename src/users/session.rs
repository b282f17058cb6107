use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;
use crate::users::dto::PublicUser;
use crate::users::repo::User;
use crate::users::tokens::JwtKeys;

/// The authenticated caller, resolved fresh per request. Handlers take this
/// extractor instead of trusting any caller-supplied user id.
pub struct CurrentUser(pub PublicUser);

/// Access token from the `accessToken` cookie, else from the bearer header.
/// Cookie wins when both are present.
pub(crate) fn access_token_from(headers: &HeaderMap) -> Option<String> {
    cookie_value(headers, "accessToken").or_else(|| bearer_token(headers))
}

pub(crate) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').map(str::trim).find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name && !v.is_empty()).then(|| v.to_string())
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.to_string())
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = access_token_from(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("unauthorized request".into()))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify_access(&token).map_err(|_| {
            warn!("invalid or expired access token");
            ApiError::Unauthorized("invalid or expired access token".into())
        })?;

        let user = User::find_by_id(&state.db, claims.sub)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("invalid access token".into()))?;

        Ok(CurrentUser(PublicUser::from(user)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(
                axum::http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn cookie_value_parses_multiple_cookies() {
        let h = headers(&[("cookie", "theme=dark; accessToken=abc.def.ghi; other=1")]);
        assert_eq!(cookie_value(&h, "accessToken").as_deref(), Some("abc.def.ghi"));
        assert_eq!(cookie_value(&h, "theme").as_deref(), Some("dark"));
        assert_eq!(cookie_value(&h, "refreshToken"), None);
    }

    #[test]
    fn cookie_value_ignores_empty_and_prefixed_names() {
        let h = headers(&[("cookie", "xaccessToken=nope; accessToken=")]);
        assert_eq!(cookie_value(&h, "accessToken"), None);
    }

    #[test]
    fn cookie_takes_precedence_over_bearer() {
        let h = headers(&[
            ("cookie", "accessToken=from-cookie"),
            ("authorization", "Bearer from-header"),
        ]);
        assert_eq!(access_token_from(&h).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn bearer_used_when_no_cookie() {
        let h = headers(&[("authorization", "Bearer from-header")]);
        assert_eq!(access_token_from(&h).as_deref(), Some("from-header"));
    }

    #[test]
    fn no_token_sources_yields_none() {
        let h = headers(&[("authorization", "Basic dXNlcjpwdw==")]);
        assert_eq!(access_token_from(&h), None);
    }
}
