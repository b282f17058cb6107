use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::repo::User;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}

/// Signing/verification material for both token kinds. Access and refresh
/// tokens use separate secrets, so a refresh token can never pass access
/// verification even before the `kind` claim is checked.
#[derive(Clone)]
pub struct JwtKeys {
    pub access_encoding: EncodingKey,
    pub access_decoding: DecodingKey,
    pub refresh_encoding: EncodingKey,
    pub refresh_decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let TokenConfig {
            access_secret,
            refresh_secret,
            issuer,
            audience,
            access_ttl_minutes,
            refresh_ttl_minutes,
        } = state.config.tokens.clone();
        Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
            issuer,
            audience,
            access_ttl: Duration::from_secs((access_ttl_minutes as u64) * 60),
            refresh_ttl: Duration::from_secs((refresh_ttl_minutes as u64) * 60),
        }
    }
}

impl JwtKeys {
    fn sign_with_kind(&self, user_id: Uuid, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let (ttl, key) = match kind {
            TokenKind::Access => (self.access_ttl, &self.access_encoding),
            TokenKind::Refresh => (self.refresh_ttl, &self.refresh_encoding),
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, key)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Access)
    }
    pub fn sign_refresh(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Refresh)
    }

    fn verify(&self, token: &str, kind: TokenKind) -> anyhow::Result<Claims> {
        let key = match kind {
            TokenKind::Access => &self.access_decoding,
            TokenKind::Refresh => &self.refresh_decoding,
        };
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, key, &validation)?;
        if data.claims.kind != kind {
            anyhow::bail!("unexpected token kind");
        }
        debug!(user_id = %data.claims.sub, kind = ?kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_access(&self, token: &str) -> anyhow::Result<Claims> {
        self.verify(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        self.verify(token, TokenKind::Refresh)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Sign a fresh access/refresh pair and persist the refresh token as the
/// user's single active slot, superseding whatever was stored before.
pub async fn issue_pair(db: &PgPool, keys: &JwtKeys, user_id: Uuid) -> anyhow::Result<TokenPair> {
    let access_token = keys.sign_access(user_id)?;
    let refresh_token = keys.sign_refresh(user_id)?;
    User::set_refresh_token(db, user_id, Some(&refresh_token)).await?;
    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// A presented refresh token is only good while it equals the user's stored
/// slot. A cleared slot (NULL) matches nothing at all.
fn slot_matches(stored: Option<&str>, presented: &str) -> bool {
    matches!(stored, Some(s) if s == presented)
}

/// Exchange a still-valid refresh token for a new pair. The presented token
/// must match the stored slot exactly; a superseded or cleared token fails
/// even if its signature and expiry are fine. Two concurrent rotations can
/// both pass the comparison before either write lands; last write wins.
pub async fn rotate(db: &PgPool, keys: &JwtKeys, presented: &str) -> Result<(User, TokenPair), ApiError> {
    let claims = keys
        .verify_refresh(presented)
        .map_err(|_| ApiError::Unauthorized("invalid refresh token".into()))?;

    let user = User::find_by_id(db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("invalid refresh token".into()))?;

    if !slot_matches(user.refresh_token.as_deref(), presented) {
        return Err(ApiError::Unauthorized(
            "refresh token is expired or already used".into(),
        ));
    }

    let pair = issue_pair(db, keys, user.id).await?;
    Ok((user, pair))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys() -> JwtKeys {
        let state = AppState::fake();
        JwtKeys::from_ref(&state)
    }

    #[tokio::test]
    async fn sign_and_verify_access_token() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign_access(user_id).expect("sign access");
        let claims = keys.verify_access(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[tokio::test]
    async fn sign_and_verify_refresh_token() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign_refresh(user_id).expect("sign refresh");
        let claims = keys.verify_refresh(&token).expect("verify refresh");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.kind, TokenKind::Refresh);
    }

    #[tokio::test]
    async fn access_verification_rejects_refresh_token() {
        let keys = make_keys();
        let token = keys.sign_refresh(Uuid::new_v4()).expect("sign refresh");
        assert!(keys.verify_access(&token).is_err());
    }

    #[tokio::test]
    async fn refresh_verification_rejects_access_token() {
        let keys = make_keys();
        let token = keys.sign_access(Uuid::new_v4()).expect("sign access");
        assert!(keys.verify_refresh(&token).is_err());
    }

    #[tokio::test]
    async fn verify_rejects_expired_token() {
        let keys = make_keys();
        let now = OffsetDateTime::now_utc();
        // expired well past jsonwebtoken's default 60s leeway
        let claims = Claims {
            sub: Uuid::new_v4(),
            iat: (now.unix_timestamp() - 600) as usize,
            exp: (now.unix_timestamp() - 300) as usize,
            iss: keys.issuer.clone(),
            aud: keys.audience.clone(),
            kind: TokenKind::Access,
        };
        let token = encode(&Header::default(), &claims, &keys.access_encoding).unwrap();
        assert!(keys.verify_access(&token).is_err());
    }

    #[tokio::test]
    async fn verify_rejects_garbage() {
        let keys = make_keys();
        assert!(keys.verify_access("not-a-jwt").is_err());
        assert!(keys.verify_refresh("").is_err());
    }

    #[tokio::test]
    async fn slot_accepts_only_the_current_token() {
        let keys = make_keys();
        let current = keys.sign_refresh(Uuid::new_v4()).expect("sign refresh");
        assert!(slot_matches(Some(&current), &current));
    }

    #[test]
    fn slot_rejects_a_superseded_token() {
        // rotation stored a new value; the previously issued token is dead
        // even though its signature and expiry are still fine
        assert!(!slot_matches(Some("rotated.refresh.token"), "stale.refresh.token"));
    }

    #[test]
    fn cleared_slot_matches_nothing() {
        assert!(!slot_matches(None, "any.refresh.token"));
        assert!(!slot_matches(None, ""));
    }
}
