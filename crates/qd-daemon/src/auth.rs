//! Session verification.
//!
//! Every settlement route requires a bearer token binding the caller's user
//! id *and* wallet — the engine compares that wallet against the one
//! recorded on the match, so the token is the only place a wallet claim can
//! enter the system. Tokens are HS256 JWTs issued by the matchmaking
//! frontend with the shared `QD_SESSION_SECRET`.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use qd_types::Principal;

use crate::api_types::ApiErrorResponse;
use crate::state::AppState;

pub const ENV_SESSION_SECRET: &str = "QD_SESSION_SECRET";

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    /// User id.
    sub: String,
    /// Wallet bound to the session at login.
    wallet: String,
    exp: usize,
}

#[derive(Clone)]
pub struct SessionVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SessionVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let secret = std::env::var(ENV_SESSION_SECRET)
            .map_err(|_| anyhow::anyhow!("missing env var {ENV_SESSION_SECRET}"))?;
        Ok(Self::new(&secret))
    }

    /// Validate a token and extract the caller. Expiry is enforced by the
    /// default validation.
    pub fn verify(&self, token: &str) -> anyhow::Result<Principal> {
        let data = decode::<SessionClaims>(token, &self.decoding, &Validation::default())
            .map_err(|e| anyhow::anyhow!("invalid session token: {e}"))?;
        Ok(Principal::new(data.claims.sub, data.claims.wallet))
    }

    /// Mint a token for a principal. Used by tests and the CLI token tool;
    /// production tokens come from the matchmaking frontend.
    pub fn issue(&self, principal: &Principal, ttl: chrono::Duration) -> anyhow::Result<String> {
        let claims = SessionClaims {
            sub: principal.user_id.clone(),
            wallet: principal.wallet.clone(),
            exp: (Utc::now() + ttl).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| anyhow::anyhow!("failed to issue session token: {e}"))
    }
}

/// Extractor: the verified caller of a settlement route.
pub struct Session(pub Principal);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(unauthorized)?;

        let principal = state.sessions.verify(token).map_err(|_| unauthorized())?;
        Ok(Session(principal))
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiErrorResponse::new("missing or invalid session token", "unauthorized")),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_the_principal() {
        let v = SessionVerifier::new("test-secret-12345");
        let p = Principal::new("alice", "0xAAA1");
        let token = v.issue(&p, chrono::Duration::hours(1)).unwrap();
        assert_eq!(v.verify(&token).unwrap(), p);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let issuer = SessionVerifier::new("secret-a");
        let other = SessionVerifier::new("secret-b");
        let token = issuer
            .issue(&Principal::new("alice", "0xaaa"), chrono::Duration::hours(1))
            .unwrap();
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let v = SessionVerifier::new("test-secret-12345");
        let token = v
            .issue(
                &Principal::new("alice", "0xaaa"),
                chrono::Duration::seconds(-120),
            )
            .unwrap();
        assert!(v.verify(&token).is_err());
    }

    #[test]
    fn garbage_token_is_rejected() {
        let v = SessionVerifier::new("test-secret-12345");
        assert!(v.verify("not.a.token").is_err());
    }
}
