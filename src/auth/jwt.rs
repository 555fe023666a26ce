//! Session Tokens
//! Mission: Turn a bearer token into the `Actor` every ledger call is checked against

use crate::auth::models::{Claims, User};
use crate::models::Actor;
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;

const SESSION_TTL_HOURS: i64 = 24;

/// Issues HS256 session tokens and resolves them back to an [`Actor`].
///
/// `sub` carries the user id and `role` the ledger role; a token whose subject is not a
/// user id is rejected even when its signature is valid.
pub struct JwtHandler {
    secret: String,
    ttl: Duration,
}

impl JwtHandler {
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            ttl: Duration::hours(SESSION_TTL_HOURS),
        }
    }

    /// Sign a session for `user`. Returns the token and its lifetime in seconds.
    pub fn generate_token(&self, user: &User) -> Result<(String, usize)> {
        let expires_at = Utc::now()
            .checked_add_signed(self.ttl)
            .context("Session expiry out of range")?;

        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            exp: expires_at.timestamp() as usize,
        };

        debug!(user_id = %user.id, role = %user.role, "Issuing session token");

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .context("Failed to sign session token")?;

        Ok((token, self.ttl.num_seconds() as usize))
    }

    /// Check signature and expiry, and that the subject names a user.
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .context("Invalid or expired token")?
        .claims;

        claims.actor().context("Token subject is not a user id")?;
        Ok(claims)
    }

    /// Claims plus the ledger identity they grant.
    pub fn authenticate(&self, token: &str) -> Result<(Claims, Actor)> {
        let claims = self.validate_token(token)?;
        let actor = claims.actor().context("Token subject is not a user id")?;
        Ok((claims, actor))
    }
}
