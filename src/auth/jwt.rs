use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Role;
use crate::clock::Clock;
use crate::config::AppConfig;

/// Issues and checks access tokens. Issue and expiry times come from the
/// directory clock, not the host clock.
#[derive(Clone)]
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    expiry: Duration,
    clock: Arc<dyn Clock>,
}

impl JwtService {
    pub fn from_config(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        if config.jwt_expiry_minutes <= 0 {
            bail!("JWT_EXPIRY_MINUTES must be positive");
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            expiry: Duration::minutes(config.jwt_expiry_minutes),
            clock,
        })
    }

    /// Lifetime of a freshly issued token, in seconds.
    pub fn expires_in(&self) -> i64 {
        self.expiry.num_seconds()
    }

    pub fn generate_token(&self, user_id: Uuid, username: &str, role: Role) -> Result<String> {
        let issued_at = self.clock.now();
        let claims = Claims {
            sub: user_id,
            username: username.to_owned(),
            role,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: epoch_seconds(issued_at)?,
            exp: epoch_seconds(issued_at + self.expiry)?,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(&[self.audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        // expiry is checked below against the directory clock
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.decoding, &validation)?.claims;
        if claims.exp <= epoch_seconds(self.clock.now())? {
            bail!("token for {} expired", claims.username);
        }
        Ok(claims)
    }
}

fn epoch_seconds(instant: DateTime<Utc>) -> Result<u64> {
    u64::try_from(instant.timestamp()).with_context(|| format!("{instant} predates the epoch"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub iss: String,
    pub aud: String,
    pub iat: u64,
    pub exp: u64,
}
