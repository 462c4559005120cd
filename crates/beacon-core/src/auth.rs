//! Demo auth collaborator: token issuance and bearer verification.
//!
//! One fixed credential pair exists for the demo deployment. Verification
//! yields an actor identity `{email, name}`. Session connects degrade to a
//! guest identity on a missing or invalid token; mutation endpoints treat
//! the same condition as an error.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::SessionUser;

/// Demo operator credentials. Do not model production auth on this.
pub const DEMO_EMAIL: &str = "admin@beacon.example";
pub const DEMO_PASSWORD: &str = "admin123";
pub const DEMO_NAME: &str = "Beacon Admin";

/// Token lifetime.
const TOKEN_TTL_HOURS: i64 = 12;

/// JWT claims carried by an issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub email: String,
    pub name: String,
    /// Expiry, Unix seconds.
    pub exp: i64,
}

/// Issues and verifies bearer tokens (HS256).
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenAuthority {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Read the signing secret from `JWT_SECRET`, with a dev-only default.
    pub fn from_env() -> Self {
        let secret = std::env::var("JWT_SECRET")
            .unwrap_or_else(|_| "dev-secret-please-change".to_string());
        Self::new(secret.as_bytes())
    }

    /// Check the demo credential pair and issue a signed token.
    pub fn login(&self, email: &str, password: &str) -> Result<String> {
        if email != DEMO_EMAIL || password != DEMO_PASSWORD {
            return Err(Error::Unauthorized("Invalid credentials".to_string()));
        }
        let claims = Claims {
            email: DEMO_EMAIL.to_string(),
            name: DEMO_NAME.to_string(),
            exp: (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
        };
        jsonwebtoken::encode(&jsonwebtoken::Header::default(), &claims, &self.encoding)
            .map_err(|e| Error::Unauthorized(format!("Token signing failed: {e}")))
    }

    /// Verify a raw token and return the actor identity.
    pub fn verify(&self, token: &str) -> Result<SessionUser> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| Error::Unauthorized("Invalid token".to_string()))?;
        Ok(SessionUser {
            email: data.claims.email,
            name: Some(data.claims.name),
        })
    }

    /// Verify an `Authorization: Bearer <token>` header value.
    pub fn verify_bearer(&self, header: &str) -> Result<SessionUser> {
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| Error::Unauthorized("Invalid auth format".to_string()))?;
        self.verify(token)
    }
}
