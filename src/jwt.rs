use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppError;

const DEFAULT_EXP_HOURS: i64 = 24;

/// HS256 bearer-token verification. Token issuance lives outside this
/// service; `encode` stays around for the CLI and test suites.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub exp_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}

impl JwtConfig {
    pub fn new(secret: impl Into<Vec<u8>>, exp_hours: i64) -> Self {
        Self {
            secret: Arc::new(secret.into()),
            exp_hours,
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        let secret =
            std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;

        let exp_hours = match std::env::var("JWT_EXP_HOURS") {
            Ok(raw) => raw
                .parse::<i64>()
                .map_err(|_| AppError::configuration("JWT_EXP_HOURS must be a valid integer"))?,
            Err(_) => DEFAULT_EXP_HOURS,
        };

        Ok(Self::new(secret.into_bytes(), exp_hours))
    }

    pub fn encode(&self, user_id: Uuid) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            exp: (now + Duration::hours(self.exp_hours)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| AppError::token(err.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let validation = Validation::new(Algorithm::HS256);

        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|err| AppError::token(err.to_string()))
    }
}

/// The verified identity every authorization decision starts from.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token =
            bearer_token(parts).ok_or_else(|| AppError::unauthorized("Authorization header missing"))?;

        let claims = state.jwt.decode(token)?;

        Ok(AuthUser { user_id: claims.sub })
    }
}
