use actix_web::{dev::Payload, Error, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use std::future::{ready, Ready};

use crate::error::ApiError;
use crate::models::Id;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// `"<user id>:<username>"`
    pub sub: String,
    pub exp: usize,
    pub roles: Vec<Role>,
}

impl Claims {
    /// The viewer identity carried in the subject.
    pub fn viewer_id(&self) -> Result<Id, ApiError> {
        self.sub
            .split(':')
            .next()
            .and_then(|id| id.parse().ok())
            .ok_or(ApiError::Unauthorized)
    }

    pub fn username(&self) -> &str {
        self.sub.split_once(':').map(|(_, name)| name).unwrap_or("")
    }

    pub fn is_moderator(&self) -> bool {
        self.roles.iter().any(|r| matches!(r, Role::Moderator | Role::Admin))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TokenError {
    #[error("JWT_SECRET not set")]
    MissingSecret,
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

fn secret() -> Result<String, TokenError> {
    env::var("JWT_SECRET").map_err(|_| TokenError::MissingSecret)
}

/// Validate a JWT and return its claims.
fn decode_jwt(token: &str) -> Result<Claims, TokenError> {
    let secret = secret()?;
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Extractor yielding validated `Claims`. Use `Option<Auth>` on routes where the viewer is optional.
pub struct Auth(pub Claims);

impl Auth {
    pub fn viewer_id(&self) -> Result<Id, ApiError> {
        self.0.viewer_id()
    }
}

impl FromRequest for Auth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        if let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() {
            match decode_jwt(bearer.token()) {
                Ok(claims) => return ready(Ok(Auth(claims))),
                Err(e) => {
                    tracing::debug!(error = %e, "rejected bearer token");
                    return ready(Err(ApiError::Unauthorized.into()));
                }
            }
        }
        ready(Err(ApiError::Unauthorized.into()))
    }
}

/// Viewer id for routes where signing in is optional.
pub fn viewer_of(auth: &Option<Auth>) -> Option<Id> {
    auth.as_ref().and_then(|a| a.viewer_id().ok())
}

/// Create a JWT for a user
pub fn create_jwt(user_id: Id, username: &str, roles: Vec<Role>) -> Result<String, TokenError> {
    let secret = secret()?;
    let expiration = (chrono::Utc::now() + chrono::Duration::hours(24)).timestamp() as usize;

    let claims = Claims {
        sub: format!("{user_id}:{username}"),
        exp: expiration,
        roles,
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}
