// src/auth.rs
use crate::error::AuthError;
use crate::secret::Secret;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::{Request, State};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const AUTOMATION_SECRET_HEADER: &str = "X-Automation-Secret";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// External identity id
    pub sub: Option<String>,
    pub email: Option<String>,
    pub exp: usize,
    #[serde(default)]
    pub iat: Option<usize>,
}

/// Secrets the request guards check against.
pub struct AuthConfig {
    jwt_secret: Secret,
    callback_secret: Option<Secret>,
    backend_token: Option<Secret>,
}

impl AuthConfig {
    pub fn new(
        jwt_secret: Secret,
        callback_secret: Option<Secret>,
        backend_token: Option<Secret>,
    ) -> Self {
        Self {
            jwt_secret,
            callback_secret,
            backend_token,
        }
    }

    /// Verify an HS256 bearer token signed with the shared secret.
    pub fn verify_token(&self, token: &str) -> Result<Caller, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;

        let key = DecodingKey::from_secret(self.jwt_secret.expose().as_bytes());
        let data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            _ => AuthError::Invalid(e.to_string()),
        })?;

        let external_id = data
            .claims
            .sub
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingSubject)?;

        Ok(Caller {
            external_id,
            email: data.claims.email,
            token: Secret::new(token),
        })
    }

    /// Fails closed: an unset or empty configured secret rejects every callback.
    pub fn check_callback_secret(&self, presented: Option<&str>) -> Result<(), AuthError> {
        check_shared_secret(self.callback_secret.as_ref(), presented)
    }

    pub fn check_backend_token(&self, presented: Option<&str>) -> Result<(), AuthError> {
        check_shared_secret(self.backend_token.as_ref(), presented)
    }
}

fn check_shared_secret(expected: Option<&Secret>, presented: Option<&str>) -> Result<(), AuthError> {
    match (expected, presented) {
        (Some(expected), Some(presented))
            if !expected.is_empty() && constant_time_eq(expected.expose(), presented) =>
        {
            Ok(())
        }
        _ => Err(AuthError::AutomationSecretMismatch),
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn bearer_token<'r>(req: &'r Request<'_>) -> Result<&'r str, AuthError> {
    match req.headers().get_one("Authorization") {
        Some(header) if header.starts_with("Bearer ") => {
            let token = header[7..].trim();
            if token.is_empty() {
                Err(AuthError::MissingToken)
            } else {
                Ok(token)
            }
        }
        Some(_) => Err(AuthError::InvalidScheme),
        None => Err(AuthError::MissingToken),
    }
}

/// Last authentication failure of a request, read back by the 401 catcher.
pub struct AuthFailure(pub Option<AuthError>);

fn reject<T>(req: &Request<'_>, error: AuthError) -> Outcome<T, AuthError> {
    warn!("Authentication failed: {}", error);
    let cached = req.local_cache(|| AuthFailure(Some(error.clone())));
    let error = cached.0.clone().unwrap_or(error);
    Outcome::Error((Status::Unauthorized, error))
}

async fn auth_config<'r>(req: &'r Request<'_>) -> Option<&'r AuthConfig> {
    match req.guard::<&State<AuthConfig>>().await {
        Outcome::Success(config) => Some(config.inner()),
        _ => None,
    }
}

/// The verified caller of a user-facing endpoint.
#[derive(Debug, Clone)]
pub struct Caller {
    pub external_id: String,
    pub email: Option<String>,
    /// The caller's own bearer token, forwarded to the run for document access.
    pub token: Secret,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Caller {
    type Error = AuthError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(config) = auth_config(req).await else {
            return Outcome::Error((Status::InternalServerError, AuthError::MissingToken));
        };

        let token = match bearer_token(req) {
            Ok(token) => token,
            Err(e) => return reject(req, e),
        };

        match config.verify_token(token) {
            Ok(caller) => {
                info!("JWT validated successfully for user: {}", caller.external_id);
                Outcome::Success(caller)
            }
            Err(e) => reject(req, e),
        }
    }
}

/// A request presenting the automation shared secret (status callbacks).
pub struct AutomationCaller;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AutomationCaller {
    type Error = AuthError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(config) = auth_config(req).await else {
            return Outcome::Error((Status::InternalServerError, AuthError::AutomationSecretMismatch));
        };

        match config.check_callback_secret(req.headers().get_one(AUTOMATION_SECRET_HEADER)) {
            Ok(()) => Outcome::Success(AutomationCaller),
            Err(e) => reject(req, e),
        }
    }
}

/// An orchestrator dispatching a run to this instance's worker endpoint.
pub struct WorkerCaller;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for WorkerCaller {
    type Error = AuthError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(config) = auth_config(req).await else {
            return Outcome::Error((Status::InternalServerError, AuthError::MissingToken));
        };

        let presented = match bearer_token(req) {
            Ok(token) => token,
            Err(e) => return reject(req, e),
        };

        match config.check_backend_token(Some(presented)) {
            Ok(()) => Outcome::Success(WorkerCaller),
            Err(e) => reject(req, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, sub: Option<&str>, exp_offset: i64) -> String {
        let exp = (chrono::Utc::now().timestamp() + exp_offset) as usize;
        let claims = Claims {
            sub: sub.map(str::to_string),
            email: Some("ada@example.com".to_string()),
            exp,
            iat: None,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn config() -> AuthConfig {
        AuthConfig::new(
            Secret::new("jwt-secret"),
            Some(Secret::new("callback-secret")),
            None,
        )
    }

    #[test]
    fn valid_token_yields_caller() {
        let caller = config()
            .verify_token(&token("jwt-secret", Some("user-1"), 3600))
            .unwrap();
        assert_eq!(caller.external_id, "user-1");
        assert_eq!(caller.email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn expired_token_is_rejected() {
        let err = config()
            .verify_token(&token("jwt-secret", Some("user-1"), -3600))
            .unwrap_err();
        assert_eq!(err, AuthError::Expired);
    }

    #[test]
    fn wrong_signature_is_rejected() {
        let err = config()
            .verify_token(&token("other-secret", Some("user-1"), 3600))
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidSignature);
    }

    #[test]
    fn missing_subject_is_rejected() {
        let err = config()
            .verify_token(&token("jwt-secret", None, 3600))
            .unwrap_err();
        assert_eq!(err, AuthError::MissingSubject);
    }

    #[test]
    fn callback_secret_fails_closed() {
        let config = config();
        assert!(config.check_callback_secret(Some("callback-secret")).is_ok());
        assert!(config.check_callback_secret(Some("nope")).is_err());
        assert!(config.check_callback_secret(None).is_err());

        let unconfigured = AuthConfig::new(Secret::new("jwt"), None, None);
        assert!(unconfigured.check_callback_secret(Some("")).is_err());
        assert!(unconfigured.check_backend_token(Some("anything")).is_err());
    }
}
