use axum::http::{header, HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use joblane_core::types::{Role, SessionContext};

use crate::problem::ProblemResponse;

/// Decodes session capability tokens minted by the identity service into
/// an explicit [`SessionContext`]. Every handler takes the context as an
/// argument; nothing about the caller is ambient.
#[derive(Clone)]
pub struct SessionTokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SessionTokenValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        // Expiry is checked against the injected clock below so tests can
        // pin time.
        validation.validate_aud = false;
        validation.validate_exp = false;
        validation.validate_nbf = false;
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<SessionContext, TokenError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| TokenError::Invalid(format!("{err}")))?;
        let claims = data.claims;

        let now_ts = now.timestamp();
        if let Some(nbf) = claims.nbf {
            if now_ts < nbf as i64 {
                return Err(TokenError::Invalid("token_not_yet_valid".to_string()));
            }
        }
        if now_ts >= claims.exp as i64 {
            return Err(TokenError::Invalid("token_expired".to_string()));
        }

        let role: Role = claims
            .role
            .parse()
            .map_err(|_| TokenError::Invalid("unknown_role".to_string()))?;

        Ok(SessionContext {
            user_id: claims.sub,
            role,
            display_name: claims.name,
            email: claims.email,
        })
    }
}

/// Claims carried by a session token.
#[derive(Debug, Deserialize, Serialize)]
pub struct SessionClaims {
    pub sub: String,
    pub role: String,
    pub name: String,
    pub email: String,
    pub exp: usize,
    #[serde(default)]
    pub nbf: Option<usize>,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Extracts and validates the bearer session token from request headers.
pub fn authenticate(
    validator: &SessionTokenValidator,
    headers: &HeaderMap,
    now: DateTime<Utc>,
) -> Result<SessionContext, ProblemResponse> {
    let token = bearer_token(headers).ok_or_else(|| {
        ProblemResponse::new(
            StatusCode::UNAUTHORIZED,
            "missing_token",
            "a bearer session token is required",
        )
    })?;

    validator.decode(token, now).map_err(|_| {
        ProblemResponse::new(
            StatusCode::FORBIDDEN,
            "invalid_token",
            "the session token is invalid or expired",
        )
    })
}

/// Rejects callers whose role does not match the operation.
pub fn require_role(session: &SessionContext, role: Role) -> Result<(), ProblemResponse> {
    if session.role == role {
        return Ok(());
    }
    Err(ProblemResponse::new(
        StatusCode::FORBIDDEN,
        "role_mismatch",
        format!("this operation requires the {} role", role.as_str()),
    ))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &[u8] = b"test-secret";

    fn token(claims: &SessionClaims) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(SECRET),
        )
        .expect("encode token")
    }

    fn claims(role: &str, exp: usize) -> SessionClaims {
        SessionClaims {
            sub: "u-1".to_string(),
            role: role.to_string(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            exp,
            nbf: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn decodes_a_valid_session() {
        let validator = SessionTokenValidator::new(SECRET);
        let token = token(&claims("jobseeker", (now().timestamp() + 600) as usize));
        let session = validator.decode(&token, now()).expect("valid session");
        assert_eq!(session.user_id, "u-1");
        assert_eq!(session.role, Role::Seeker);
        assert_eq!(session.display_name, "Alice");
    }

    #[test]
    fn rejects_expired_and_unknown_role_tokens() {
        let validator = SessionTokenValidator::new(SECRET);

        let expired = token(&claims("jobseeker", (now().timestamp() - 1) as usize));
        assert!(validator.decode(&expired, now()).is_err());

        let bad_role = token(&claims("superuser", (now().timestamp() + 600) as usize));
        assert!(validator.decode(&bad_role, now()).is_err());
    }

    #[test]
    fn rejects_tokens_signed_with_another_secret() {
        let validator = SessionTokenValidator::new(SECRET);
        let forged = encode(
            &Header::default(),
            &claims("employer", (now().timestamp() + 600) as usize),
            &EncodingKey::from_secret(b"other-secret"),
        )
        .unwrap();
        assert!(validator.decode(&forged, now()).is_err());
    }

    #[test]
    fn role_gate_matches_exactly() {
        let session = SessionContext {
            user_id: "u-1".to_string(),
            role: Role::Employer,
            display_name: "Acme HR".to_string(),
            email: "hr@acme.example".to_string(),
        };
        assert!(require_role(&session, Role::Employer).is_ok());
        assert!(require_role(&session, Role::Seeker).is_err());
    }
}
