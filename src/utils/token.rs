use axum::http::StatusCode;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorMessage, HttpError};

/// JWT claims: `sub` is the user id, `iat`/`exp` are unix seconds
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
}

pub fn create_token(
    user_id: &str,
    secret: &[u8],
    expires_in_seconds: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    if user_id.is_empty() {
        return Err(jsonwebtoken::errors::ErrorKind::InvalidSubject.into());
    }

    let now = Utc::now();
    let iat = now.timestamp() as usize;
    let exp = (now + Duration::seconds(expires_in_seconds)).timestamp() as usize;
    let claims = TokenClaims {
        sub: user_id.to_string(),
        iat,
        exp,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
}

/// Returns the subject of a valid, unexpired HS256 token
pub fn decode_token<T: Into<String>>(token: T, secret: &[u8]) -> Result<String, HttpError> {
    let decoded = decode::<TokenClaims>(
        &token.into(),
        &DecodingKey::from_secret(secret),
        &Validation::new(Algorithm::HS256),
    );

    match decoded {
        Ok(token) => Ok(token.claims.sub),
        Err(_) => Err(HttpError::new(
            ErrorMessage::InvalidToken.to_string(),
            StatusCode::UNAUTHORIZED,
        )),
    }
}

/// Opaque, single-use token embedded in the verification link
pub fn generate_verification_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    #[test]
    fn round_trips_subject() {
        let token = create_token("user-1", SECRET, 60).unwrap();
        assert_eq!(decode_token(token, SECRET).unwrap(), "user-1");
    }

    #[test]
    fn rejects_wrong_secret_and_expired_tokens() {
        let token = create_token("user-1", SECRET, 60).unwrap();
        assert_eq!(
            decode_token(token, b"other").unwrap_err().status,
            StatusCode::UNAUTHORIZED
        );

        // default validation allows 60s of leeway
        let expired = create_token("user-1", SECRET, -120).unwrap();
        assert!(decode_token(expired, SECRET).is_err());
    }

    #[test]
    fn empty_subject_is_refused() {
        assert!(create_token("", SECRET, 60).is_err());
    }

    #[test]
    fn verification_tokens_are_unique() {
        assert_ne!(generate_verification_token(), generate_verification_token());
    }
}
