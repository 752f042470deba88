use jsonwebtoken::{self, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Display name; used as sender/rewarder name.
    pub sub: String,
    /// User row id.
    pub uid: String,
    pub jti: String,
    pub exp: i64,
    pub role: Role,
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("invalid token: {0}")]
    Decode(String),
    #[error("encoding failed: {0}")]
    Encode(String),
}

pub fn decode_and_verify(token: &str, secret: &[u8]) -> Result<JwtClaims, JwtError> {
    let key = DecodingKey::from_secret(secret);
    let validation = Validation::new(Algorithm::HS256);
    jsonwebtoken::decode::<JwtClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| JwtError::Decode(e.to_string()))
}

pub fn encode(claims: &JwtClaims, secret: &[u8]) -> Result<String, JwtError> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| JwtError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> JwtClaims {
        JwtClaims {
            sub: "Ada".into(),
            uid: "student_ada".into(),
            jti: "j1".into(),
            exp: 4_102_444_800,
            role: Role::Student,
        }
    }

    #[test]
    fn verifies_with_the_signing_secret_only() {
        let token = encode(&claims(), b"secret").unwrap();
        let decoded = decode_and_verify(&token, b"secret").unwrap();
        assert_eq!(decoded.sub, "Ada");
        assert_eq!(decoded.role, Role::Student);
        assert!(decode_and_verify(&token, b"other").is_err());
    }
}
