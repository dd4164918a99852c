use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Bearer token claims issued by the login endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub exp: i64,
}

/// HS256 token signing and verification with the shared `JWT_SECRET`.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenKeys {
    pub fn new(secret: &str) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::EmptySecret);
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        })
    }

    /// Issue a token for `user_id` valid for `ttl_secs`.
    pub fn sign(&self, user_id: i64, ttl_secs: i64) -> Result<String, AuthError> {
        let claims = Claims {
            user_id,
            exp: Utc::now().timestamp() + ttl_secs,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Verify a token and return the user id it was issued for.
    pub fn verify(&self, token: &str) -> Result<i64, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;
        Ok(data.claims.user_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("JWT secret must not be empty")]
    EmptySecret,

    #[error("Invalid token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_then_verify() {
        let keys = TokenKeys::new("secret").unwrap();
        let token = keys.sign(7, 3600).unwrap();
        assert_eq!(keys.verify(&token).unwrap(), 7);
    }

    #[test]
    fn test_rejects_other_secret_and_expired_tokens() {
        let keys = TokenKeys::new("secret").unwrap();
        let other = TokenKeys::new("other").unwrap();

        assert!(keys.verify(&other.sign(7, 3600).unwrap()).is_err());
        assert!(keys.verify(&keys.sign(7, -3600).unwrap()).is_err());
        assert!(keys.verify("not-a-token").is_err());
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        assert!(matches!(TokenKeys::new(""), Err(AuthError::EmptySecret)));
    }
}
