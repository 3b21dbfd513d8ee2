//! Signed identity tokens
//!
//! HS256 JWTs carrying only the username. Tokens are long-lived: no expiry
//! claim is issued or required.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::auth::credentials::Identity;
use crate::error::VaultError;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn issue(&self, identity: &Identity) -> Result<String, VaultError> {
        let claims = Claims {
            sub: identity.name().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| VaultError::Internal(format!("token signing failed: {e}")))
    }

    /// Returns the subject of a correctly signed token.
    pub fn validate(&self, token: &str) -> Result<String, VaultError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims.sub)
            .map_err(|_| VaultError::AuthorizationRequired("Invalid token".into()))
    }
}
