//! HS256 access/refresh token pairs.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use souk_core::UserId;

use super::AuthError;
use crate::config::JwtConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub jti: String,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly issued access + refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    pub access_claims: Claims,
    pub refresh_claims: Claims,
}

/// Signs and verifies bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    #[must_use]
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    /// Issue a new pair with distinct JTIs.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenEncoding` if signing fails.
    pub fn issue_pair(&self, user_id: UserId) -> Result<TokenPair, AuthError> {
        let access_claims = self.claims(user_id, TokenType::Access, self.access_ttl);
        let refresh_claims = self.claims(user_id, TokenType::Refresh, self.refresh_ttl);

        let header = Header::new(Algorithm::HS256);
        Ok(TokenPair {
            access: encode(&header, &access_claims, &self.encoding)?,
            refresh: encode(&header, &refresh_claims, &self.encoding)?,
            access_claims,
            refresh_claims,
        })
    }

    /// Verify signature and expiry, and require the given token type.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for any verification failure.
    pub fn decode(&self, token: &str, expected: TokenType) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            AuthError::InvalidToken
        })?;

        if data.claims.token_type != expected {
            return Err(AuthError::InvalidToken);
        }
        Ok(data.claims)
    }

    fn claims(&self, user_id: UserId, token_type: TokenType, ttl: Duration) -> Claims {
        let now = Utc::now();
        Claims {
            sub: user_id,
            jti: Uuid::new_v4().simple().to_string(),
            token_type,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn service(access_ttl: Duration) -> TokenService {
        TokenService::new(&JwtConfig {
            secret: SecretString::from("k7Q!p2Zr9@Lm4#Xw8$Tn3%Vb6^Hc1&Jd"),
            access_ttl,
            refresh_ttl: Duration::days(7),
        })
    }

    #[test]
    fn test_pair_has_distinct_jtis_and_types() {
        let tokens = service(Duration::minutes(15));
        let pair = tokens.issue_pair(UserId::new(42)).unwrap();

        assert_ne!(pair.access_claims.jti, pair.refresh_claims.jti);
        assert!(pair.refresh_claims.exp > pair.access_claims.exp);

        let access = tokens.decode(&pair.access, TokenType::Access).unwrap();
        assert_eq!(access.sub, UserId::new(42));
        let refresh = tokens.decode(&pair.refresh, TokenType::Refresh).unwrap();
        assert_eq!(refresh.jti, pair.refresh_claims.jti);
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let tokens = service(Duration::minutes(15));
        let pair = tokens.issue_pair(UserId::new(1)).unwrap();

        assert!(matches!(
            tokens.decode(&pair.refresh, TokenType::Access),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let tokens = service(Duration::minutes(-5));
        let pair = tokens.issue_pair(UserId::new(1)).unwrap();

        assert!(matches!(
            tokens.decode(&pair.access, TokenType::Access),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_foreign_signature_is_rejected() {
        let pair = service(Duration::minutes(15))
            .issue_pair(UserId::new(1))
            .unwrap();
        let other = TokenService::new(&JwtConfig {
            secret: SecretString::from("Zr9@Lm4#Xw8$Tn3%Vb6^Hc1&Jdk7Q!p2"),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
        });

        assert!(other.decode(&pair.access, TokenType::Access).is_err());
        assert!(other.decode("not-a-jwt", TokenType::Access).is_err());
    }
}
