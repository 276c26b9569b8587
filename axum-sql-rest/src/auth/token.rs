//! Bearer-token wrapping around the JWT primitive.
//!
//! The crypto itself is jsonwebtoken's; only the claim set and its
//! verification semantics belong to the gateway.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Issued tokens expire after 14 days.
pub const TOKEN_TTL: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// The claim set carried by a gateway token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    #[serde(default)]
    pub is_admin: bool,
    /// Expiry as unix seconds; verified on decode.
    pub exp: i64,
}

/// Signs a token (HMAC-SHA256) for the given user.
pub fn generate(
    secret: &[u8],
    user_id: i64,
    is_admin: bool,
) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .saturating_add(TOKEN_TTL)
        .as_secs() as i64;
    let claims = Claims {
        user_id,
        is_admin,
        exp,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
}

/// Verifies a token's signature and expiry, returning its claims.
pub fn verify(secret: &[u8], token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::errors::ErrorKind;

    use super::*;

    const SECRET: &[u8] = b"test-secret";

    #[test]
    fn test_generate_and_verify() {
        let token = generate(SECRET, 42, true).unwrap();
        let claims = verify(SECRET, &token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert!(claims.is_admin);
        assert!(claims.exp > 0);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = generate(SECRET, 1, false).unwrap();
        let err = verify(b"other-secret", &token).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidSignature));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let expired = Claims {
            user_id: 1,
            is_admin: false,
            exp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_secs() as i64
                - 600,
        };
        let token = encode(
            &Header::default(),
            &expired,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        let err = verify(SECRET, &token).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ExpiredSignature));
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        assert!(verify(SECRET, "not-a-token").is_err());
    }
}
