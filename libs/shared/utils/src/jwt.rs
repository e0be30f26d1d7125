use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use thiserror::Error;
use tracing::debug;

use shared_models::auth::{JwtClaims, User};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum JwtError {
    #[error("JWT secret is not set")]
    MissingSecret,

    #[error("Token expired")]
    Expired,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Invalid token: {0}")]
    Malformed(String),
}

pub fn validate_token(token: &str, jwt_secret: &str) -> Result<User, JwtError> {
    if jwt_secret.is_empty() {
        return Err(JwtError::MissingSecret);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    // Supabase issues `aud: authenticated`; audience is not part of our trust decision.
    validation.validate_aud = false;

    let data = decode::<JwtClaims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => JwtError::Expired,
        ErrorKind::InvalidSignature => JwtError::InvalidSignature,
        _ => {
            debug!("Rejected token: {}", e);
            JwtError::Malformed(e.to_string())
        }
    })?;

    let claims = data.claims;

    // Application roles live in app_metadata; the top-level claim is the database role.
    let role = claims
        .app_metadata
        .as_ref()
        .and_then(|meta| meta.get("role"))
        .and_then(|role| role.as_str())
        .map(str::to_string)
        .or(claims.role);

    let user = User {
        id: claims.sub,
        email: claims.email,
        role,
    };

    debug!("Token validated successfully for user: {}", user.id);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{JwtTestUtils, TestUser};
    use assert_matches::assert_matches;

    const SECRET: &str = "test-secret-key-for-jwt-validation-must-be-long-enough";

    #[test]
    fn valid_token_yields_user_with_role() {
        let user = TestUser::doctor("doc@example.com");
        let token = JwtTestUtils::create_test_token(&user, SECRET, Some(1));

        let validated = validate_token(&token, SECRET).unwrap();
        assert_eq!(validated.id, user.id);
        assert_eq!(validated.email.as_deref(), Some("doc@example.com"));
        assert!(validated.is_doctor());
    }

    #[test]
    fn app_metadata_role_wins_over_database_role() {
        let user = TestUser::admin("admin@example.com");
        let token = JwtTestUtils::create_supabase_style_token(&user, SECRET);

        let validated = validate_token(&token, SECRET).unwrap();
        assert!(validated.is_admin());
    }

    #[test]
    fn expired_and_forged_tokens_are_rejected() {
        let user = TestUser::patient("p@example.com");

        let expired = JwtTestUtils::create_expired_token(&user, SECRET);
        assert_eq!(validate_token(&expired, SECRET), Err(JwtError::Expired));

        let forged = JwtTestUtils::create_invalid_signature_token(&user);
        assert_eq!(validate_token(&forged, SECRET), Err(JwtError::InvalidSignature));

        assert_matches!(
            validate_token(&JwtTestUtils::create_malformed_token(), SECRET),
            Err(JwtError::Malformed(_))
        );
        assert_eq!(validate_token("a.b.c", ""), Err(JwtError::MissingSecret));
    }
}
