use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error};
use uuid::Uuid;

use crate::auth::auth::AuthUser;
use crate::models::{Claims, TokenType};

fn now() -> usize {
    Utc::now().timestamp().max(0) as usize
}

fn issue(
    user: &AuthUser,
    token_type: TokenType,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), Error> {
    let claims = Claims {
        user_id: user.user_id.clone(),
        sub: user.email.clone(),
        name: user.name.clone(),
        role: user.role.id(),
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
        token_type,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok((token, claims))
}

pub fn generate_access_token(user: &AuthUser, secret: &str, ttl: usize) -> Result<String, Error> {
    issue(user, TokenType::Access, secret, ttl).map(|(token, _)| token)
}

pub fn generate_refresh_token(
    user: &AuthUser,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), Error> {
    issue(user, TokenType::Refresh, secret, ttl)
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;

    fn vendor() -> AuthUser {
        AuthUser {
            user_id: "u-1".into(),
            email: "vendor@x.com".into(),
            name: "Vera".into(),
            role: Role::Vendor,
        }
    }

    #[test]
    fn tokens_carry_identity_and_type() {
        let access = generate_access_token(&vendor(), "secret", 60).unwrap();
        let claims = verify_token(&access, "secret").unwrap();
        assert_eq!(claims.user_id, "u-1");
        assert_eq!(claims.sub, "vendor@x.com");
        assert_eq!(claims.role, Role::Vendor.id());
        assert_eq!(claims.token_type, TokenType::Access);

        let (refresh, refresh_claims) = generate_refresh_token(&vendor(), "secret", 60).unwrap();
        assert_eq!(refresh_claims.token_type, TokenType::Refresh);
        assert_eq!(verify_token(&refresh, "secret").unwrap().jti, refresh_claims.jti);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let access = generate_access_token(&vendor(), "secret", 60).unwrap();
        assert!(verify_token(&access, "other").is_err());
    }
}
