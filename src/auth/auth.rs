use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::model::role::Role;
use crate::models::{Claims, TokenType};

/// The verified caller. Built only from a valid access token, never from
/// query or body fields.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl AuthUser {
    /// Accepts access tokens only.
    pub fn from_claims(claims: Claims) -> AppResult<Self> {
        if claims.token_type != TokenType::Access {
            return Err(AppError::Unauthorized("Access token required".into()));
        }
        let role = Role::from_id(claims.role)
            .ok_or_else(|| AppError::Unauthorized("Invalid role".into()))?;

        Ok(AuthUser {
            user_id: claims.user_id,
            email: claims.sub,
            name: claims.name,
            role,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::forbidden("Admin only"))
        }
    }

    pub fn require_any(&self, roles: &[Role]) -> AppResult<()> {
        if self.is_admin() || roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::forbidden("Not allowed for this account type"))
        }
    }

    /// Employee id of the caller; only employee accounts have one.
    pub fn employee_id(&self) -> AppResult<&str> {
        if self.role == Role::Employee {
            Ok(&self.user_id)
        } else {
            Err(AppError::forbidden("No employee profile"))
        }
    }

    /// Employee whose records the caller may touch: admins pick one,
    /// employees always get themselves.
    pub fn employee_scope<'a>(&'a self, requested: Option<&'a str>) -> AppResult<Option<&'a str>> {
        if self.is_admin() {
            Ok(requested)
        } else {
            self.employee_id().map(Some)
        }
    }
}

pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // set by the auth middleware on protected scopes
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let Some(token) = bearer_token(req) else {
            return ready(Err(AppError::Unauthorized("Missing token".into())));
        };

        let Some(config) = req.app_data::<Data<Config>>() else {
            return ready(Err(AppError::Internal("Config missing".into())));
        };

        let result = verify_token(token, &config.jwt_secret)
            .map_err(|_| AppError::Unauthorized("Invalid token".into()))
            .and_then(AuthUser::from_claims);

        ready(result)
    }
}
