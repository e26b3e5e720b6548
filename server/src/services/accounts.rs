use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::password::{hash_password, verify_password};
use crate::auth::{AuthAdmin, TokenIssuer};
use crate::models::{Admin, AdminRole, User};
use crate::store::Store;
use crate::utils::{AppError, AppResult};

const PASSWORD_SPECIALS: &str = "@$!%*?&";
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginUser {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterAdmin {
    pub username: String,
    pub password: String,
    pub role: AdminRole,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginAdmin {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSession {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminSession {
    pub token: String,
    pub admin: Admin,
}

/// At least 8 characters from letters, digits and `@$!%*?&`, with one of
/// each of lower case, upper case, digit and special.
pub fn validate_password(password: &str) -> AppResult<()> {
    let allowed = password
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || PASSWORD_SPECIALS.contains(c));
    let strong = password.chars().count() >= MIN_PASSWORD_LEN
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| PASSWORD_SPECIALS.contains(c));

    if allowed && strong {
        Ok(())
    } else {
        Err(AppError::ValidationError(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters and contain upper and lower \
             case letters, a number and one of {PASSWORD_SPECIALS}"
        )))
    }
}

pub fn validate_email(email: &str) -> AppResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AppError::ValidationError("Invalid email format".to_string()))
    }
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn Store>,
    tokens: Arc<TokenIssuer>,
}

impl AccountService {
    pub fn new(store: Arc<dyn Store>, tokens: Arc<TokenIssuer>) -> Self {
        Self { store, tokens }
    }

    pub async fn register_user(&self, request: RegisterUser) -> AppResult<User> {
        let name = request.name.trim();
        let email = request.email.trim().to_lowercase();
        if name.is_empty() {
            return Err(AppError::ValidationError("Name is required".to_string()));
        }
        validate_email(&email)?;
        validate_password(&request.password)?;

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }

        let hash = hash_password(&request.password)?;
        let user = self.store.create_user(name, &email, &hash).await?;
        info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    pub async fn login_user(&self, request: LoginUser) -> AppResult<UserSession> {
        let email = request.email.trim().to_lowercase();
        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .filter(|u| verify_password(&request.password, &u.password_hash))
            .ok_or_else(|| AppError::AuthError("Invalid email or password".to_string()))?;

        let token = self.tokens.issue_for_user(&user)?;
        info!(user_id = %user.id, "User logged in");
        Ok(UserSession { token, user })
    }

    /// Only a SUPER_ADMIN may create admins, except for the very first
    /// one, which must itself be a SUPER_ADMIN.
    pub async fn register_admin(
        &self,
        caller: Option<&AuthAdmin>,
        request: RegisterAdmin,
    ) -> AppResult<Admin> {
        let username = request.username.trim();
        if username.is_empty() {
            return Err(AppError::ValidationError("Username is required".to_string()));
        }
        validate_password(&request.password)?;

        match caller {
            Some(admin) => admin.authorize(&[AdminRole::SuperAdmin])?,
            None => {
                if self.store.count_admins().await? > 0 {
                    return Err(AppError::AuthError(
                        "Missing authorization header".to_string(),
                    ));
                }
                if request.role != AdminRole::SuperAdmin {
                    return Err(AppError::ValidationError(
                        "The first admin must be a SUPER_ADMIN".to_string(),
                    ));
                }
            }
        }

        if self.store.find_admin_by_username(username).await?.is_some() {
            return Err(AppError::Conflict("Username is already taken".to_string()));
        }

        let hash = hash_password(&request.password)?;
        let admin = self
            .store
            .create_admin(username, &hash, request.role)
            .await?;
        info!(admin_id = %admin.id, role = ?admin.role, "Admin registered");
        Ok(admin)
    }

    pub async fn login_admin(&self, request: LoginAdmin) -> AppResult<AdminSession> {
        let admin = self
            .store
            .find_admin_by_username(request.username.trim())
            .await?
            .filter(|a| verify_password(&request.password, &a.password_hash))
            .ok_or_else(|| AppError::AuthError("Invalid username or password".to_string()))?;

        let token = self.tokens.issue_for_admin(&admin)?;
        info!(admin_id = %admin.id, "Admin logged in");
        Ok(AdminSession { token, admin })
    }
}
