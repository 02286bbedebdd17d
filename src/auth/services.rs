use std::sync::Arc;

use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{jwt::JwtKeys, password::PasswordHasher};
use crate::{
    error::AppError,
    state::AppState,
    users::{
        repo::{StoreError, UserStore},
        repo_types::{NewUser, PublicUser, Role, User, UserChanges},
    },
};

pub const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_full_name(full_name: &str) -> Result<(), AppError> {
    if full_name.trim().is_empty() {
        return Err(AppError::validation("fullName", "Full name is required"));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), AppError> {
    if !is_valid_email(email) {
        return Err(AppError::validation("email", "Invalid email format"));
    }
    Ok(())
}

fn validate_password(field: &'static str, password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            field,
            "Password must be at least 6 characters",
        ));
    }
    Ok(())
}

/// A freshly minted token and the user it was issued for.
#[derive(Debug)]
pub struct Session {
    pub token: String,
    pub user: PublicUser,
}

/// Signup, login, password and profile changes.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    keys: JwtKeys,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        AuthService::new(state.store.clone(), state.hasher.clone(), state.keys.clone())
    }
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, hasher: PasswordHasher, keys: JwtKeys) -> Self {
        Self {
            store,
            hasher,
            keys,
        }
    }

    fn session_for(&self, user: User) -> Result<Session, AppError> {
        let token = self.keys.issue(user.id, user.role).map_err(AppError::internal)?;
        Ok(Session {
            token,
            user: user.into(),
        })
    }

    #[instrument(skip(self, password))]
    pub async fn signup(
        &self,
        full_name: &str,
        email: &str,
        password: &str,
    ) -> Result<Session, AppError> {
        validate_full_name(full_name)?;
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_password("password", password)?;

        let password_hash = self
            .hasher
            .hash_blocking(password.to_string())
            .await
            .map_err(AppError::internal)?;

        let user = self
            .store
            .create(NewUser {
                full_name: full_name.trim().to_string(),
                email,
                password_hash,
                role: Role::User,
            })
            .await
            .map_err(|e| {
                if matches!(e, StoreError::DuplicateEmail) {
                    warn!("signup with registered email");
                }
                AppError::from(e)
            })?;

        info!(user_id = %user.id, email = %user.email, "user registered");
        self.session_for(user)
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let email = normalize_email(email);

        let user = match self.store.find_by_email(&email).await? {
            Some(u) => u,
            None => {
                warn!(email = %email, "login unknown email");
                return Err(AppError::InvalidCredentials);
            }
        };

        let ok = self
            .hasher
            .verify_blocking(password.to_string(), user.password_hash.clone())
            .await
            .map_err(AppError::internal)?;
        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }

        if !user.is_active() {
            warn!(user_id = %user.id, "login to inactive account");
            return Err(AppError::AccountInactive);
        }

        info!(user_id = %user.id, "user logged in");
        self.session_for(user)
    }

    /// The existing token stays valid after the change.
    #[instrument(skip(self, current_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let ok = self
            .hasher
            .verify_blocking(current_password.to_string(), user.password_hash)
            .await
            .map_err(AppError::internal)?;
        if !ok {
            warn!(user_id = %user_id, "change password with wrong current password");
            return Err(AppError::InvalidCurrentPassword);
        }

        validate_password("newPassword", new_password)?;

        let password_hash = self
            .hasher
            .hash_blocking(new_password.to_string())
            .await
            .map_err(AppError::internal)?;
        self.store
            .update(
                user_id,
                UserChanges {
                    password_hash: Some(password_hash),
                    ..Default::default()
                },
            )
            .await?;

        info!(user_id = %user_id, "password changed");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        full_name: Option<&str>,
        email: Option<&str>,
    ) -> Result<PublicUser, AppError> {
        let full_name = match full_name {
            Some(name) => {
                validate_full_name(name)?;
                Some(name.trim().to_string())
            }
            None => None,
        };
        let email = match email {
            Some(raw) => {
                let email = normalize_email(raw);
                validate_email(&email)?;
                if let Some(owner) = self.store.find_by_email(&email).await? {
                    if owner.id != user_id {
                        warn!(user_id = %user_id, "profile update to email in use");
                        return Err(AppError::DuplicateEmail);
                    }
                }
                Some(email)
            }
            None => None,
        };

        let user = self
            .store
            .update(
                user_id,
                UserChanges {
                    full_name,
                    email,
                    ..Default::default()
                },
            )
            .await?;

        info!(user_id = %user.id, "profile updated");
        Ok(user.into())
    }

    /// Creates the configured admin unless the email is already registered.
    #[instrument(skip(self, password))]
    pub async fn ensure_admin(
        &self,
        full_name: &str,
        email: &str,
        password: &str,
    ) -> Result<(), AppError> {
        validate_full_name(full_name)?;
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_password("password", password)?;

        if self.store.find_by_email(&email).await?.is_some() {
            info!(email = %email, "admin account already present");
            return Ok(());
        }

        let password_hash = self
            .hasher
            .hash_blocking(password.to_string())
            .await
            .map_err(AppError::internal)?;
        let created = self
            .store
            .create(NewUser {
                full_name: full_name.trim().to_string(),
                email,
                password_hash,
                role: Role::Admin,
            })
            .await;

        match created {
            Ok(user) => {
                info!(user_id = %user.id, email = %user.email, "admin account created");
                Ok(())
            }
            // lost a race against another instance seeding the same account
            Err(StoreError::DuplicateEmail) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
