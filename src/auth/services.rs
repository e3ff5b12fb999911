//! Session lifecycle: registration, login, refresh rotation, logout and
//! password change, plus the profile flows that share the same store.
//!
//! Each user holds at most one refresh token. Login overwrites it, refresh
//! swaps it with a compare-and-swap, logout clears it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use super::dto::RegisterForm;
use super::jwt::{JwtKeys, TokenPair};
use super::password::{hash_password_async, verify_password_async};
use crate::error::AppError;
use crate::images::{AssetManager, UploadItem};
use crate::users::model::{AssetSlot, NewUser, PublicUser};
use crate::users::repo::{StoreError, UserStore};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trimmed value, or `None` if nothing is left.
fn non_blank(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, AppError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| AppError::StoreTimeout)?
        .map_err(AppError::from)
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub user: PublicUser,
    pub tokens: TokenPair,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    keys: Arc<JwtKeys>,
    assets: AssetManager,
    store_timeout: Duration,
    revoke_on_password_change: bool,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        keys: Arc<JwtKeys>,
        assets: AssetManager,
        store_timeout: Duration,
        revoke_on_password_change: bool,
    ) -> Self {
        Self {
            users,
            keys,
            assets,
            store_timeout,
            revoke_on_password_change,
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    pub async fn register(&self, form: RegisterForm) -> Result<PublicUser, AppError> {
        let RegisterForm {
            username,
            email,
            full_name,
            password,
            avatar,
            cover,
        } = form;

        if [&username, &email, &full_name, &password]
            .iter()
            .any(|f| f.trim().is_empty())
        {
            return Err(AppError::validation("All fields are required"));
        }
        let username = username.trim().to_lowercase();
        let email = email.trim().to_lowercase();
        let full_name = full_name.trim().to_string();
        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(AppError::validation("Invalid email"));
        }

        if bounded(self.store_timeout, self.users.exists(&username, &email)).await? {
            warn!(username = %username, email = %email, "username or email already registered");
            return Err(AppError::Conflict("Username or email already exists".into()));
        }

        let avatar = avatar.ok_or_else(|| AppError::validation("Avatar file is required"))?;

        let id = Uuid::new_v4();
        let avatar = self.assets.upload(id, AssetSlot::Avatar, avatar).await?;
        let cover = match cover {
            Some(item) => match self.assets.upload(id, AssetSlot::Cover, item).await {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!(error = %e, user_id = %id, "cover upload failed; continuing without cover");
                    None
                }
            },
            None => None,
        };

        let created = match hash_password_async(password).await {
            Ok(password_hash) => {
                let new_user = NewUser {
                    id,
                    username,
                    email,
                    full_name,
                    password_hash,
                    avatar: avatar.clone(),
                    cover: cover.clone(),
                };
                bounded(self.store_timeout, self.users.create(new_user)).await
            }
            Err(e) => Err(e),
        };

        match created {
            Ok(user) => {
                info!(user_id = %user.id, username = %user.username, "user registered");
                Ok(PublicUser::from(&user))
            }
            Err(AppError::StoreTimeout) => {
                // The insert may have committed; the uploads stay referenced if so.
                warn!(user_id = %id, "create timed out; keeping uploaded images");
                Err(AppError::StoreTimeout)
            }
            Err(e) => {
                self.assets.discard(&avatar).await;
                if let Some(cover) = &cover {
                    self.assets.discard(cover).await;
                }
                Err(e)
            }
        }
    }

    pub async fn login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        password: &str,
    ) -> Result<LoginOutcome, AppError> {
        let username = non_blank(username).map(str::to_lowercase);
        let email = non_blank(email).map(str::to_lowercase);
        if username.is_none() && email.is_none() {
            return Err(AppError::validation("Username or email is required"));
        }

        let user = bounded(
            self.store_timeout,
            self.users
                .find_by_login(username.as_deref(), email.as_deref()),
        )
        .await?
        .ok_or_else(|| AppError::NotFound("User does not exist".into()))?;

        let ok = verify_password_async(password.to_string(), user.password_hash.clone()).await?;
        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::Authentication("invalid credentials"));
        }

        let tokens = self.keys.issue_pair(user.id)?;
        // Overwriting the stored token ends any previous session.
        let stored = bounded(
            self.store_timeout,
            self.users.set_refresh_token(user.id, Some(&tokens.refresh_token)),
        )
        .await?;
        if !stored {
            return Err(AppError::NotFound("User does not exist".into()));
        }

        info!(user_id = %user.id, "user logged in");
        Ok(LoginOutcome {
            user: PublicUser::from(&user),
            tokens,
        })
    }

    pub async fn refresh(&self, incoming: Option<&str>) -> Result<TokenPair, AppError> {
        let incoming =
            non_blank(incoming).ok_or(AppError::Authentication("missing refresh token"))?;
        let user_id = self.keys.verify_refresh(incoming)?;

        let user = bounded(self.store_timeout, self.users.find_by_id(user_id))
            .await?
            .ok_or(AppError::Authentication("unknown user"))?;
        if user.refresh_token.as_deref() != Some(incoming) {
            warn!(user_id = %user_id, "refresh token expired or already used");
            return Err(AppError::Authentication(
                "refresh token expired or already used",
            ));
        }

        let tokens = self.keys.issue_pair(user_id)?;
        let rotated = bounded(
            self.store_timeout,
            self.users
                .rotate_refresh_token(user_id, incoming, &tokens.refresh_token),
        )
        .await?;
        if !rotated {
            // Lost a race with a concurrent refresh or logout.
            warn!(user_id = %user_id, "refresh token consumed concurrently");
            return Err(AppError::Authentication(
                "refresh token expired or already used",
            ));
        }

        info!(user_id = %user_id, "refresh token rotated");
        Ok(tokens)
    }

    pub async fn logout(&self, user_id: Uuid) -> Result<(), AppError> {
        let cleared = bounded(self.store_timeout, self.users.set_refresh_token(user_id, None)).await?;
        if !cleared {
            warn!(user_id = %user_id, "logout for unknown user");
        }
        info!(user_id = %user_id, "user logged out");
        Ok(())
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        if new_password.trim().is_empty() {
            return Err(AppError::validation("New password is required"));
        }
        let user = bounded(self.store_timeout, self.users.find_by_id(user_id))
            .await?
            .ok_or_else(|| AppError::NotFound("User does not exist".into()))?;

        let ok = verify_password_async(old_password.to_string(), user.password_hash).await?;
        if !ok {
            warn!(user_id = %user_id, "change password with wrong old password");
            return Err(AppError::Authentication("invalid credentials"));
        }

        let hash = hash_password_async(new_password.to_string()).await?;
        let updated = bounded(
            self.store_timeout,
            self.users
                .set_password_hash(user_id, &hash, self.revoke_on_password_change),
        )
        .await?;
        if !updated {
            return Err(AppError::NotFound("User does not exist".into()));
        }
        info!(
            user_id = %user_id,
            session_revoked = self.revoke_on_password_change,
            "password changed"
        );
        Ok(())
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<PublicUser, AppError> {
        bounded(self.store_timeout, self.users.find_by_id(user_id))
            .await?
            .map(|u| PublicUser::from(&u))
            .ok_or_else(|| AppError::NotFound("User does not exist".into()))
    }

    pub async fn update_account(
        &self,
        user_id: Uuid,
        full_name: Option<&str>,
        email: Option<&str>,
    ) -> Result<PublicUser, AppError> {
        let (Some(full_name), Some(email)) = (non_blank(full_name), non_blank(email)) else {
            return Err(AppError::validation("All fields are required"));
        };
        let email = email.to_lowercase();
        if !is_valid_email(&email) {
            return Err(AppError::validation("Invalid email"));
        }

        let user = bounded(
            self.store_timeout,
            self.users.update_account(user_id, full_name, &email),
        )
        .await?
        .ok_or_else(|| AppError::NotFound("User does not exist".into()))?;
        info!(user_id = %user_id, "account details updated");
        Ok(PublicUser::from(&user))
    }

    /// Replaces the avatar or cover image; the previous object is deleted
    /// only after the new reference is stored.
    pub async fn update_asset(
        &self,
        user_id: Uuid,
        slot: AssetSlot,
        item: Option<UploadItem>,
    ) -> Result<PublicUser, AppError> {
        let item = item.ok_or_else(|| {
            AppError::validation(match slot {
                AssetSlot::Avatar => "Avatar file is missing",
                AssetSlot::Cover => "Cover image file is missing",
            })
        })?;
        let user = bounded(self.store_timeout, self.users.find_by_id(user_id))
            .await?
            .ok_or_else(|| AppError::NotFound("User does not exist".into()))?;

        let users = self.users.clone();
        let limit = self.store_timeout;
        let updated = self
            .assets
            .replace(user.id, slot, user.asset(slot), item, |asset| async move {
                bounded(limit, users.set_asset(user_id, slot, &asset))
                    .await?
                    .ok_or_else(|| AppError::NotFound("User does not exist".into()))
            })
            .await?;

        info!(user_id = %user_id, slot = slot.as_str(), "profile image replaced");
        Ok(PublicUser::from(&updated))
    }
}
