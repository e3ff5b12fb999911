use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::model::{AssetRef, AssetSlot, NewUser, User, UserRow};
use crate::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("username or email already exists")]
    Conflict,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
            _ => StoreError::Backend(anyhow::Error::new(e)),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => AppError::Conflict("Username or email already exists".into()),
            StoreError::Backend(e) => AppError::Store(format!("{e:#}")),
        }
    }
}

/// Persistence boundary for user records.
///
/// Mutations that report `bool` return `false` when the target user does not
/// exist (or, for rotation, when the expected token no longer matches).
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Matches on username or email, whichever are supplied.
    async fn find_by_login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, StoreError>;

    async fn exists(&self, username: &str, email: &str) -> Result<bool, StoreError>;

    /// Fails with `StoreError::Conflict` if username or email is taken.
    async fn create(&self, new_user: NewUser) -> Result<User, StoreError>;

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<bool, StoreError>;

    /// Replaces the refresh token only if it still equals `expected`.
    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        next: &str,
    ) -> Result<bool, StoreError>;

    async fn set_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
        revoke_session: bool,
    ) -> Result<bool, StoreError>;

    async fn update_account(
        &self,
        id: Uuid,
        full_name: &str,
        email: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn set_asset(
        &self,
        id: Uuid,
        slot: AssetSlot,
        asset: &AssetRef,
    ) -> Result<Option<User>, StoreError>;
}

const USER_COLUMNS: &str = "id, username, email, full_name, password_hash, \
     avatar_url, avatar_object_id, cover_url, cover_object_id, \
     refresh_token, created_at, updated_at";

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(User::from))
    }

    async fn find_by_login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {USER_COLUMNS}
              FROM users
             WHERE ($1::text IS NOT NULL AND username = $1)
                OR ($2::text IS NOT NULL AND email = $2)
             LIMIT 1
            "#
        ))
        .bind(username)
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(User::from))
    }

    async fn exists(&self, username: &str, email: &str) -> Result<bool, StoreError> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1 OR email = $2)",
        )
        .bind(username)
        .bind(email)
        .fetch_one(&self.db)
        .await?;
        Ok(found)
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let cover_url = new_user.cover.as_ref().map(|c| c.url.as_str());
        let cover_object_id = new_user.cover.as_ref().and_then(|c| c.object_id.as_deref());
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, username, email, full_name, password_hash,
                               avatar_url, avatar_object_id, cover_url, cover_object_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(new_user.id)
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.full_name)
        .bind(&new_user.password_hash)
        .bind(&new_user.avatar.url)
        .bind(new_user.avatar.object_id.as_deref())
        .bind(cover_url)
        .bind(cover_object_id)
        .fetch_one(&self.db)
        .await?;
        Ok(row.into())
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<bool, StoreError> {
        let res = sqlx::query(
            "UPDATE users SET refresh_token = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(token)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        next: &str,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET refresh_token = $3, updated_at = now()
             WHERE id = $1 AND refresh_token = $2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn set_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
        revoke_session: bool,
    ) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $2,
                   refresh_token = CASE WHEN $3 THEN NULL ELSE refresh_token END,
                   updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .bind(revoke_session)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn update_account(
        &self,
        id: Uuid,
        full_name: &str,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET full_name = $2, email = $3, updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(full_name)
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(User::from))
    }

    async fn set_asset(
        &self,
        id: Uuid,
        slot: AssetSlot,
        asset: &AssetRef,
    ) -> Result<Option<User>, StoreError> {
        let (url_col, id_col) = match slot {
            AssetSlot::Avatar => ("avatar_url", "avatar_object_id"),
            AssetSlot::Cover => ("cover_url", "cover_object_id"),
        };
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET {url_col} = $2, {id_col} = $3, updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&asset.url)
        .bind(asset.object_id.as_deref())
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(User::from))
    }
}
