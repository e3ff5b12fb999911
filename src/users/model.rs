use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Reference to an image held by object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    pub url: String,
    /// Provider object id recorded at upload time; absent on legacy references.
    pub object_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSlot {
    Avatar,
    Cover,
}

impl AssetSlot {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetSlot::Avatar => "avatars",
            AssetSlot::Cover => "covers",
        }
    }
}

/// User record as persisted.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String, // Argon2 hash
    pub avatar: AssetRef,
    pub cover: Option<AssetRef>,
    pub refresh_token: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn asset(&self, slot: AssetSlot) -> Option<&AssetRef> {
        match slot {
            AssetSlot::Avatar => Some(&self.avatar),
            AssetSlot::Cover => self.cover.as_ref(),
        }
    }
}

/// Flat row shape of the `users` table.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub avatar_url: String,
    pub avatar_object_id: Option<String>,
    pub cover_url: Option<String>,
    pub cover_object_id: Option<String>,
    pub refresh_token: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            username: r.username,
            email: r.email,
            full_name: r.full_name,
            password_hash: r.password_hash,
            avatar: AssetRef {
                url: r.avatar_url,
                object_id: r.avatar_object_id,
            },
            cover: r.cover_url.map(|url| AssetRef {
                url,
                object_id: r.cover_object_id,
            }),
            refresh_token: r.refresh_token,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Input for creating a user; the store assigns timestamps.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub avatar: AssetRef,
    pub cover: Option<AssetRef>,
}

/// Sanitized view returned to callers; carries no credential fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            email: u.email.clone(),
            full_name: u.full_name.clone(),
            avatar: u.avatar.url.clone(),
            cover_image: u.cover.as_ref().map(|c| c.url.clone()),
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "a@x.com".into(),
            full_name: "Alice A".into(),
            password_hash: "$argon2id$secret-hash".into(),
            avatar: AssetRef {
                url: "https://cdn/avatars/1.png".into(),
                object_id: Some("avatars/1.png".into()),
            },
            cover: None,
            refresh_token: Some("refresh-secret".into()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn public_user_has_no_credentials() {
        let json = serde_json::to_string(&PublicUser::from(&user())).unwrap();
        assert!(json.contains("alice"));
        assert!(json.contains("fullName"));
        assert!(!json.contains("argon2"));
        assert!(!json.contains("refresh-secret"));
        assert!(!json.contains("password"));
    }

    #[test]
    fn row_without_cover_maps_to_none() {
        let now = OffsetDateTime::now_utc();
        let row = UserRow {
            id: Uuid::new_v4(),
            username: "bob".into(),
            email: "b@x.com".into(),
            full_name: "Bob".into(),
            password_hash: "h".into(),
            avatar_url: "https://cdn/a.png".into(),
            avatar_object_id: None,
            cover_url: None,
            cover_object_id: Some("stale".into()),
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        let user = User::from(row);
        assert!(user.cover.is_none());
        assert_eq!(user.asset(AssetSlot::Avatar).unwrap().url, "https://cdn/a.png");
    }
}
