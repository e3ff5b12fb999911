use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::model::{AssetRef, AssetSlot, NewUser, User};
use super::repo::{StoreError, UserStore};

/// Process-local store. Every mutation runs under one write lock, so the
/// uniqueness checks and the refresh-token compare-and-swap are atomic.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

fn taken(
    users: &HashMap<Uuid, User>,
    skip: Option<Uuid>,
    username: Option<&str>,
    email: Option<&str>,
) -> bool {
    users.values().any(|u| {
        Some(u.id) != skip
            && (username.is_some_and(|n| u.username == n) || email.is_some_and(|e| u.email == e))
    })
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| {
                username.is_some_and(|n| u.username == n) || email.is_some_and(|e| u.email == e)
            })
            .cloned())
    }

    async fn exists(&self, username: &str, email: &str) -> Result<bool, StoreError> {
        let users = self.users.read().await;
        Ok(taken(&users, None, Some(username), Some(email)))
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.contains_key(&new_user.id)
            || taken(&users, None, Some(&new_user.username), Some(&new_user.email))
        {
            return Err(StoreError::Conflict);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: new_user.id,
            username: new_user.username,
            email: new_user.email,
            full_name: new_user.full_name,
            password_hash: new_user.password_hash,
            avatar: new_user.avatar,
            cover: new_user.cover,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };
        user.refresh_token = token.map(str::to_string);
        user.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        next: &str,
    ) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(user) if user.refresh_token.as_deref() == Some(expected) => {
                user.refresh_token = Some(next.to_string());
                user.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
        revoke_session: bool,
    ) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };
        user.password_hash = password_hash.to_string();
        if revoke_session {
            user.refresh_token = None;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn update_account(
        &self,
        id: Uuid,
        full_name: &str,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        if !users.contains_key(&id) {
            return Ok(None);
        }
        if taken(&users, Some(id), None, Some(email)) {
            return Err(StoreError::Conflict);
        }
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        user.full_name = full_name.to_string();
        user.email = email.to_string();
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn set_asset(
        &self,
        id: Uuid,
        slot: AssetSlot,
        asset: &AssetRef,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        match slot {
            AssetSlot::Avatar => user.avatar = asset.clone(),
            AssetSlot::Cover => user.cover = Some(asset.clone()),
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            full_name: "Test User".into(),
            password_hash: "hash".into(),
            avatar: AssetRef {
                url: "https://fake.local/a.png".into(),
                object_id: Some("a.png".into()),
            },
            cover: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_username_or_email() {
        let store = MemoryUserStore::new();
        store.create(new_user("alice", "a@x.com")).await.unwrap();
        assert!(matches!(
            store.create(new_user("alice", "other@x.com")).await,
            Err(StoreError::Conflict)
        ));
        assert!(matches!(
            store.create(new_user("other", "a@x.com")).await,
            Err(StoreError::Conflict)
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn rotate_is_compare_and_swap() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("alice", "a@x.com")).await.unwrap();
        assert!(store.set_refresh_token(user.id, Some("t1")).await.unwrap());

        assert!(store.rotate_refresh_token(user.id, "t1", "t2").await.unwrap());
        assert!(!store.rotate_refresh_token(user.id, "t1", "t3").await.unwrap());

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn rotate_fails_after_clear() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("alice", "a@x.com")).await.unwrap();
        store.set_refresh_token(user.id, Some("t1")).await.unwrap();
        store.set_refresh_token(user.id, None).await.unwrap();
        assert!(!store.rotate_refresh_token(user.id, "t1", "t2").await.unwrap());
    }

    #[tokio::test]
    async fn find_by_login_matches_either_identifier() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("alice", "a@x.com")).await.unwrap();
        let by_name = store.find_by_login(Some("alice"), None).await.unwrap().unwrap();
        let by_mail = store.find_by_login(None, Some("a@x.com")).await.unwrap().unwrap();
        assert_eq!(by_name.id, user.id);
        assert_eq!(by_mail.id, user.id);
        assert!(store.find_by_login(None, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_account_rejects_taken_email() {
        let store = MemoryUserStore::new();
        let alice = store.create(new_user("alice", "a@x.com")).await.unwrap();
        store.create(new_user("bob", "b@x.com")).await.unwrap();
        assert!(matches!(
            store.update_account(alice.id, "Alice", "b@x.com").await,
            Err(StoreError::Conflict)
        ));
        let updated = store
            .update_account(alice.id, "Alice B", "a@x.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.full_name, "Alice B");
    }
}
