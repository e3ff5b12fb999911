use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::storage::StorageClient;
use crate::users::model::{AssetRef, AssetSlot};

/// An image received from the client, not yet stored.
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

/// Uploads profile images and retires the objects they replace.
#[derive(Clone)]
pub struct AssetManager {
    storage: Arc<dyn StorageClient>,
    timeout: Duration,
}

impl AssetManager {
    pub fn new(storage: Arc<dyn StorageClient>, timeout: Duration) -> Self {
        Self { storage, timeout }
    }

    pub async fn upload(
        &self,
        owner: Uuid,
        slot: AssetSlot,
        item: UploadItem,
    ) -> Result<AssetRef, AppError> {
        if item.body.is_empty() {
            return Err(AppError::validation("Image file is empty"));
        }
        let ext = ext_from_mime(&item.content_type)
            .ok_or_else(|| AppError::validation("Unsupported image type"))?;
        let key = format!("{}/{}/{}.{}", slot.as_str(), owner, Uuid::new_v4(), ext);

        let stored = tokio::time::timeout(
            self.timeout,
            self.storage.put_object(&key, item.body, &item.content_type),
        )
        .await
        .map_err(|_| AppError::Upload(format!("put_object {} timed out", key)))?
        .map_err(|e| AppError::Upload(format!("put_object {}: {e:#}", key)))?;

        if stored.url.trim().is_empty() {
            self.discard(&AssetRef {
                url: String::new(),
                object_id: Some(stored.object_id),
            })
            .await;
            return Err(AppError::Upload(format!("no url returned for {}", key)));
        }

        info!(%owner, key = %key, "image uploaded");
        Ok(AssetRef {
            url: stored.url,
            object_id: Some(stored.object_id),
        })
    }

    /// Uploads `item`, hands the new reference to `persist`, and only then
    /// deletes the object that `previous` pointed to.
    ///
    /// If `persist` fails the fresh upload is deleted and the old one kept.
    /// A timed-out `persist` deletes neither.
    pub async fn replace<T, F, Fut>(
        &self,
        owner: Uuid,
        slot: AssetSlot,
        previous: Option<&AssetRef>,
        item: UploadItem,
        persist: F,
    ) -> Result<T, AppError>
    where
        F: FnOnce(AssetRef) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let fresh = self.upload(owner, slot, item).await?;
        match persist(fresh.clone()).await {
            Ok(out) => {
                if let Some(old) = previous {
                    self.discard(old).await;
                }
                Ok(out)
            }
            Err(AppError::StoreTimeout) => {
                // The write may have landed; either object could be the live one.
                warn!(
                    %owner,
                    fresh = ?fresh.object_id,
                    previous = ?previous.and_then(|p| p.object_id.as_deref()),
                    "persist timed out; keeping both objects"
                );
                Err(AppError::StoreTimeout)
            }
            Err(e) => {
                self.discard(&fresh).await;
                Err(e)
            }
        }
    }

    /// Best-effort delete. Failures are logged and swallowed.
    pub async fn discard(&self, asset: &AssetRef) {
        let Some(object_id) = asset
            .object_id
            .clone()
            .or_else(|| public_id_from_url(&asset.url))
        else {
            warn!(url = %asset.url, "cannot resolve object id; leaving object in place");
            return;
        };

        match tokio::time::timeout(self.timeout, self.storage.delete_object(&object_id)).await {
            Ok(Ok(())) => info!(object_id = %object_id, "old image deleted"),
            Ok(Err(e)) => warn!(error = %e, object_id = %object_id, "delete_object failed"),
            Err(_) => warn!(object_id = %object_id, "delete_object timed out"),
        }
    }
}

/// Object id embedded in a versioned upload URL: the part between
/// `/upload/v<digits>/` and the file extension.
pub fn public_id_from_url(url: &str) -> Option<String> {
    lazy_static! {
        static ref PUBLIC_ID_RE: Regex = Regex::new(r"/upload/v\d+/(.*?)(\.\w+)$").unwrap();
    }
    PUBLIC_ID_RE
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|id| !id.is_empty())
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

#[cfg(test)]
mod image_tests {
    use super::*;
    use crate::storage::{MemoryStorage, StoredObject};
    use async_trait::async_trait;

    /// Storage that answers only after `delay`.
    struct SlowStorage {
        delay: Duration,
    }

    #[async_trait]
    impl StorageClient for SlowStorage {
        async fn put_object(
            &self,
            key: &str,
            _body: Bytes,
            _content_type: &str,
        ) -> anyhow::Result<StoredObject> {
            tokio::time::sleep(self.delay).await;
            Ok(StoredObject {
                object_id: key.to_string(),
                url: format!("https://slow.local/{}", key),
            })
        }

        async fn delete_object(&self, _key: &str) -> anyhow::Result<()> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }
    }

    fn png() -> UploadItem {
        UploadItem {
            body: Bytes::from_static(b"\x89PNG"),
            content_type: "image/png".into(),
        }
    }

    fn manager() -> (AssetManager, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (
            AssetManager::new(storage.clone(), Duration::from_secs(5)),
            storage,
        )
    }

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[test]
    fn test_public_id_from_url() {
        assert_eq!(
            public_id_from_url(
                "https://res.example.com/demo/image/upload/v1234567890/user_avatars/profile_pic.jpg"
            ),
            Some("user_avatars/profile_pic".to_string())
        );
        assert_eq!(
            public_id_from_url("https://res.example.com/x/upload/v1/a.png"),
            Some("a".to_string())
        );
        assert_eq!(public_id_from_url("https://cdn.example.com/avatars/a.png"), None);
        assert_eq!(public_id_from_url("https://res.example.com/upload/v12/noext"), None);
    }

    #[tokio::test]
    async fn upload_rejects_non_images() {
        let (assets, storage) = manager();
        let item = UploadItem {
            body: Bytes::from_static(b"%PDF"),
            content_type: "application/pdf".into(),
        };
        let err = assets.upload(Uuid::new_v4(), AssetSlot::Avatar, item).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(storage.len(), 0);
    }

    #[tokio::test]
    async fn upload_failure_is_upload_error() {
        let (assets, storage) = manager();
        storage.fail_uploads(true);
        let err = assets.upload(Uuid::new_v4(), AssetSlot::Cover, png()).await.unwrap_err();
        assert!(matches!(err, AppError::Upload(_)));
    }

    #[tokio::test]
    async fn slow_upload_times_out_as_upload_error() {
        let assets = AssetManager::new(
            Arc::new(SlowStorage {
                delay: Duration::from_millis(500),
            }),
            Duration::from_millis(50),
        );
        let err = assets.upload(Uuid::new_v4(), AssetSlot::Avatar, png()).await.unwrap_err();
        match err {
            AppError::Upload(msg) => assert!(msg.contains("timed out"), "{msg}"),
            other => panic!("expected upload error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_delete_is_swallowed() {
        let assets = AssetManager::new(
            Arc::new(SlowStorage {
                delay: Duration::from_millis(500),
            }),
            Duration::from_millis(50),
        );
        assets
            .discard(&AssetRef {
                url: "https://slow.local/avatars/a.png".into(),
                object_id: Some("avatars/a.png".into()),
            })
            .await;
    }

    #[tokio::test]
    async fn replace_keeps_both_objects_when_persist_times_out() {
        let (assets, storage) = manager();
        let owner = Uuid::new_v4();
        let old = assets.upload(owner, AssetSlot::Avatar, png()).await.unwrap();

        let err = assets
            .replace(owner, AssetSlot::Avatar, Some(&old), png(), |_| async move {
                Err::<(), _>(AppError::StoreTimeout)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::StoreTimeout));
        assert_eq!(storage.len(), 2);
        assert!(storage.contains(old.object_id.as_deref().unwrap()));
    }

    #[tokio::test]
    async fn replace_deletes_old_after_persist() {
        let (assets, storage) = manager();
        let owner = Uuid::new_v4();
        let old = assets.upload(owner, AssetSlot::Avatar, png()).await.unwrap();
        let old_id = old.object_id.clone().unwrap();

        let new = assets
            .replace(owner, AssetSlot::Avatar, Some(&old), png(), |r| async move {
                Ok::<_, AppError>(r)
            })
            .await
            .unwrap();

        assert!(!storage.contains(&old_id));
        assert!(storage.contains(new.object_id.as_deref().unwrap()));
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn replace_keeps_old_when_upload_fails() {
        let (assets, storage) = manager();
        let owner = Uuid::new_v4();
        let old = assets.upload(owner, AssetSlot::Avatar, png()).await.unwrap();
        storage.fail_uploads(true);

        let err = assets
            .replace(owner, AssetSlot::Avatar, Some(&old), png(), |r| async move {
                Ok::<_, AppError>(r)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Upload(_)));
        assert!(storage.contains(old.object_id.as_deref().unwrap()));
    }

    #[tokio::test]
    async fn replace_rolls_back_fresh_upload_when_persist_fails() {
        let (assets, storage) = manager();
        let owner = Uuid::new_v4();
        let old = assets.upload(owner, AssetSlot::Cover, png()).await.unwrap();

        let err = assets
            .replace(owner, AssetSlot::Cover, Some(&old), png(), |_| async move {
                Err::<(), _>(AppError::Store("down".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Store(_)));
        assert_eq!(storage.len(), 1);
        assert!(storage.contains(old.object_id.as_deref().unwrap()));
    }

    #[tokio::test]
    async fn delete_failure_does_not_undo_swap() {
        let (assets, storage) = manager();
        let owner = Uuid::new_v4();
        let old = assets.upload(owner, AssetSlot::Avatar, png()).await.unwrap();
        storage.fail_deletes(true);

        let new = assets
            .replace(owner, AssetSlot::Avatar, Some(&old), png(), |r| async move {
                Ok::<_, AppError>(r)
            })
            .await
            .unwrap();

        assert_ne!(new, old);
        assert_eq!(storage.len(), 2);
    }
}
