use crate::auth::jwt::JwtKeys;
use crate::auth::services::AuthService;
use crate::config::{AppConfig, StoreBackend};
use crate::images::AssetManager;
use crate::storage::{Storage, StorageClient};
use crate::users::memory::MemoryUserStore;
use crate::users::repo::{PgUserStore, UserStore};
use anyhow::Context;
use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub keys: Arc<JwtKeys>,
    pub auth: AuthService,
}

impl FromRef<AppState> for Arc<JwtKeys> {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let users: Arc<dyn UserStore> = match config.store_backend {
            StoreBackend::Postgres => {
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .acquire_timeout(Duration::from_secs(config.store_timeout_secs))
                    .connect(&config.database_url)
                    .await
                    .context("connect to database")?;

                if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
                    tracing::warn!(error = %e, "migration failed; continuing");
                }
                Arc::new(PgUserStore::new(db))
            }
            StoreBackend::Memory => {
                tracing::warn!("using in-memory user store; data is lost on restart");
                Arc::new(MemoryUserStore::new())
            }
        };

        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;

        Self::from_parts(config, users, storage)
    }

    /// Wires the components together. Fails if the signing configuration is unusable.
    pub fn from_parts(
        config: AppConfig,
        users: Arc<dyn UserStore>,
        storage: Arc<dyn StorageClient>,
    ) -> anyhow::Result<Self> {
        let keys = Arc::new(JwtKeys::from_config(&config.jwt).context("token signing keys")?);
        let assets = AssetManager::new(storage, Duration::from_secs(config.upload_timeout_secs));
        let auth = AuthService::new(
            users,
            keys.clone(),
            assets,
            Duration::from_secs(config.store_timeout_secs),
            config.revoke_session_on_password_change,
        );
        Ok(Self {
            config: Arc::new(config),
            keys,
            auth,
        })
    }
}
