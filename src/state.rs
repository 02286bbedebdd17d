use crate::auth::{jwt::JwtKeys, password::PasswordHasher, services::AuthService};
use crate::config::AppConfig;
use crate::db;
use crate::users::{memory::MemoryUserStore, pg::PgUserStore, repo::UserStore};
use sqlx::PgPool;
use std::sync::Arc;

/// A store over `pool` with the schema brought up to date. Refuses to start on a failed migration.
async fn pg_store(pool: PgPool) -> anyhow::Result<Arc<dyn UserStore>> {
    db::migrate(&pool).await?;
    Ok(Arc::new(PgUserStore::new(pool)))
}

/// Everything a request handler can reach. Built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn UserStore>,
    pub hasher: PasswordHasher,
    pub keys: JwtKeys,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = match &config.database_url {
            Some(url) => pg_store(db::connect(url).await?).await?,
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory user store");
                Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>
            }
        };

        Self::from_parts(config, store)
    }

    pub fn from_parts(config: Arc<AppConfig>, store: Arc<dyn UserStore>) -> anyhow::Result<Self> {
        let hasher = PasswordHasher::new(&config.hash)?;
        let keys = JwtKeys::from_config(&config.jwt)?;
        Ok(Self {
            config,
            store,
            hasher,
            keys,
        })
    }

    /// Creates the admin account named in config, if any.
    pub async fn seed_admin(&self) -> anyhow::Result<()> {
        let Some(seed) = &self.config.admin else {
            return Ok(());
        };
        AuthService::new(self.store.clone(), self.hasher.clone(), self.keys.clone())
            .ensure_admin(&seed.full_name, &seed.email, &seed.password)
            .await
            .map_err(|e| anyhow::anyhow!("seed admin account: {e}"))
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::config::HashConfig;

        let config = Arc::new(AppConfig {
            database_url: None,
            frontend_url: None,
            jwt: crate::auth::jwt::test_jwt_config(),
            hash: HashConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
            admin: None,
        });
        let store = Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>;
        Self::from_parts(config, store).expect("fake state")
    }
}
