use crate::config::BlogConfig;
use crate::identity::IdentityEvent;
use crate::repository::{PostRepository, ProfileRepository};
use anyhow::{Context, Result};
use minijinja::Environment;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<BlogConfig>,
    pub posts: PostRepository,
    pub profiles: ProfileRepository,
    /// 登录态变化广播
    pub identity_events: broadcast::Sender<IdentityEvent>,
    /// 登录速率限制：IP -> 登录尝试时间戳列表
    pub login_limiter: Arc<std::sync::Mutex<HashMap<String, Vec<Instant>>>>,
    /// 页面模板渲染环境
    pub templates: Arc<Environment<'static>>,
    /// 实际使用的 JWT 密钥（优先配置文件，其次数据库持久化自动生成）
    pub jwt_secret: Arc<String>,
}

impl AppState {
    pub async fn new(project_root: &Path, config: BlogConfig) -> Result<Self> {
        let pool = open_database(&config.database_path(project_root)).await?;
        Self::with_pool(pool, config).await
    }

    pub async fn with_pool(pool: SqlitePool, config: BlogConfig) -> Result<Self> {
        let jwt_secret = resolve_jwt_secret(&config.auth.jwt_secret, &pool).await?;
        let (identity_events, _) = broadcast::channel::<IdentityEvent>(64);
        let templates = crate::server::template::build_env()?;

        Ok(Self {
            posts: PostRepository::new(pool.clone()),
            profiles: ProfileRepository::new(pool.clone()),
            db: pool,
            config: Arc::new(config),
            identity_events,
            login_limiter: Arc::new(std::sync::Mutex::new(HashMap::new())),
            templates: Arc::new(templates),
            jwt_secret: Arc::new(jwt_secret),
        })
    }

    /// 广播登录态变化；没有订阅者时静默丢弃
    pub fn publish_identity(&self, event: IdentityEvent) {
        let _ = self.identity_events.send(event);
    }
}

/// 打开（必要时创建）SQLite 数据库并执行迁移
pub async fn open_database(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .with_context(|| format!("打开数据库 {} 失败", path.display()))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("数据库迁移失败：{}", e))?;

    Ok(pool)
}

const DEFAULT_JWT_SECRET: &str = "CHANGE_ME_IN_PRODUCTION";

/// 配置文件显式设置 > 数据库持久化 > 自动生成新密钥
async fn resolve_jwt_secret(config_secret: &str, db: &SqlitePool) -> Result<String> {
    if config_secret != DEFAULT_JWT_SECRET && !config_secret.is_empty() {
        return Ok(config_secret.to_owned());
    }

    tracing::warn!("JWT secret 未配置或为默认值，将使用自动生成的安全密钥");

    let existing: Option<(String,)> =
        sqlx::query_as("SELECT value FROM site_settings WHERE key = 'jwt_secret'")
            .fetch_optional(db)
            .await?;

    if let Some((secret,)) = existing {
        return Ok(secret);
    }

    let secret = generate_random_secret();
    sqlx::query(
        "INSERT INTO site_settings (key, value) VALUES ('jwt_secret', ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(&secret)
    .execute(db)
    .await?;

    tracing::info!("已自动生成 JWT secret 并持久化到数据库");
    Ok(secret)
}

fn generate_random_secret() -> String {
    use argon2::password_hash::rand_core::{OsRng, RngCore};

    let mut bytes = [0u8; 64];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory_pool;

    #[tokio::test]
    async fn generated_secret_is_persisted() {
        let pool = memory_pool().await;
        let first = resolve_jwt_secret(DEFAULT_JWT_SECRET, &pool).await.unwrap();
        let second = resolve_jwt_secret("", &pool).await.unwrap();
        assert_eq!(first.len(), 128);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn configured_secret_wins() {
        let pool = memory_pool().await;
        let secret = resolve_jwt_secret("from-config", &pool).await.unwrap();
        assert_eq!(secret, "from-config");
    }
}
