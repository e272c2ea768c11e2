use sqlx::SqlitePool;

use super::{StoreError, StoreResult, parse_timestamp, timestamp};
use crate::content::{Role, UserProfile};

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: String,
    email: String,
    display_name: String,
    profile: String,
    created_at: String,
    updated_at: String,
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            display_name: row.display_name,
            // CHECK 约束保证只有两种取值
            role: row.profile.parse().unwrap_or_default(),
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

const PROFILE_COLUMNS: &str = "id, email, display_name, profile, created_at, updated_at";

#[derive(Clone)]
pub struct ProfileRepository {
    db: SqlitePool,
}

impl ProfileRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn get(&self, id: &str) -> StoreResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(UserProfile::from))
    }

    pub async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM users WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(UserProfile::from))
    }

    /// 登录用：返回 (用户 ID, 密码哈希)
    pub async fn find_credentials(&self, email: &str) -> StoreResult<Option<(String, String)>> {
        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT id, password_hash FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    /// 创建用户档案，返回新用户 ID
    pub async fn create(
        &self,
        email: &str,
        display_name: &str,
        password_hash: &str,
        role: Role,
    ) -> StoreResult<String> {
        let id = ulid::Ulid::new().to_string();
        let now = timestamp(chrono::Utc::now());

        let result = sqlx::query(
            "INSERT INTO users (id, email, display_name, password_hash, profile, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(email)
        .bind(display_name)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(id),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateEmail(email.to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn set_role(&self, email: &str, role: Role) -> StoreResult<()> {
        let now = timestamp(chrono::Utc::now());
        let result = sqlx::query("UPDATE users SET profile = ?, updated_at = ? WHERE email = ?")
            .bind(role.as_str())
            .bind(&now)
            .bind(email)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(email.to_owned()));
        }
        Ok(())
    }

    /// 权限判断：用户不存在或查询失败都视为非编辑
    pub async fn is_editor(&self, id: &str) -> bool {
        match self.get(id).await {
            Ok(Some(profile)) => profile.is_editor(),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("查询用户 {id} 权限失败: {e}");
                false
            }
        }
    }

    pub async fn touch_login(&self, id: &str) -> StoreResult<()> {
        let now = timestamp(chrono::Utc::now());
        sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
            .bind(&now)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// 撤销 token（加入黑名单）
    pub async fn revoke_token(&self, jti: &str, expires_at: &str) -> StoreResult<()> {
        sqlx::query("INSERT OR IGNORE INTO revoked_tokens (jti, expires_at) VALUES (?, ?)")
            .bind(jti)
            .bind(expires_at)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// 查询失败时按已撤销处理
    pub async fn is_token_revoked(&self, jti: &str) -> bool {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE jti = ?)")
            .bind(jti)
            .fetch_one(&self.db)
            .await
            .unwrap_or(true)
    }

    pub async fn cleanup_expired_tokens(&self) -> StoreResult<u64> {
        let now = timestamp(chrono::Utc::now());
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < ?")
            .bind(&now)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
