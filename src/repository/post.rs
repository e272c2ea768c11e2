use sqlx::SqlitePool;

use super::{StoreError, StoreResult, parse_timestamp, timestamp};
use crate::content::Post;

/// 新建文章参数，作者信息取自当前登录的编辑
pub struct NewPost<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub author_id: &'a str,
    pub author_name: &'a str,
    pub author_email: &'a str,
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: String,
    title: String,
    content: String,
    author_id: String,
    author_name: String,
    author_email: String,
    created_at: String,
    updated_at: String,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            content: row.content,
            author_id: row.author_id,
            author_name: row.author_name,
            author_email: row.author_email,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

const POST_COLUMNS: &str =
    "id, title, content, author_id, author_name, author_email, created_at, updated_at";

#[derive(Clone)]
pub struct PostRepository {
    db: SqlitePool,
}

impl PostRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// 全部文章，按创建时间倒序
    pub async fn list(&self) -> StoreResult<Vec<Post>> {
        let rows = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    pub async fn get(&self, id: &str) -> StoreResult<Option<Post>> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Post::from))
    }

    /// 返回新文章 ID
    pub async fn create(&self, p: &NewPost<'_>) -> StoreResult<String> {
        let id = ulid::Ulid::new().to_string();
        let now = timestamp(chrono::Utc::now());

        sqlx::query(
            "INSERT INTO posts (id, title, content, author_id, author_name, author_email, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(p.title)
        .bind(p.content)
        .bind(p.author_id)
        .bind(p.author_name)
        .bind(p.author_email)
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await?;

        Ok(id)
    }

    pub async fn update(&self, id: &str, title: &str, content: &str) -> StoreResult<()> {
        let now = timestamp(chrono::Utc::now());
        let result = sqlx::query("UPDATE posts SET title = ?, content = ?, updated_at = ? WHERE id = ?")
            .bind(title)
            .bind(content)
            .bind(&now)
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        Ok(())
    }

    /// 直接删除，不可恢复
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory_pool;

    fn draft<'a>(title: &'a str, content: &'a str) -> NewPost<'a> {
        NewPost {
            title,
            content,
            author_id: "u1",
            author_name: "Ada",
            author_email: "ada@example.com",
        }
    }

    #[tokio::test]
    async fn create_then_get() {
        let repo = PostRepository::new(memory_pool().await);
        let id = repo.create(&draft("Hello", "<p>World</p>")).await.unwrap();

        let post = repo.get(&id).await.unwrap().expect("post exists");
        assert_eq!(post.title, "Hello");
        assert_eq!(post.content, "<p>World</p>");
        assert_eq!(post.author_email, "ada@example.com");
        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let repo = PostRepository::new(memory_pool().await);
        let first = repo.create(&draft("first", "a")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = repo.create(&draft("second", "b")).await.unwrap();

        let ids: Vec<_> = repo.list().await.unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[tokio::test]
    async fn update_and_delete() {
        let repo = PostRepository::new(memory_pool().await);
        let id = repo.create(&draft("old", "old body")).await.unwrap();

        repo.update(&id, "new", "new body").await.unwrap();
        let post = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(post.title, "new");
        assert!(post.updated_at >= post.created_at);

        repo.delete(&id).await.unwrap();
        assert!(repo.get(&id).await.unwrap().is_none());
        assert!(matches!(repo.delete(&id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            repo.update(&id, "x", "y").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
