pub mod html;
pub mod truncate;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Reader,
    Editor,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Editor => "editor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reader" => Ok(Role::Reader),
            "editor" => Ok(Role::Editor),
            other => Err(format!("未知角色：{other}（可选 reader / editor）")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    /// 编辑提交的 HTML，可能是片段也可能是完整文档
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    pub author_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn is_editor(&self) -> bool {
        self.role == Role::Editor
    }
}

/// 供列表页渲染的文章摘要
#[derive(Debug, Clone, Serialize)]
pub struct PostSummary {
    pub id: String,
    pub title: String,
    pub author_name: String,
    pub created_at: String,
    pub excerpt: String,
    /// 为 true 时列表页显示「阅读全文」
    pub is_truncated: bool,
}

impl PostSummary {
    pub fn from_post(post: &Post, excerpt_length: usize, date_format: &str) -> Self {
        let truncated = truncate::truncate_html(&post.content, excerpt_length);
        Self {
            id: post.id.clone(),
            title: post.title.clone(),
            author_name: post.author_name.clone(),
            created_at: post.created_at.format(date_format).to_string(),
            excerpt: truncated.content,
            is_truncated: truncated.is_truncated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_post(content: &str) -> Post {
        let at = Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap();
        Post {
            id: "01HXTESTPOST".into(),
            title: "Hello".into(),
            content: content.into(),
            author_id: "u1".into(),
            author_name: "Ada".into(),
            author_email: "ada@example.com".into(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Editor".parse::<Role>(), Ok(Role::Editor));
        assert_eq!(" reader ".parse::<Role>(), Ok(Role::Reader));
        assert!("admin".parse::<Role>().is_err());
        assert_eq!(Role::default(), Role::Reader);
    }

    #[test]
    fn summary_truncates_long_posts() {
        let post = sample_post(&format!("<p>{}</p>", "A fairly long sentence. ".repeat(40)));
        let summary = PostSummary::from_post(&post, 300, "%Y-%m-%d %H:%M");
        assert!(summary.is_truncated);
        assert!(summary.excerpt.ends_with(truncate::ELLIPSIS));
        assert_eq!(summary.created_at, "2024-05-17 09:30");
    }

    #[test]
    fn summary_keeps_short_posts_whole() {
        let post = sample_post("<p>Short one.</p>");
        let summary = PostSummary::from_post(&post, 300, "%Y-%m-%d");
        assert!(!summary.is_truncated);
        assert_eq!(summary.excerpt, "<p>Short one.</p>");
        assert_eq!(summary.author_name, "Ada");
    }
}
