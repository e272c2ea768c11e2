use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "dailyblog.toml";

#[derive(Debug, Default, Deserialize)]
pub struct BlogConfig {
    #[serde(default)]
    pub site: SiteInfo,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize)]
pub struct SiteInfo {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct ListingConfig {
    /// 列表页摘要的可见字符数
    #[serde(default = "default_excerpt_length")]
    pub excerpt_length: usize,
    /// chrono 格式串
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    /// 相对项目根目录
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expires_in")]
    pub jwt_expires_in: String,
    #[serde(default = "default_session_name")]
    pub session_name: String,
}

impl BlogConfig {
    /// 读取项目根目录下的 dailyblog.toml，文件不存在时使用默认配置
    pub fn load(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("读取 {} 失败", config_path.display()))?;
        Self::parse(&content).with_context(|| format!("解析 {} 失败", config_path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn database_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.database.path)
    }
}

// 默认值函数
fn default_title() -> String { "Daily Blog".into() }
fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 3000 }
fn default_log_level() -> String { "info".into() }
fn default_excerpt_length() -> usize { crate::content::truncate::DEFAULT_MAX_LENGTH }
fn default_date_format() -> String { "%Y-%m-%d %H:%M".into() }
fn default_db_path() -> String { "dailyblog.db".into() }
fn default_jwt_secret() -> String { "CHANGE_ME_IN_PRODUCTION".into() }
fn default_jwt_expires_in() -> String { "7d".into() }
fn default_session_name() -> String { "dailyblog_session".into() }

impl Default for SiteInfo {
    fn default() -> Self {
        Self {
            title: default_title(),
            description: String::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            excerpt_length: default_excerpt_length(),
            date_format: default_date_format(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            jwt_expires_in: default_jwt_expires_in(),
            session_name: default_session_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let config = BlogConfig::load(dir.path())?;
        assert_eq!(config.site.title, "Daily Blog");
        assert_eq!(config.listing.excerpt_length, 300);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database_path(dir.path()), dir.path().join("dailyblog.db"));
        Ok(())
    }

    #[test]
    fn partial_file_keeps_other_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[site]\ntitle = \"Notes\"\n\n[listing]\nexcerpt_length = 120\n",
        )?;
        let config = BlogConfig::load(dir.path())?;
        assert_eq!(config.site.title, "Notes");
        assert_eq!(config.listing.excerpt_length, 120);
        assert_eq!(config.listing.date_format, "%Y-%m-%d %H:%M");
        assert_eq!(config.auth.session_name, "dailyblog_session");
        Ok(())
    }

    #[test]
    fn invalid_file_reports_path() -> Result<()> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join(CONFIG_FILE), "[server]\nport = \"high\"\n")?;
        let err = BlogConfig::load(dir.path()).unwrap_err();
        assert!(format!("{err}").contains(CONFIG_FILE));
        Ok(())
    }
}
