use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};

mod config;
mod content;
mod identity;
mod repository;
mod server;
mod state;

use content::Role;
use content::truncate::{DEFAULT_MAX_LENGTH, truncate_html};

#[derive(Parser)]
#[command(name = "dailyblog", about = "Daily Blog 博客服务", version = long_version())]
struct Cli {
    /// 以 JSON 格式输出日志
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动博客服务
    Serve {
        /// 项目根目录（默认当前目录）
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        /// 监听地址
        #[arg(long)]
        host: Option<String>,

        /// 监听端口
        #[arg(long)]
        port: Option<u16>,
    },

    /// 截断 HTML 摘要（调试用）
    Truncate {
        /// 输入文件，省略时读取标准输入
        file: Option<PathBuf>,

        /// 可见字符上限（至少为 1）
        #[arg(
            short,
            long,
            default_value_t = DEFAULT_MAX_LENGTH,
            value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
        )]
        max_length: usize,

        /// 输出 JSON 结果
        #[arg(long)]
        json: bool,
    },

    /// 用户管理
    User {
        /// 项目根目录（默认当前目录）
        #[arg(short, long, default_value = ".", global = true)]
        root: PathBuf,

        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// 创建用户
    Add {
        #[arg(long)]
        email: String,

        /// 显示名称
        #[arg(long)]
        name: String,

        #[arg(long)]
        password: String,

        /// 直接授予编辑权限
        #[arg(long)]
        editor: bool,
    },

    /// 修改用户角色
    Role {
        #[arg(long)]
        email: String,

        #[arg(long)]
        role: Role,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // None 等同于 Serve { root: ".", host: None, port: None }
    let command = cli.command.unwrap_or(Commands::Serve {
        root: PathBuf::from("."),
        host: None,
        port: None,
    });

    // 对于需要加载配置的命令，使用配置中的日志级别作为默认值
    let default_level = match &command {
        Commands::Serve { root, .. } | Commands::User { root, .. } => {
            config::BlogConfig::load(root).ok().map(|c| c.server.log_level)
        }
        Commands::Truncate { .. } => None,
    };
    init_tracing(default_level.as_deref().unwrap_or("info"), cli.log_json);

    match command {
        Commands::Serve { root, host, port } => {
            let root = root.canonicalize()?;
            let blog_config = config::BlogConfig::load(&root)?;

            let host = host.unwrap_or_else(|| blog_config.server.host.clone());
            let port = port.unwrap_or(blog_config.server.port);

            runtime()?.block_on(async move { run_server(&root, blog_config, &host, port).await })?;
        }
        Commands::Truncate {
            file,
            max_length,
            json,
        } => {
            let html = read_input(file.as_deref())?;
            let result = truncate_html(&html, max_length);
            tracing::debug!(is_truncated = result.is_truncated, "截断完成");
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.content);
            }
        }
        Commands::User { root, action } => {
            let root = root.canonicalize()?;
            let blog_config = config::BlogConfig::load(&root)?;
            runtime()?.block_on(async move { run_user_action(&root, &blog_config, action).await })?;
        }
    }

    Ok(())
}

fn init_tracing(default_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn read_input(file: Option<&Path>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("读取 {} 失败", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("读取标准输入失败")?;
            Ok(buf)
        }
    }
}

async fn run_server(
    root: &Path,
    blog_config: config::BlogConfig,
    host: &str,
    port: u16,
) -> anyhow::Result<()> {
    let app_state = state::AppState::new(root, blog_config).await?;

    identity::spawn_identity_logger(app_state.identity_events.subscribe());
    // 启动后台定时清理过期 token
    server::cleanup::spawn_token_cleanup(app_state.clone());

    let app = server::router(app_state);

    let addr = format!("{host}:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            tracing::error!("端口 {port} 已被占用");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!("博客服务启动：http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_user_action(
    root: &Path,
    blog_config: &config::BlogConfig,
    action: UserAction,
) -> anyhow::Result<()> {
    let pool = state::open_database(&blog_config.database_path(root)).await?;
    let profiles = repository::ProfileRepository::new(pool);

    match action {
        UserAction::Add {
            email,
            name,
            password,
            editor,
        } => {
            let role = if editor { Role::Editor } else { Role::Reader };
            let hash = server::auth::hash_password(&password)?;
            let id = profiles.create(email.trim(), name.trim(), &hash, role).await?;
            tracing::info!("已创建用户 {email}（{role}），ID：{id}");
        }
        UserAction::Role { email, role } => {
            let email = email.trim();
            profiles.set_role(email, role).await?;
            if let Some(profile) = profiles.find_by_email(email).await? {
                tracing::info!("已将 {}（{}）的角色设为 {role}", profile.display_name, profile.email);
            }
        }
    }
    Ok(())
}

const fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        "\ncommit:  ",
        env!("DAILYBLOG_GIT_COMMIT"),
        "\nbuild:   ",
        env!("DAILYBLOG_BUILD_TIME"),
        "\ntarget:  ",
        env!("DAILYBLOG_BUILD_TARGET"),
        "\nprofile: ",
        env!("DAILYBLOG_BUILD_PROFILE"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_rejects_zero_length() {
        assert!(Cli::try_parse_from(["dailyblog", "truncate", "--max-length", "0"]).is_err());

        let cli = Cli::try_parse_from(["dailyblog", "truncate", "-m", "1"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Truncate { max_length: 1, .. })));

        let cli = Cli::try_parse_from(["dailyblog", "truncate"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Truncate { max_length: DEFAULT_MAX_LENGTH, .. })
        ));
    }
}
