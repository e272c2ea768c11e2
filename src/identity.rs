use serde::Serialize;
use tokio::sync::broadcast;

/// 登录态变化事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum IdentityEvent {
    Registered { user_id: String, email: String },
    SignedIn { user_id: String, email: String },
    SignedOut { user_id: String },
}

/// 后台任务：将登录态变化写入日志
pub fn spawn_identity_logger(mut events: broadcast::Receiver<IdentityEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(IdentityEvent::Registered { user_id, email }) => {
                    tracing::info!(%user_id, %email, "新用户注册");
                }
                Ok(IdentityEvent::SignedIn { user_id, email }) => {
                    tracing::info!(%user_id, %email, "用户登录");
                }
                Ok(IdentityEvent::SignedOut { user_id }) => {
                    tracing::info!(%user_id, "用户登出");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("登录事件积压，跳过 {skipped} 条");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
