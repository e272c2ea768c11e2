use crate::content::{Role, UserProfile};
use crate::identity::IdentityEvent;
use crate::repository::StoreError;
use crate::state::AppState;
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::{Form, Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Extension;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

const LOGIN_WINDOW: Duration = Duration::from_secs(60);
const LOGIN_MAX_ATTEMPTS: usize = 5;

// ── 数据结构 ──

/// 当前请求的登录用户，未登录为 None
#[derive(Clone, Default)]
pub struct CurrentUser(pub Option<UserProfile>);

impl CurrentUser {
    pub fn is_editor(&self) -> bool {
        self.0.as_ref().is_some_and(UserProfile::is_editor)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("邮箱或密码错误")]
    InvalidCredentials,

    #[error("密码哈希失败: {0}")]
    Hash(String),

    #[error("无效的时间格式: {0}")]
    Duration(String),

    #[error("JWT 处理失败: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub display_name: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    exp: usize,
    jti: String,
}

// ── 密码工具 ──

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Hash(e.to_string()))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Hash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

// ── JWT 工具 ──

fn parse_duration(s: &str) -> Result<Duration, AuthError> {
    let s = s.trim();
    let Some(unit) = s.chars().last() else {
        return Err(AuthError::Duration(s.to_owned()));
    };
    let num: u64 = s[..s.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| AuthError::Duration(s.to_owned()))?;
    let secs = match unit {
        'd' => num * 86400,
        'h' => num * 3600,
        'm' => num * 60,
        's' => num,
        _ => return Err(AuthError::Duration(s.to_owned())),
    };
    Ok(Duration::from_secs(secs))
}

/// 返回 (token, jti)
pub(super) fn create_jwt(
    user_id: &str,
    email: &str,
    jwt_secret: &str,
    expires_in: &str,
) -> Result<(String, String), AuthError> {
    let duration = parse_duration(expires_in)?;
    let exp = chrono::Utc::now().timestamp() as usize + duration.as_secs() as usize;
    let jti = ulid::Ulid::new().to_string();

    let claims = Claims {
        sub: user_id.to_owned(),
        email: email.to_owned(),
        exp,
        jti: jti.clone(),
    };

    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )?;

    Ok((token, jti))
}

fn decode_jwt(token: &str, jwt_secret: &str) -> Result<Claims, AuthError> {
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

fn build_cookie(name: &str, value: &str, max_age_secs: i64) -> String {
    format!("{name}={value}; HttpOnly; SameSite=Strict; Path=/; Max-Age={max_age_secs}")
}

fn session_cookie(state: &AppState, token: &str) -> Option<HeaderValue> {
    let max_age = parse_duration(&state.config.auth.jwt_expires_in)
        .unwrap_or(Duration::from_secs(7 * 86400));
    let cookie = build_cookie(&state.config.auth.session_name, token, max_age.as_secs() as i64);
    HeaderValue::from_str(&cookie).ok()
}

fn redirect_with_cookie(to: &str, cookie: Option<HeaderValue>) -> Response {
    let mut resp = Redirect::to(to).into_response();
    if let Some(cookie) = cookie {
        resp.headers_mut().insert(SET_COOKIE, cookie);
    }
    resp
}

// ── 路由处理 ──

fn render_auth_page(
    state: &AppState,
    template: &str,
    error: Option<&str>,
) -> Html<String> {
    let ctx = minijinja::context! {
        site_title => &state.config.site.title,
        user => minijinja::Value::from(()),
        is_editor => false,
        error => error,
    };
    let html = super::template::render(&state.templates, template, ctx)
        .unwrap_or_else(|e| format!("模板渲染失败: {e}"));
    Html(html)
}

pub async fn login_page(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<String> {
    let error = params.contains_key("error").then_some("邮箱或密码错误");
    render_auth_page(&state, "login.html", error)
}

pub async fn login_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let client_ip = client_ip(&headers);

    // 速率限制检查：窗口内尝试次数有上限
    {
        let mut limiter = state.login_limiter.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        let attempts = limiter.entry(client_ip.clone()).or_default();
        attempts.retain(|t| now.duration_since(*t) < LOGIN_WINDOW);

        if attempts.len() >= LOGIN_MAX_ATTEMPTS {
            tracing::warn!(%client_ip, "登录请求过于频繁");
            return (StatusCode::TOO_MANY_REQUESTS, "登录请求过于频繁，请稍后再试").into_response();
        }

        attempts.push(now);
    }

    match try_login(&state, &form).await {
        Ok((user_id, token)) => {
            state.publish_identity(IdentityEvent::SignedIn {
                user_id,
                email: form.email.trim().to_owned(),
            });
            redirect_with_cookie("/", session_cookie(&state, &token))
        }
        Err(AuthError::InvalidCredentials) => Redirect::to("/login?error=1").into_response(),
        Err(e) => {
            tracing::error!("登录失败: {e}");
            Redirect::to("/login?error=1").into_response()
        }
    }
}

/// 返回 (用户 ID, token)
async fn try_login(state: &AppState, form: &LoginForm) -> Result<(String, String), AuthError> {
    let email = form.email.trim();
    let (user_id, password_hash) = state
        .profiles
        .find_credentials(email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !verify_password(&form.password, &password_hash)? {
        return Err(AuthError::InvalidCredentials);
    }

    if let Err(e) = state.profiles.touch_login(&user_id).await {
        tracing::warn!("更新最后登录时间失败: {e}");
    }

    let (token, _jti) = create_jwt(
        &user_id,
        email,
        &state.jwt_secret,
        &state.config.auth.jwt_expires_in,
    )?;
    Ok((user_id, token))
}

pub async fn register_page(State(state): State<AppState>) -> Html<String> {
    render_auth_page(&state, "register.html", None)
}

pub async fn register_submit(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Response {
    let email = form.email.trim();
    let display_name = form.display_name.trim();
    if email.is_empty() || display_name.is_empty() || form.password.len() < 8 {
        let page = render_auth_page(&state, "register.html", Some("请填写昵称与邮箱，密码至少 8 位"));
        return (StatusCode::BAD_REQUEST, page).into_response();
    }

    let result = async {
        let hash = hash_password(&form.password)?;
        // 新注册用户一律是读者，编辑权限通过 CLI 授予
        let user_id = state
            .profiles
            .create(email, display_name, &hash, Role::Reader)
            .await?;
        let (token, _) = create_jwt(
            &user_id,
            email,
            &state.jwt_secret,
            &state.config.auth.jwt_expires_in,
        )?;
        Ok::<_, AuthError>((user_id, token))
    }
    .await;

    match result {
        Ok((user_id, token)) => {
            state.publish_identity(IdentityEvent::Registered {
                user_id,
                email: email.to_owned(),
            });
            redirect_with_cookie("/", session_cookie(&state, &token))
        }
        Err(AuthError::Store(StoreError::DuplicateEmail(_))) => {
            let page = render_auth_page(&state, "register.html", Some("该邮箱已被注册"));
            (StatusCode::CONFLICT, page).into_response()
        }
        Err(e) => {
            tracing::error!("注册失败: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "注册失败，请稍后再试").into_response()
        }
    }
}

pub async fn logout(State(state): State<AppState>, req: Request<axum::body::Body>) -> Response {
    let cookie_name = &state.config.auth.session_name;

    if let Some(token) = extract_token_from_request(&req, cookie_name)
        && let Ok(claims) = decode_jwt(&token, &state.jwt_secret)
    {
        let expires_at = chrono::DateTime::from_timestamp(claims.exp as i64, 0).unwrap_or_default();
        if let Err(e) = state
            .profiles
            .revoke_token(&claims.jti, &crate::repository::timestamp(expires_at))
            .await
        {
            tracing::warn!("撤销 token 失败: {e}");
        }
        state.publish_identity(IdentityEvent::SignedOut { user_id: claims.sub });
    }

    let clear_cookie = HeaderValue::from_str(&build_cookie(cookie_name, "", 0)).ok();
    redirect_with_cookie("/", clear_cookie)
}

// ── 中间件 ──

/// 解析会话：所有路由都会拿到 `CurrentUser` 扩展
pub async fn session(
    State(state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let claims = extract_token_from_request(&req, &state.config.auth.session_name)
        .and_then(|token| decode_jwt(&token, &state.jwt_secret).ok());

    let mut user = None;
    if let Some(claims) = &claims
        && !state.profiles.is_token_revoked(&claims.jti).await
    {
        match state.profiles.get(&claims.sub).await {
            Ok(profile) => user = profile,
            Err(e) => tracing::warn!("加载用户 {} 失败: {e}", claims.sub),
        }
    }

    let signed_in = user.is_some();
    req.extensions_mut().insert(CurrentUser(user));

    let mut resp = next.run(req).await;

    // 自动续期：剩余时间不足总有效期的 1/3 时签发新 token
    if signed_in
        && let Some(claims) = claims
        && !resp.headers().contains_key(SET_COOKIE)
        && let Ok(total) = parse_duration(&state.config.auth.jwt_expires_in)
    {
        let now = chrono::Utc::now().timestamp() as usize;
        let remaining = claims.exp.saturating_sub(now);
        if remaining < total.as_secs() as usize / 3
            && let Ok((token, _)) = create_jwt(
                &claims.sub,
                &claims.email,
                &state.jwt_secret,
                &state.config.auth.jwt_expires_in,
            )
            && let Some(cookie) = session_cookie(&state, &token)
        {
            resp.headers_mut().insert(SET_COOKIE, cookie);
        }
    }

    resp
}

/// 编辑专属路由：未登录跳转登录页，非编辑返回 403，通过后注入 `UserProfile`
///
/// 角色以存储中的当前值为准，写操作前再查一次
pub async fn require_editor(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(profile) = current.0 else {
        return Redirect::to("/login").into_response();
    };

    if !state.profiles.is_editor(&profile.id).await {
        tracing::warn!(user_id = %profile.id, "非编辑用户尝试管理文章");
        return (StatusCode::FORBIDDEN, "只有编辑可以创建、修改或删除文章").into_response();
    }

    req.extensions_mut().insert(profile);
    next.run(req).await
}

// ── 辅助函数 ──

/// 丢弃窗口外的尝试记录，并移除已无记录的 IP，返回移除的条目数
pub fn prune_login_limiter(state: &AppState, now: Instant) -> usize {
    let mut limiter = state.login_limiter.lock().unwrap_or_else(|e| e.into_inner());
    let before = limiter.len();
    limiter.retain(|_, attempts| {
        attempts.retain(|t| now.duration_since(*t) < LOGIN_WINDOW);
        !attempts.is_empty()
    });
    before - limiter.len()
}

/// 优先 x-forwarded-for，回退到 x-real-ip
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_owned())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_owned())
        })
        .unwrap_or_else(|| "unknown".to_owned())
}

fn extract_token_from_request<B>(req: &Request<B>, cookie_name: &str) -> Option<String> {
    let header = req.headers().get(axum::http::header::COOKIE)?;
    let header_str = header.to_str().ok()?;
    for pair in header_str.split(';') {
        if let Some(value) = pair.trim().strip_prefix(cookie_name)
            && let Some(value) = value.strip_prefix('=')
            && !value.is_empty()
        {
            return Some(value.to_owned());
        }
    }
    None
}
