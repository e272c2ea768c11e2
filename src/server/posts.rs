use axum::extract::{Form, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Extension;
use minijinja::{Value, context};
use serde::Deserialize;

use super::auth::CurrentUser;
use super::template::render;
use crate::content::{PostSummary, UserProfile};
use crate::repository::{NewPost, StoreError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PostForm {
    pub title: String,
    pub content: String,
}

impl PostForm {
    /// 标题和内容去除首尾空白后都不能为空
    fn validated(&self) -> Option<(&str, &str)> {
        let title = self.title.trim();
        let content = self.content.trim();
        (!title.is_empty() && !content.is_empty()).then_some((title, content))
    }
}

fn render_page(state: &AppState, current: &CurrentUser, name: &str, extra: Value) -> Response {
    let ctx = context! {
        site_title => &state.config.site.title,
        user => &current.0,
        is_editor => current.is_editor(),
        ..extra
    };
    match render(&state.templates, name, ctx) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("{e:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, "模板渲染失败").into_response()
        }
    }
}

fn store_failure(action: &str, e: StoreError) -> Response {
    tracing::error!("{action}失败: {e}");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{action}失败，请稍后再试")).into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "文章不存在").into_response()
}

fn missing_fields() -> Response {
    (StatusCode::BAD_REQUEST, "请填写标题和内容").into_response()
}

/// 首页：全部文章按创建时间倒序，正文截断为摘要
pub async fn list_posts(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Response {
    let posts = match state.posts.list().await {
        Ok(posts) => posts,
        Err(e) => return store_failure("加载文章列表", e),
    };

    let listing = &state.config.listing;
    let summaries: Vec<PostSummary> = posts
        .iter()
        .map(|post| PostSummary::from_post(post, listing.excerpt_length, &listing.date_format))
        .collect();

    render_page(&state, &current, "index.html", context! { posts => summaries })
}

/// 详情页直接渲染完整正文，不经过截断
pub async fn show_post(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Response {
    let post = match state.posts.get(&id).await {
        Ok(Some(post)) => post,
        Ok(None) => return not_found(),
        Err(e) => return store_failure("加载文章", e),
    };

    let created_at = post.created_at.format(&state.config.listing.date_format).to_string();
    render_page(
        &state,
        &current,
        "post.html",
        context! { post => post, created_at => created_at },
    )
}

pub async fn new_post_page(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Response {
    let ctx = context! {
        is_edit => false,
        action => "/posts/new",
        title => "",
        content => "",
    };
    render_page(&state, &current, "form.html", ctx)
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(editor): Extension<UserProfile>,
    Form(form): Form<PostForm>,
) -> Response {
    let Some((title, content)) = form.validated() else {
        return missing_fields();
    };

    let new_post = NewPost {
        title,
        content,
        author_id: &editor.id,
        author_name: &editor.display_name,
        author_email: &editor.email,
    };

    match state.posts.create(&new_post).await {
        Ok(id) => {
            tracing::info!(post_id = %id, author = %editor.email, "文章已发布");
            Redirect::to("/").into_response()
        }
        Err(e) => store_failure("发布文章", e),
    }
}

pub async fn edit_post_page(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Response {
    let post = match state.posts.get(&id).await {
        Ok(Some(post)) => post,
        Ok(None) => return not_found(),
        Err(e) => return store_failure("加载文章", e),
    };

    let ctx = context! {
        is_edit => true,
        action => format!("/posts/{}/edit", post.id),
        title => post.title,
        content => post.content,
    };
    render_page(&state, &current, "form.html", ctx)
}

pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Form(form): Form<PostForm>,
) -> Response {
    let Some((title, content)) = form.validated() else {
        return missing_fields();
    };

    match state.posts.update(&id, title, content).await {
        Ok(()) => {
            tracing::info!(post_id = %id, "文章已更新");
            Redirect::to(&format!("/posts/{id}")).into_response()
        }
        Err(StoreError::NotFound(_)) => not_found(),
        Err(e) => store_failure("更新文章", e),
    }
}

pub async fn delete_post(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.posts.delete(&id).await {
        Ok(()) => {
            tracing::info!(post_id = %id, "文章已删除");
            Redirect::to("/").into_response()
        }
        Err(StoreError::NotFound(_)) => not_found(),
        Err(e) => store_failure("删除文章", e),
    }
}
