use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub mod auth;
pub mod cleanup;
pub mod health;
pub mod posts;
pub mod template;

pub fn router(state: AppState) -> Router {
    // 读者可访问的路由
    let public_routes = Router::new()
        .route("/", get(posts::list_posts))
        .route("/posts/{id}", get(posts::show_post))
        .route("/login", get(auth::login_page).post(auth::login_submit))
        .route("/register", get(auth::register_page).post(auth::register_submit))
        .route("/logout", post(auth::logout))
        .route("/health", get(health::health_check));

    // 仅编辑可访问的路由
    let editor_routes = Router::new()
        .route("/posts/new", get(posts::new_post_page).post(posts::create_post))
        .route("/posts/{id}/edit", get(posts::edit_post_page).post(posts::update_post))
        .route("/posts/{id}/delete", post(posts::delete_post))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_editor));

    Router::new()
        .merge(public_routes)
        .merge(editor_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth::session))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlogConfig;
    use crate::content::Role;
    use crate::repository::{memory_pool, NewPost};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        AppState::with_pool(memory_pool().await, BlogConfig::default())
            .await
            .unwrap()
    }

    async fn session_cookie_for(state: &AppState, email: &str, role: Role) -> String {
        let id = state.profiles.create(email, "Tester", "unused", role).await.unwrap();
        let (token, _) = auth::create_jwt(&id, email, &state.jwt_secret, "1h").unwrap();
        format!("{}={token}", state.config.auth.session_name)
    }

    async fn seed_post(state: &AppState, title: &str, content: &str) -> String {
        state
            .posts
            .create(&NewPost {
                title,
                content,
                author_id: "u1",
                author_name: "Ada",
                author_email: "ada@example.com",
            })
            .await
            .unwrap()
    }

    async fn send(state: &AppState, req: Request<Body>) -> Response {
        router(state.clone()).oneshot(req).await.unwrap()
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn form(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_owned())).unwrap()
    }

    async fn body_text(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(resp: &Response) -> &str {
        resp.headers()[header::LOCATION].to_str().unwrap()
    }

    #[tokio::test]
    async fn index_shows_truncated_excerpts() {
        let state = test_state().await;
        let long = format!("<p>{}</p>", "Every day is a good day to write. ".repeat(30));
        let long_id = seed_post(&state, "Long", &long).await;
        seed_post(&state, "Short", "<p>Tiny post.</p>").await;

        let resp = send(&state, get("/", None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let html = body_text(resp).await;
        assert!(html.contains("<p>Tiny post.</p>"));
        assert!(html.contains(&format!("href=\"/posts/{long_id}\">阅读全文")));
        assert_eq!(html.matches("阅读全文").count(), 1);
        assert!(!html.contains(&long));
    }

    #[tokio::test]
    async fn detail_renders_full_content() {
        let state = test_state().await;
        let long = format!("<p>{}</p>", "Every day is a good day to write. ".repeat(30));
        let id = seed_post(&state, "Long", &long).await;

        let html = body_text(send(&state, get(&format!("/posts/{id}"), None)).await).await;
        assert!(html.contains(&long));
        assert!(!html.contains("/delete"));

        let resp = send(&state, get("/posts/does-not-exist", None)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn editor_routes_require_login() {
        let state = test_state().await;
        let resp = send(&state, get("/posts/new", None)).await;
        assert!(resp.status().is_redirection());
        assert_eq!(location(&resp), "/login");
    }

    #[tokio::test]
    async fn readers_cannot_manage_posts() {
        let state = test_state().await;
        let cookie = session_cookie_for(&state, "reader@example.com", Role::Reader).await;
        let id = seed_post(&state, "Keep", "<p>Keep me.</p>").await;

        let resp = send(&state, form("/posts/new", Some(&cookie), "title=a&content=b")).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = send(&state, form(&format!("/posts/{id}/delete"), Some(&cookie), "")).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(state.posts.get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn editor_can_create_edit_and_delete() {
        let state = test_state().await;
        let cookie = session_cookie_for(&state, "editor@example.com", Role::Editor).await;

        let resp = send(
            &state,
            form(
                "/posts/new",
                Some(&cookie),
                "title=+Hello+&content=%3Cp%3EFirst+post%3C%2Fp%3E",
            ),
        )
        .await;
        assert!(resp.status().is_redirection());

        let posts = state.posts.list().await.unwrap();
        assert_eq!(posts.len(), 1);
        let post = &posts[0];
        assert_eq!(post.title, "Hello");
        assert_eq!(post.content, "<p>First post</p>");
        assert_eq!(post.author_email, "editor@example.com");

        let html = body_text(send(&state, get(&format!("/posts/{}", post.id), Some(&cookie))).await).await;
        assert!(html.contains(&format!("/posts/{}/delete", post.id)));

        let resp = send(
            &state,
            form(&format!("/posts/{}/edit", post.id), Some(&cookie), "title=Updated&content=x"),
        )
        .await;
        assert_eq!(location(&resp), format!("/posts/{}", post.id));
        assert_eq!(state.posts.get(&post.id).await.unwrap().unwrap().title, "Updated");

        let resp = send(&state, form(&format!("/posts/{}/delete", post.id), Some(&cookie), "")).await;
        assert_eq!(location(&resp), "/");
        assert!(state.posts.list().await.unwrap().is_empty());

        let resp = send(&state, form(&format!("/posts/{}/delete", post.id), Some(&cookie), "")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn blank_fields_are_rejected() {
        let state = test_state().await;
        let cookie = session_cookie_for(&state, "editor@example.com", Role::Editor).await;
        let resp = send(&state, form("/posts/new", Some(&cookie), "title=+++&content=body")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(state.posts.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn revoked_session_is_anonymous() {
        let state = test_state().await;
        let cookie = session_cookie_for(&state, "editor@example.com", Role::Editor).await;

        let resp = send(&state, form("/logout", Some(&cookie), "")).await;
        assert!(resp.status().is_redirection());
        let cleared = resp.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cleared.contains("Max-Age=0"));

        let resp = send(&state, get("/posts/new", Some(&cookie))).await;
        assert_eq!(location(&resp), "/login");
    }

    #[tokio::test]
    async fn registration_signs_in_as_reader() {
        let state = test_state().await;
        let mut events = state.identity_events.subscribe();

        let resp = send(
            &state,
            form(
                "/register",
                None,
                "email=new%40example.com&display_name=Newbie&password=long-enough",
            ),
        )
        .await;
        assert!(resp.status().is_redirection());
        assert!(resp.headers().contains_key(header::SET_COOKIE));

        let profile = state.profiles.find_by_email("new@example.com").await.unwrap().unwrap();
        assert_eq!(profile.role, Role::Reader);
        assert!(matches!(
            events.try_recv(),
            Ok(crate::identity::IdentityEvent::Registered { .. })
        ));

        let resp = send(
            &state,
            form(
                "/register",
                None,
                "email=new%40example.com&display_name=Again&password=long-enough",
            ),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn failed_logins_are_rate_limited() {
        let state = test_state().await;
        for _ in 0..5 {
            let resp = send(&state, form("/login", None, "email=x%40example.com&password=nope")).await;
            assert_eq!(location(&resp), "/login?error=1");
        }
        let resp = send(&state, form("/login", None, "email=x%40example.com&password=nope")).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn health_reports_database() {
        let state = test_state().await;
        let body = body_text(send(&state, get("/health", None)).await).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["database"], "connected");
    }
}
