use anyhow::{Context, Result};
use minijinja::{Environment, Value};

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../../templates/base.html")),
    ("index.html", include_str!("../../templates/index.html")),
    ("post.html", include_str!("../../templates/post.html")),
    ("form.html", include_str!("../../templates/form.html")),
    ("login.html", include_str!("../../templates/login.html")),
    ("register.html", include_str!("../../templates/register.html")),
];

/// 构建页面渲染环境，模板在编译期嵌入
pub fn build_env() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    for &(name, source) in TEMPLATES {
        env.add_template(name, source)
            .with_context(|| format!("注册模板 {name} 失败"))?;
    }
    Ok(env)
}

pub fn render(env: &Environment, name: &str, ctx: Value) -> Result<String> {
    let tmpl = env
        .get_template(name)
        .with_context(|| format!("模板 {name} 不存在"))?;
    let html = tmpl
        .render(ctx)
        .with_context(|| format!("渲染模板 {name} 失败"))?;
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn excerpt_is_rendered_unescaped() {
        let env = build_env().unwrap();
        let ctx = context! {
            site_title => "Daily Blog",
            user => Value::from(()),
            is_editor => false,
            posts => vec![context! {
                id => "p1",
                title => "<Title>",
                author_name => "Ada",
                created_at => "2024-05-17 09:30",
                excerpt => "<p>Body...</p>",
                is_truncated => true,
            }],
        };
        let html = render(&env, "index.html", ctx).unwrap();
        assert!(html.contains("<p>Body...</p>"));
        assert!(html.contains("&lt;Title&gt;"));
        assert!(html.contains("阅读全文"));
    }
}
