use regex::Regex;
use std::sync::LazyLock;

static DOCUMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<!doctype|<html|<body").unwrap());
static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body[^>]*>(.*?)</body>").unwrap());
static HEAD_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)</head>(.*)").unwrap());
static BODY_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</body>").unwrap());
static HTML_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</html>").unwrap());

/// 可识别的命名实体，按需扩展
const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&#39;", "'"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// 含尖括号的完整标签，如 `<p class="x">`
    Tag(&'a str),
    Text(&'a str),
}

/// 流式切分 HTML：只区分标签与文本，不建树、不追踪嵌套
///
/// `<` 之后必须存在 `>` 才算标签；找不到闭合的 `<` 连同其后内容按文本处理。
pub struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
}

pub fn tokenize(html: &str) -> Tokenizer<'_> {
    Tokenizer { src: html, pos: 0 }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let src = self.src;
        let rest = &src[self.pos..];
        if rest.is_empty() {
            return None;
        }

        if rest.starts_with('<') {
            if let Some(end) = rest.find('>') {
                self.pos += end + 1;
                return Some(Token::Tag(&rest[..=end]));
            }
            self.pos = src.len();
            return Some(Token::Text(rest));
        }

        let end = rest.find('<').unwrap_or(rest.len());
        self.pos += end;
        Some(Token::Text(&rest[..end]))
    }
}

/// 从完整 HTML 文档中取出 body 内容；本身就是片段时原样返回
pub fn extract_body(html: &str) -> &str {
    if !DOCUMENT_RE.is_match(html) {
        return html;
    }

    if let Some(inner) = BODY_RE.captures(html).and_then(|c| c.get(1))
        && !inner.as_str().is_empty()
    {
        return inner.as_str().trim();
    }

    // 没有成对的 body 标签，退而取 </head> 之后的部分
    if let Some(rest) = HEAD_END_RE.captures(html).and_then(|c| c.get(1))
        && !rest.as_str().is_empty()
    {
        let mut rest = rest.as_str();
        if let Some(m) = BODY_CLOSE_RE.find(rest) {
            rest = &rest[..m.start()];
        }
        if let Some(m) = HTML_CLOSE_RE.find(rest) {
            rest = &rest[..m.start()];
        }
        return rest.trim();
    }

    html
}

/// 去除标签并解码常见实体，得到首尾去空白的纯文本
pub fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    for token in tokenize(html) {
        if let Token::Text(run) = token {
            decode_entities(run, &mut text);
        }
    }
    text.trim().to_string()
}

fn decode_entities(run: &str, out: &mut String) {
    let mut rest = run;
    while let Some((ch, used)) = first_decoded(rest) {
        out.push(ch);
        rest = &rest[used..];
    }
}

/// 解码文本开头的一个字符，返回（字符，占用字节数）；实体整体只算一个字符
pub(super) fn first_decoded(run: &str) -> Option<(char, usize)> {
    let ch = run.chars().next()?;
    if ch == '&'
        && let Some((name, decoded)) = ENTITIES.iter().find(|(name, _)| run.starts_with(name))
        && let Some(decoded) = decoded.chars().next()
    {
        return Some((decoded, name.len()));
    }
    Some((ch, ch.len_utf8()))
}
