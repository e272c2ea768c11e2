//! 列表页文章摘要：在保持 HTML 可渲染的前提下按可见文本长度截断。
//!
//! 流程：取 body 内容 → 计算纯文本 → 在句子/单词边界选定截断点 →
//! 把纯文本偏移映射回 HTML 偏移 → 切片并附加省略号。
//! 长度均以字符（`char`）计，切片总是落在 UTF-8 边界上。
//! 任何畸形输入都只会退化为近似结果，不会报错。

use serde::Serialize;

use super::html::{Token, extract_body, first_decoded, strip_tags, tokenize};

/// 列表页默认摘要长度
pub const DEFAULT_MAX_LENGTH: usize = 300;

pub const ELLIPSIS: &str = "...";

/// 边界距离截断点不能早于该比例，否则宁可在单词中间截断
const BOUNDARY_RATIO: f64 = 0.7;
/// 扫描未数够目标时，低于该偏移（字符）的结果视为不可信
const MIN_HTML_OFFSET: usize = 50;
/// 截断结果至少要保留的可见字符数
const MIN_VISIBLE_TEXT: usize = 10;
/// 估算：标记大约让字符数翻倍
const MARKUP_ESTIMATE_FACTOR: usize = 2;
/// 映射失败时按可见长度的固定倍数切片
const RAW_SLICE_FACTOR: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TruncationResult {
    pub content: String,
    pub is_truncated: bool,
}

impl TruncationResult {
    fn unchanged(content: &str) -> Self {
        Self {
            content: content.to_string(),
            is_truncated: false,
        }
    }
}

/// 将 HTML 截断到约 `max_length` 个可见字符
///
/// `max_length` 为 0 时结果只剩省略号，调用方应传入正数。
pub fn truncate_html(html: &str, max_length: usize) -> TruncationResult {
    if html.trim().is_empty() {
        return TruncationResult::unchanged(html);
    }

    let body = extract_body(html);
    let plain = strip_tags(body);
    if plain.chars().count() <= max_length {
        return TruncationResult::unchanged(body);
    }

    let truncate_at = find_break(&plain, max_length);
    let (offset, counted) = map_text_offset(body, truncate_at);
    let mut end = drop_split_tag(body, offset_floor(body, offset, counted, truncate_at));

    let visible = visible_chars(&body[..end]);
    if visible < MIN_VISIBLE_TEXT {
        let fallback = char_prefix(body, max_length * RAW_SLICE_FACTOR).len();
        let fallback = drop_split_tag(body, fallback);
        let fallback_visible = visible_chars(&body[..fallback]);
        tracing::debug!(visible, fallback_visible, "截断结果几乎没有可见文本，改用固定比例切片");
        if fallback_visible > visible {
            end = fallback;
        }
    }

    let truncated = body[..end].trim();
    let mut content = String::with_capacity(truncated.len() + ELLIPSIS.len());
    content.push_str(truncated);
    if truncated.len() < body.len() {
        content.push_str(ELLIPSIS);
    }

    TruncationResult {
        content,
        is_truncated: true,
    }
}

/// 在 `[0, max_length]` 内选择截断点：优先句末标点，其次空格，都太靠前则硬截断
///
/// 调用方保证 `plain` 的字符数大于 `max_length`。
fn find_break(plain: &str, max_length: usize) -> usize {
    let window: Vec<char> = plain.chars().take(max_length + 1).collect();
    let last = |target: char| window.iter().rposition(|&c| c == target);
    let threshold = max_length as f64 * BOUNDARY_RATIO;

    let last_punct = ['.', '!', '?'].into_iter().filter_map(last).max();
    if let Some(pos) = last_punct
        && pos as f64 > threshold
    {
        return pos + 1;
    }

    if let Some(pos) = last(' ')
        && pos as f64 > threshold
    {
        return pos;
    }

    max_length
}

/// 把纯文本偏移映射为 `body` 的字节偏移，返回（字节偏移，实际数到的字符数）
///
/// 计数方式与 [`strip_tags`] 一致：标签不计，实体算一个字符，
/// 首个可见字符之前的空白不计。因此 `body[..offset]` 去标签后
/// 恰好是纯文本的前 `truncate_at` 个字符。
fn map_text_offset(body: &str, truncate_at: usize) -> (usize, usize) {
    let mut offset = 0;
    let mut counted = 0;
    let mut leading = true;

    for token in tokenize(body) {
        if counted >= truncate_at {
            break;
        }
        match token {
            Token::Tag(tag) => offset += tag.len(),
            Token::Text(run) => {
                let mut rest = run;
                while counted < truncate_at
                    && let Some((ch, used)) = first_decoded(rest)
                {
                    rest = &rest[used..];
                    offset += used;
                    if leading && ch.is_whitespace() {
                        continue;
                    }
                    leading = false;
                    counted += 1;
                }
            }
        }
    }

    (offset, counted)
}

/// 扫描在数够 `truncate_at` 之前就到了 body 末尾，且偏移小于下限时，
/// 改按“标记约占一倍”估算偏移
///
/// `truncate_html` 传入的目标总小于纯文本长度，这里只兜住目标越界的情况。
fn offset_floor(body: &str, offset: usize, counted: usize, truncate_at: usize) -> usize {
    if counted >= truncate_at || char_len(&body[..offset]) >= MIN_HTML_OFFSET {
        return offset;
    }
    let estimate = char_prefix(body, truncate_at * MARKUP_ESTIMATE_FACTOR).len();
    tracing::debug!(offset, estimate, "文本偏移映射未到达目标，改用长度估算");
    estimate
}

/// `body[..end]` 若把一个标签切成两半，回退到该标签的 `<` 之前
///
/// 与分词器一致：只有 `body` 在其后还有 `>` 时，结尾的 `<` 才是标签开头，
/// 否则它本来就是正文里的字符，原样保留。
fn drop_split_tag(body: &str, end: usize) -> usize {
    match tokenize(&body[..end]).last() {
        Some(Token::Text(tail)) if tail.starts_with('<') => {
            let start = end - tail.len();
            if body[start..].contains('>') { start } else { end }
        }
        _ => end,
    }
}

fn visible_chars(html: &str) -> usize {
    strip_tags(html).chars().count()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn char_prefix(s: &str, chars: usize) -> &str {
    match s.char_indices().nth(chars) {
        Some((byte, _)) => &s[..byte],
        None => s,
    }
}
