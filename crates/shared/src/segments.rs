//! Segmentation of assistant text into renderable pieces.
//!
//! Assistant replies are split in two stages:
//! - [`segment`] separates fenced code blocks (```` ```lang ```` ... ```` ``` ````)
//!   from the prose around them
//! - [`render_inline`] turns a prose segment into inline spans:
//!   `**bold**`, `*italic*`, `` `code` ``, `[label](url)` and line breaks
//!
//! Both are pure and never fail; malformed markup stays literal.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::LazyLock;

/// Language recorded for a fence without a tag.
pub const DEFAULT_LANGUAGE: &str = "plaintext";

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```([A-Za-z0-9_]+)?\n((?s:.*?))```").expect("fence pattern is valid")
});

/// A typed chunk of assistant text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    PlainText {
        content: String,
        /// Byte range of this segment in the source text
        span: Range<usize>,
    },
    CodeBlock {
        language: String,
        /// Body with fences stripped and surrounding whitespace trimmed
        content: String,
        /// Byte range of the whole fenced block, fences included
        span: Range<usize>,
    },
}

impl Segment {
    pub fn content(&self) -> &str {
        match self {
            Segment::PlainText { content, .. } | Segment::CodeBlock { content, .. } => content,
        }
    }

    pub fn span(&self) -> Range<usize> {
        match self {
            Segment::PlainText { span, .. } | Segment::CodeBlock { span, .. } => span.clone(),
        }
    }

    pub fn is_code(&self) -> bool {
        matches!(self, Segment::CodeBlock { .. })
    }

    fn plain(text: &str, span: Range<usize>) -> Self {
        Segment::PlainText {
            content: text[span.clone()].to_string(),
            span,
        }
    }
}

/// Split `text` into prose and fenced code blocks, in source order.
///
/// An opening fence without a closing one is not a block; its backticks stay
/// in the surrounding prose. Text with no complete fence yields exactly one
/// `PlainText` segment, even when empty.
pub fn segment(text: &str) -> Vec<Segment> {
    let mut parts = Vec::new();
    let mut last = 0;

    for caps in FENCE_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            parts.push(Segment::plain(text, last..whole.start()));
        }
        let language = caps
            .get(1)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
        let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        parts.push(Segment::CodeBlock {
            language,
            content: body.trim().to_string(),
            span: whole.range(),
        });
        last = whole.end();
    }

    if last < text.len() || parts.is_empty() {
        parts.push(Segment::plain(text, last..text.len()));
    }
    parts
}

/// Inline formatting within a prose segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum InlineSpan {
    Bold(String),
    Italic(String),
    InlineCode(String),
    Link { href: String, label: String },
    LineBreak,
    PlainRun(String),
}

/// Resolve inline markup in a prose segment.
///
/// Scans left to right; at each position the markers are tried in the order
/// bold, italic, inline code, link, so `**` is always bold before it can be
/// read as two italic markers. Markers never span a newline and never enclose
/// empty text; this holds for inline code too, unlike a bare `` `[^`]+` ``
/// pattern, which would run across lines. Anything unmatched is kept as a
/// plain run.
pub fn render_inline(text: &str) -> Vec<InlineSpan> {
    let mut spans = Vec::new();
    let mut plain = String::new();
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        if c == '\n' {
            flush_plain(&mut plain, &mut spans);
            spans.push(InlineSpan::LineBreak);
            rest = &rest[1..];
            continue;
        }
        if let Some((span, consumed)) = match_marker(rest) {
            flush_plain(&mut plain, &mut spans);
            spans.push(span);
            rest = &rest[consumed..];
            continue;
        }
        plain.push(c);
        rest = &rest[c.len_utf8()..];
    }

    flush_plain(&mut plain, &mut spans);
    spans
}

fn flush_plain(plain: &mut String, spans: &mut Vec<InlineSpan>) {
    if !plain.is_empty() {
        spans.push(InlineSpan::PlainRun(std::mem::take(plain)));
    }
}

/// Try every marker at the start of `rest`. Returns the span and bytes consumed.
fn match_marker(rest: &str) -> Option<(InlineSpan, usize)> {
    match *rest.as_bytes().first()? {
        b'*' => match_delimited(rest, "**")
            .map(|(inner, n)| (InlineSpan::Bold(inner), n))
            .or_else(|| {
                match_delimited(rest, "*").map(|(inner, n)| (InlineSpan::Italic(inner), n))
            }),
        b'`' => match_delimited(rest, "`").map(|(inner, n)| (InlineSpan::InlineCode(inner), n)),
        b'[' => match_link(rest),
        _ => None,
    }
}

/// `delim` + shortest non-empty text on the same line + `delim`.
fn match_delimited(rest: &str, delim: &str) -> Option<(String, usize)> {
    let body = rest.strip_prefix(delim)?;
    let line = body.split('\n').next().unwrap_or(body);
    let end = line.find(delim)?;
    if end == 0 {
        return None;
    }
    Some((body[..end].to_string(), end + 2 * delim.len()))
}

/// `[label](href)` with both parts non-empty and on one line.
fn match_link(rest: &str) -> Option<(InlineSpan, usize)> {
    let body = rest.strip_prefix('[')?;
    let close = body.find(|c: char| c == ']' || c == '\n')?;
    if close == 0 || !body[close..].starts_with(']') {
        return None;
    }
    let target = body[close + 1..].strip_prefix('(')?;
    let end = target.find(|c: char| c == ')' || c == '\n')?;
    if end == 0 || !target[end..].starts_with(')') {
        return None;
    }
    let span = InlineSpan::Link {
        href: target[..end].to_string(),
        label: body[..close].to_string(),
    };
    Some((span, close + end + 4))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(text: &str, segments: &[Segment]) -> String {
        segments.iter().map(|s| &text[s.span()]).collect()
    }

    fn plain(s: &str) -> InlineSpan {
        InlineSpan::PlainRun(s.to_string())
    }

    #[test]
    fn test_plain_only() {
        let segments = segment("plain only");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].content(), "plain only");
        assert!(!segments[0].is_code());
    }

    #[test]
    fn test_empty_input_is_one_plain_segment() {
        let segments = segment("");
        assert_eq!(
            segments,
            vec![Segment::PlainText {
                content: String::new(),
                span: 0..0
            }]
        );
    }

    #[test]
    fn test_code_block_between_text() {
        let text = "a```js\nx=1\n```b";
        let segments = segment(text);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].content(), "a");
        match &segments[1] {
            Segment::CodeBlock {
                language, content, ..
            } => {
                assert_eq!(language, "js");
                assert_eq!(content, "x=1");
            }
            other => panic!("expected code block, got {:?}", other),
        }
        assert_eq!(segments[2].content(), "b");
        assert_eq!(reassemble(text, &segments), text);
    }

    #[test]
    fn test_unterminated_fence_stays_plain() {
        let text = "```js\nincomplete";
        let segments = segment(text);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].content(), text);
        assert!(!segments[0].is_code());
    }

    #[test]
    fn test_missing_language_defaults_to_plaintext() {
        let segments = segment("```\n  echo hi  \n```");
        assert_eq!(
            segments,
            vec![Segment::CodeBlock {
                language: "plaintext".into(),
                content: "echo hi".into(),
                span: 0..19,
            }]
        );
    }

    #[test]
    fn test_adjacent_blocks_have_no_empty_text_between() {
        let text = "```rs\nfn a() {}\n``````py\nb = 1\n```";
        let segments = segment(text);
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(Segment::is_code));
        assert_eq!(reassemble(text, &segments), text);
    }

    #[test]
    fn test_blocks_are_shortest_match() {
        let text = "intro\n```go\none\n```\nmiddle\n```sh\ntwo\n```\nend";
        let segments = segment(text);
        let contents: Vec<_> = segments.iter().map(Segment::content).collect();
        assert_eq!(contents, vec!["intro\n", "one", "\nmiddle\n", "two", "\nend"]);
        assert_eq!(reassemble(text, &segments), text);
    }

    #[test]
    fn test_spans_reconstruct_mixed_inputs() {
        let inputs = [
            "",
            "no fences at all",
            "```\n```",
            "head ```py\nx\n``` tail ```unterminated",
            "héllo ```rs\nlet ü = 1;\n``` wörld",
            "``` js\nspace before tag is not a tag\n```",
        ];
        for text in inputs {
            let segments = segment(text);
            assert_eq!(reassemble(text, &segments), text, "input: {:?}", text);
        }
    }

    #[test]
    fn test_segment_is_idempotent() {
        let text = "x```c\nint a;\n```y";
        assert_eq!(segment(text), segment(text));
    }

    #[test]
    fn test_bold_then_italic() {
        assert_eq!(
            render_inline("**bold** and *italic*"),
            vec![
                InlineSpan::Bold("bold".into()),
                plain(" and "),
                InlineSpan::Italic("italic".into()),
            ]
        );
    }

    #[test]
    fn test_inline_code_and_link() {
        assert_eq!(
            render_inline("run `cargo test` or see [docs](https://docs.rs)"),
            vec![
                plain("run "),
                InlineSpan::InlineCode("cargo test".into()),
                plain(" or see "),
                InlineSpan::Link {
                    href: "https://docs.rs".into(),
                    label: "docs".into()
                },
            ]
        );
    }

    #[test]
    fn test_newlines_become_line_breaks() {
        assert_eq!(
            render_inline("one\ntwo\n"),
            vec![
                plain("one"),
                InlineSpan::LineBreak,
                plain("two"),
                InlineSpan::LineBreak,
            ]
        );
    }

    #[test]
    fn test_unmatched_markers_stay_literal() {
        assert_eq!(render_inline("a * b"), vec![plain("a * b")]);
        assert_eq!(render_inline("**open"), vec![plain("**open")]);
        assert_eq!(render_inline("`tick"), vec![plain("`tick")]);
        assert_eq!(render_inline("[label](no close"), vec![plain("[label](no close")]);
        assert_eq!(render_inline("[x] done"), vec![plain("[x] done")]);
        assert_eq!(render_inline("****"), vec![plain("****")]);
    }

    #[test]
    fn test_markers_do_not_cross_lines() {
        assert_eq!(
            render_inline("*a\nb*"),
            vec![plain("*a"), InlineSpan::LineBreak, plain("b*")]
        );
        assert_eq!(
            render_inline("`let x =\n1;`"),
            vec![plain("`let x ="), InlineSpan::LineBreak, plain("1;`")]
        );
    }

    #[test]
    fn test_code_claims_text_before_emphasis() {
        assert_eq!(
            render_inline("`**not bold**`"),
            vec![InlineSpan::InlineCode("**not bold**".into())]
        );
    }

    #[test]
    fn test_adjacent_markers() {
        assert_eq!(
            render_inline("**a***b*"),
            vec![InlineSpan::Bold("a".into()), InlineSpan::Italic("b".into())]
        );
    }

    #[test]
    fn test_render_inline_is_idempotent() {
        let text = "**x** *y* `z` [l](u)\n";
        assert_eq!(render_inline(text), render_inline(text));
    }
}
