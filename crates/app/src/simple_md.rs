//! Lightweight renderer for chat messages.
//!
//! Turns segmented assistant text into either ANSI-styled terminal output or
//! a standalone HTML transcript. All text is escaped and link targets are
//! checked, so model output can never inject markup or script URLs.

use crate::sessions::{ChatMessage, MessageBody, Role};
use shared::files::{base_name, is_code_file};
use shared::segments::{render_inline, segment, InlineSpan, Segment};
use url::Url;

const BOLD: &str = "\x1b[1m";
const ITALIC: &str = "\x1b[3m";
const CYAN: &str = "\x1b[36m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Absolute links must be http, https or mailto. Relative links are allowed.
pub fn is_safe_href(href: &str) -> bool {
    match Url::parse(href.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https" | "mailto"),
        Err(url::ParseError::RelativeUrlWithoutBase) => true,
        Err(_) => false,
    }
}

pub fn to_html(spans: &[InlineSpan]) -> String {
    let mut out = String::new();
    for span in spans {
        match span {
            InlineSpan::Bold(t) => {
                out.push_str(&format!("<strong>{}</strong>", escape_html(t)))
            }
            InlineSpan::Italic(t) => out.push_str(&format!("<em>{}</em>", escape_html(t))),
            InlineSpan::InlineCode(t) => {
                out.push_str(&format!("<code>{}</code>", escape_html(t)))
            }
            InlineSpan::Link { href, label } if is_safe_href(href) => out.push_str(&format!(
                "<a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a>",
                escape_html(href),
                escape_html(label)
            )),
            // Unsafe targets keep only their label.
            InlineSpan::Link { label, .. } => out.push_str(&escape_html(label)),
            InlineSpan::LineBreak => out.push_str("<br>"),
            InlineSpan::PlainRun(t) => out.push_str(&escape_html(t)),
        }
    }
    out
}

pub fn to_terminal(spans: &[InlineSpan]) -> String {
    let mut out = String::new();
    for span in spans {
        match span {
            InlineSpan::Bold(t) => out.push_str(&format!("{BOLD}{t}{RESET}")),
            InlineSpan::Italic(t) => out.push_str(&format!("{ITALIC}{t}{RESET}")),
            InlineSpan::InlineCode(t) => out.push_str(&format!("{CYAN}{t}{RESET}")),
            InlineSpan::Link { href, label } => out.push_str(&format!("{label} ({href})")),
            InlineSpan::LineBreak => out.push('\n'),
            InlineSpan::PlainRun(t) => out.push_str(t),
        }
    }
    out
}

fn code_block_terminal(language: &str, content: &str) -> String {
    let mut out = format!("{DIM}--- {language} ---{RESET}\n");
    for line in content.lines() {
        out.push_str(&format!("{CYAN}  {line}{RESET}\n"));
    }
    out.push_str(&format!("{DIM}---{RESET}"));
    out
}

fn code_block_html(language: &str, content: &str) -> String {
    format!(
        "<pre><code class=\"language-{}\">{}</code></pre>",
        escape_html(language),
        escape_html(content)
    )
}

/// Free text through segmentation, then inline markup per prose segment.
pub fn render_text_terminal(text: &str) -> String {
    segment(text)
        .iter()
        .map(|seg| match seg {
            Segment::CodeBlock {
                language, content, ..
            } => code_block_terminal(language, content),
            Segment::PlainText { content, .. } => to_terminal(&render_inline(content)),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_text_html(text: &str) -> String {
    segment(text)
        .iter()
        .map(|seg| match seg {
            Segment::CodeBlock {
                language, content, ..
            } => code_block_html(language, content),
            Segment::PlainText { content, .. } => {
                format!("<p>{}</p>", to_html(&render_inline(content)))
            }
        })
        .collect()
}

fn file_label(path: &str) -> &'static str {
    if is_code_file(base_name(path)) {
        "code"
    } else {
        "file"
    }
}

fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Model => "Assistant",
        Role::System => "System",
    }
}

pub fn render_message_terminal(msg: &ChatMessage) -> String {
    let mut out = format!("{BOLD}{}{RESET} {DIM}{}{RESET}\n", speaker(msg.role), msg.timestamp);

    if let Some(files) = &msg.files {
        for path in files {
            out.push_str(&format!("  [{}] {}\n", file_label(path), path));
        }
    }

    match (&msg.body, msg.role) {
        (MessageBody::Text(text), _) if msg.is_error => {
            out.push_str(&format!("{RED}{text}{RESET}"));
        }
        (MessageBody::Text(text), Role::Model) => out.push_str(&render_text_terminal(text)),
        (MessageBody::Text(text), _) => out.push_str(text),
        (MessageBody::Structured(reply), _) => {
            let mut parts = Vec::new();
            if let Some(explanation) = reply.explanation.as_deref().filter(|e| !e.is_empty()) {
                parts.push(to_terminal(&render_inline(explanation)));
            }
            if let Some(code) = reply.code.as_deref().filter(|c| !c.is_empty()) {
                parts.push(code_block_terminal(reply.language_or_default(), code));
            }
            out.push_str(&parts.join("\n"));
        }
    }
    out
}

fn render_message_html(msg: &ChatMessage) -> String {
    let class = match msg.role {
        Role::User => "user",
        Role::Model if msg.is_error => "error",
        Role::Model => "model",
        Role::System => "system",
    };
    let mut out = format!(
        "<div class=\"message {}\"><div class=\"meta\">{} <span>{}</span></div>",
        class,
        speaker(msg.role),
        escape_html(&msg.timestamp)
    );

    if let Some(files) = &msg.files {
        out.push_str("<ul class=\"files\">");
        for path in files {
            out.push_str(&format!(
                "<li class=\"{}\">{}</li>",
                file_label(path),
                escape_html(path)
            ));
        }
        out.push_str("</ul>");
    }

    match (&msg.body, msg.role) {
        (MessageBody::Text(text), Role::Model) if !msg.is_error => {
            out.push_str(&render_text_html(text))
        }
        (MessageBody::Text(text), _) => {
            out.push_str(&format!("<p>{}</p>", escape_html(text)))
        }
        (MessageBody::Structured(reply), _) => {
            if let Some(explanation) = reply.explanation.as_deref().filter(|e| !e.is_empty()) {
                out.push_str(&format!("<p>{}</p>", to_html(&render_inline(explanation))));
            }
            if let Some(code) = reply.code.as_deref().filter(|c| !c.is_empty()) {
                out.push_str(&code_block_html(reply.language_or_default(), code));
            }
        }
    }
    out.push_str("</div>");
    out
}

/// A standalone HTML page for the whole conversation.
pub fn transcript_html(messages: &[ChatMessage]) -> String {
    let body: String = messages.iter().map(render_message_html).collect();
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Code Assistant transcript</title></head>\n<body>\n{}\n</body></html>\n",
        body
    )
}
