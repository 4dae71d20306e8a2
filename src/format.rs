//! Markdown to HTML conversion for platforms that only accept HTML

use pulldown_cmark::{html, Event, Options, Parser};

/// Render Markdown to HTML
///
/// CommonMark plus tables and strikethrough. Raw HTML passes through and
/// single newlines become `<br />`.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}
