//! Rendering of human-readable descriptions.

use std::fmt;

/// Markdown capability used for field descriptions only.
pub trait MarkdownRenderer: Send + Sync + fmt::Debug {
    fn render(&self, text: &str) -> String;
}

/// CommonMark renderer backed by pulldown-cmark.
#[cfg(feature = "markdown")]
#[derive(Debug, Clone, Copy, Default)]
pub struct PulldownRenderer;

#[cfg(feature = "markdown")]
impl MarkdownRenderer for PulldownRenderer {
    fn render(&self, text: &str) -> String {
        let parser = pulldown_cmark::Parser::new(text);
        let mut html = String::new();
        pulldown_cmark::html::push_html(&mut html, parser);
        html
    }
}

/// Render a description, falling back to the raw text without a renderer.
pub fn render_description(renderer: Option<&dyn MarkdownRenderer>, text: &str) -> String {
    match renderer {
        Some(r) => r.render(text),
        None => text.to_string(),
    }
}
