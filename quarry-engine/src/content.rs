//! HTML content extraction: drops boilerplate and renders readable text or
//! markdown.
//!
//! Used by the `direct` scraper and by the transport layer to turn HTML
//! error pages into a one-line message.

use scraper::{ElementRef, Html, Selector};

use crate::error::ProviderError;
use crate::types::OutputFormat;

/// Default maximum characters kept from an extracted page.
pub const DEFAULT_MAX_CHARS: usize = 100_000;

/// Elements whose whole subtree is never content.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "noscript", "svg", "iframe", "form",
    "button", "template",
];

/// Elements that start a new paragraph.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "table", "tr", "ul", "ol", "dl", "figure",
    "blockquote", "details", "summary",
];

/// A page reduced to its main content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    /// `<title>`, or the first `<h1>` when the title is missing.
    pub title: Option<String>,
    pub content: String,
}

/// Extract the main content of `html` in the requested format.
///
/// `Html` returns the markup of the main content element unchanged;
/// `Markdown` and `Text` render it with boilerplate removed.
///
/// # Errors
///
/// Returns [`ProviderError::Parse`] if no content survives extraction.
pub fn extract(html: &str, format: OutputFormat, max_chars: usize) -> Result<ExtractedPage, ProviderError> {
    let document = Html::parse_document(html);
    let title = extract_title(&document);

    let Some(root) = main_element(&document) else {
        return Err(ProviderError::Parse("no extractable content found".into()));
    };

    let content = match format {
        OutputFormat::Html => root.html(),
        OutputFormat::Markdown | OutputFormat::Text => {
            let mut renderer = Renderer::new(format == OutputFormat::Markdown);
            renderer.walk(root);
            normalise_whitespace(&renderer.out)
        }
    };

    if content.trim().is_empty() {
        return Err(ProviderError::Parse("no extractable content found".into()));
    }

    Ok(ExtractedPage {
        title,
        content: truncate_to_limit(&content, max_chars),
    })
}

/// Collapse an HTML fragment or document into one line of plain text.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let title = extract_title(&document).unwrap_or_default();
    let body = main_element(&document)
        .map(|root| {
            let mut renderer = Renderer::new(false);
            renderer.walk(root);
            collapse_spaces(&renderer.out)
        })
        .unwrap_or_default();

    if title.is_empty() || body.starts_with(&title) {
        body
    } else if body.is_empty() {
        title
    } else {
        format!("{title}: {body}")
    }
}

fn extract_title(document: &Html) -> Option<String> {
    ["title", "h1"].iter().find_map(|tag| {
        let selector = Selector::parse(tag).ok()?;
        let text = document.select(&selector).next()?.text().collect::<String>();
        let text = collapse_spaces(&text);
        (!text.is_empty()).then_some(text)
    })
}

/// First non-empty content container, falling back to `<body>`.
fn main_element(document: &Html) -> Option<ElementRef<'_>> {
    ["article", "main", "[role=\"main\"]", "body"]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| {
            document
                .select(&selector)
                .find(|el| el.text().any(|t| !t.trim().is_empty()))
        })
}

struct Renderer {
    out: String,
    markdown: bool,
}

impl Renderer {
    fn new(markdown: bool) -> Self {
        Self {
            out: String::new(),
            markdown,
        }
    }

    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            if let Some(text) = child.value().as_text() {
                self.push_inline(text);
            } else if let Some(child) = ElementRef::wrap(child) {
                self.element(child);
            }
        }
    }

    fn element(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        if SKIPPED_TAGS.contains(&name) {
            return;
        }
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let text = collapse_spaces(&el.text().collect::<String>());
                if text.is_empty() {
                    return;
                }
                self.block_break();
                if self.markdown {
                    let level = name[1..].parse::<usize>().unwrap_or(1);
                    self.out.push_str(&"#".repeat(level));
                    self.out.push(' ');
                }
                self.out.push_str(&text);
                self.block_break();
            }
            "li" => {
                self.out.push('\n');
                if self.markdown {
                    self.out.push_str("- ");
                }
                self.walk(el);
            }
            "br" => self.out.push('\n'),
            "pre" => {
                let code = el.text().collect::<String>();
                self.block_break();
                if self.markdown {
                    self.out.push_str("```\n");
                    self.out.push_str(code.trim_end());
                    self.out.push_str("\n```");
                } else {
                    self.out.push_str(code.trim_end());
                }
                self.block_break();
            }
            "a" if self.markdown => {
                let text = collapse_spaces(&el.text().collect::<String>());
                match el.value().attr("href") {
                    Some(href) if !text.is_empty() && !href.starts_with('#') => {
                        self.push_word(&format!("[{text}]({href})"));
                    }
                    _ => self.push_word(&text),
                }
            }
            "strong" | "b" if self.markdown => {
                let text = collapse_spaces(&el.text().collect::<String>());
                if !text.is_empty() {
                    self.push_word(&format!("**{text}**"));
                }
            }
            "code" if self.markdown => {
                let text = collapse_spaces(&el.text().collect::<String>());
                if !text.is_empty() {
                    self.push_word(&format!("`{text}`"));
                }
            }
            _ if BLOCK_TAGS.contains(&name) => {
                self.block_break();
                self.walk(el);
                self.block_break();
            }
            _ => self.walk(el),
        }
    }

    /// Append a text node, collapsing source-formatting whitespace.
    fn push_inline(&mut self, text: &str) {
        let collapsed = collapse_spaces(text);
        if collapsed.is_empty() {
            if text.chars().any(char::is_whitespace) {
                self.space();
            }
            return;
        }
        if text.starts_with(char::is_whitespace) {
            self.space();
        }
        self.out.push_str(&collapsed);
        if text.ends_with(char::is_whitespace) {
            self.space();
        }
    }

    fn push_word(&mut self, word: &str) {
        if self
            .out
            .chars()
            .last()
            .is_some_and(|c| !c.is_whitespace() && !matches!(c, '(' | '['))
        {
            self.out.push(' ');
        }
        self.out.push_str(word);
    }

    fn space(&mut self) {
        if self.out.chars().last().is_some_and(|c| !c.is_whitespace()) {
            self.out.push(' ');
        }
    }

    fn block_break(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push_str("\n\n");
        }
    }
}

fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trim every line and keep at most one blank line between paragraphs.
pub fn normalise_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !result.is_empty() {
            result.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        result.push_str(line);
        blank_run = 0;
    }
    result
}

/// Truncate to `max_chars` characters, marking the cut.
pub fn truncate_to_limit(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_owned(),
        Some((end, _)) => {
            let mut truncated = text[..end].to_owned();
            truncated.push_str("\n\n[Content truncated]");
            truncated
        }
    }
}
