//! Structured renderers and the plain-text fallback layout.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd, html};

use sdsynth_shared::{Result, SynthError};

use crate::ExportFormat;

/// Title used when a document has no heading.
pub const DEFAULT_TITLE: &str = "Synthesized Solution Document";

/// Converts cleaned Markdown into the bytes of one export format.
pub trait DocumentRenderer {
    fn format(&self) -> ExportFormat;

    fn render(&self, markdown: &str) -> Result<String>;
}

fn parser_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH
}

/// Standalone HTML page via `pulldown-cmark`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlRenderer;

impl DocumentRenderer for HtmlRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Html
    }

    fn render(&self, markdown: &str) -> Result<String> {
        let mut body = String::with_capacity(markdown.len() * 3 / 2);
        html::write_html_fmt(&mut body, Parser::new_ext(markdown, parser_options()))
            .map_err(|e| SynthError::Export(format!("HTML rendering failed: {e}")))?;
        Ok(html_page(&document_title(markdown), &body))
    }
}

/// The cleaned Markdown itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownRenderer;

impl DocumentRenderer for MarkdownRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Markdown
    }

    fn render(&self, markdown: &str) -> Result<String> {
        Ok(markdown.to_string())
    }
}

/// Markup-free text: headings and paragraphs separated by blank lines,
/// list items prefixed with `- `, table cells separated by tabs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextRenderer;

impl DocumentRenderer for TextRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Text
    }

    fn render(&self, markdown: &str) -> Result<String> {
        let mut out = String::with_capacity(markdown.len());
        for event in Parser::new_ext(markdown, parser_options()) {
            match event {
                Event::Text(t) | Event::Code(t) => out.push_str(&t),
                Event::SoftBreak | Event::HardBreak => out.push('\n'),
                Event::Start(Tag::Item) => out.push_str("- "),
                Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::CodeBlock) => {
                    out.push_str("\n\n")
                }
                Event::End(TagEnd::Item | TagEnd::TableHead | TagEnd::TableRow) => out.push('\n'),
                Event::End(TagEnd::TableCell) => out.push('\t'),
                Event::Rule => out.push('\n'),
                _ => {}
            }
        }
        let trimmed = out.trim_end();
        Ok(format!("{trimmed}\n"))
    }
}

/// Default renderer for a format.
pub fn renderer_for(format: ExportFormat) -> Box<dyn DocumentRenderer> {
    match format {
        ExportFormat::Html => Box::new(HtmlRenderer),
        ExportFormat::Markdown => Box::new(MarkdownRenderer),
        ExportFormat::Text => Box::new(TextRenderer),
    }
}

/// Unformatted layout used when structured rendering fails.
pub fn plain_layout(markdown: &str, format: ExportFormat) -> String {
    match format {
        ExportFormat::Html => {
            let body = format!("<pre>{}</pre>\n", escape_html(markdown));
            html_page(&document_title(markdown), &body)
        }
        ExportFormat::Markdown | ExportFormat::Text => markdown.to_string(),
    }
}

/// Text of the first heading, or [`DEFAULT_TITLE`].
pub fn document_title(markdown: &str) -> String {
    let mut in_heading = false;
    let mut title = String::new();

    for event in Parser::new_ext(markdown, parser_options()) {
        match event {
            Event::Start(Tag::Heading { .. }) => in_heading = true,
            Event::End(TagEnd::Heading(_)) => {
                if !title.trim().is_empty() {
                    return title.trim().to_string();
                }
                in_heading = false;
            }
            Event::Text(t) | Event::Code(t) if in_heading => title.push_str(&t),
            _ => {}
        }
    }

    DEFAULT_TITLE.to_string()
}

fn html_page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
         <style>\nbody {{ font-family: Helvetica, Arial, sans-serif; max-width: 52rem; margin: 2rem auto; line-height: 1.5; }}\n\
         table {{ border-collapse: collapse; }}\nth, td {{ border: 1px solid #999; padding: 0.3rem 0.6rem; }}\n\
         pre {{ white-space: pre-wrap; }}\n</style>\n</head>\n<body>\n{body}</body>\n</html>\n",
        title = escape_html(title),
    )
}

fn escape_html(text: &str) -> String {
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
