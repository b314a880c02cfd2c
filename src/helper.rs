use std::{fs, path::Path};

use log::{debug, error, trace};
use pulldown_cmark::{Event, Parser, TagEnd};

use crate::{Note, Result, VaultError};

/// Block-level HTML tags that separate words when stripped.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "td", "th",
    "blockquote", "pre", "hr", "section", "article", "table",
];

/// Derives the text-only projection of editor markup.
///
/// Handles Markdown and raw HTML (the rich-text editor emits HTML, which
/// pulldown-cmark passes through as HTML events). Whitespace is collapsed.
pub fn derive_plain_text(markup: &str) -> String {
    let mut text = String::with_capacity(markup.len());

    for event in Parser::new(markup) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::Html(html) | Event::InlineHtml(html) => strip_tags(&html, &mut text),
            Event::SoftBreak | Event::HardBreak | Event::Rule => text.push(' '),
            Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Heading(_))
            | Event::End(TagEnd::Item)
            | Event::End(TagEnd::CodeBlock)
            | Event::End(TagEnd::TableCell) => text.push(' '),
            _ => {}
        }
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_tags(html: &str, out: &mut String) {
    let mut in_tag = false;
    let mut tag = String::new();
    let mut entity: Option<String> = None;

    for c in html.chars() {
        if in_tag {
            if c == '>' {
                in_tag = false;
                let name: String = tag
                    .trim_start_matches('/')
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric())
                    .collect::<String>()
                    .to_ascii_lowercase();
                if BLOCK_TAGS.contains(&name.as_str()) {
                    out.push(' ');
                }
                tag.clear();
            } else {
                tag.push(c);
            }
            continue;
        }

        if let Some(buf) = entity.as_mut() {
            if c == ';' {
                out.push_str(decode_entity(buf));
                entity = None;
            } else if c.is_ascii_alphanumeric() || c == '#' {
                buf.push(c);
            } else {
                out.push('&');
                out.push_str(buf);
                out.push(c);
                entity = None;
            }
            continue;
        }

        match c {
            '<' => in_tag = true,
            '&' => entity = Some(String::new()),
            _ => out.push(c),
        }
    }

    if let Some(buf) = entity {
        out.push('&');
        out.push_str(&buf);
    }
}

fn decode_entity(name: &str) -> &str {
    match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "#39" | "apos" => "'",
        "nbsp" => " ",
        _ => "",
    }
}

/// Helper method to load a single note from file
pub fn load_note_from_file(path: &Path) -> Result<Note> {
    debug!("Loading note from file: {}", path.display());
    let content = fs::read_to_string(path).map_err(|e| {
        error!("Failed to open note file {}: {}", path.display(), e);
        VaultError::Io(e)
    })?;

    let note: Note = serde_json::from_str(&content)?;

    // Validate note
    if note.id.is_empty() {
        let error_mgs = format!("Note from {} has an empty ID", path.display());
        error!("{}", error_mgs);
        return Err(VaultError::Validation { message: error_mgs });
    }

    trace!("Successfully loaded note: {}", note.id);
    Ok(note)
}

// Helper method for parsing tags
pub fn parse_tags(tags: Option<String>) -> Vec<String> {
    let mut parsed: Vec<String> = Vec::new();
    for tag in tags.iter().flat_map(|t| t.split(',')) {
        let tag = tag.trim();
        if !tag.is_empty() && !parsed.iter().any(|t| t == tag) {
            parsed.push(tag.to_string());
        }
    }
    parsed
}
