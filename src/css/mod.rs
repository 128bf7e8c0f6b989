//! CSS inlining for email markup.
//!
//! Mail clients ignore most `<style>` blocks, so stylesheet rules are
//! merged into each element's `style` attribute before delivery. Options
//! are fixed for this domain:
//! - `@media` and other at-rules are kept as-is instead of being inlined
//! - `<style>` and `<link>` tags are removed from the output
//! - remote stylesheets are never fetched
//!
//! Template tags are swapped for placeholders before the markup is parsed
//! and restored afterwards, so loops around table rows and operators
//! inside tags survive inlining.
//!
//! Inlining fails open: a broken stylesheet degrades styling, it never
//! breaks rendering.

use std::borrow::Cow;

use css_inline::{CSSInliner, InlineError};

use crate::metrics::CssMetrics;

fn inliner(extra_css: Option<&str>) -> CSSInliner<'_> {
    CSSInliner::options()
        .inline_style_tags(true)
        .keep_style_tags(false)
        .keep_link_tags(false)
        .keep_at_rules(true)
        .load_remote_stylesheets(false)
        .extra_css(extra_css.map(Cow::Borrowed))
        .build()
}

/// Layouts are whole documents; fragment parsing would drop their
/// `<html>`, `<head>` and `<body>` elements. Leading comments and an XML
/// prolog are skipped before sniffing.
fn is_document(html: &str) -> bool {
    let mut rest = html.trim_start_matches('\u{feff}').trim_start();
    loop {
        let skipped = if let Some(after) = rest.strip_prefix("<!--") {
            after.find("-->").map(|end| &after[end + 3..])
        } else if let Some(after) = rest.strip_prefix("<?") {
            after.find("?>").map(|end| &after[end + 2..])
        } else {
            break;
        };
        match skipped {
            Some(after) => rest = after.trim_start(),
            None => return false,
        }
    }

    let prefix = rest.chars().take(9).collect::<String>().to_ascii_lowercase();
    prefix.starts_with("<html") || prefix.starts_with("<!doctype")
}

/// Split a leading `<?xml ...?>` prolog off `html`. The HTML parser would
/// otherwise rewrite it into a comment.
fn split_prolog(html: &str) -> (&str, &str) {
    let trimmed = html.trim_start_matches('\u{feff}').trim_start();
    if !trimmed.starts_with("<?") {
        return ("", html);
    }
    match trimmed.find("?>") {
        Some(end) => {
            let split = html.len() - trimmed.len() + end + 2;
            html.split_at(split)
        }
        None => ("", html),
    }
}

const DELIMITERS: [(&[u8], &[u8]); 3] = [(b"{{", b"}}"), (b"{%", b"%}"), (b"{#", b"#}")];

/// Elements whose content the parser keeps as raw text
const RAW_TEXT: [&str; 4] = ["script", "style", "textarea", "title"];

fn placeholder(index: usize) -> String {
    format!("mailer-tag-{}-x", index)
}

/// End of the template tag opening at `at`, if one does
fn tag_end(bytes: &[u8], at: usize) -> Option<usize> {
    let rest = &bytes[at..];
    let (_, close) = DELIMITERS.iter().find(|(open, _)| rest.starts_with(open))?;
    rest[2..]
        .windows(2)
        .position(|w| w == *close)
        .map(|pos| at + 2 + pos + 2)
}

/// Where the scanner is relative to HTML markup
#[derive(Default)]
struct Markup {
    in_tag: bool,
    in_comment: bool,
    quote: Option<u8>,
    tag_start: usize,
    raw_text: Option<&'static str>,
}

impl Markup {
    /// Inside a tag, a comment or raw text. Template tags there become
    /// plain tokens; elsewhere they become comments so the parser keeps
    /// them in place, including between table rows.
    fn inside(&self) -> bool {
        self.in_tag || self.in_comment || self.raw_text.is_some()
    }

    fn step(&mut self, bytes: &[u8], at: usize) {
        let rest = &bytes[at..];

        if self.in_comment {
            if rest.starts_with(b"-->") {
                self.in_comment = false;
            }
            return;
        }

        if let Some(name) = self.raw_text {
            let closes = rest.len() > name.len() + 1
                && rest.starts_with(b"</")
                && rest[2..2 + name.len()].eq_ignore_ascii_case(name.as_bytes());
            if closes {
                self.raw_text = None;
                self.open_tag(at);
            }
            return;
        }

        if self.in_tag {
            match (self.quote, rest[0]) {
                (Some(q), c) if c == q => self.quote = None,
                (Some(_), _) => {}
                (None, b'"' | b'\'') => self.quote = Some(rest[0]),
                (None, b'>') => self.close_tag(bytes, at),
                _ => {}
            }
            return;
        }

        if rest.starts_with(b"<!--") {
            self.in_comment = true;
        } else if rest[0] == b'<'
            && rest
                .get(1)
                .is_some_and(|&c| c.is_ascii_alphabetic() || matches!(c, b'/' | b'!' | b'?'))
        {
            self.open_tag(at);
        }
    }

    fn open_tag(&mut self, at: usize) {
        self.in_tag = true;
        self.quote = None;
        self.tag_start = at + 1;
    }

    fn close_tag(&mut self, bytes: &[u8], at: usize) {
        self.in_tag = false;
        let name: Vec<u8> = bytes[self.tag_start..at]
            .iter()
            .take_while(|c| c.is_ascii_alphanumeric())
            .map(u8::to_ascii_lowercase)
            .collect();
        self.raw_text = RAW_TEXT.iter().copied().find(|raw| raw.as_bytes() == name);
    }
}

/// Swap every `{{ }}`, `{% %}` and `{# #}` tag for a placeholder the HTML
/// parser leaves alone. Returns the rewritten markup and the original tags
/// in placeholder order.
fn protect(source: &str) -> (String, Vec<String>) {
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut tags = Vec::new();
    let mut markup = Markup::default();
    let mut last = 0;
    let mut at = 0;

    while at < bytes.len() {
        if let Some(end) = tag_end(bytes, at) {
            out.push_str(&source[last..at]);
            let token = placeholder(tags.len());
            if markup.inside() {
                out.push_str(&token);
            } else {
                out.push_str("<!--");
                out.push_str(&token);
                out.push_str("-->");
            }
            tags.push(source[at..end].to_string());
            at = end;
            last = end;
            continue;
        }
        markup.step(bytes, at);
        at += 1;
    }
    out.push_str(&source[last..]);

    (out, tags)
}

/// Put the original template tags back in place of their placeholders
fn restore(html: &str, tags: &[String]) -> String {
    let mut out = html.to_string();
    for (index, tag) in tags.iter().enumerate() {
        let token = placeholder(index);
        out = out
            .replace(&format!("<!--{}-->", token), tag)
            // Tags in attribute position come back as empty attributes
            .replace(&format!("{}=\"\"", token), tag)
            .replace(&token, tag);
    }
    out
}

/// Inline `css` into `html`, a fragment or a whole document.
///
/// Returns `html` unchanged when `css` is absent. On any inliner error the
/// failure is logged against `template` and the original markup is
/// returned.
pub fn inline(html: &str, css: Option<&str>, template: &str) -> String {
    let Some(css) = css else {
        return html.to_string();
    };

    match try_inline(html, css) {
        Ok(inlined) => inlined,
        Err(e) => {
            CssMetrics::record_failure();
            tracing::error!(
                target: "mailer",
                template = %template,
                error = %e,
                "Could not add CSS to template"
            );
            html.to_string()
        }
    }
}

/// Strict variant of [`inline`] for callers that want the error.
pub fn try_inline(html: &str, css: &str) -> Result<String, InlineError> {
    let (prolog, html) = split_prolog(html);
    let (protected, tags) = protect(html);

    let mut inlined = if is_document(&protected) {
        inliner(Some(css)).inline(&protected)?
    } else {
        inliner(None).inline_fragment(&protected, css)?
    };

    // The parser wraps bare rows in <tbody>, which would split a loop
    // that opens before the first row
    if !html.to_ascii_lowercase().contains("<tbody") {
        inlined = inlined.replace("<tbody>", "").replace("</tbody>", "");
    }

    Ok(format!("{}{}", prolog, restore(&inlined, &tags)))
}
