//! Renders a [`Composite`] as one flat, styled HTML page.
//!
//! The page is re-materialised from the fixed template on every call; nothing
//! is patched in place. Chapter `n` lives in `<div id="chapter-n">` and the
//! table of contents links to `#chapter-n`.

use std::fmt::Write;

use crate::contract::{Composite, SlotState};

const STYLE: &str = "\
body { max-width: 42em; margin: 2em auto; padding: 0 1em; font-family: Georgia, serif; line-height: 1.6; color: #222; }
header { text-align: center; margin-bottom: 3em; }
nav.toc ol { padding-left: 1.5em; }
nav.toc a { text-decoration: none; }
.chapter { margin-top: 4em; }
.chapter.pending, .chapter.failed { color: #888; font-style: italic; }
";

pub fn anchor(index: usize) -> String {
    format!("chapter-{index}")
}

pub fn render_html(composite: &Composite) -> String {
    let title = escape(&composite.title);
    let author = escape(&composite.author);

    let mut toc = String::new();
    let mut chapters = String::new();
    for slot in &composite.chapters {
        let id = anchor(slot.index);
        let chapter_title = escape(&slot.title);
        let _ = writeln!(toc, "<li><a href=\"#{id}\">{chapter_title}</a></li>");

        let _ = match &slot.state {
            SlotState::Filled(body) => writeln!(
                chapters,
                "<div id=\"{id}\" class=\"chapter\">\n{body}\n</div>"
            ),
            SlotState::Pending => writeln!(
                chapters,
                "<div id=\"{id}\" class=\"chapter pending\">\n<h2>{chapter_title}</h2>\n<p>This chapter is still being converted.</p>\n</div>"
            ),
            SlotState::Failed(reason) => writeln!(
                chapters,
                "<div id=\"{id}\" class=\"chapter failed\">\n<h2>{chapter_title}</h2>\n<p>This chapter could not be converted: {}</p>\n</div>",
                escape(reason)
            ),
        };
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n<style>\n{STYLE}</style>\n</head>\n<body>\n<header>\n<h1>{title}</h1>\n<p class=\"author\">{author}</p>\n</header>\n<nav class=\"toc\">\n<h2>Contents</h2>\n<ol>\n{toc}</ol>\n</nav>\n<main>\n{chapters}</main>\n</body>\n</html>\n"
    )
}

fn escape(text: &str) -> String {
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
