//! Instruction text and response schemas sent to the transformation service.

use serde_json::{json, Value};

use crate::config::BoundaryStrategy;
use crate::contract::{BoundaryHint, TransformRequest, UnitDescriptor};

const ANALYSIS_PREAMBLE: &str = "\
You are given a complete book or long-form document. Identify its title, its author \
and every chapter it contains, in reading order.

Rules:
- Return a FLAT list of chapters. Do not return parts, books, sections or any other \
grouping level; if the document groups chapters, list the chapters inside each group \
individually.
- Include prologues, introductions, epilogues and appendices as chapters when they \
carry body text.
- Chapter titles must be copied exactly as they appear in the document.";

const SENTENCE_RULES: &str = "\
- For every chapter give `first_sentence` and `last_sentence`: the literal first and \
last sentence of the chapter body, copied verbatim so they can be located by exact match.";

const NEXT_TITLE_RULES: &str = "\
- Chapter titles must be exact: the title of each chapter is used to find where the \
previous chapter stops.";

const UNIT_RULES: &str = "\
Convert the requested chapter, and only that chapter, to clean semantic HTML.
- Output only the HTML fragment for the chapter body: no <html>, <head> or <body> \
tags, no markdown and no commentary.
- Use <h2> for the chapter title, <p> for paragraphs, <blockquote>, <ul>/<ol>, \
<em>/<strong> where the source uses them.
- Keep the full text of the chapter. Do not summarise, shorten or translate it.";

/// The single analysis request for the given boundary strategy.
pub fn analysis_request(strategy: BoundaryStrategy) -> TransformRequest {
    let rules = match strategy {
        BoundaryStrategy::Sentences => SENTENCE_RULES,
        BoundaryStrategy::NextTitle => NEXT_TITLE_RULES,
    };
    TransformRequest::structured(
        format!("{ANALYSIS_PREAMBLE}\n{rules}"),
        analysis_schema(strategy),
    )
}

/// JSON schema for the analysis response.
pub fn analysis_schema(strategy: BoundaryStrategy) -> Value {
    let chapter = match strategy {
        BoundaryStrategy::Sentences => json!({
            "type": "OBJECT",
            "properties": {
                "title": { "type": "STRING" },
                "first_sentence": { "type": "STRING" },
                "last_sentence": { "type": "STRING" }
            },
            "required": ["title", "first_sentence", "last_sentence"]
        }),
        BoundaryStrategy::NextTitle => json!({
            "type": "OBJECT",
            "properties": {
                "title": { "type": "STRING" }
            },
            "required": ["title"]
        }),
    };
    json!({
        "type": "OBJECT",
        "properties": {
            "title": { "type": "STRING" },
            "author": { "type": "STRING" },
            "chapters": { "type": "ARRAY", "items": chapter }
        },
        "required": ["title", "chapters"]
    })
}

/// The request transforming one unit, bounded by its hint.
pub fn unit_request(unit: &UnitDescriptor) -> TransformRequest {
    let boundary = match &unit.boundary {
        Some(BoundaryHint::Sentences { first, last }) => format!(
            "The chapter starts with the sentence:\n\"{first}\"\nand ends with the sentence:\n\"{last}\"\n\
             Start exactly at the first sentence and stop right after the last one."
        ),
        Some(BoundaryHint::NextTitle(Some(next))) => format!(
            "Start at the chapter title and continue until you reach the title of the next \
             chapter, \"{next}\". Stop before that title; do not include any of the next chapter."
        ),
        Some(BoundaryHint::NextTitle(None)) => {
            "This is the last chapter: start at its title and continue to the end of the document."
                .to_string()
        }
        None => "Start at the chapter title and stop where the chapter ends.".to_string(),
    };
    TransformRequest::text(format!(
        "Chapter {index}: \"{title}\".\n{boundary}\n\n{UNIT_RULES}",
        index = unit.index,
        title = unit.title,
    ))
}
