use std::fmt::Write;

use crate::docs::types::EvidenceItem;

pub const PREAMBLE: &str = "You are a helpful assistant answering questions using ONLY the provided sources.
If the sources are insufficient, say that clearly and suggest what information to add.
Do not cite a source that is not listed below.";

/// Stands in for the sources section when retrieval found nothing.
pub const NO_EVIDENCE_MARKER: &str = "No sources retrieved.";

pub const CLOSING_INSTRUCTIONS: &str = "Instructions:
- Write a clear answer.
- Use plain language.
- At the end, list which sources you used (example: \"Used sources: 1, 3\").";

/// Compose the generator input from a question and ordered evidence.
///
/// Sections, always in this order: preamble, one `[Source N]` block per
/// evidence item (or [`NO_EVIDENCE_MARKER`]), the question, the closing
/// instructions. Deterministic and free of I/O.
pub fn build_prompt(question: &str, evidence: &[EvidenceItem]) -> String {
    let mut out = String::from(PREAMBLE);
    out.push_str("\n\nSources:\n");
    if evidence.is_empty() {
        out.push_str(NO_EVIDENCE_MARKER);
        out.push('\n');
    } else {
        for (i, item) in evidence.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            // Writing into a String cannot fail.
            let _ = write!(
                out,
                "[Source {n}]\nTitle: {title}\nURL: {url}\nPublisher: {source} | Date: {date}\nExcerpt:\n{snippet}\n",
                n = i + 1,
                title = field(&item.title),
                url = field(&item.url),
                source = field(&item.source),
                date = field(&item.published_date),
                snippet = item.snippet,
            );
        }
    }

    out.push_str("\nUser question:\n");
    out.push_str(question);
    out.push_str("\n\n");
    out.push_str(CLOSING_INSTRUCTIONS);
    out.push('\n');
    out
}

fn field(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("unknown")
}
