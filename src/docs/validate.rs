use crate::error::{FieldError, ValidationError};

use super::types::{ChatRequest, DocumentDraft, DocumentIn, RetrieveQuery};

pub const TITLE_CHARS: (usize, usize) = (3, 200);
pub const SOURCE_CHARS: (usize, usize) = (2, 80);
pub const DATE_CHARS: (usize, usize) = (8, 30);
pub const TEXT_CHARS: (usize, usize) = (50, 20_000);
pub const URL_MAX_CHARS: usize = 2048;
pub const MESSAGE_CHARS: (usize, usize) = (2, 2000);
pub const MAX_TAGS: usize = 20;
pub const TAG_MAX_CHARS: usize = 50;

/// Accumulates field failures across one request.
#[derive(Default)]
struct Report {
    fields: Vec<FieldError>,
}

impl Report {
    fn fail(&mut self, field: &str, reason: impl Into<String>) {
        self.fields.push(FieldError {
            field: field.to_string(),
            reason: reason.into(),
        });
    }

    /// Required text bounded to `min..=max` chars.
    fn text(&mut self, field: &str, value: Option<String>, (min, max): (usize, usize)) -> Option<String> {
        let Some(value) = value else {
            self.fail(field, "is required");
            return None;
        };
        if value.trim().is_empty() {
            self.fail(field, "must not be blank");
            return None;
        }
        let len = value.chars().count();
        if len < min {
            self.fail(field, format!("must be at least {} characters (got {})", min, len));
            return None;
        }
        if len > max {
            self.fail(field, format!("must be at most {} characters (got {})", max, len));
            return None;
        }
        Some(value)
    }

    fn url(&mut self, field: &str, value: Option<String>) -> Option<String> {
        let value = self.text(field, value, (1, URL_MAX_CHARS))?;
        match url::Url::parse(value.trim()) {
            Ok(parsed) if !matches!(parsed.scheme(), "http" | "https") => {
                self.fail(field, "must use http or https");
                None
            }
            Ok(parsed) if parsed.host_str().map_or(true, str::is_empty) => {
                self.fail(field, "must include a host");
                None
            }
            Ok(parsed) => Some(parsed.to_string()),
            Err(e) => {
                self.fail(field, format!("is not a valid URL: {}", e));
                None
            }
        }
    }

    fn tags(&mut self, value: Option<Vec<String>>) -> Vec<String> {
        let tags = value.unwrap_or_default();
        if tags.len() > MAX_TAGS {
            self.fail("tags", format!("must contain at most {} entries (got {})", MAX_TAGS, tags.len()));
            return Vec::new();
        }
        let mut ok = true;
        for (i, tag) in tags.iter().enumerate() {
            let field = format!("tags[{}]", i);
            if tag.trim().is_empty() {
                self.fail(&field, "must not be blank");
                ok = false;
            } else if tag.chars().count() > TAG_MAX_CHARS {
                self.fail(&field, format!("must be at most {} characters", TAG_MAX_CHARS));
                ok = false;
            }
        }
        if ok {
            tags.into_iter().map(|t| t.trim().to_string()).collect()
        } else {
            Vec::new()
        }
    }

    fn top_k(&mut self, field: &str, value: Option<usize>, default: usize, max: usize) -> usize {
        match value {
            None => default,
            Some(k) if (1..=max).contains(&k) => k,
            Some(k) => {
                self.fail(field, format!("must be within 1..={} (got {})", max, k));
                default
            }
        }
    }

    fn finish<T>(self, value: Option<T>) -> Result<T, ValidationError> {
        match value {
            Some(v) if self.fields.is_empty() => Ok(v),
            _ => Err(ValidationError {
                fields: self.fields,
            }),
        }
    }
}

/// Check an ingest body against the document contract. Lengths count chars,
/// and every offending field is reported, not just the first.
pub fn validate_document(draft: DocumentDraft) -> Result<DocumentIn, ValidationError> {
    let mut report = Report::default();
    let title = report.text("title", draft.title, TITLE_CHARS);
    let url = report.url("url", draft.url);
    let source = report.text("source", draft.source, SOURCE_CHARS);
    let published_date = report.text("published_date", draft.published_date, DATE_CHARS);
    let text = report.text("text", draft.text, TEXT_CHARS);
    let tags = report.tags(draft.tags);

    let doc = match (title, url, source, published_date, text) {
        (Some(title), Some(url), Some(source), Some(published_date), Some(text)) => Some(DocumentIn {
            title,
            url,
            source,
            published_date,
            text,
            tags,
        }),
        _ => None,
    };
    report.finish(doc)
}

/// Check a free-text question under the given field name.
pub fn validate_message(field: &str, value: Option<String>) -> Result<String, ValidationError> {
    let mut report = Report::default();
    let message = report.text(field, value, MESSAGE_CHARS);
    report.finish(message)
}

/// Check a chat body: message and optional `top_k`, reported together.
pub fn validate_chat(
    req: ChatRequest,
    default_top_k: usize,
    max_top_k: usize,
) -> Result<(String, usize), ValidationError> {
    let mut report = Report::default();
    let message = report.text("message", req.message, MESSAGE_CHARS);
    let k = report.top_k("top_k", req.top_k, default_top_k, max_top_k);
    report.finish(message.map(|m| (m, k)))
}

/// Check the retrieval-only query string: `q` and optional `k`.
pub fn validate_retrieve(
    query: RetrieveQuery,
    default_top_k: usize,
    max_top_k: usize,
) -> Result<(String, usize), ValidationError> {
    let mut report = Report::default();
    let q = report.text("q", query.q, MESSAGE_CHARS);
    let k = report.top_k("k", query.k, default_top_k, max_top_k);
    report.finish(q.map(|q| (q, k)))
}
