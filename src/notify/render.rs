use crate::ingest::types::Record;

pub const SUMMARY_MAX_CHARS: usize = 300;

/// `title` field, falling back to the record id.
pub fn title_of(record: &Record) -> String {
    record
        .field_str("title")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(record.id.as_str())
        .to_string()
}

pub fn url_of(record: &Record) -> Option<&str> {
    record.field_str("url").filter(|u| u.starts_with("http"))
}

/// `summary` field cut to `SUMMARY_MAX_CHARS` (with a trailing "...").
pub fn summary_of(record: &Record) -> Option<String> {
    let s = record.field_str("summary")?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().count() <= SUMMARY_MAX_CHARS {
        return Some(s.to_string());
    }
    let mut out: String = s.chars().take(SUMMARY_MAX_CHARS - 3).collect();
    out.push_str("...");
    Some(out)
}
