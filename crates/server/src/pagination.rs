//! Offset pagination and the search pattern shared by list endpoints.

use serde::Serialize;

pub const PER_PAGE: i64 = 10;

#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub data: Vec<T>,
    pub current_page: i64,
    pub per_page: i64,
    pub total: i64,
    pub last_page: i64,
}

impl<T: Serialize> Page<T> {
    pub fn new(data: Vec<T>, page: i64, total: i64) -> Self {
        Self {
            data,
            current_page: page,
            per_page: PER_PAGE,
            total,
            last_page: last_page(total),
        }
    }
}

/// Pages are 1-based; anything below 1 is treated as the first page.
pub fn normalize_page(page: Option<i64>) -> i64 {
    page.unwrap_or(1).max(1)
}

pub fn offset(page: i64) -> i64 {
    (page - 1).saturating_mul(PER_PAGE)
}

fn last_page(total: i64) -> i64 {
    ((total + PER_PAGE - 1) / PER_PAGE).max(1)
}

/// Separates fields inside a `search_text` column so a pattern cannot match
/// across two of them.
const FIELD_SEPARATOR: char = '\u{1f}';

/// The `search_text` value stored for a row: its searchable fields,
/// Unicode-lowercased. `LOWER()` in SQLite only folds ASCII, so folding
/// happens here for both the stored text and the pattern.
pub fn search_text(fields: &[&str]) -> String {
    let mut text = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            text.push(FIELD_SEPARATOR);
        }
        text.push_str(&field.to_lowercase());
    }
    text
}

/// Build a `LIKE ... ESCAPE '\'` pattern for a case-insensitive substring
/// match against a `search_text` column. The input is lowercased and its
/// wildcards are escaped so that `%` and `_` match literally.
pub fn like_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Treat blank search text as absent.
pub fn search_term(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(like_pattern)
}
