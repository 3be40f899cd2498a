//! Compiled-in domain vocabularies and the text normalization they are
//! matched against.

/// Completion results that reject a document. Checked before [`POSITIVE_OUTCOMES`]
/// because several positive words are substrings of their negations.
pub const NEGATIVE_OUTCOMES: &[&str] = &[
    "не согласован",
    "не утвержден",
    "отклонен",
    "отказано",
    "not approved",
    "not coordinated",
    "rejected",
    "declined",
];

pub const POSITIVE_OUTCOMES: &[&str] = &[
    "согласован",
    "утвержден",
    "одобрен",
    "исполнен",
    "выполнен",
    "approved",
    "accepted",
];

/// Stage-name fragments marking the final approval step of a workflow.
pub const FINAL_STAGE_MARKERS: &[&str] = &["утвержд", "approv"];

/// Trim, collapse inner whitespace runs to one space and lowercase.
///
/// `ё` folds to `е` so exports that differ only in that letter compare equal.
#[must_use]
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for word in raw.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        for ch in word.chars().flat_map(char::to_lowercase) {
            out.push(if ch == 'ё' { 'е' } else { ch });
        }
    }
    out
}

/// Case-insensitive natural key for name-like values.
#[must_use]
pub fn normalize_key(raw: &str) -> String {
    normalize_text(raw)
}

#[must_use]
pub fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
