//! Row classifier: document kind from the discriminator column, blank-row
//! detection and request-number extraction from reference text.

use std::sync::OnceLock;

use procurement_core::vocabulary::normalize_text;
use procurement_core::DocumentKind;
use regex_lite::Regex;

use crate::cells::{parse_int, parse_text};
use crate::decoder::Cell;

/// Discriminator values of a documents export, matched exactly after trimming.
pub const DISCRIMINATORS: &[(&str, DocumentKind)] = &[
    ("Заявка на закупку", DocumentKind::PurchaseRequest),
    ("Закупочная процедура", DocumentKind::Purchase),
    ("Договор", DocumentKind::Contract),
    ("Спецификация", DocumentKind::Specification),
];

#[must_use]
pub fn classify(discriminator: &Cell) -> Option<DocumentKind> {
    let value = parse_text(discriminator)?;
    DISCRIMINATORS.iter().find(|(label, _)| *label == value).map(|(_, kind)| *kind)
}

#[must_use]
pub fn is_blank_row(row: &[Cell]) -> bool {
    row.iter().all(Cell::is_blank)
}

fn request_reference_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"заявк[а-я]*[^№]{0,40}?№\s*(\d+)").ok())
        .as_ref()
}

/// Request number referenced by a free-text cell such as
/// `Заявка на закупку № 1024 от 01.03.2024`. A bare integer cell is taken as is.
#[must_use]
pub fn extract_request_number(reference: &Cell) -> Option<i64> {
    if let Some(number) = parse_int(reference) {
        return Some(number);
    }
    let text = normalize_text(&parse_text(reference)?);
    let captures = request_reference_pattern()?.captures(&text)?;
    captures.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> Cell {
        Cell::Text(value.to_string())
    }

    #[test]
    fn discriminators_match_exactly_after_trim() {
        assert_eq!(classify(&text(" Заявка на закупку ")), Some(DocumentKind::PurchaseRequest));
        assert_eq!(classify(&text("Закупочная процедура")), Some(DocumentKind::Purchase));
        assert_eq!(classify(&text("Договор")), Some(DocumentKind::Contract));
        assert_eq!(classify(&text("Спецификация")), Some(DocumentKind::Specification));
        assert_eq!(classify(&text("договор")), None);
        assert_eq!(classify(&text("Служебная записка")), None);
        assert_eq!(classify(&Cell::Blank), None);
    }

    #[test]
    fn blank_rows_ignore_whitespace_text() {
        assert!(is_blank_row(&[Cell::Blank, text("  ")]));
        assert!(is_blank_row(&[]));
        assert!(!is_blank_row(&[Cell::Blank, Cell::Number(0.0)]));
    }

    #[test]
    fn request_numbers_come_from_labelled_references() {
        assert_eq!(
            extract_request_number(&text("Заявка на закупку № 1024 от 01.03.2024")),
            Some(1024)
        );
        assert_eq!(extract_request_number(&text("ЗАЯВКА №77")), Some(77));
        assert_eq!(extract_request_number(&text("по заявке  №  15")), Some(15));
        assert_eq!(extract_request_number(&Cell::Number(512.0)), Some(512));
        assert_eq!(extract_request_number(&text("Договор № 15")), None);
        assert_eq!(extract_request_number(&Cell::Blank), None);
    }
}
