//! Typed cell parser. Every function is total: input that does not convert
//! yields `None` and a debug log line, never an error.

use procurement_core::local_datetime;
use time::format_description::BorrowedFormatItem;
use time::macros::{date, datetime, format_description};
use time::{Date, Duration, PrimitiveDateTime};
use tracing::debug;

use crate::columns::Polarity;
use crate::decoder::Cell;

const SERIAL_EPOCH: PrimitiveDateTime = datetime!(1899-12-30 0:00);
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Bare numbers are only read as serial dates inside this window.
const SERIAL_FLOOR: Date = date!(1950 - 01 - 01);
const SERIAL_CEILING: Date = date!(2100 - 01 - 01);

const AFFIRMATIVE: &[&str] = &["да", "д", "yes", "y", "true", "истина", "1", "+"];
const NEGATIVE: &[&str] = &["нет", "н", "no", "n", "false", "ложь", "0", "-"];

const DATETIME_PATTERNS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!(
        "[day padding:none].[month padding:none].[year] [hour padding:none]:[minute]:[second]"
    ),
    format_description!("[day padding:none].[month padding:none].[year] [hour padding:none]:[minute]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[day padding:none]/[month padding:none]/[year] [hour padding:none]:[minute]"),
];

const DATE_PATTERNS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[day padding:none].[month padding:none].[year]"),
    format_description!("[year]-[month]-[day]"),
    format_description!("[day padding:none]/[month padding:none]/[year]"),
];

/// Trimmed text; numbers render without a trailing `.0`.
#[must_use]
pub fn parse_text(cell: &Cell) -> Option<String> {
    let text = match cell.value() {
        Cell::Text(text) => text.trim().to_string(),
        Cell::Number(value) => render_number(*value),
        Cell::Bool(value) => value.to_string(),
        Cell::Date(serial) => serial_to_datetime(*serial)
            .and_then(|value| local_datetime::format(value).ok())
            .unwrap_or_default(),
        Cell::Blank | Cell::Error(_) | Cell::Formula { .. } => String::new(),
    };
    (!text.is_empty()).then_some(text)
}

#[allow(clippy::cast_possible_truncation)]
fn render_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Integers: native numbers without a fractional part, or text that cleans to one.
#[must_use]
pub fn parse_int(cell: &Cell) -> Option<i64> {
    let value = match cell.value() {
        Cell::Number(value) => Some(*value),
        Cell::Text(text) => clean_number(text),
        _ => None,
    }?;
    let parsed = float_to_int(value);
    if parsed.is_none() {
        debug!(?cell, "cell is not an integer");
    }
    parsed
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn float_to_int(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0 && value.abs() <= i64::MAX as f64)
        .then_some(value as i64)
}

/// Decimals: native numbers, or text with whitespace, thousands separators and
/// a comma decimal separator cleaned out.
#[must_use]
pub fn parse_decimal(cell: &Cell) -> Option<f64> {
    match cell.value() {
        Cell::Number(value) if value.is_finite() => Some(*value),
        Cell::Text(text) => clean_number(text),
        Cell::Blank => None,
        other => {
            debug!(cell = ?other, "cell is not a decimal");
            None
        }
    }
}

fn clean_number(raw: &str) -> Option<f64> {
    let compact: String =
        raw.chars().filter(|ch| !ch.is_whitespace() && *ch != '\'' && *ch != '’').collect();
    if compact.is_empty() {
        return None;
    }

    let normalized = match (compact.rfind(','), compact.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => compact.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => compact.replace(',', ""),
        (Some(_), None) if compact.matches(',').count() > 1 => compact.replace(',', ""),
        (Some(_), None) => compact.replace(',', "."),
        (None, Some(_)) if compact.matches('.').count() > 1 => compact.replace('.', ""),
        _ => compact,
    };

    match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            debug!(raw, "text is not a number");
            None
        }
    }
}

/// Booleans under the polarity the column resolver recorded for the header.
///
/// An inverted header states the negation of the field, so an affirmative
/// value reads as `false` and a blank cell as `true`.
#[must_use]
pub fn parse_bool(cell: &Cell, polarity: Polarity) -> Option<bool> {
    let literal = if cell.is_blank() {
        None
    } else {
        let literal = bool_literal(cell.value());
        if literal.is_none() {
            debug!(?cell, "cell is not a boolean");
            return None;
        }
        literal
    };

    match (polarity, literal) {
        (Polarity::Normal, literal) => literal,
        (Polarity::Inverted, Some(value)) => Some(!value),
        (Polarity::Inverted, None) => Some(true),
    }
}

fn bool_literal(cell: &Cell) -> Option<bool> {
    match cell {
        Cell::Bool(value) => Some(*value),
        Cell::Number(value) if *value == 1.0 => Some(true),
        Cell::Number(value) if *value == 0.0 => Some(false),
        Cell::Text(text) => {
            let token = text.trim().to_lowercase();
            if AFFIRMATIVE.contains(&token.as_str()) {
                Some(true)
            } else if NEGATIVE.contains(&token.as_str()) {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Dates: native date cells, then plausible serial numbers, then the fixed text
/// patterns in order. Date-only values resolve to midnight.
#[must_use]
pub fn parse_date(cell: &Cell) -> Option<PrimitiveDateTime> {
    let parsed = match cell.value() {
        Cell::Blank => return None,
        Cell::Date(serial) => serial_to_datetime(*serial),
        Cell::Number(serial) => serial_to_datetime(*serial)
            .filter(|value| (SERIAL_FLOOR..SERIAL_CEILING).contains(&value.date())),
        Cell::Text(text) => parse_date_text(text.trim()),
        _ => None,
    };
    if parsed.is_none() {
        debug!(?cell, "cell is not a date");
    }
    parsed
}

fn parse_date_text(text: &str) -> Option<PrimitiveDateTime> {
    if text.is_empty() {
        return None;
    }
    DATETIME_PATTERNS
        .iter()
        .find_map(|pattern| PrimitiveDateTime::parse(text, pattern).ok())
        .or_else(|| {
            DATE_PATTERNS
                .iter()
                .find_map(|pattern| Date::parse(text, pattern).ok())
                .map(Date::midnight)
        })
}

/// Spreadsheet serial day number to a timestamp, rounded to whole seconds.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn serial_to_datetime(serial: f64) -> Option<PrimitiveDateTime> {
    if !serial.is_finite() || !(0.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let seconds = (serial * SECONDS_PER_DAY).round() as i64;
    SERIAL_EPOCH.checked_add(Duration::seconds(seconds))
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn text(value: &str) -> Cell {
        Cell::Text(value.to_string())
    }

    #[test]
    fn text_is_trimmed_and_numbers_drop_trailing_zero() {
        assert_eq!(parse_text(&text("  Заявка  ")), Some("Заявка".to_string()));
        assert_eq!(parse_text(&text("   ")), None);
        assert_eq!(parse_text(&Cell::Number(1024.0)), Some("1024".to_string()));
        assert_eq!(parse_text(&Cell::Number(12.5)), Some("12.5".to_string()));
        assert_eq!(parse_text(&Cell::Error("#N/A".to_string())), None);
    }

    #[test]
    fn numbers_accept_localized_text_and_cached_formulas() {
        assert_eq!(parse_decimal(&text("1\u{a0}234 567,89")), Some(1_234_567.89));
        assert_eq!(parse_decimal(&text("1,234,567.5")), Some(1_234_567.5));
        assert_eq!(parse_decimal(&text("1.234.567,5")), Some(1_234_567.5));
        assert_eq!(parse_decimal(&text("abc")), None);
        let formula = Cell::Formula { formula: "A1*2".to_string(), cached: Box::new(Cell::Number(84.0)) };
        assert_eq!(parse_decimal(&formula), Some(84.0));

        assert_eq!(parse_int(&Cell::Number(1024.0)), Some(1024));
        assert_eq!(parse_int(&Cell::Number(10.5)), None);
        assert_eq!(parse_int(&text(" 2 024 ")), Some(2024));
        assert_eq!(parse_int(&Cell::Blank), None);
    }

    #[test]
    fn inverted_polarity_flips_values_and_fills_blanks() {
        assert_eq!(parse_bool(&text("yes"), Polarity::Inverted), Some(false));
        assert_eq!(parse_bool(&text("Нет"), Polarity::Inverted), Some(true));
        assert_eq!(parse_bool(&Cell::Blank, Polarity::Inverted), Some(true));

        assert_eq!(parse_bool(&text("Да"), Polarity::Normal), Some(true));
        assert_eq!(parse_bool(&Cell::Bool(false), Polarity::Normal), Some(false));
        assert_eq!(parse_bool(&Cell::Blank, Polarity::Normal), None);
        assert_eq!(parse_bool(&text("возможно"), Polarity::Inverted), None);
    }

    #[test]
    fn dates_try_native_serial_then_text_patterns() {
        assert_eq!(parse_date(&Cell::Date(45_352.5)), Some(datetime!(2024-03-01 12:00)));
        assert_eq!(parse_date(&Cell::Number(45_352.0)), Some(datetime!(2024-03-01 0:00)));
        assert_eq!(parse_date(&Cell::Number(12.0)), None);

        assert_eq!(parse_date(&text("01.03.2024 09:15:30")), Some(datetime!(2024-03-01 9:15:30)));
        assert_eq!(parse_date(&text("1.3.2024 9:15")), Some(datetime!(2024-03-01 9:15)));
        assert_eq!(parse_date(&text("01.03.2024")), Some(datetime!(2024-03-01 0:00)));
        assert_eq!(parse_date(&text("2024-03-01T09:15:30")), Some(datetime!(2024-03-01 9:15:30)));
        assert_eq!(parse_date(&text("2024-03-01 09:15:30")), Some(datetime!(2024-03-01 9:15:30)));
        assert_eq!(parse_date(&text("2024-03-01")), Some(datetime!(2024-03-01 0:00)));
        assert_eq!(parse_date(&text("01/03/2024 09:15")), Some(datetime!(2024-03-01 9:15)));
        assert_eq!(parse_date(&text("01/03/2024")), Some(datetime!(2024-03-01 0:00)));
        assert_eq!(parse_date(&text("в работе")), None);
    }

    #[test]
    fn serial_dates_round_to_whole_seconds() {
        let almost_noon = 45_352.5 - 0.2 / SECONDS_PER_DAY;
        assert_eq!(serial_to_datetime(almost_noon), Some(datetime!(2024-03-01 12:00)));
        assert_eq!(serial_to_datetime(f64::NAN), None);
    }
}
