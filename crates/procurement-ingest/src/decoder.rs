//! Tabular decoder: opens `.xls`/`.xlsx`/`.xlsm` containers through calamine
//! and exposes one sheet as rows of typed cells.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use tracing::debug;

use crate::error::IngestError;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["xls", "xlsx", "xlsm"];

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Blank,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Native spreadsheet date as a serial day number.
    Date(f64),
    Formula { formula: String, cached: Box<Cell> },
    Error(String),
}

impl Cell {
    /// The value a reader sees: formulas collapse to their cached result.
    #[must_use]
    pub fn value(&self) -> &Cell {
        match self {
            Self::Formula { cached, .. } => cached.value(),
            other => other,
        }
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self.value() {
            Self::Blank => true,
            Self::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Self::Blank,
            Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text) => {
                Self::Text(text.clone())
            }
            #[allow(clippy::cast_precision_loss)]
            Data::Int(value) => Self::Number(*value as f64),
            Data::Float(value) => Self::Number(*value),
            Data::Bool(value) => Self::Bool(*value),
            Data::DateTime(value) => Self::Date(value.as_f64()),
            Data::Error(err) => Self::Error(format!("{err:?}")),
        }
    }
}

static BLANK: Cell = Cell::Blank;

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    /// Cell at `(row, column)`; positions past the end of a short row read as blank.
    #[must_use]
    pub fn cell(&self, row: usize, column: usize) -> &Cell {
        self.rows.get(row).and_then(|cells| cells.get(column)).unwrap_or(&BLANK)
    }

    /// Header row rendered as trimmed text for the column resolver.
    #[must_use]
    pub fn header_texts(&self, row: usize) -> Vec<String> {
        self.rows
            .get(row)
            .map(|cells| {
                cells
                    .iter()
                    .map(|cell| crate::cells::parse_text(cell).unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Reject anything but the spreadsheet extensions the decoder understands.
///
/// # Errors
/// Returns [`IngestError::UnsupportedFormat`] for other or missing extensions.
pub fn check_extension(path: &Path) -> Result<(), IngestError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(IngestError::UnsupportedFormat(path.display().to_string()))
    }
}

/// Decode one worksheet: the sheet named `label` (case-insensitive) or the first one.
///
/// Formula cells keep their cached values so the parser can fall back to them.
///
/// # Errors
/// Returns an error when the extension is unsupported, the container cannot
/// be read, or the requested sheet does not exist.
pub fn open_sheet(path: &Path, label: Option<&str>) -> Result<Sheet, IngestError> {
    check_extension(path)?;
    let mut workbook = open_workbook_auto(path)?;
    let names = workbook.sheet_names();

    let name = match label {
        Some(label) => {
            let wanted = label.trim().to_lowercase();
            names.iter().find(|name| name.trim().to_lowercase() == wanted).cloned()
        }
        None => names.first().cloned(),
    }
    .ok_or_else(|| {
        IngestError::NoWorksheet(format!(
            "{} in {}",
            label.unwrap_or("<first>"),
            path.display()
        ))
    })?;

    let range = workbook.worksheet_range(&name)?;
    let mut rows: Vec<Vec<Cell>> =
        range.rows().map(|row| row.iter().map(Cell::from).collect()).collect();

    match workbook.worksheet_formula(&name) {
        Ok(formulas) => {
            if let (Some(values_start), Some(formulas_start)) = (range.start(), formulas.start()) {
                attach_formulas(&mut rows, values_start, formulas_start, formulas.cells());
            }
        }
        Err(err) => debug!(sheet = %name, error = %err, "formulas unavailable"),
    }

    Ok(Sheet { name, rows })
}

fn attach_formulas<'a>(
    rows: &mut [Vec<Cell>],
    values_start: (u32, u32),
    formulas_start: (u32, u32),
    formulas: impl Iterator<Item = (usize, usize, &'a String)>,
) {
    for (row, column, formula) in formulas {
        if formula.is_empty() {
            continue;
        }
        let absolute_row = formulas_start.0 as usize + row;
        let absolute_column = formulas_start.1 as usize + column;
        let (Some(row), Some(column)) = (
            absolute_row.checked_sub(values_start.0 as usize),
            absolute_column.checked_sub(values_start.1 as usize),
        ) else {
            continue;
        };
        if let Some(cell) = rows.get_mut(row).and_then(|cells| cells.get_mut(column)) {
            let cached = std::mem::replace(cell, Cell::Blank);
            *cell = Cell::Formula { formula: formula.clone(), cached: Box::new(cached) };
        }
    }
}
