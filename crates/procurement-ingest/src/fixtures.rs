//! `.xlsx` fixtures for tests: text, numbers, booleans and formulas with
//! cached values, one or more sheets.

use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Formula, Workbook, Worksheet};

#[derive(Debug, Clone, PartialEq)]
pub enum FixtureCell {
    Blank,
    Text(String),
    Number(f64),
    Bool(bool),
    Formula { formula: String, cached: String },
}

impl FixtureCell {
    #[must_use]
    pub fn text(value: &str) -> Self {
        Self::Text(value.to_string())
    }

    #[must_use]
    pub fn formula(formula: &str, cached: &str) -> Self {
        Self::Formula { formula: formula.to_string(), cached: cached.to_string() }
    }
}

/// Rows of text cells, blank strings becoming blank cells.
#[must_use]
pub fn text_rows(rows: &[&[&str]]) -> Vec<Vec<FixtureCell>> {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|value| {
                    if value.is_empty() {
                        FixtureCell::Blank
                    } else {
                        FixtureCell::text(value)
                    }
                })
                .collect()
        })
        .collect()
}

/// # Errors
/// Returns an error when the workbook cannot be written.
pub fn write_xlsx(path: &Path, sheet_name: &str, rows: &[Vec<FixtureCell>]) -> Result<()> {
    write_workbook(path, &[(sheet_name, rows)])
}

/// # Errors
/// Returns an error when a sheet is misnamed or the workbook cannot be saved.
pub fn write_workbook(path: &Path, sheets: &[(&str, &[Vec<FixtureCell>])]) -> Result<()> {
    let mut workbook = Workbook::new();
    for (name, rows) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name).with_context(|| format!("invalid sheet name {name:?}"))?;
        write_rows(worksheet, rows)?;
    }
    workbook
        .save(path)
        .with_context(|| format!("failed to save fixture {}", path.display()))
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<FixtureCell>]) -> Result<()> {
    for (row_index, row) in rows.iter().enumerate() {
        let row_number = u32::try_from(row_index).context("fixture row out of range")?;
        for (column_index, cell) in row.iter().enumerate() {
            let column = u16::try_from(column_index).context("fixture column out of range")?;
            match cell {
                FixtureCell::Blank => {}
                FixtureCell::Text(value) => {
                    worksheet.write_string(row_number, column, value.as_str())?;
                }
                FixtureCell::Number(value) => {
                    worksheet.write_number(row_number, column, *value)?;
                }
                FixtureCell::Bool(value) => {
                    worksheet.write_boolean(row_number, column, *value)?;
                }
                FixtureCell::Formula { formula, cached } => {
                    let formula = Formula::new(formula.as_str()).set_result(cached.as_str());
                    worksheet.write_formula(row_number, column, formula)?;
                }
            }
        }
    }
    Ok(())
}
