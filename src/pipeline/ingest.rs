//! Spreadsheet ingestion: bytes + column requirement → [`TableData`].
//!
//! Workbooks (xlsx, xlsm, xlsb, xls, ods) are opened with `calamine`, which
//! sniffs the container format itself; anything that is not a zip or OLE
//! container is read as UTF-8 CSV. Only the first sheet is used, and its
//! first non-blank row is the header.
//!
//! Validation is all-or-nothing: a header row missing any required column
//! fails with [`ComposeError::SchemaValidation`] listing every missing column
//! and every header that was found.

use crate::error::ComposeError;
use crate::model::{RawTableRow, TableData};
use crate::schema::{FeedbackSchema, SheetRequirement, TableSchema};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;
use tracing::{debug, info};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Ingest a sheet for one of the schema's tables.
pub fn ingest_table(bytes: &[u8], table: &TableSchema) -> Result<TableData, ComposeError> {
    ingest(bytes, &table.name, &table.requirement())
}

/// Ingest a survey feedback sheet.
pub fn ingest_feedback(bytes: &[u8], feedback: &FeedbackSchema) -> Result<TableData, ComposeError> {
    ingest(bytes, "feedback", &feedback.requirement())
}

/// Parse `bytes` and validate the header row against `requirement`.
///
/// # Errors
/// - [`ComposeError::UnreadableSpreadsheet`] when the bytes are neither a
///   workbook nor UTF-8 text
/// - [`ComposeError::SchemaValidation`] when required columns are missing
/// - [`ComposeError::EmptyData`] when no data rows follow the header
pub fn ingest(
    bytes: &[u8],
    table: &str,
    requirement: &SheetRequirement,
) -> Result<TableData, ComposeError> {
    let grid = read_grid(bytes)?;
    let mut rows = grid.into_iter().skip_while(|r| is_blank(r));

    let header: Vec<String> = rows
        .next()
        .map(|r| r.into_iter().map(|c| c.trim().to_string()).collect())
        .unwrap_or_default();

    let canonical = validate_header(&header, requirement)?;

    // A blank record in an answer sheet is a respondent who skipped every
    // question; it still counts as a data row.
    let keep_blank = matches!(requirement, SheetRequirement::QuestionColumns(_));

    let data: Vec<RawTableRow> = rows
        .filter(|r| keep_blank || !is_blank(r))
        .map(|mut cells| {
            if cells.len() > header.len() {
                debug!(
                    "Dropping {} cells past the last header in '{}'",
                    cells.len() - header.len(),
                    table
                );
            }
            cells.resize(header.len(), String::new());
            let pairs = header
                .iter()
                .cloned()
                .zip(cells.into_iter().map(|c| c.trim().to_string()))
                .collect();
            RawTableRow::new(pairs, canonical.clone())
        })
        .collect();

    if data.is_empty() {
        return Err(ComposeError::EmptyData {
            table: table.to_string(),
        });
    }

    info!("Ingested {} rows into '{}'", data.len(), table);
    Ok(TableData {
        name: table.to_string(),
        columns: header,
        rows: data,
    })
}

/// Check the header row, returning `(canonical name, column index)` pairs
/// for every required column.
fn validate_header(
    header: &[String],
    requirement: &SheetRequirement,
) -> Result<Vec<(String, usize)>, ComposeError> {
    let found_columns: Vec<String> = header.iter().filter(|h| !h.is_empty()).cloned().collect();

    match requirement {
        SheetRequirement::Columns(columns) => {
            let mut canonical = Vec::with_capacity(columns.len());
            let mut missing_columns = Vec::new();
            for column in columns {
                match header.iter().position(|h| column.matches(h)) {
                    Some(idx) => canonical.push((column.name.clone(), idx)),
                    None => missing_columns.push(column.name.clone()),
                }
            }
            if missing_columns.is_empty() {
                Ok(canonical)
            } else {
                Err(ComposeError::SchemaValidation {
                    missing_columns,
                    found_columns,
                })
            }
        }
        SheetRequirement::QuestionColumns(policy) => {
            if header.iter().any(|h| policy.is_question(h)) {
                Ok(Vec::new())
            } else {
                Err(ComposeError::SchemaValidation {
                    missing_columns: vec![policy.describe()],
                    found_columns,
                })
            }
        }
    }
}

/// Read the first sheet of a workbook, or a CSV file, as rows of text cells.
pub fn read_grid(bytes: &[u8]) -> Result<Vec<Vec<String>>, ComposeError> {
    if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
        read_workbook(bytes)
    } else {
        read_csv(bytes)
    }
}

fn read_workbook(bytes: &[u8]) -> Result<Vec<Vec<String>>, ComposeError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| {
        ComposeError::UnreadableSpreadsheet {
            detail: e.to_string(),
        }
    })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ComposeError::UnreadableSpreadsheet {
            detail: "workbook contains no sheets".into(),
        })?
        .map_err(|e| ComposeError::UnreadableSpreadsheet {
            detail: e.to_string(),
        })?;

    debug!(
        "Workbook first sheet: {} rows x {} columns",
        range.height(),
        range.width()
    );
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn read_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>, ComposeError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if std::str::from_utf8(bytes).is_err() {
        return Err(ComposeError::UnreadableSpreadsheet {
            detail: "not a workbook and not UTF-8 text".into(),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ComposeError::UnreadableSpreadsheet {
            detail: e.to_string(),
        })?;
        grid.push(record.iter().map(str::to_string).collect());
    }
    Ok(grid)
}

/// Render one workbook cell as the text a reader would see.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::Error(e) => format!("{e:?}"),
        other => other.to_string(),
    }
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}
