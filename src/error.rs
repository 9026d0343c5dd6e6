//! Error types for the report-composer library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ComposeError`] — **Fatal**: the operation cannot proceed at all
//!   (spreadsheet missing required columns, a rejected upload batch, a broken
//!   internal contract). Returned as `Err(ComposeError)` and, for the
//!   caller-facing variants, carries enough structured detail for the caller
//!   to fix the source and upload again.
//!
//! * [`ArtifactError`] — **Non-fatal**: a single chart or image could not be
//!   produced. Stored next to the placeholder that replaced it so callers can
//!   inspect degraded output rather than losing the whole document.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the report-composer library.
///
/// Per-artifact failures use [`ArtifactError`] and never surface here.
#[derive(Debug, Error)]
pub enum ComposeError {
    // ── Spreadsheet errors ────────────────────────────────────────────────
    /// The header row lacks one or more required columns.
    #[error(
        "Spreadsheet is missing required column(s): {}\nFound columns: {}\nFix the header row and upload again.",
        missing_columns.join(", "),
        found_columns.join(", ")
    )]
    SchemaValidation {
        missing_columns: Vec<String>,
        found_columns: Vec<String>,
    },

    /// The header row is valid but no data rows follow it.
    #[error("Spreadsheet '{table}' has a header row but no data rows")]
    EmptyData { table: String },

    /// The bytes are neither a workbook calamine can open nor UTF-8 CSV.
    #[error("Could not read spreadsheet: {detail}\nSupported formats: xlsx, xlsm, xlsb, xls, ods, csv.")]
    UnreadableSpreadsheet { detail: String },

    /// A table upload named a table the report schema does not declare.
    #[error("Report kind '{kind}' has no table named '{table}'")]
    UnknownTable { kind: String, table: String },

    // ── Image upload errors ───────────────────────────────────────────────
    /// One or more files in an upload batch have a disallowed extension.
    #[error(
        "Unsupported file type: {}\nAllowed extensions: {}",
        files.join(", "),
        allowed.join(", ")
    )]
    FileType {
        files: Vec<String>,
        allowed: Vec<String>,
    },

    /// An upload batch holds more files than the configured limit.
    #[error("Too many files in one upload: {attempted} (limit is {limit} per batch)")]
    BatchSize { limit: usize, attempted: usize },

    /// An upload or removal named a bucket the report schema does not declare.
    #[error("Unknown image category '{bucket}'. Known categories: {}", known.join(", "))]
    UnknownBucket { bucket: String, known: Vec<String> },

    /// Removal index past the end of the bucket.
    #[error("No image #{index} in category '{bucket}' (it holds {len})")]
    ImageIndexOutOfRange {
        bucket: String,
        index: usize,
        len: usize,
    },

    // ── Internal contract errors ──────────────────────────────────────────
    /// Upstream data broke an internal contract; generation cannot continue.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    // ── Rendering errors ──────────────────────────────────────────────────
    /// The document backend failed as a whole (not a single slot).
    #[error("Failed to produce {format} document: {detail}")]
    DocumentWrite { format: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ComposeError {
    /// True for errors the caller resolves by correcting and re-uploading
    /// the source file.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ComposeError::SchemaValidation { .. }
                | ComposeError::EmptyData { .. }
                | ComposeError::UnreadableSpreadsheet { .. }
                | ComposeError::FileType { .. }
                | ComposeError::BatchSize { .. }
        )
    }
}

/// A non-fatal error for a single chart or image slot.
///
/// The slot is rendered as a visible placeholder and the rest of the
/// document is produced normally.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ArtifactError {
    /// Chart rasterisation failed for one question.
    #[error("Chart {index} ('{title}'): capture failed: {detail}")]
    CaptureFailure {
        index: usize,
        title: String,
        detail: String,
    },

    /// An image reference could not be fetched or decoded.
    #[error("Image '{reference}': {detail}")]
    RenderFailure { reference: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_validation_display_names_columns() {
        let e = ComposeError::SchemaValidation {
            missing_columns: vec!["TimeStamp".into()],
            found_columns: vec!["Sr No".into(), "Full Name".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("TimeStamp"), "got: {msg}");
        assert!(msg.contains("Sr No, Full Name"), "got: {msg}");
    }

    #[test]
    fn batch_size_display_names_limit() {
        let e = ComposeError::BatchSize {
            limit: 10,
            attempted: 12,
        };
        assert!(e.to_string().contains("limit is 10"));
    }

    #[test]
    fn file_type_display_lists_offenders() {
        let e = ComposeError::FileType {
            files: vec!["notes.txt".into(), "clip.mov".into()],
            allowed: vec!["jpg".into(), "png".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("notes.txt, clip.mov"));
        assert!(msg.contains("jpg, png"));
    }

    #[test]
    fn validation_classification() {
        assert!(ComposeError::EmptyData {
            table: "attendance".into()
        }
        .is_validation());
        assert!(!ComposeError::InvariantViolation("x".into()).is_validation());
    }

    #[test]
    fn artifact_error_display() {
        let e = ArtifactError::CaptureFailure {
            index: 2,
            title: "Was it useful?".into(),
            detail: "surface busy".into(),
        };
        assert!(e.to_string().contains("Chart 2"));
        assert!(e.to_string().contains("surface busy"));
    }
}
