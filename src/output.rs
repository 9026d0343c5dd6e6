//! Output types returned by the generation entry points.

use crate::config::OutputFormat;
use crate::document::ReportDocument;
use crate::error::ArtifactError;
use serde::{Deserialize, Serialize};

/// A finished report.
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    /// The complete document bytes.
    pub bytes: Vec<u8>,

    pub format: OutputFormat,

    /// The document the bytes were rendered from.
    pub document: ReportDocument,

    pub stats: GenerationStats,
}

impl GeneratedReport {
    /// True when at least one chart or image slot shows a placeholder.
    pub fn is_degraded(&self) -> bool {
        self.stats.placeholder_charts > 0 || self.stats.degraded_images > 0
    }
}

/// Summary of one generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Pages in the layout plan.
    pub planned_pages: usize,

    /// Pages written by the backend. Equal to `planned_pages` for PDF.
    pub rendered_pages: usize,

    pub charts: usize,

    /// Charts whose capture failed and were drawn as placeholders.
    pub placeholder_charts: usize,

    pub images: usize,

    /// Image slots drawn as placeholders because the reference could not be
    /// fetched or decoded.
    pub degraded_images: usize,

    /// Per-artifact failures, in the order they were encountered.
    pub artifact_errors: Vec<ArtifactError>,

    /// Bytes in the output document.
    pub output_bytes: usize,

    /// Time spent fetching hosted images, in milliseconds.
    pub fetch_duration_ms: u64,

    /// Time spent in the document backend, in milliseconds.
    pub render_duration_ms: u64,

    /// Wall-clock time of the whole run, in milliseconds.
    pub total_duration_ms: u64,
}
