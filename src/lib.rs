//! # report-composer
//!
//! Compose fixed-layout report documents from spreadsheets, survey feedback,
//! rendered charts and categorised photos.
//!
//! ## Pipeline Overview
//!
//! ```text
//! spreadsheet bytes ─┬─ 1. Ingest     header validation → TableData
//!                    └─ 2. Aggregate  question columns → QuestionAggregate
//!                       3. Capture    settle delay + rasterise, sequential
//! photo references ───  4. Images     bucketed, ordinal-stable store
//!                       5. Layout     counts → fixed-capacity PageDescriptors
//!                       6. Render     PDF (lopdf) │ DOCX (zip) │ Markdown
//! ```
//!
//! Chart or image failures never abort a document: the slot degrades to a
//! visible placeholder and the error is reported in
//! [`GenerationStats::artifact_errors`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use report_composer::{ComposerConfig, ImageUpload, ReportKind, ReportSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = ReportSession::for_kind(ReportKind::Event, ComposerConfig::default());
//!     session.set_field("event_name", "Hack Night");
//!     session.upload_table("attendance", &std::fs::read("attendance.xlsx")?)?;
//!     session.upload_feedback(&std::fs::read("feedback.csv")?)?;
//!     session.add_images("team", vec![ImageUpload::from_path("photos/team.jpg")])?;
//!
//!     let report = session.export().await?;
//!     std::fs::write("hack-night.pdf", &report.bytes)?;
//!     eprintln!("{} pages, {} placeholders",
//!         report.stats.rendered_pages,
//!         report.stats.artifact_errors.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `report-compose` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! report-composer = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod compose;
pub mod config;
pub mod document;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod render;
pub mod schema;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use compose::{generate, generate_sync, generate_to_file, plan_layout, render_report};
pub use config::{ComposerConfig, ComposerConfigBuilder, OutputFormat, PageSize};
pub use document::{BucketImages, PageDescriptor, PageKind, ReportContent, ReportDocument, Slot};
pub use error::{ArtifactError, ComposeError};
pub use model::{
    CategorizedImage, ChartArtifact, ChartContent, FieldValue, QuestionAggregate, RawTableRow,
    ResponseCounts, ScalarField, Section, SectionBody, TableData,
};
pub use output::{GeneratedReport, GenerationStats};
pub use pipeline::chart::{ChartRasterizer, ChartSpec, ChartView, SvgRasterizer};
pub use pipeline::images::{ImageCategoryStore, ImageUpload};
pub use pipeline::layout::{LayoutInput, PageLayoutEngine};
pub use progress::{
    ChannelProgress, NoopProgress, Phase, ProgressEvent, ProgressHandle, ProgressSink,
};
pub use schema::{QuestionColumnPolicy, ReportKind, ReportSchema};
pub use session::{CaptureTicket, CompletedCapture, ReportSession};
