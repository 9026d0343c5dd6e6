//! Generation entry points.
//!
//! [`generate`] turns report content into document bytes in one call:
//!
//! ```text
//! ReportContent ──▶ assemble + layout ──▶ resolve images (PDF only) ──▶ render
//! ```
//!
//! Generation is all-or-nothing. It returns complete bytes, possibly with
//! placeholder slots, or an error; [`generate_to_file`] never leaves a
//! partially written file behind.

use crate::config::{ComposerConfig, OutputFormat};
use crate::document::{PageDescriptor, ReportContent, ReportDocument};
use crate::error::{ArtifactError, ComposeError};
use crate::model::ChartContent;
use crate::output::{GeneratedReport, GenerationStats};
use crate::pipeline::input::{self, ResolvedImages};
use crate::pipeline::layout::{plan_pages, LayoutInput};
use crate::progress::{NoopProgress, Phase, ProgressEvent, ProgressSink};
use crate::render;
use crate::schema::ReportSchema;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Assemble `content` against `schema` and render it.
///
/// # Errors
/// - [`ComposeError::InvariantViolation`] when the content breaks a pipeline
///   contract (see [`ReportDocument::assemble`])
/// - [`ComposeError::DocumentWrite`] when the backend fails as a whole
///
/// Broken images and failed charts are not errors: they degrade to
/// placeholders and are counted in [`GenerationStats`].
pub async fn generate(
    schema: &ReportSchema,
    content: ReportContent,
    config: &ComposerConfig,
) -> Result<GeneratedReport, ComposeError> {
    let document = assemble(schema, content, config)?;
    render_report(document, config).await
}

/// Render an already assembled document.
pub async fn render_report(
    document: ReportDocument,
    config: &ComposerConfig,
) -> Result<GeneratedReport, ComposeError> {
    let total_start = Instant::now();
    let format = config.output_format;
    let progress = config.progress_sink();
    info!(
        "Generating {} '{}' ({} pages planned)",
        format,
        document.title(),
        document.pages().len()
    );

    // ── Step 1: Resolve images ───────────────────────────────────────────
    // Flow formats link images by reference and never embed them.
    let fetch_start = Instant::now();
    let images = match format {
        OutputFormat::Pdf => {
            input::resolve_images(
                &document.image_references(),
                config.image_fetch_timeout_secs,
                config.fetch_concurrency,
            )
            .await
        }
        OutputFormat::Docx | OutputFormat::Markdown => ResolvedImages::new(),
    };
    let fetch_duration_ms = fetch_start.elapsed().as_millis() as u64;

    // ── Step 2: Render on a blocking thread ──────────────────────────────
    progress.emit(ProgressEvent::PhaseStarted {
        phase: Phase::Render,
        total: document.pages().len(),
    });
    let render_start = Instant::now();
    let sink = config.progress.clone();
    let page_size = config.page_size;
    let (document, rendered) = tokio::task::spawn_blocking(move || {
        let sink: &dyn ProgressSink = match &sink {
            Some(s) => s.as_ref(),
            None => &NoopProgress,
        };
        let result = render::render_document(&document, &images, format, page_size, sink);
        (document, result)
    })
    .await
    .map_err(|e| ComposeError::Internal(format!("Render task panicked: {}", e)))?;
    let rendered = rendered?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    for error in &rendered.degraded_images {
        if let ArtifactError::RenderFailure { reference, .. } = error {
            progress.emit(ProgressEvent::ImageDegraded {
                reference: reference.clone(),
                error: error.to_string(),
            });
        }
    }
    progress.emit(ProgressEvent::PhaseCompleted {
        phase: Phase::Render,
    });

    // ── Step 3: Stats ────────────────────────────────────────────────────
    let mut artifact_errors: Vec<_> = document
        .charts()
        .iter()
        .filter_map(|c| match &c.content {
            ChartContent::Placeholder { error } => Some(error.clone()),
            _ => None,
        })
        .collect();
    artifact_errors.extend(rendered.degraded_charts.iter().cloned());
    let placeholder_charts = artifact_errors.len();
    artifact_errors.extend(rendered.degraded_images.iter().cloned());

    let stats = GenerationStats {
        planned_pages: document.pages().len(),
        rendered_pages: rendered.pages,
        charts: document.charts().len(),
        placeholder_charts,
        images: document.images().iter().map(|b| b.images.len()).sum(),
        degraded_images: rendered.degraded_images.len(),
        artifact_errors,
        output_bytes: rendered.bytes.len(),
        fetch_duration_ms,
        render_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Generated {} ({} bytes, {} pages) in {}ms",
        format, stats.output_bytes, stats.rendered_pages, stats.total_duration_ms
    );

    Ok(GeneratedReport {
        bytes: rendered.bytes,
        format,
        document,
        stats,
    })
}

/// Generate and write the result to `output_path`.
///
/// The bytes go to a temporary file in the destination directory which is
/// then persisted over `output_path`, so readers never observe a partial
/// document.
pub async fn generate_to_file(
    schema: &ReportSchema,
    content: ReportContent,
    output_path: impl AsRef<Path>,
    config: &ComposerConfig,
) -> Result<GenerationStats, ComposeError> {
    let report = generate(schema, content, config).await?;
    let path = output_path.as_ref().to_path_buf();
    let bytes = report.bytes;

    tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
        .await
        .map_err(|e| ComposeError::Internal(format!("Write task panicked: {}", e)))??;

    Ok(report.stats)
}

/// Synchronous wrapper around [`generate`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync(
    schema: &ReportSchema,
    content: ReportContent,
    config: &ComposerConfig,
) -> Result<GeneratedReport, ComposeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ComposeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate(schema, content, config))
}

/// Compute the page plan only. No content is rendered and nothing is fetched.
pub fn plan_layout(
    schema: &ReportSchema,
    input: &LayoutInput,
) -> Result<Vec<PageDescriptor>, ComposeError> {
    let pages = plan_pages(schema, input)?;
    debug!("Planned {} pages for '{}'", pages.len(), schema.kind);
    Ok(pages)
}

// ── Internal helpers ─────────────────────────────────────────────────────

pub(crate) fn assemble(
    schema: &ReportSchema,
    content: ReportContent,
    config: &ComposerConfig,
) -> Result<ReportDocument, ComposeError> {
    let progress = config.progress_sink();
    progress.emit(ProgressEvent::PhaseStarted {
        phase: Phase::Layout,
        total: 1,
    });
    let document = ReportDocument::assemble(schema, content)?;
    info!("Planned {} pages", document.pages().len());
    progress.emit(ProgressEvent::LayoutPlanned {
        pages: document.pages().len(),
    });
    progress.emit(ProgressEvent::PhaseCompleted {
        phase: Phase::Layout,
    });
    Ok(document)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ComposeError> {
    let fail = |source: std::io::Error| ComposeError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(fail)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.as_file().sync_all().map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ReportKind;

    #[test]
    fn write_atomic_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/report.md");
        write_atomic(&path, b"# Report\n").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"# Report\n");
        // Only the final file remains; the temp file was renamed over it.
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn plan_layout_counts_pages() {
        let schema = ReportKind::Event.schema();
        let input = LayoutInput {
            image_counts: vec![("team".into(), 9)],
            ..Default::default()
        };
        let pages = plan_layout(&schema, &input).unwrap();
        // cover + attendance + charts + team(3) + winners + certificates + general + sections
        assert_eq!(pages.len(), 10);
    }

    #[tokio::test]
    async fn markdown_generation_skips_fetching() {
        let schema = ReportKind::Event.schema();
        let config = ComposerConfig::builder()
            .output_format(OutputFormat::Markdown)
            .build()
            .unwrap();
        let report = generate(&schema, ReportContent::default(), &config)
            .await
            .unwrap();
        assert_eq!(report.format, OutputFormat::Markdown);
        assert!(String::from_utf8(report.bytes.clone()).unwrap().starts_with("# Event Report\n"));
        assert_eq!(report.stats.fetch_duration_ms, 0);
        assert!(!report.is_degraded());
    }

    #[test]
    fn generate_sync_runs_outside_a_runtime() {
        let schema = ReportKind::Feedback.schema();
        let config = ComposerConfig::builder()
            .output_format(OutputFormat::Docx)
            .build()
            .unwrap();
        let report = generate_sync(&schema, ReportContent::default(), &config).unwrap();
        assert_eq!(&report.bytes[..2], b"PK");
        assert_eq!(report.stats.planned_pages, report.document.pages().len());
    }
}
