//! Document backends.
//!
//! Both backends consume the same [`ReportDocument`]:
//!
//! ```text
//!                      ┌──▶ pdf       one fixed page per PageDescriptor
//! ReportDocument ──────┤
//!                      └──▶ flow ──┬──▶ docx      WordprocessingML in a zip
//!                                  └──▶ markdown
//! ```
//!
//! Rendering is CPU-bound and synchronous; callers run it on a blocking
//! thread (see [`crate::compose`]).

pub mod docx;
pub mod flow;
pub mod markdown;
pub mod pdf;

use crate::config::{OutputFormat, PageSize};
use crate::document::ReportDocument;
use crate::error::{ArtifactError, ComposeError};
use crate::pipeline::input::ResolvedImages;
use crate::progress::ProgressSink;

/// Bytes produced by one backend.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub bytes: Vec<u8>,
    /// Physical pages for PDF; logical pages (descriptors) for flow formats.
    pub pages: usize,
    /// Photo references that fell back to a placeholder, one per reference.
    pub degraded_images: Vec<ArtifactError>,
    /// Captured charts whose rasters could not be embedded, one per chart.
    pub degraded_charts: Vec<ArtifactError>,
}

/// Render `document` in `format`.
///
/// `images` is only consulted by the PDF backend; flow formats reference
/// images by link or file name and never embed them.
pub fn render_document(
    document: &ReportDocument,
    images: &ResolvedImages,
    format: OutputFormat,
    page_size: PageSize,
    progress: &dyn ProgressSink,
) -> Result<RenderOutput, ComposeError> {
    match format {
        OutputFormat::Pdf => pdf::render_pdf(document, images, page_size, progress),
        OutputFormat::Docx => {
            let blocks = flow::linearize(document);
            let bytes = docx::write_docx(document.title(), &blocks)?;
            Ok(RenderOutput {
                bytes,
                pages: document.pages().len(),
                degraded_images: Vec::new(),
                degraded_charts: Vec::new(),
            })
        }
        OutputFormat::Markdown => {
            let blocks = flow::linearize(document);
            Ok(RenderOutput {
                bytes: markdown::write_markdown(&blocks).into_bytes(),
                pages: document.pages().len(),
                degraded_images: Vec::new(),
                degraded_charts: Vec::new(),
            })
        }
    }
}
