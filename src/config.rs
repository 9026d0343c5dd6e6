//! Configuration types for report composition.
//!
//! Every knob of the pipeline lives in [`ComposerConfig`], built via its
//! [`ComposerConfigBuilder`]. Setters clamp obviously out-of-range values;
//! `build()` rejects the combinations that cannot work.

use crate::error::ComposeError;
use crate::pipeline::capture::CaptureOptions;
use crate::pipeline::chart::{ChartRasterizer, SvgRasterizer};
use crate::pipeline::images::{DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_MAX_FILES_PER_BATCH};
use crate::progress::{NoopProgress, ProgressHandle, ProgressSink};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

static DEFAULT_RASTERIZER: Lazy<Arc<SvgRasterizer>> = Lazy::new(|| Arc::new(SvgRasterizer::new()));

/// Configuration for report composition.
///
/// # Example
/// ```rust
/// use report_composer::{ComposerConfig, OutputFormat};
///
/// let config = ComposerConfig::builder()
///     .output_format(OutputFormat::Docx)
///     .settle_delay_ms(0)
///     .max_files_per_batch(20)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ComposerConfig {
    /// Document backend. Default: PDF.
    pub output_format: OutputFormat,

    /// Paper size for the paginated backend. Default: A4.
    pub page_size: PageSize,

    /// Pause before each chart capture, in milliseconds. Default: 500.
    pub settle_delay_ms: u64,

    /// Raster width of each chart view in pixels. Range: 120–4096. Default: 640.
    pub chart_width: u32,

    /// Raster height of each chart view in pixels. Range: 120–4096. Default: 400.
    pub chart_height: u32,

    /// Maximum files per image upload batch. Default: 10.
    pub max_files_per_batch: usize,

    /// Accepted image extensions, lower-case without the dot.
    /// Default: `jpg`, `jpeg`, `png`.
    pub allowed_extensions: Vec<String>,

    /// Timeout for fetching one hosted image, in seconds. Default: 30.
    pub image_fetch_timeout_secs: u64,

    /// Hosted images fetched at once. Default: 4.
    pub fetch_concurrency: usize,

    /// Event sink. If None, events are dropped.
    pub progress: Option<ProgressHandle>,

    /// Chart rasterizer. If None, the built-in SVG rasterizer is used.
    pub rasterizer: Option<Arc<dyn ChartRasterizer>>,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::default(),
            page_size: PageSize::default(),
            settle_delay_ms: 500,
            chart_width: 640,
            chart_height: 400,
            max_files_per_batch: DEFAULT_MAX_FILES_PER_BATCH,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            image_fetch_timeout_secs: 30,
            fetch_concurrency: 4,
            progress: None,
            rasterizer: None,
        }
    }
}

impl fmt::Debug for ComposerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposerConfig")
            .field("output_format", &self.output_format)
            .field("page_size", &self.page_size)
            .field("settle_delay_ms", &self.settle_delay_ms)
            .field("chart_width", &self.chart_width)
            .field("chart_height", &self.chart_height)
            .field("max_files_per_batch", &self.max_files_per_batch)
            .field("allowed_extensions", &self.allowed_extensions)
            .field("image_fetch_timeout_secs", &self.image_fetch_timeout_secs)
            .field("fetch_concurrency", &self.fetch_concurrency)
            .field("progress", &self.progress.as_ref().map(|_| "<dyn ProgressSink>"))
            .field(
                "rasterizer",
                &self.rasterizer.as_ref().map(|_| "<dyn ChartRasterizer>"),
            )
            .finish()
    }
}

impl ComposerConfig {
    /// Create a new builder for `ComposerConfig`.
    pub fn builder() -> ComposerConfigBuilder {
        ComposerConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            width: self.chart_width,
            height: self.chart_height,
        }
    }

    pub fn progress_sink(&self) -> &dyn ProgressSink {
        match &self.progress {
            Some(p) => p.as_ref(),
            None => &NoopProgress,
        }
    }

    pub fn chart_rasterizer(&self) -> Arc<dyn ChartRasterizer> {
        match &self.rasterizer {
            Some(r) => Arc::clone(r),
            None => Arc::clone(&*DEFAULT_RASTERIZER) as Arc<dyn ChartRasterizer>,
        }
    }
}

/// Builder for [`ComposerConfig`].
#[derive(Debug)]
pub struct ComposerConfigBuilder {
    config: ComposerConfig,
}

impl ComposerConfigBuilder {
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn page_size(mut self, size: PageSize) -> Self {
        self.config.page_size = size;
        self
    }

    pub fn settle_delay_ms(mut self, ms: u64) -> Self {
        self.config.settle_delay_ms = ms;
        self
    }

    pub fn chart_size(mut self, width: u32, height: u32) -> Self {
        self.config.chart_width = width.clamp(120, 4096);
        self.config.chart_height = height.clamp(120, 4096);
        self
    }

    pub fn max_files_per_batch(mut self, n: usize) -> Self {
        self.config.max_files_per_batch = n.max(1);
        self
    }

    pub fn allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.allowed_extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn image_fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.image_fetch_timeout_secs = secs;
        self
    }

    pub fn fetch_concurrency(mut self, n: usize) -> Self {
        self.config.fetch_concurrency = n.max(1);
        self
    }

    pub fn progress(mut self, sink: ProgressHandle) -> Self {
        self.config.progress = Some(sink);
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn ChartRasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ComposerConfig, ComposeError> {
        let c = &self.config;
        if c.allowed_extensions.is_empty() {
            return Err(ComposeError::InvalidConfig(
                "at least one image extension must be allowed".into(),
            ));
        }
        if c.image_fetch_timeout_secs == 0 {
            return Err(ComposeError::InvalidConfig(
                "image fetch timeout must be at least 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Output document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Paginated, absolutely positioned pages. (default)
    #[default]
    Pdf,
    /// Flow document (WordprocessingML).
    Docx,
    /// Flow document as Markdown text.
    Markdown,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Docx => "docx",
            OutputFormat::Markdown => "md",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "application/pdf",
            OutputFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            OutputFormat::Markdown => "text/markdown",
        }
    }

    /// Guess the format from an output path's extension.
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Pdf => "PDF",
            OutputFormat::Docx => "DOCX",
            OutputFormat::Markdown => "Markdown",
        })
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pdf" => Ok(OutputFormat::Pdf),
            "docx" | "word" => Ok(OutputFormat::Docx),
            "md" | "markdown" => Ok(OutputFormat::Markdown),
            other => Err(format!(
                "unknown output format '{other}' (expected pdf, docx or markdown)"
            )),
        }
    }
}

/// Paper size for the paginated backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    /// 210 × 297 mm. (default)
    #[default]
    A4,
    /// 8.5 × 11 in.
    Letter,
}

impl PageSize {
    /// Width and height in PDF points.
    pub fn points(&self) -> (f32, f32) {
        match self {
            PageSize::A4 => (595.0, 842.0),
            PageSize::Letter => (612.0, 792.0),
        }
    }
}

impl std::str::FromStr for PageSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "a4" => Ok(PageSize::A4),
            "letter" => Ok(PageSize::Letter),
            other => Err(format!("unknown page size '{other}' (expected a4 or letter)")),
        }
    }
}
