//! An editing session: the mutable state behind one report.
//!
//! Uploads replace what they target and bump the session epoch. Chart
//! capture is split in three so a caller holding the session behind a lock
//! can release it while charts rasterise:
//!
//! ```text
//! start_capture()  ──▶  CaptureTicket::run().await  ──▶  commit_capture()
//!   (epoch = n)            (no session access)            kept iff epoch == n
//! ```
//!
//! A capture whose epoch is no longer current is discarded on commit
//! (last writer wins). [`ReportSession::capture_charts`] runs all three
//! steps for callers that own the session outright.

use crate::compose;
use crate::config::ComposerConfig;
use crate::document::{ReportContent, ReportDocument};
use crate::error::{ArtifactError, ComposeError};
use crate::model::{
    CategorizedImage, ChartArtifact, ChartContent, FieldValue, QuestionAggregate, Section,
    TableData,
};
use crate::output::GeneratedReport;
use crate::pipeline::aggregate::aggregate_responses;
use crate::pipeline::capture;
use crate::pipeline::images::{ImageCategoryStore, ImageUpload};
use crate::pipeline::ingest::{ingest_feedback, ingest_table};
use crate::progress::{Phase, ProgressEvent};
use crate::schema::{ReportKind, ReportSchema};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Mutable state of one report being edited.
#[derive(Debug, Clone)]
pub struct ReportSession {
    schema: ReportSchema,
    config: ComposerConfig,
    fields: BTreeMap<String, FieldValue>,
    tables: Vec<TableData>,
    feedback: Option<TableData>,
    aggregates: Vec<QuestionAggregate>,
    charts: Vec<ChartArtifact>,
    images: ImageCategoryStore,
    sections: Vec<Section>,
    epoch: u64,
}

/// A pending capture: the aggregates it covers and the epoch it started at.
#[derive(Debug, Clone)]
pub struct CaptureTicket {
    epoch: u64,
    aggregates: Vec<QuestionAggregate>,
}

/// Charts produced by a [`CaptureTicket`], waiting to be committed.
#[derive(Debug, Clone)]
pub struct CompletedCapture {
    epoch: u64,
    charts: Vec<ChartArtifact>,
}

impl CaptureTicket {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Rasterise every chart. Does not touch the session.
    pub async fn run(self, config: &ComposerConfig) -> CompletedCapture {
        let charts = capture::capture_charts(
            &self.aggregates,
            config.chart_rasterizer(),
            &config.capture_options(),
            config.progress_sink(),
        )
        .await;
        CompletedCapture {
            epoch: self.epoch,
            charts,
        }
    }
}

impl CompletedCapture {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn charts(&self) -> &[ChartArtifact] {
        &self.charts
    }
}

impl ReportSession {
    pub fn new(schema: ReportSchema, config: ComposerConfig) -> Self {
        let images = ImageCategoryStore::new(
            &schema,
            config.max_files_per_batch,
            config.allowed_extensions.clone(),
        );
        Self {
            schema,
            config,
            fields: BTreeMap::new(),
            tables: Vec::new(),
            feedback: None,
            aggregates: Vec::new(),
            charts: Vec::new(),
            images,
            sections: Vec::new(),
            epoch: 0,
        }
    }

    /// Session for one of the built-in report kinds.
    pub fn for_kind(kind: ReportKind, config: ComposerConfig) -> Self {
        Self::new(kind.schema(), config)
    }

    pub fn schema(&self) -> &ReportSchema {
        &self.schema
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Counter bumped by every upload and every capture start.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    // ── Fields & sections ────────────────────────────────────────────────

    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn add_section(&mut self, section: Section) {
        self.sections.push(section);
    }

    pub fn remove_section(&mut self, index: usize) -> Option<Section> {
        (index < self.sections.len()).then(|| self.sections.remove(index))
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    // ── Spreadsheets ─────────────────────────────────────────────────────

    /// Ingest `bytes` as the schema table `table`, replacing any previous
    /// upload. On error the previous data is kept.
    pub fn upload_table(&mut self, table: &str, bytes: &[u8]) -> Result<&TableData, ComposeError> {
        let spec = self
            .schema
            .table(table)
            .ok_or_else(|| ComposeError::UnknownTable {
                kind: self.schema.kind.clone(),
                table: table.to_string(),
            })?;

        let progress = self.config.progress_sink();
        progress.emit(ProgressEvent::PhaseStarted {
            phase: Phase::Ingest,
            total: 1,
        });
        let data = ingest_table(bytes, spec)?;
        progress.emit(ProgressEvent::TableIngested {
            table: data.name.clone(),
            rows: data.row_count(),
        });
        progress.emit(ProgressEvent::PhaseCompleted {
            phase: Phase::Ingest,
        });

        self.bump_epoch();
        let pos = match self.tables.iter().position(|t| t.name == table) {
            Some(pos) => {
                self.tables[pos] = data;
                pos
            }
            None => {
                self.tables.push(data);
                self.tables.len() - 1
            }
        };
        Ok(&self.tables[pos])
    }

    pub fn table(&self, name: &str) -> Option<&TableData> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Ingest a feedback sheet and recompute the aggregates.
    ///
    /// Charts captured for the previous upload are dropped.
    pub fn upload_feedback(&mut self, bytes: &[u8]) -> Result<&[QuestionAggregate], ComposeError> {
        let spec = self
            .schema
            .feedback
            .as_ref()
            .ok_or_else(|| ComposeError::UnknownTable {
                kind: self.schema.kind.clone(),
                table: "feedback".to_string(),
            })?;

        let progress = self.config.progress_sink();
        progress.emit(ProgressEvent::PhaseStarted {
            phase: Phase::Ingest,
            total: 1,
        });
        let data = ingest_feedback(bytes, spec)?;
        progress.emit(ProgressEvent::TableIngested {
            table: data.name.clone(),
            rows: data.row_count(),
        });
        progress.emit(ProgressEvent::PhaseCompleted {
            phase: Phase::Ingest,
        });

        progress.emit(ProgressEvent::PhaseStarted {
            phase: Phase::Aggregate,
            total: data.columns.len(),
        });
        let aggregates = aggregate_responses(&data, &spec.policy);
        progress.emit(ProgressEvent::QuestionsAggregated {
            questions: aggregates.len(),
        });
        progress.emit(ProgressEvent::PhaseCompleted {
            phase: Phase::Aggregate,
        });

        self.bump_epoch();
        self.feedback = Some(data);
        self.aggregates = aggregates;
        self.charts.clear();
        Ok(&self.aggregates)
    }

    pub fn feedback(&self) -> Option<&TableData> {
        self.feedback.as_ref()
    }

    pub fn aggregates(&self) -> &[QuestionAggregate] {
        &self.aggregates
    }

    // ── Photos ───────────────────────────────────────────────────────────

    pub fn add_images(
        &mut self,
        bucket: &str,
        uploads: Vec<ImageUpload>,
    ) -> Result<&[CategorizedImage], ComposeError> {
        self.images.add_batch(bucket, uploads)?;
        self.bump_epoch();
        self.images.images(bucket)
    }

    pub fn remove_image(
        &mut self,
        bucket: &str,
        index: usize,
    ) -> Result<CategorizedImage, ComposeError> {
        let removed = self.images.remove(bucket, index)?;
        self.bump_epoch();
        Ok(removed)
    }

    pub fn images(&self) -> &ImageCategoryStore {
        &self.images
    }

    // ── Charts ───────────────────────────────────────────────────────────

    /// Begin a capture of the current aggregates.
    pub fn start_capture(&mut self) -> CaptureTicket {
        self.bump_epoch();
        CaptureTicket {
            epoch: self.epoch,
            aggregates: self.aggregates.clone(),
        }
    }

    /// Store the charts of `capture` if no newer upload or capture started
    /// since its ticket was issued. Returns whether they were kept.
    pub fn commit_capture(&mut self, capture: CompletedCapture) -> bool {
        if capture.epoch != self.epoch {
            warn!(
                "Discarding capture from epoch {} (current epoch is {})",
                capture.epoch, self.epoch
            );
            self.config
                .progress_sink()
                .emit(ProgressEvent::CaptureDiscarded {
                    epoch: capture.epoch,
                    current: self.epoch,
                });
            return false;
        }
        info!("Committed {} charts at epoch {}", capture.charts.len(), capture.epoch);
        self.charts = capture.charts;
        true
    }

    /// Start, run and commit a capture in one step.
    pub async fn capture_charts(&mut self) -> &[ChartArtifact] {
        let ticket = self.start_capture();
        let completed = ticket.run(&self.config).await;
        self.commit_capture(completed);
        &self.charts
    }

    pub fn charts(&self) -> &[ChartArtifact] {
        &self.charts
    }

    /// True when every aggregate has a committed chart.
    pub fn charts_current(&self) -> bool {
        self.charts.len() == self.aggregates.len()
    }

    // ── Output ───────────────────────────────────────────────────────────

    /// Snapshot the session as generation input.
    ///
    /// Aggregates without a committed chart get a placeholder (or a
    /// "no responses" slot when there is nothing to draw).
    pub fn content(&self) -> ReportContent {
        let charts = if self.charts_current() {
            self.charts.clone()
        } else {
            self.aggregates
                .iter()
                .enumerate()
                .map(|(index, agg)| ChartArtifact {
                    index,
                    title: agg.question_label.clone(),
                    content: if agg.response_counts.is_empty() {
                        ChartContent::NoResponses
                    } else {
                        ChartContent::Placeholder {
                            error: ArtifactError::CaptureFailure {
                                index,
                                title: agg.question_label.clone(),
                                detail: "chart was not captured".to_string(),
                            },
                        }
                    },
                })
                .collect()
        };

        // Tables in schema order.
        let tables = self
            .schema
            .tables
            .iter()
            .filter_map(|spec| self.table(&spec.name).cloned())
            .collect();

        ReportContent {
            fields: self.fields.clone(),
            tables,
            aggregates: self.aggregates.clone(),
            charts,
            images: self.images.snapshot(),
            sections: self.sections.clone(),
        }
    }

    /// Assemble a fresh document from the current state.
    pub fn document(&self) -> Result<ReportDocument, ComposeError> {
        compose::assemble(&self.schema, self.content(), &self.config)
    }

    /// Capture charts if needed, then render with the session config.
    pub async fn export(&mut self) -> Result<GeneratedReport, ComposeError> {
        if !self.charts_current() {
            self.capture_charts().await;
        }
        let document = self.document()?;
        compose::render_report(document, &self.config).await
    }

    fn bump_epoch(&mut self) {
        self.epoch += 1;
        debug!("Session epoch -> {}", self.epoch);
    }
}
