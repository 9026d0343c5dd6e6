//! End-to-end tests for report-composer.
//!
//! Spreadsheets are built in memory with `rust_xlsxwriter`; generated PDFs
//! are re-opened with `lopdf` and DOCX packages with `zip`. No network
//! access is needed: image references are local temp files.

use report_composer::{
    generate, generate_to_file, ArtifactError, ChannelProgress, ChartRasterizer, ChartSpec,
    ComposeError, ComposerConfig, ImageUpload, LayoutInput, OutputFormat, PageKind, ProgressEvent,
    ProgressSink, ReportKind, ReportSession, Section, SvgRasterizer,
};
use rust_xlsxwriter::Workbook;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tokio_stream::StreamExt;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Build an xlsx workbook whose first sheet holds `rows` (first row = header).
fn xlsx(rows: &[&[&str]]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            if let Ok(n) = value.parse::<f64>() {
                sheet.write_number(r as u32, c as u16, n).unwrap();
            } else if !value.is_empty() {
                sheet.write_string(r as u32, c as u16, *value).unwrap();
            }
        }
    }
    workbook.save_to_buffer().unwrap()
}

fn attendance_xlsx() -> Vec<u8> {
    xlsx(&[
        &["Sr No", "Full Name", "User Action", "TimeStamp"],
        &["1", "Asha Rao", "Joined", "2024-03-01 09:00"],
        &["2", "Ravi Kumar", "Joined", "2024-03-01 09:04"],
        &["3", "Meera Iyer", "Left", "2024-03-01 11:30"],
    ])
}

fn feedback_xlsx() -> Vec<u8> {
    xlsx(&[
        &[
            "Timestamp",
            "Email",
            "How useful was the session?",
            "Would you attend again?",
            "Comments?",
        ],
        &["t1", "a@x.org", "Very useful", "Yes", ""],
        &["t2", "b@x.org", "Somewhat", "Yes", ""],
        &["t3", "c@x.org", "Very useful", "No", ""],
    ])
}

/// Rasterizer that renders real PNGs without loading system fonts.
fn quiet_rasterizer() -> Arc<dyn ChartRasterizer> {
    Arc::new(SvgRasterizer::without_fonts())
}

/// Fails for one chart index, renders the others.
struct FailOn(usize);

impl ChartRasterizer for FailOn {
    fn rasterize(&self, chart: &ChartSpec) -> Result<Vec<u8>, String> {
        if chart.index == self.0 {
            return Err("renderer crashed".into());
        }
        SvgRasterizer::without_fonts().rasterize(chart)
    }
}

/// Succeeds with bytes no image decoder accepts.
struct GarbageRaster;

impl ChartRasterizer for GarbageRaster {
    fn rasterize(&self, _chart: &ChartSpec) -> Result<Vec<u8>, String> {
        Ok(b"not a png".to_vec())
    }
}

fn config(format: OutputFormat, rasterizer: Arc<dyn ChartRasterizer>) -> ComposerConfig {
    ComposerConfig::builder()
        .output_format(format)
        .settle_delay_ms(0)
        .rasterizer(rasterizer)
        .build()
        .unwrap()
}

fn write_png(dir: &Path, name: &str) -> String {
    let path = dir.join(name);
    image::RgbImage::from_pixel(48, 32, image::Rgb([30, 120, 200]))
        .save(&path)
        .unwrap();
    path.to_string_lossy().into_owned()
}

fn pdf_page_count(bytes: &[u8]) -> usize {
    lopdf::Document::load_mem(bytes).unwrap().get_pages().len()
}

// ── Ingestion ────────────────────────────────────────────────────────────────

#[test]
fn xlsx_attendance_rows_expose_required_columns() {
    let mut session = ReportSession::for_kind(ReportKind::Event, ComposerConfig::default());
    let table = session.upload_table("attendance", &attendance_xlsx()).unwrap();

    assert_eq!(table.row_count(), 3);
    for row in &table.rows {
        for column in ["Sr No", "Full Name", "User Action", "TimeStamp"] {
            assert!(row.get(column).is_some(), "row lacks {column}");
        }
    }
    assert_eq!(table.rows[0].get("Sr No"), Some("1"));
    assert_eq!(table.rows[2].get("Full Name"), Some("Meera Iyer"));
}

#[test]
fn xlsx_missing_timestamp_is_reported() {
    let bytes = xlsx(&[
        &["Sr No", "Full Name", "User Action"],
        &["1", "Asha Rao", "Joined"],
    ]);
    let mut session = ReportSession::for_kind(ReportKind::Event, ComposerConfig::default());
    match session.upload_table("attendance", &bytes) {
        Err(ComposeError::SchemaValidation {
            missing_columns,
            found_columns,
        }) => {
            assert_eq!(missing_columns, vec!["TimeStamp".to_string()]);
            assert_eq!(found_columns.len(), 3);
        }
        other => panic!("expected SchemaValidation, got {other:?}"),
    }
}

#[test]
fn missing_columns_are_exactly_the_absent_required_ones() {
    let bytes = xlsx(&[&["full name", "Email"], &["Asha Rao", "asha@x.org"]]);
    let mut session = ReportSession::for_kind(ReportKind::Event, ComposerConfig::default());
    match session.upload_table("attendance", &bytes) {
        Err(ComposeError::SchemaValidation {
            missing_columns,
            found_columns,
        }) => {
            assert_eq!(missing_columns, vec!["Sr No", "User Action", "TimeStamp"]);
            assert_eq!(found_columns, vec!["full name", "Email"]);
        }
        other => panic!("expected SchemaValidation, got {other:?}"),
    }
    assert!(session.table("attendance").is_none());
}

#[test]
fn header_only_sheet_is_empty_data() {
    let bytes = xlsx(&[&["Sr No", "Roll Number", "Name", "Marks"]]);
    let mut session = ReportSession::for_kind(ReportKind::Assessment, ComposerConfig::default());
    let err = session.upload_table("performance", &bytes).unwrap_err();
    assert!(matches!(err, ComposeError::EmptyData { .. }));
    assert!(err.is_validation());
}

#[test]
fn feedback_aggregates_sum_to_answered_cells() {
    let mut session = ReportSession::for_kind(ReportKind::Feedback, ComposerConfig::default());
    let aggregates = session.upload_feedback(&feedback_xlsx()).unwrap();

    assert_eq!(aggregates.len(), 3);
    assert_eq!(aggregates[0].question_label, "How useful was the session?");
    assert_eq!(aggregates[0].response_counts.get("Very useful"), Some(2));
    assert_eq!(aggregates[0].response_counts.total(), 3);
    assert_eq!(aggregates[1].response_counts.total(), 3);
    // Comments? has no answers at all.
    assert!(aggregates[2].response_counts.is_empty());
}

// ── Layout ───────────────────────────────────────────────────────────────────

#[test]
fn nine_team_images_fill_four_four_one() {
    let schema = ReportKind::Event.schema();
    let pages = report_composer::plan_layout(
        &schema,
        &LayoutInput {
            image_counts: vec![("team".into(), 9)],
            ..Default::default()
        },
    )
    .unwrap();

    let team: Vec<_> = pages
        .iter()
        .filter(|p| p.kind == PageKind::Images { bucket: "team".into() })
        .collect();
    assert_eq!(team.len(), 3);
    assert_eq!(
        team.iter().map(|p| p.filled_count()).collect::<Vec<_>>(),
        vec![4, 4, 1]
    );
    assert!(team.iter().all(|p| p.capacity == 4));
    assert_eq!(team[2].padding_count(), 3);
}

#[tokio::test]
async fn unanswered_question_gets_one_chart_page_with_notice() {
    let mut session = ReportSession::for_kind(
        ReportKind::Feedback,
        config(OutputFormat::Markdown, quiet_rasterizer()),
    );
    let aggregates = session
        .upload_feedback(b"Any suggestions?\n\"\"\n\"\"\n")
        .unwrap();
    assert_eq!(aggregates.len(), 1);
    assert!(aggregates[0].response_counts.is_empty());
    assert_eq!(session.feedback().unwrap().row_count(), 2);

    let document = session.document().unwrap();
    let chart_pages: Vec<_> = document
        .pages()
        .iter()
        .filter(|p| p.kind == PageKind::Charts)
        .collect();
    assert_eq!(chart_pages.len(), 1);
    assert_eq!(chart_pages[0].filled_count(), 1);

    let report = session.export().await.unwrap();
    assert_eq!(report.stats.placeholder_charts, 0);
    let md = String::from_utf8(report.bytes).unwrap();
    assert!(md.contains("**Any suggestions?:** No responses"));
}

// ── Capture ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_capture_degrades_only_its_chart() {
    let bytes = xlsx(&[
        &["Email", "Q1?", "Q2?", "Q3?"],
        &["a@x.org", "Yes", "Good", "5"],
        &["b@x.org", "No", "Good", "4"],
    ]);
    let mut session = ReportSession::for_kind(
        ReportKind::Feedback,
        config(OutputFormat::Pdf, Arc::new(FailOn(1))),
    );
    session.upload_feedback(&bytes).unwrap();

    let charts = session.capture_charts().await;
    assert_eq!(charts.len(), 3);
    assert!(charts[0].is_rendered());
    assert!(charts[1].is_placeholder());
    assert!(charts[2].is_rendered());

    let report = session.export().await.unwrap();
    assert_eq!(report.stats.placeholder_charts, 1);
    assert!(report.is_degraded());
    assert_eq!(pdf_page_count(&report.bytes), report.document.pages().len());
}

#[tokio::test]
async fn undecodable_chart_raster_counts_as_a_chart_placeholder() {
    let bytes = xlsx(&[&["Email", "Useful?"], &["a@x.org", "Yes"], &["b@x.org", "No"]]);
    let mut session = ReportSession::for_kind(
        ReportKind::Feedback,
        config(OutputFormat::Pdf, Arc::new(GarbageRaster)),
    );
    session.upload_feedback(&bytes).unwrap();

    let report = session.export().await.unwrap();
    assert!(session.charts()[0].is_rendered());
    assert_eq!(report.stats.placeholder_charts, 1);
    assert_eq!(report.stats.degraded_images, 0);
    assert_eq!(report.stats.artifact_errors.len(), 1);
    assert!(matches!(
        &report.stats.artifact_errors[0],
        ArtifactError::CaptureFailure { index: 0, .. }
    ));
    assert!(report.is_degraded());
    assert_eq!(pdf_page_count(&report.bytes), report.document.pages().len());
}

// ── Rendering ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pdf_has_one_page_per_descriptor_and_survives_broken_images() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = ReportSession::for_kind(
        ReportKind::Event,
        config(OutputFormat::Pdf, quiet_rasterizer()),
    );
    session.set_field("event_name", "Hack Night");
    session.set_field("venue", "Hall A");
    session.upload_table("attendance", &attendance_xlsx()).unwrap();
    session.upload_feedback(&feedback_xlsx()).unwrap();

    let mut uploads: Vec<ImageUpload> = (0..5)
        .map(|i| ImageUpload::from_path(write_png(dir.path(), &format!("team_{i}.png"))))
        .collect();
    uploads.push(ImageUpload::new("gone.jpg", dir.path().join("gone.jpg").to_string_lossy()));
    session.add_images("team", uploads).unwrap();
    session.add_section(Section::items(
        "Highlights",
        vec!["Opening talk".into(), "Demos".into()],
    ));

    let report = session.export().await.unwrap();
    assert_eq!(&report.bytes[..5], b"%PDF-");
    let planned = report.document.pages().len();
    // cover, attendance, charts(2), team(2), winners, certificates, general, sections
    assert_eq!(planned, 10);
    assert_eq!(pdf_page_count(&report.bytes), planned);
    assert_eq!(report.stats.rendered_pages, planned);
    assert_eq!(report.stats.images, 6);
    assert_eq!(report.stats.degraded_images, 1);
    assert_eq!(report.stats.placeholder_charts, 0);
}

#[tokio::test]
async fn docx_package_carries_title_and_summaries() {
    let mut session = ReportSession::for_kind(
        ReportKind::Assessment,
        config(OutputFormat::Docx, quiet_rasterizer()),
    );
    session.set_field("assessment_name", "Midterm & Quiz");
    session
        .upload_table(
            "performance",
            &xlsx(&[
                &["Sr No", "Roll Number", "Name", "Marks"],
                &["1", "R01", "Asha", "87"],
            ]),
        )
        .unwrap();

    let report = session.export().await.unwrap();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(report.bytes)).unwrap();
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();

    assert!(xml.contains("Performance"));
    assert!(xml.contains("1 row (Sr No, Roll Number, Name, Marks)"));
    assert!(xml.contains("No photos were added to this category."));
}

#[tokio::test]
async fn markdown_keeps_logical_order() {
    let schema = ReportKind::Event.schema();
    let mut session = ReportSession::new(
        schema,
        config(OutputFormat::Markdown, quiet_rasterizer()),
    );
    session.set_field("event_name", "Hack Night");
    session
        .add_images(
            "winners",
            vec![ImageUpload::new("podium.jpg", "https://cdn.example/podium.jpg")],
        )
        .unwrap();
    session.add_section(Section::text("Notes", "Thanks to all volunteers."));

    let report = session.export().await.unwrap();
    let md = String::from_utf8(report.bytes).unwrap();

    let pos = |needle: &str| md.find(needle).unwrap_or_else(|| panic!("missing {needle}"));
    assert!(pos("# Hack Night") < pos("## Attendance"));
    assert!(pos("## Attendance") < pos("## Feedback"));
    assert!(pos("## Feedback") < pos("## Team"));
    assert!(pos("## Team") < pos("## Winners"));
    assert!(pos("![podium.jpg](<https://cdn.example/podium.jpg>)") > pos("## Winners"));
    assert!(pos("### Notes") > pos("## Additional Information"));
}

#[tokio::test]
async fn generate_to_file_writes_complete_document() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("reports/feedback.pdf");
    let schema = ReportKind::Feedback.schema();
    let config = config(OutputFormat::Pdf, quiet_rasterizer());

    let stats = generate_to_file(&schema, Default::default(), &out, &config)
        .await
        .unwrap();
    let bytes = std::fs::read(&out).unwrap();
    assert_eq!(bytes.len(), stats.output_bytes);
    assert_eq!(pdf_page_count(&bytes), stats.planned_pages);
}

#[tokio::test]
async fn progress_stream_reports_every_page() {
    let (sink, mut events) = ChannelProgress::channel();
    let config = ComposerConfig::builder()
        .output_format(OutputFormat::Pdf)
        .progress(Arc::new(sink) as Arc<dyn ProgressSink>)
        .rasterizer(quiet_rasterizer())
        .build()
        .unwrap();
    let schema = ReportKind::Feedback.schema();

    let report = generate(&schema, Default::default(), &config).await.unwrap();
    drop(config);

    let mut rendered = 0;
    let mut planned = None;
    while let Some(event) = events.next().await {
        match event {
            ProgressEvent::PageRendered { .. } => rendered += 1,
            ProgressEvent::LayoutPlanned { pages } => planned = Some(pages),
            _ => {}
        }
    }
    assert_eq!(planned, Some(report.document.pages().len()));
    assert_eq!(rendered, report.document.pages().len());
}

#[tokio::test]
async fn progress_stream_ends_when_the_session_is_dropped() {
    let (sink, events) = ChannelProgress::channel();
    let config = ComposerConfig::builder()
        .output_format(OutputFormat::Pdf)
        .progress(Arc::new(sink) as Arc<dyn ProgressSink>)
        .rasterizer(quiet_rasterizer())
        .build()
        .unwrap();
    let mut session = ReportSession::for_kind(ReportKind::Feedback, config);
    session.upload_feedback(&feedback_xlsx()).unwrap();
    session.capture_charts().await;
    let report = session.export().await.unwrap();
    drop(session);

    let drained = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        events.collect::<Vec<_>>(),
    )
    .await
    .expect("stream stays open after the session is gone");

    let rendered = drained
        .iter()
        .filter(|e| matches!(e, ProgressEvent::PageRendered { .. }))
        .count();
    assert_eq!(rendered, report.stats.rendered_pages);
    assert!(drained
        .iter()
        .any(|e| matches!(e, ProgressEvent::ChartCaptured { .. })));
}
