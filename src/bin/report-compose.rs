//! CLI binary for report-composer.
//!
//! A thin shim over the library crate: it loads files into a
//! `ReportSession`, captures charts and writes the document.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use report_composer::{
    generate_to_file, ChannelProgress, ComposerConfig, FieldValue, ImageUpload, OutputFormat,
    PageKind, PageSize, Phase, ProgressEvent, ProgressSink, ReportKind, ReportSession, Section,
};
use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Event report with attendance, feedback and team photos
  report-compose --kind event \
      --field event_name="Hack Night" --field venue="Hall A" \
      --table attendance=attendance.xlsx --feedback feedback.csv \
      --image team=photos/t1.jpg --image team=photos/t2.jpg \
      -o hack-night.pdf

  # Word document instead of PDF (format taken from the extension)
  report-compose --kind assessment --table performance=marks.xlsx -o marks.docx

  # Markdown to stdout
  report-compose --kind feedback --feedback survey.csv --format markdown

  # Show the page plan without rendering
  report-compose --kind event --image team=a.jpg --layout-only

REPORT KINDS:
  event        attendance table, feedback charts, team/winners/certificates/general photos
  assessment   performance table, feedback charts, team/question-set/documents photos
  feedback     feedback charts, team/general photos

SPREADSHEETS:
  xlsx, xlsm, xlsb, xls, ods and UTF-8 csv. The first sheet is used; its first
  non-blank row is the header. Feedback question columns are the headers
  containing '?'.

IMAGE REFERENCES:
  Local paths, http(s):// URLs and data: URIs. References that cannot be
  fetched or decoded become a visible placeholder in their slot.
"#;

/// Compose report documents from spreadsheets, survey feedback and photos.
#[derive(Parser, Debug)]
#[command(
    name = "report-compose",
    version,
    about = "Compose fixed-layout report documents (PDF / DOCX / Markdown)",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Report kind: event, assessment, feedback.
    #[arg(short, long, env = "REPORT_COMPOSE_KIND")]
    kind: ReportKind,

    /// Scalar field as KEY=VALUE (repeatable).
    #[arg(long = "field", value_name = "KEY=VALUE")]
    fields: Vec<String>,

    /// JSON object of fields; values are strings or string arrays.
    #[arg(long, value_name = "FILE")]
    fields_file: Option<PathBuf>,

    /// Table sheet as NAME=PATH (repeatable), e.g. attendance=sheet.xlsx.
    #[arg(long = "table", value_name = "NAME=PATH")]
    tables: Vec<String>,

    /// Survey feedback sheet.
    #[arg(long, value_name = "PATH")]
    feedback: Option<PathBuf>,

    /// Photo as BUCKET=REFERENCE (repeatable), e.g. team=photos/a.jpg.
    #[arg(long = "image", value_name = "BUCKET=REFERENCE")]
    images: Vec<String>,

    /// Extra text section as TITLE=BODY (repeatable).
    #[arg(long = "section", value_name = "TITLE=BODY")]
    sections: Vec<String>,

    /// JSON array of sections: {"title": ..., "body": "text" | ["item", ...]}.
    #[arg(long, value_name = "FILE")]
    sections_file: Option<PathBuf>,

    /// Write the document to this file instead of stdout.
    #[arg(short, long, env = "REPORT_COMPOSE_OUTPUT")]
    output: Option<PathBuf>,

    /// Output format: pdf, docx, markdown. Defaults to the output extension, else pdf.
    #[arg(short, long, env = "REPORT_COMPOSE_FORMAT")]
    format: Option<OutputFormat>,

    /// Paper size for PDF: a4, letter.
    #[arg(long, env = "REPORT_COMPOSE_PAGE_SIZE", default_value = "a4")]
    page_size: PageSize,

    /// Pause before each chart capture, in milliseconds.
    #[arg(long, env = "REPORT_COMPOSE_SETTLE_DELAY_MS", default_value_t = 500)]
    settle_delay_ms: u64,

    /// Maximum files per image upload batch.
    #[arg(long, env = "REPORT_COMPOSE_MAX_FILES", default_value_t = 10)]
    max_files_per_batch: usize,

    /// Timeout for fetching one hosted image, in seconds.
    #[arg(long, env = "REPORT_COMPOSE_FETCH_TIMEOUT", default_value_t = 30)]
    fetch_timeout: u64,

    /// Print the page plan and exit.
    #[arg(long)]
    layout_only: bool,

    /// Print the assembled document (or page plan) as JSON instead of rendering.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "REPORT_COMPOSE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "REPORT_COMPOSE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "REPORT_COMPOSE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; errors still reach stderr.
    let renders = !cli.layout_only && !cli.json;
    let show_progress = renders && !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let format = cli
        .format
        .or_else(|| cli.output.as_deref().and_then(OutputFormat::from_path))
        .unwrap_or_default();

    // ── Progress ─────────────────────────────────────────────────────────
    let (progress, bar_task) = if show_progress {
        let (sink, stream) = ChannelProgress::channel();
        let bar = ProgressBar::new(0);
        let task = tokio::spawn(drive_progress_bar(bar.clone(), stream));
        (Some(Arc::new(sink) as Arc<dyn ProgressSink>), Some((bar, task)))
    } else {
        (None, None)
    };

    let mut builder = ComposerConfig::builder()
        .output_format(format)
        .page_size(cli.page_size)
        .settle_delay_ms(cli.settle_delay_ms)
        .max_files_per_batch(cli.max_files_per_batch)
        .image_fetch_timeout_secs(cli.fetch_timeout);
    if let Some(sink) = progress {
        builder = builder.progress(sink);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Load session ─────────────────────────────────────────────────────
    let mut session = ReportSession::for_kind(cli.kind, config);
    load_session(&cli, &mut session).await?;

    // ── Layout / JSON modes ──────────────────────────────────────────────
    if cli.layout_only {
        let document = session.document().context("Layout failed")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(document.pages()).context("Failed to serialise pages")?
            );
        } else {
            print_plan(&document);
        }
        drop(session);
        finish_bar(bar_task).await;
        return Ok(());
    }
    if cli.json {
        session.capture_charts().await;
        let document = session.document().context("Layout failed")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&document).context("Failed to serialise document")?
        );
        drop(session);
        finish_bar(bar_task).await;
        return Ok(());
    }

    // ── Render ───────────────────────────────────────────────────────────
    if !session.charts_current() {
        session.capture_charts().await;
    }

    if let Some(ref output_path) = cli.output {
        let stats = generate_to_file(
            session.schema(),
            session.content(),
            output_path,
            session.config(),
        )
        .await
        .context("Generation failed")?;
        drop(session);
        finish_bar(bar_task).await;

        if !cli.quiet {
            let degraded = stats.placeholder_charts + stats.degraded_images;
            eprintln!(
                "{}  {} pages  {} bytes  {}ms  →  {}",
                if degraded == 0 { green("✔") } else { yellow("⚠") },
                stats.rendered_pages,
                stats.output_bytes,
                stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
            for error in &stats.artifact_errors {
                eprintln!("   {} {}", yellow("placeholder:"), dim(&error.to_string()));
            }
        }
    } else {
        if format != OutputFormat::Markdown && io::stdout().is_terminal() {
            bail!(
                "Refusing to write {format} bytes to a terminal; use --output or redirect stdout"
            );
        }
        let report = session.export().await.context("Generation failed")?;
        drop(session);
        finish_bar(bar_task).await;

        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(&report.bytes)
            .context("Failed to write to stdout")?;
        handle.flush().ok();

        if !cli.quiet {
            eprintln!(
                "Generated {} pages ({} bytes) in {}ms",
                report.stats.rendered_pages,
                report.stats.output_bytes,
                report.stats.total_duration_ms
            );
        }
    }

    Ok(())
}

/// Apply every input flag to the session.
async fn load_session(cli: &Cli, session: &mut ReportSession) -> Result<()> {
    if let Some(ref path) = cli.fields_file {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read fields from {}", path.display()))?;
        let fields: BTreeMap<String, FieldValue> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid fields JSON in {}", path.display()))?;
        for (key, value) in fields {
            session.set_field(key, value);
        }
    }
    for entry in &cli.fields {
        let (key, value) = split_pair(entry, "--field")?;
        session.set_field(key, value);
    }

    for entry in &cli.tables {
        let (name, path) = split_pair(entry, "--table")?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read table sheet {path}"))?;
        let table = session
            .upload_table(name, &bytes)
            .with_context(|| format!("Table '{name}' rejected"))?;
        tracing::info!("Loaded {} rows into '{}'", table.row_count(), name);
    }

    if let Some(ref path) = cli.feedback {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read feedback sheet {}", path.display()))?;
        let aggregates = session.upload_feedback(&bytes).context("Feedback sheet rejected")?;
        tracing::info!("Found {} feedback questions", aggregates.len());
    }

    // Group references per bucket, then upload in batches the store accepts.
    let mut per_bucket: Vec<(String, Vec<ImageUpload>)> = Vec::new();
    for entry in &cli.images {
        let (bucket, reference) = split_pair(entry, "--image")?;
        let upload = ImageUpload::from_path(reference);
        match per_bucket.iter_mut().find(|(b, _)| b == bucket) {
            Some((_, uploads)) => uploads.push(upload),
            None => per_bucket.push((bucket.to_string(), vec![upload])),
        }
    }
    let batch = session.images().max_files_per_batch();
    for (bucket, uploads) in per_bucket {
        for chunk in uploads.chunks(batch) {
            session
                .add_images(&bucket, chunk.to_vec())
                .with_context(|| format!("Images for '{bucket}' rejected"))?;
        }
    }

    if let Some(ref path) = cli.sections_file {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read sections from {}", path.display()))?;
        let sections: Vec<Section> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid sections JSON in {}", path.display()))?;
        for section in sections {
            session.add_section(section);
        }
    }
    for entry in &cli.sections {
        let (title, body) = split_pair(entry, "--section")?;
        session.add_section(Section::text(title, body.replace("\\n", "\n")));
    }

    Ok(())
}

fn split_pair<'a>(entry: &'a str, flag: &str) -> Result<(&'a str, &'a str)> {
    match entry.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim(), v.trim())),
        _ => bail!("{flag} expects NAME=VALUE, got '{entry}'"),
    }
}

fn print_plan(document: &report_composer::ReportDocument) {
    println!("{}", bold(document.title()));
    for (i, page) in document.pages().iter().enumerate() {
        let kind = match &page.kind {
            PageKind::Cover => "cover".to_string(),
            PageKind::Table { table } => format!("table:{table}"),
            PageKind::Charts => "charts".to_string(),
            PageKind::Images { bucket } => format!("images:{bucket}"),
            PageKind::Sections => "sections".to_string(),
        };
        let fill = if page.kind == PageKind::Cover {
            String::new()
        } else if page.is_notice() {
            dim("(empty)")
        } else {
            format!("{}/{}", page.filled_count(), page.capacity)
        };
        println!(
            "{:>3}  {:<20} {:<8} {}",
            i + 1,
            kind,
            format!("{}/{}", page.part, page.parts),
            fill
        );
    }
}

/// Consume progress events and animate one bar per phase.
async fn drive_progress_bar(
    bar: ProgressBar,
    mut events: tokio_stream::wrappers::UnboundedReceiverStream<ProgressEvent>,
) {
    let style = ProgressStyle::with_template(
        "{spinner:.cyan} {prefix:.bold:>9}  [{bar:36.green/238}] {pos:>3}/{len}  {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(80));

    while let Some(event) = events.next().await {
        match event {
            ProgressEvent::PhaseStarted { phase, total } => {
                bar.set_prefix(phase.to_string());
                bar.set_length(total as u64);
                bar.set_position(0);
                bar.set_message("");
            }
            ProgressEvent::TableIngested { table, rows } => {
                bar.println(format!("  {} {} ({} rows)", green("✓"), table, rows));
                bar.inc(1);
            }
            ProgressEvent::QuestionsAggregated { questions } => {
                bar.set_position(bar.length().unwrap_or(0));
                bar.println(format!("  {} {} questions", green("✓"), questions));
            }
            ProgressEvent::ChartCaptured { index, total } => {
                bar.set_message(format!("chart {index}/{total}"));
                bar.inc(1);
            }
            ProgressEvent::ChartFailed { index, error, .. } => {
                bar.println(format!("  {} chart {}: {}", yellow("⚠"), index, dim(&error)));
                bar.inc(1);
            }
            ProgressEvent::CaptureDiscarded { epoch, current } => {
                bar.println(dim(&format!("  capture {epoch} superseded by {current}")));
            }
            ProgressEvent::LayoutPlanned { pages } => {
                bar.set_message(format!("{pages} pages"));
                bar.inc(1);
            }
            ProgressEvent::ImageDegraded { reference, .. } => {
                bar.println(format!("  {} image {}", yellow("⚠"), dim(&reference)));
            }
            ProgressEvent::PageRendered { page, total } => {
                bar.set_message(format!("page {page}/{total}"));
                bar.inc(1);
            }
            ProgressEvent::PhaseCompleted { phase } => {
                if phase == Phase::Render {
                    bar.set_message("done");
                }
            }
        }
    }
}

/// Wait for the bar to drain every queued event, then clear it. The stream
/// ends once the session, which owns the last sink, has been dropped.
async fn finish_bar(progress: Option<(ProgressBar, tokio::task::JoinHandle<()>)>) {
    if let Some((bar, task)) = progress {
        let _ = task.await;
        bar.finish_and_clear();
    }
}
