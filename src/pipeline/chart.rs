//! Chart rasterisation: one aggregate → PNG bytes.
//!
//! Charts are drawn as SVG text and rasterised with `resvg`. The
//! [`ChartRasterizer`] trait is the seam the capture orchestrator calls
//! through; tests substitute their own implementations to inject failures.

use crate::model::QuestionAggregate;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

const PALETTE: &[&str] = &[
    "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc948", "#b07aa1", "#ff9da7",
    "#9c755f", "#bab0ac",
];

/// Which of the two views to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartView {
    /// Bar per response, height = count.
    Distribution,
    /// Pie slice per response, angle = share of total.
    Proportion,
}

/// Everything a rasterizer needs to draw one view of one question.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub index: usize,
    pub title: String,
    pub view: ChartView,
    /// `(response, count)` in first-seen order.
    pub counts: Vec<(String, usize)>,
    pub width: u32,
    pub height: u32,
}

impl ChartSpec {
    pub fn from_aggregate(
        index: usize,
        aggregate: &QuestionAggregate,
        view: ChartView,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            index,
            title: aggregate.question_label.clone(),
            view,
            counts: aggregate
                .response_counts
                .iter()
                .map(|(r, c)| (r.to_string(), c))
                .collect(),
            width,
            height,
        }
    }

    fn total(&self) -> usize {
        self.counts.iter().map(|(_, c)| c).sum()
    }
}

/// Turns a [`ChartSpec`] into PNG bytes.
///
/// Called from a blocking thread; implementations may be slow but must be
/// thread-safe. An `Err` marks this one chart as failed.
pub trait ChartRasterizer: Send + Sync {
    fn rasterize(&self, chart: &ChartSpec) -> Result<Vec<u8>, String>;
}

/// Default rasterizer: SVG markup rendered through `resvg`.
pub struct SvgRasterizer {
    fontdb: Arc<usvg::fontdb::Database>,
}

impl SvgRasterizer {
    /// Rasterizer with the system fonts loaded.
    pub fn new() -> Self {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        debug!("Chart rasterizer loaded {} font faces", db.len());
        Self {
            fontdb: Arc::new(db),
        }
    }

    /// Rasterizer without fonts; labels are dropped, shapes still render.
    pub fn without_fonts() -> Self {
        Self {
            fontdb: Arc::new(usvg::fontdb::Database::new()),
        }
    }
}

impl Default for SvgRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartRasterizer for SvgRasterizer {
    fn rasterize(&self, chart: &ChartSpec) -> Result<Vec<u8>, String> {
        let svg = chart_svg(chart);
        let mut opt = usvg::Options::default();
        opt.fontdb = self.fontdb.clone();

        let tree = usvg::Tree::from_str(&svg, &opt).map_err(|e| format!("invalid chart svg: {e}"))?;
        let size = tree.size().to_int_size();
        let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
            .ok_or_else(|| format!("cannot allocate {}x{} pixmap", size.width(), size.height()))?;
        pixmap.fill(resvg::tiny_skia::Color::WHITE);
        resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap.as_mut());

        pixmap.encode_png().map_err(|e| format!("png encode failed: {e}"))
    }
}

/// SVG markup for one chart view.
pub fn chart_svg(chart: &ChartSpec) -> String {
    match chart.view {
        ChartView::Distribution => bar_svg(chart),
        ChartView::Proportion => pie_svg(chart),
    }
}

fn bar_svg(chart: &ChartSpec) -> String {
    let (w, h) = (chart.width.max(120) as f64, chart.height.max(120) as f64);
    let (left, right, top, bottom) = (48.0, 16.0, 40.0, 56.0);
    let plot_w = w - left - right;
    let plot_h = h - top - bottom;
    let max = chart.counts.iter().map(|(_, c)| *c).max().unwrap_or(0).max(1) as f64;

    let mut svg = svg_open(w, h);
    title_text(&mut svg, w, &chart.title);

    // axes
    let _ = write!(
        svg,
        r##"<line x1="{left}" y1="{top}" x2="{left}" y2="{y}" stroke="#333" stroke-width="1"/><line x1="{left}" y1="{y}" x2="{x}" y2="{y}" stroke="#333" stroke-width="1"/>"##,
        y = top + plot_h,
        x = left + plot_w,
    );

    let n = chart.counts.len().max(1) as f64;
    let slot = plot_w / n;
    let bar_w = (slot * 0.6).max(1.0);
    for (i, (label, count)) in chart.counts.iter().enumerate() {
        let bar_h = plot_h * (*count as f64) / max;
        let x = left + slot * i as f64 + (slot - bar_w) / 2.0;
        let y = top + plot_h - bar_h;
        let _ = write!(
            svg,
            r#"<rect x="{x:.1}" y="{y:.1}" width="{bar_w:.1}" height="{bar_h:.1}" fill="{}"/>"#,
            PALETTE[i % PALETTE.len()]
        );
        let _ = write!(
            svg,
            r##"<text x="{cx:.1}" y="{ty:.1}" font-family="sans-serif" font-size="12" text-anchor="middle" fill="#222">{count}</text>"##,
            cx = x + bar_w / 2.0,
            ty = y - 4.0,
        );
        let _ = write!(
            svg,
            r##"<text x="{cx:.1}" y="{ly:.1}" font-family="sans-serif" font-size="11" text-anchor="middle" fill="#444">{}</text>"##,
            escape_xml(&truncate(label, 18)),
            cx = x + bar_w / 2.0,
            ly = top + plot_h + 18.0,
        );
    }

    svg.push_str("</svg>");
    svg
}

fn pie_svg(chart: &ChartSpec) -> String {
    let (w, h) = (chart.width.max(120) as f64, chart.height.max(120) as f64);
    let total = chart.total().max(1) as f64;
    let legend_w = (w * 0.35).min(220.0);
    let r = ((w - legend_w).min(h - 56.0) / 2.0 - 8.0).max(10.0);
    let (cx, cy) = ((w - legend_w) / 2.0, 40.0 + (h - 40.0) / 2.0);

    let mut svg = svg_open(w, h);
    title_text(&mut svg, w, &chart.title);

    let non_zero: Vec<_> = chart.counts.iter().filter(|(_, c)| *c > 0).collect();
    if non_zero.len() == 1 {
        let _ = write!(
            svg,
            r#"<circle cx="{cx:.1}" cy="{cy:.1}" r="{r:.1}" fill="{}"/>"#,
            PALETTE[0]
        );
    } else {
        let mut angle = -std::f64::consts::FRAC_PI_2;
        for (i, (_, count)) in chart.counts.iter().enumerate() {
            if *count == 0 {
                continue;
            }
            let sweep = std::f64::consts::TAU * (*count as f64) / total;
            let (x0, y0) = (cx + r * angle.cos(), cy + r * angle.sin());
            let end = angle + sweep;
            let (x1, y1) = (cx + r * end.cos(), cy + r * end.sin());
            let large = if sweep > std::f64::consts::PI { 1 } else { 0 };
            let _ = write!(
                svg,
                r##"<path d="M{cx:.2},{cy:.2} L{x0:.2},{y0:.2} A{r:.2},{r:.2} 0 {large} 1 {x1:.2},{y1:.2} Z" fill="{}" stroke="#fff" stroke-width="1"/>"##,
                PALETTE[i % PALETTE.len()]
            );
            angle = end;
        }
    }

    let legend_x = w - legend_w + 8.0;
    for (i, (label, count)) in chart.counts.iter().enumerate() {
        let y = 56.0 + 20.0 * i as f64;
        let pct = 100.0 * (*count as f64) / total;
        let _ = write!(
            svg,
            r##"<rect x="{legend_x:.1}" y="{ry:.1}" width="12" height="12" fill="{}"/><text x="{tx:.1}" y="{y:.1}" font-family="sans-serif" font-size="11" fill="#222">{} ({pct:.0}%)</text>"##,
            PALETTE[i % PALETTE.len()],
            escape_xml(&truncate(label, 22)),
            ry = y - 10.0,
            tx = legend_x + 18.0,
        );
    }

    svg.push_str("</svg>");
    svg
}

fn svg_open(w: f64, h: f64) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><rect width="100%" height="100%" fill="white"/>"#
    )
}

fn title_text(svg: &mut String, w: f64, title: &str) {
    let _ = write!(
        svg,
        r##"<text x="{x:.1}" y="24" font-family="sans-serif" font-size="15" font-weight="bold" text-anchor="middle" fill="#111">{}</text>"##,
        escape_xml(&truncate(title, 70)),
        x = w / 2.0,
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
