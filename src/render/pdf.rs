//! Paginated backend: one absolutely positioned PDF page per descriptor.
//!
//! Pages are drawn with the 14 standard Type1 fonts (Helvetica and
//! Helvetica-Bold, WinAnsi encoding), so no font program is embedded. Photos
//! and chart rasters are re-encoded as JPEG and written once per document as
//! `DCTDecode` image XObjects, then placed into slots with `cm` + `Do`.
//!
//! Slot geometry:
//!
//! ```text
//! charts / sections        images (capacity 4)
//! ┌──────────────────┐     ┌────────┬────────┐
//! │ slot 0           │     │ slot 0 │ slot 1 │
//! ├──────────────────┤     ├────────┼────────┤
//! │ slot 1           │     │ slot 2 │ slot 3 │
//! └──────────────────┘     └────────┴────────┘
//! ```

use super::RenderOutput;
use crate::config::PageSize;
use crate::document::{PageDescriptor, PageKind, ReportDocument, Slot};
use crate::error::{ArtifactError, ComposeError};
use crate::model::{ChartArtifact, ChartContent, FieldValue, SectionBody};
use crate::pipeline::encode::{encode_for_pdf, EncodedImage};
use crate::pipeline::input::ResolvedImages;
use crate::pipeline::text::paragraphs;
use crate::progress::{ProgressEvent, ProgressSink};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;
use tracing::{debug, info, warn};

const MARGIN: f32 = 48.0;
const FOOTER_HEIGHT: f32 = 24.0;
const HEADING_SIZE: f32 = 18.0;
const TITLE_SIZE: f32 = 26.0;
const BODY_SIZE: f32 = 11.0;
const SMALL_SIZE: f32 = 8.5;
const LINE_FACTOR: f32 = 1.35;
const ROW_HEIGHT: f32 = 16.0;
const SLOT_GAP: f32 = 12.0;

const FONT_REGULAR: &str = "F1";
const FONT_BOLD: &str = "F2";

/// Average Helvetica glyph advance as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.5;

/// Axis-aligned rectangle in PDF user space (origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq)]
struct Rect {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
}

impl Rect {
    fn top(&self) -> f32 {
        self.y + self.h
    }

    fn center_x(&self) -> f32 {
        self.x + self.w / 2.0
    }

    /// Split into a `rows × cols` grid, row-major from the top-left.
    fn grid(&self, rows: usize, cols: usize, gap: f32) -> Vec<Rect> {
        let rows = rows.max(1);
        let cols = cols.max(1);
        let cell_w = (self.w - gap * (cols - 1) as f32) / cols as f32;
        let cell_h = (self.h - gap * (rows - 1) as f32) / rows as f32;
        let mut cells = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                cells.push(Rect {
                    x: self.x + c as f32 * (cell_w + gap),
                    y: self.top() - (r + 1) as f32 * cell_h - r as f32 * gap,
                    w: cell_w,
                    h: cell_h,
                });
            }
        }
        cells
    }

    /// Largest `iw:ih` rectangle centred inside `self`.
    fn fit(&self, iw: f32, ih: f32) -> Rect {
        if iw <= 0.0 || ih <= 0.0 {
            return *self;
        }
        let scale = (self.w / iw).min(self.h / ih);
        let (w, h) = (iw * scale, ih * scale);
        Rect {
            x: self.x + (self.w - w) / 2.0,
            y: self.y + (self.h - h) / 2.0,
            w,
            h,
        }
    }
}

/// An embedded image XObject.
#[derive(Debug, Clone, Copy)]
struct Placed {
    id: ObjectId,
    width: u32,
    height: u32,
}

/// Operations and resources for one page under construction.
#[derive(Default)]
struct Canvas {
    ops: Vec<Operation>,
    xobjects: Vec<(String, ObjectId)>,
}

impl Canvas {
    fn text(&mut self, font: &str, size: f32, x: f32, y: f32, s: &str) {
        self.ops.push(Operation::new("BT", vec![]));
        self.ops
            .push(Operation::new("Tf", vec![font.into(), Object::Real(size)]));
        self.ops
            .push(Operation::new("Td", vec![Object::Real(x), Object::Real(y)]));
        self.ops
            .push(Operation::new("Tj", vec![Object::string_literal(win_ansi(s))]));
        self.ops.push(Operation::new("ET", vec![]));
    }

    fn text_centered(&mut self, font: &str, size: f32, cx: f32, y: f32, s: &str) {
        let x = cx - text_width(s, size) / 2.0;
        self.text(font, size, x, y, s);
    }

    fn text_right(&mut self, font: &str, size: f32, right: f32, y: f32, s: &str) {
        self.text(font, size, right - text_width(s, size), y, s);
    }

    /// Word-wrap `s` into `width`, starting with the baseline at `y`.
    /// Stops before going below `floor`; returns the next free baseline.
    #[allow(clippy::too_many_arguments)]
    fn wrapped(
        &mut self,
        font: &str,
        size: f32,
        x: f32,
        y: f32,
        width: f32,
        floor: f32,
        s: &str,
    ) -> f32 {
        let lead = size * LINE_FACTOR;
        let lines = wrap(s, max_chars(width, size));
        let mut y = y;
        for (i, line) in lines.iter().enumerate() {
            if y < floor {
                debug!("Clipped {} lines of text", lines.len() - i);
                break;
            }
            let last_fitting = y - lead < floor && i + 1 < lines.len();
            if last_fitting {
                self.text(font, size, x, y, &ellipsize(line, max_chars(width, size)));
            } else {
                self.text(font, size, x, y, line);
            }
            y -= lead;
        }
        y
    }

    fn set_fill_gray(&mut self, g: f32) {
        self.ops.push(Operation::new("g", vec![Object::Real(g)]));
    }

    fn fill_rect(&mut self, r: Rect, gray: f32) {
        self.ops.push(Operation::new("q", vec![]));
        self.set_fill_gray(gray);
        self.ops.push(Operation::new("re", rect_operands(r)));
        self.ops.push(Operation::new("f", vec![]));
        self.ops.push(Operation::new("Q", vec![]));
    }

    fn stroke_rect(&mut self, r: Rect, gray: f32, line_width: f32) {
        self.ops.push(Operation::new("q", vec![]));
        self.ops.push(Operation::new("G", vec![Object::Real(gray)]));
        self.ops
            .push(Operation::new("w", vec![Object::Real(line_width)]));
        self.ops.push(Operation::new("re", rect_operands(r)));
        self.ops.push(Operation::new("S", vec![]));
        self.ops.push(Operation::new("Q", vec![]));
    }

    fn line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, gray: f32) {
        self.ops.push(Operation::new("q", vec![]));
        self.ops.push(Operation::new("G", vec![Object::Real(gray)]));
        self.ops.push(Operation::new("w", vec![Object::Real(0.5)]));
        self.ops
            .push(Operation::new("m", vec![Object::Real(x0), Object::Real(y0)]));
        self.ops
            .push(Operation::new("l", vec![Object::Real(x1), Object::Real(y1)]));
        self.ops.push(Operation::new("S", vec![]));
        self.ops.push(Operation::new("Q", vec![]));
    }

    fn image(&mut self, placed: Placed, area: Rect) {
        let name = match self.xobjects.iter().find(|(_, id)| *id == placed.id) {
            Some((name, _)) => name.clone(),
            None => {
                let name = format!("Im{}", self.xobjects.len());
                self.xobjects.push((name.clone(), placed.id));
                name
            }
        };
        let r = area.fit(placed.width as f32, placed.height as f32);
        self.ops.push(Operation::new("q", vec![]));
        self.ops.push(Operation::new(
            "cm",
            vec![
                Object::Real(r.w),
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(r.h),
                Object::Real(r.x),
                Object::Real(r.y),
            ],
        ));
        self.ops
            .push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
        self.ops.push(Operation::new("Q", vec![]));
    }

    /// Framed box with a centred notice, used for padding and broken slots.
    fn placeholder(&mut self, area: Rect, message: Option<&str>, detail: Option<&str>) {
        self.stroke_rect(area, 0.75, 0.75);
        if let Some(message) = message {
            let cy = area.y + area.h / 2.0;
            self.set_fill_gray(0.45);
            self.text_centered(FONT_BOLD, BODY_SIZE, area.center_x(), cy, message);
            if let Some(detail) = detail {
                let chars = max_chars(area.w - 12.0, SMALL_SIZE);
                self.text_centered(
                    FONT_REGULAR,
                    SMALL_SIZE,
                    area.center_x(),
                    cy - BODY_SIZE * LINE_FACTOR,
                    &ellipsize(detail, chars),
                );
            }
            self.set_fill_gray(0.0);
        }
    }
}

/// Render every page of `document` to PDF bytes.
pub fn render_pdf(
    document: &ReportDocument,
    images: &ResolvedImages,
    page_size: PageSize,
    progress: &dyn ProgressSink,
) -> Result<RenderOutput, ComposeError> {
    let mut writer = PdfWriter::new(document, images, page_size);
    let total = document.pages().len();

    for (i, page) in document.pages().iter().enumerate() {
        writer.page(page, i + 1, total)?;
        progress.emit(ProgressEvent::PageRendered { page: i + 1, total });
    }

    writer.finish()
}

struct PdfWriter<'a> {
    doc: Document,
    pages_id: ObjectId,
    fonts: Dictionary,
    kids: Vec<Object>,
    document: &'a ReportDocument,
    images: &'a ResolvedImages,
    embedded: HashMap<String, Result<Placed, ArtifactError>>,
    degraded_images: Vec<ArtifactError>,
    degraded_charts: Vec<ArtifactError>,
    width: f32,
    height: f32,
}

impl<'a> PdfWriter<'a> {
    fn new(document: &'a ReportDocument, images: &'a ResolvedImages, page_size: PageSize) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let regular = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let bold = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        let (width, height) = page_size.points();
        Self {
            doc,
            pages_id,
            fonts: dictionary! {
                FONT_REGULAR => regular,
                FONT_BOLD => bold,
            },
            kids: Vec::new(),
            document,
            images,
            embedded: HashMap::new(),
            degraded_images: Vec::new(),
            degraded_charts: Vec::new(),
            width,
            height,
        }
    }

    /// Area between the page heading and the footer.
    fn body(&self) -> Rect {
        let top = self.height - MARGIN - HEADING_SIZE * 2.0;
        let bottom = MARGIN + FOOTER_HEIGHT;
        Rect {
            x: MARGIN,
            y: bottom,
            w: self.width - 2.0 * MARGIN,
            h: top - bottom,
        }
    }

    fn page(
        &mut self,
        page: &PageDescriptor,
        number: usize,
        total: usize,
    ) -> Result<(), ComposeError> {
        let mut canvas = Canvas::default();

        if page.kind == PageKind::Cover {
            self.draw_cover(&mut canvas);
        } else {
            let heading = self.document.page_heading(page);
            canvas.text(
                FONT_BOLD,
                HEADING_SIZE,
                MARGIN,
                self.height - MARGIN - HEADING_SIZE,
                &heading,
            );
            let rule_y = self.height - MARGIN - HEADING_SIZE * 1.5;
            canvas.line(MARGIN, rule_y, self.width - MARGIN, rule_y, 0.6);

            let body = self.body();
            if page.is_notice() {
                canvas.set_fill_gray(0.4);
                canvas.text_centered(
                    FONT_REGULAR,
                    BODY_SIZE + 1.0,
                    body.center_x(),
                    body.y + body.h / 2.0,
                    self.document.notice_text(&page.kind),
                );
                canvas.set_fill_gray(0.0);
            } else {
                match &page.kind {
                    PageKind::Cover => {}
                    PageKind::Table { table } => self.draw_table(&mut canvas, table, body),
                    PageKind::Charts => self.draw_charts(&mut canvas, page, body),
                    PageKind::Images { bucket } => {
                        self.draw_images(&mut canvas, page, bucket, body)
                    }
                    PageKind::Sections => self.draw_sections(&mut canvas, page, body),
                }
            }
        }

        self.draw_footer(&mut canvas, number, total);
        self.add_page(canvas)
    }

    fn draw_cover(&mut self, canvas: &mut Canvas) {
        let document = self.document;
        let content_w = self.width - 2.0 * MARGIN;
        let mut y = self.height - MARGIN - TITLE_SIZE - 40.0;

        y = canvas.wrapped(
            FONT_BOLD,
            TITLE_SIZE,
            MARGIN,
            y,
            content_w,
            self.height / 2.0,
            document.title(),
        );
        if document.title() != document.schema().display_name {
            canvas.set_fill_gray(0.35);
            canvas.text(FONT_REGULAR, 14.0, MARGIN, y, &document.schema().display_name);
            canvas.set_fill_gray(0.0);
            y -= 14.0 * LINE_FACTOR;
        }
        y -= 18.0;
        canvas.line(MARGIN, y + 8.0, self.width - MARGIN, y + 8.0, 0.6);
        y -= 12.0;

        let label_w = 120.0;
        let value_x = MARGIN + label_w;
        let value_w = content_w - label_w;
        let floor = MARGIN + FOOTER_HEIGHT;
        for field in document.fields() {
            if y < floor {
                warn!("Cover fields overflow the page; remaining fields clipped");
                break;
            }
            canvas.text(FONT_BOLD, BODY_SIZE, MARGIN, y, &field.label);
            y = match &field.value {
                None => {
                    canvas.set_fill_gray(0.5);
                    canvas.text(FONT_REGULAR, BODY_SIZE, value_x, y, "-");
                    canvas.set_fill_gray(0.0);
                    y - BODY_SIZE * LINE_FACTOR
                }
                Some(FieldValue::Text(text)) => {
                    let mut next = y;
                    for para in paragraphs(text) {
                        next = canvas.wrapped(
                            FONT_REGULAR,
                            BODY_SIZE,
                            value_x,
                            next,
                            value_w,
                            floor,
                            &para,
                        );
                    }
                    next
                }
                Some(FieldValue::List(items)) => {
                    let mut next = y;
                    for (i, item) in items.iter().enumerate() {
                        let line = format!("{}. {}", i + 1, item);
                        next = canvas.wrapped(
                            FONT_REGULAR,
                            BODY_SIZE,
                            value_x,
                            next,
                            value_w,
                            floor,
                            &line,
                        );
                    }
                    next
                }
            };
            y -= 6.0;
        }
    }

    fn draw_table(&mut self, canvas: &mut Canvas, table_name: &str, body: Rect) {
        let Some(table) = self.document.table(table_name) else {
            return;
        };
        let cols = table.columns.len().max(1);
        let col_w = body.w / cols as f32;
        let chars = max_chars(col_w - 6.0, 9.0);
        let mut y = body.top() - ROW_HEIGHT;

        canvas.fill_rect(
            Rect {
                x: body.x,
                y,
                w: body.w,
                h: ROW_HEIGHT,
            },
            0.88,
        );
        for (c, header) in table.columns.iter().enumerate() {
            canvas.text(
                FONT_BOLD,
                9.0,
                body.x + c as f32 * col_w + 3.0,
                y + 4.5,
                &ellipsize(header, chars),
            );
        }

        let mut overflowed = false;
        for row in &table.rows {
            y -= ROW_HEIGHT;
            if y < body.y && !overflowed {
                overflowed = true;
                warn!(
                    "Table '{}' has {} rows and overflows its page; rows past the margin are kept",
                    table.name,
                    table.row_count()
                );
            }
            for (c, (_, value)) in row.cells().enumerate() {
                canvas.text(
                    FONT_REGULAR,
                    9.0,
                    body.x + c as f32 * col_w + 3.0,
                    y + 4.5,
                    &ellipsize(value, chars),
                );
            }
            canvas.line(body.x, y, body.x + body.w, y, 0.8);
        }
    }

    fn draw_charts(&mut self, canvas: &mut Canvas, page: &PageDescriptor, body: Rect) {
        let document = self.document;
        let slots = body.grid(page.capacity, 1, SLOT_GAP);
        for (slot, area) in page.slots().zip(slots) {
            match slot {
                Slot::Padding => canvas.placeholder(area, None, None),
                Slot::Filled(idx) => {
                    let Some(chart) = document.charts().get(idx) else {
                        continue;
                    };
                    self.draw_chart(canvas, chart, area);
                }
            }
        }
    }

    fn draw_chart(&mut self, canvas: &mut Canvas, chart: &ChartArtifact, area: Rect) {
        let title_y = area.top() - 13.0;
        canvas.text(
            FONT_BOLD,
            12.0,
            area.x,
            title_y,
            &ellipsize(&chart.title, max_chars(area.w, 12.0)),
        );
        let content = Rect {
            h: area.h - 24.0,
            ..area
        };

        match &chart.content {
            ChartContent::NoResponses => canvas.placeholder(content, Some("No responses"), None),
            ChartContent::Placeholder { error } => {
                canvas.placeholder(content, Some("Chart unavailable"), Some(&error.to_string()))
            }
            ChartContent::Rendered {
                distribution,
                proportion,
            } => {
                let halves = content.grid(1, 2, SLOT_GAP);
                let mut failure = None;
                for (view, bytes, half) in [
                    ("distribution", distribution, halves[0]),
                    ("proportion", proportion, halves[1]),
                ] {
                    let key = format!("chart:{}:{}", chart.index, view);
                    let placed = self.embed(&key, || {
                        encode_for_pdf(bytes).map_err(|e| ArtifactError::CaptureFailure {
                            index: chart.index,
                            title: chart.title.clone(),
                            detail: format!("cannot decode {view} raster: {e}"),
                        })
                    });
                    match placed {
                        Ok(placed) => canvas.image(placed, half),
                        Err(e) => {
                            canvas.placeholder(
                                half,
                                Some("Chart unavailable"),
                                Some(&e.to_string()),
                            );
                            if failure.is_none() {
                                failure = Some(e);
                            }
                        }
                    }
                }
                // One entry per chart, however many of its views failed.
                if let Some(error) = failure {
                    warn!("{}", error);
                    self.degraded_charts.push(error);
                }
            }
        }
    }

    fn draw_images(
        &mut self,
        canvas: &mut Canvas,
        page: &PageDescriptor,
        bucket: &str,
        body: Rect,
    ) {
        let document = self.document;
        let Some(bucket) = document.bucket(bucket) else {
            return;
        };
        let cols = (page.capacity as f32).sqrt().ceil() as usize;
        let rows = page.capacity.div_ceil(cols.max(1));
        let cells = body.grid(rows, cols, SLOT_GAP);

        for (slot, cell) in page.slots().zip(cells) {
            match slot {
                Slot::Padding => canvas.placeholder(cell, None, None),
                Slot::Filled(idx) => {
                    let Some(img) = bucket.images.get(idx) else {
                        continue;
                    };
                    let caption_h = SMALL_SIZE * 2.0;
                    let picture = Rect {
                        y: cell.y + caption_h,
                        h: cell.h - caption_h,
                        ..cell
                    };
                    let images = self.images;
                    let first_use = !self.embedded.contains_key(&img.reference);
                    let placed = self.embed(&img.reference, || {
                        let bytes = match images.get(&img.reference) {
                            Some(Ok(bytes)) => bytes,
                            Some(Err(e)) => return Err(e.clone()),
                            None => {
                                return Err(ArtifactError::RenderFailure {
                                    reference: img.reference.clone(),
                                    detail: "image was not resolved".into(),
                                })
                            }
                        };
                        encode_for_pdf(bytes).map_err(|e| ArtifactError::RenderFailure {
                            reference: img.reference.clone(),
                            detail: format!("cannot decode image: {e}"),
                        })
                    });
                    match placed {
                        Ok(placed) => canvas.image(placed, picture),
                        Err(e) => {
                            if first_use {
                                warn!("{}", e);
                                self.degraded_images.push(e);
                            }
                            canvas.placeholder(
                                picture,
                                Some("Image unavailable"),
                                Some(&img.file_name),
                            );
                        }
                    }
                    canvas.set_fill_gray(0.3);
                    canvas.text_centered(
                        FONT_REGULAR,
                        SMALL_SIZE,
                        cell.center_x(),
                        cell.y + 3.0,
                        &ellipsize(&img.file_name, max_chars(cell.w, SMALL_SIZE)),
                    );
                    canvas.set_fill_gray(0.0);
                }
            }
        }
    }

    fn draw_sections(&mut self, canvas: &mut Canvas, page: &PageDescriptor, body: Rect) {
        let slots = body.grid(page.capacity, 1, SLOT_GAP);
        for (slot, area) in page.slots().zip(slots) {
            match slot {
                Slot::Padding => canvas.placeholder(area, None, None),
                Slot::Filled(idx) => {
                    let Some(section) = self.document.sections().get(idx) else {
                        continue;
                    };
                    let mut y = area.top() - 14.0;
                    y = canvas.wrapped(FONT_BOLD, 13.0, area.x, y, area.w, area.y, &section.title);
                    y -= 4.0;
                    match &section.body {
                        SectionBody::Text(text) => {
                            for para in paragraphs(text) {
                                y = canvas.wrapped(
                                    FONT_REGULAR,
                                    BODY_SIZE,
                                    area.x,
                                    y,
                                    area.w,
                                    area.y,
                                    &para,
                                );
                                y -= 4.0;
                            }
                        }
                        SectionBody::Items(items) => {
                            for (i, item) in items.iter().enumerate() {
                                let line = format!("{}. {}", i + 1, item);
                                y = canvas.wrapped(
                                    FONT_REGULAR,
                                    BODY_SIZE,
                                    area.x + 8.0,
                                    y,
                                    area.w - 8.0,
                                    area.y,
                                    &line,
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    fn draw_footer(&self, canvas: &mut Canvas, number: usize, total: usize) {
        let y = MARGIN;
        canvas.line(MARGIN, y + 12.0, self.width - MARGIN, y + 12.0, 0.8);
        canvas.set_fill_gray(0.4);
        let half = max_chars((self.width - 2.0 * MARGIN) / 2.0, SMALL_SIZE);
        canvas.text(FONT_REGULAR, SMALL_SIZE, MARGIN, y, &ellipsize(self.document.title(), half));
        canvas.text_right(
            FONT_REGULAR,
            SMALL_SIZE,
            self.width - MARGIN,
            y,
            &format!("Page {number} of {total}"),
        );
        canvas.set_fill_gray(0.0);
    }

    /// Embed an image once per key. Failures are cached too, so a broken
    /// reference is decoded only once.
    fn embed<F>(&mut self, key: &str, load: F) -> Result<Placed, ArtifactError>
    where
        F: FnOnce() -> Result<EncodedImage, ArtifactError>,
    {
        if let Some(cached) = self.embedded.get(key) {
            return cached.clone();
        }
        let result = load().map(|encoded| {
            let id = self.doc.add_object(
                Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => encoded.width as i64,
                        "Height" => encoded.height as i64,
                        "ColorSpace" => "DeviceRGB",
                        "BitsPerComponent" => 8,
                        "Filter" => "DCTDecode",
                    },
                    encoded.jpeg,
                )
                .with_compression(false),
            );
            Placed {
                id,
                width: encoded.width,
                height: encoded.height,
            }
        });
        self.embedded.insert(key.to_string(), result.clone());
        result
    }

    fn add_page(&mut self, canvas: Canvas) -> Result<(), ComposeError> {
        let content = Content {
            operations: canvas.ops,
        };
        let encoded = content.encode().map_err(|e| ComposeError::DocumentWrite {
            format: "PDF".into(),
            detail: format!("content stream encoding failed: {e}"),
        })?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, encoded));

        let mut resources = dictionary! {
            "Font" => self.fonts.clone(),
        };
        if !canvas.xobjects.is_empty() {
            let mut xobjects = Dictionary::new();
            for (name, id) in canvas.xobjects {
                xobjects.set(name, Object::Reference(id));
            }
            resources.set("XObject", xobjects);
        }

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Resources" => resources,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(self.width),
                Object::Real(self.height),
            ],
            "Contents" => content_id,
        });
        self.kids.push(Object::Reference(page_id));
        Ok(())
    }

    fn finish(mut self) -> Result<RenderOutput, ComposeError> {
        let count = self.kids.len();
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => std::mem::take(&mut self.kids),
            "Count" => count as i64,
        };
        self.doc
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let info_id = self.doc.add_object(dictionary! {
            "Title" => Object::string_literal(win_ansi(self.document.title())),
            "Producer" => Object::string_literal(concat!(
                "report-composer ",
                env!("CARGO_PKG_VERSION")
            )),
        });
        self.doc.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        self.doc
            .save_to(&mut bytes)
            .map_err(|e| ComposeError::DocumentWrite {
                format: "PDF".into(),
                detail: e.to_string(),
            })?;

        info!(
            "PDF written: {} pages, {} bytes, {} degraded images, {} degraded charts",
            count,
            bytes.len(),
            self.degraded_images.len(),
            self.degraded_charts.len()
        );
        Ok(RenderOutput {
            bytes,
            pages: count,
            degraded_images: self.degraded_images,
            degraded_charts: self.degraded_charts,
        })
    }
}

fn rect_operands(r: Rect) -> Vec<Object> {
    vec![
        Object::Real(r.x),
        Object::Real(r.y),
        Object::Real(r.w),
        Object::Real(r.h),
    ]
}

fn text_width(s: &str, size: f32) -> f32 {
    s.chars().count() as f32 * size * AVG_GLYPH_WIDTH
}

fn max_chars(width: f32, size: f32) -> usize {
    ((width / (size * AVG_GLYPH_WIDTH)).floor() as usize).max(1)
}

/// Truncate to `max` characters, ending in `...` when shortened.
fn ellipsize(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Greedy word wrap at `max` characters. Words longer than a line are split.
fn wrap(s: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    let mut lines = Vec::new();
    for raw in s.lines() {
        let mut line = String::new();
        for word in raw.split_whitespace() {
            let mut word: String = word.to_string();
            while word.chars().count() > max {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                let head: String = word.chars().take(max).collect();
                word = word.chars().skip(max).collect();
                lines.push(head);
            }
            let needed = if line.is_empty() {
                word.chars().count()
            } else {
                line.chars().count() + 1 + word.chars().count()
            };
            if needed > max && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&word);
        }
        lines.push(line);
    }
    lines
}

/// Encode text for a WinAnsi Type1 font. Characters outside the encoding
/// become `?`.
fn win_ansi(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\u{2018}' | '\u{2019}' => out.push(b'\''),
            '\u{201C}' | '\u{201D}' => out.push(b'"'),
            '\u{2013}' | '\u{2014}' => out.push(b'-'),
            '\u{2026}' => out.extend_from_slice(b"..."),
            '\u{2022}' => out.push(0x95),
            '\u{20AC}' => out.push(0x80),
            c if (c as u32) < 0x20 => out.push(b' '),
            c if (c as u32) < 0x80 => out.push(c as u8),
            c if (0xA0..=0xFF).contains(&(c as u32)) => out.push(c as u32 as u8),
            _ => out.push(b'?'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_is_row_major_from_top() {
        let r = Rect {
            x: 0.0,
            y: 0.0,
            w: 100.0,
            h: 100.0,
        };
        let cells = r.grid(2, 2, 0.0);
        assert_eq!(cells.len(), 4);
        assert_eq!((cells[0].x, cells[0].y), (0.0, 50.0));
        assert_eq!((cells[1].x, cells[1].y), (50.0, 50.0));
        assert_eq!((cells[2].x, cells[2].y), (0.0, 0.0));
    }

    #[test]
    fn fit_preserves_aspect() {
        let area = Rect {
            x: 0.0,
            y: 0.0,
            w: 200.0,
            h: 100.0,
        };
        let r = area.fit(400.0, 400.0);
        assert_eq!((r.w, r.h), (100.0, 100.0));
        assert_eq!(r.x, 50.0);
    }

    #[test]
    fn wrap_breaks_on_words() {
        assert_eq!(wrap("one two three four", 9), vec!["one two", "three", "four"]);
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap("a\nb", 10), vec!["a", "b"]);
    }

    #[test]
    fn win_ansi_maps_typography() {
        assert_eq!(win_ansi("caf\u{e9} \u{201C}x\u{201D}"), b"caf\xe9 \"x\"".to_vec());
        assert_eq!(win_ansi("\u{4e2d}"), b"?".to_vec());
    }

    #[test]
    fn ellipsize_limits_length() {
        assert_eq!(ellipsize("abcdefgh", 6), "abc...");
        assert_eq!(ellipsize("abc", 6), "abc");
    }
}
