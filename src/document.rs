//! The assembled, render-ready report.
//!
//! A [`ReportDocument`] is the page plan produced by the layout engine plus
//! the content collections the pages slice into. It is built fresh for every
//! export by [`ReportDocument::assemble`] and has no mutating accessors; both
//! backends read the same value.

use crate::error::ComposeError;
use crate::model::{
    CategorizedImage, ChartArtifact, FieldValue, QuestionAggregate, ScalarField, Section,
    SectionBody, TableData,
};
use crate::pipeline::layout::{LayoutInput, PageLayoutEngine};
use crate::pipeline::text::normalise_text;
use crate::schema::ReportSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::debug;

/// What a page shows. Each variant has its own slot capacity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageKind {
    /// Title and scalar fields.
    Cover,
    /// One whole table; never split across pages.
    Table { table: String },
    /// Question charts.
    Charts,
    /// Photo grid for one bucket.
    Images { bucket: String },
    /// User-added free-text sections.
    Sections,
}

/// One slot on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Index into the page kind's source collection.
    Filled(usize),
    /// Padding that keeps the last page of a kind uniform.
    Padding,
}

/// One fixed-capacity page of the final document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDescriptor {
    pub kind: PageKind,
    /// Contiguous slice of the source collection shown on this page.
    pub content: Range<usize>,
    pub capacity: usize,
    /// 1-based position among pages of the same kind.
    pub part: usize,
    /// Number of pages of this kind.
    pub parts: usize,
}

impl PageDescriptor {
    pub fn filled_count(&self) -> usize {
        self.content.len()
    }

    /// Empty-collection page: renders a "no data" notice instead of slots.
    /// The cover holds no collection and is never a notice.
    pub fn is_notice(&self) -> bool {
        self.kind != PageKind::Cover && self.content.is_empty()
    }

    pub fn padding_count(&self) -> usize {
        self.capacity.saturating_sub(self.filled_count())
    }

    /// Filled slots in source order followed by padding up to capacity.
    ///
    /// Notice pages yield no slots.
    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        let padding = if self.is_notice() {
            0
        } else {
            self.padding_count()
        };
        self.content
            .clone()
            .map(Slot::Filled)
            .chain(std::iter::repeat(Slot::Padding).take(padding))
    }
}

/// The photos of one bucket, in ordinal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketImages {
    pub bucket: String,
    pub title: String,
    pub images: Vec<CategorizedImage>,
}

/// Everything a generation request supplies. Consumed by
/// [`ReportDocument::assemble`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportContent {
    pub fields: BTreeMap<String, FieldValue>,
    pub tables: Vec<TableData>,
    pub aggregates: Vec<QuestionAggregate>,
    pub charts: Vec<ChartArtifact>,
    pub images: Vec<BucketImages>,
    pub sections: Vec<Section>,
}

/// The complete, ordered, render-ready report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDocument {
    title: String,
    schema: ReportSchema,
    fields: Vec<ScalarField>,
    pages: Vec<PageDescriptor>,
    tables: Vec<TableData>,
    aggregates: Vec<QuestionAggregate>,
    charts: Vec<ChartArtifact>,
    images: Vec<BucketImages>,
    sections: Vec<Section>,
}

impl ReportDocument {
    /// Validate `content` against `schema`, normalise free text and compute
    /// the page plan.
    ///
    /// # Errors
    /// [`ComposeError::InvariantViolation`] when the content breaks a pipeline
    /// contract (chart/aggregate count mismatch, out-of-order artifacts,
    /// tables or buckets the schema does not declare).
    pub fn assemble(schema: &ReportSchema, content: ReportContent) -> Result<Self, ComposeError> {
        let ReportContent {
            fields,
            tables,
            aggregates,
            charts,
            images,
            sections,
        } = content;

        if charts.len() != aggregates.len() {
            return Err(ComposeError::InvariantViolation(format!(
                "{} chart artifacts for {} question aggregates",
                charts.len(),
                aggregates.len()
            )));
        }
        if let Some((pos, artifact)) = charts
            .iter()
            .enumerate()
            .find(|(pos, a)| a.index != *pos)
        {
            return Err(ComposeError::InvariantViolation(format!(
                "chart artifact at position {pos} carries index {}",
                artifact.index
            )));
        }
        for bucket in &images {
            if let Some((pos, _)) = bucket
                .images
                .iter()
                .enumerate()
                .find(|(pos, img)| img.ordinal != *pos || img.category != bucket.bucket)
            {
                return Err(ComposeError::InvariantViolation(format!(
                    "image {pos} in bucket '{}' has a stale ordinal or category",
                    bucket.bucket
                )));
            }
        }

        for key in fields.keys() {
            if !schema.fields.iter().any(|f| &f.key == key) {
                debug!("Ignoring field '{}' not declared by '{}'", key, schema.kind);
            }
        }

        let scalar_fields: Vec<ScalarField> = schema
            .fields
            .iter()
            .map(|spec| ScalarField {
                key: spec.key.clone(),
                label: spec.label.clone(),
                value: fields
                    .get(&spec.key)
                    .filter(|v| !v.is_blank())
                    .map(normalise_field),
            })
            .collect();

        let title = schema
            .title_field
            .as_ref()
            .and_then(|key| fields.get(key))
            .and_then(|v| match v {
                FieldValue::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            })
            .unwrap_or_else(|| schema.display_name.clone());

        let sections: Vec<Section> = sections.into_iter().map(normalise_section).collect();

        // Buckets in schema order; a bucket the caller left out is empty.
        let mut ordered_images = Vec::with_capacity(schema.buckets.len());
        for spec in &schema.buckets {
            let found = images.iter().find(|b| b.bucket == spec.name);
            ordered_images.push(BucketImages {
                bucket: spec.name.clone(),
                title: spec.title.clone(),
                images: found.map(|b| b.images.clone()).unwrap_or_default(),
            });
        }

        let input = LayoutInput {
            image_counts: images
                .iter()
                .map(|b| (b.bucket.clone(), b.images.len()))
                .collect(),
            chart_count: charts.len(),
            section_count: sections.len(),
            table_rows: tables
                .iter()
                .map(|t| (t.name.clone(), t.row_count()))
                .collect(),
        };
        let pages = PageLayoutEngine::new(schema)?.plan(&input)?;

        Ok(Self {
            title,
            schema: schema.clone(),
            fields: scalar_fields,
            pages,
            tables,
            aggregates,
            charts,
            images: ordered_images,
            sections,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn schema(&self) -> &ReportSchema {
        &self.schema
    }

    pub fn fields(&self) -> &[ScalarField] {
        &self.fields
    }

    pub fn pages(&self) -> &[PageDescriptor] {
        &self.pages
    }

    pub fn tables(&self) -> &[TableData] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableData> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn aggregates(&self) -> &[QuestionAggregate] {
        &self.aggregates
    }

    pub fn charts(&self) -> &[ChartArtifact] {
        &self.charts
    }

    pub fn images(&self) -> &[BucketImages] {
        &self.images
    }

    pub fn bucket(&self, name: &str) -> Option<&BucketImages> {
        self.images.iter().find(|b| b.bucket == name)
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Every image reference in page order, deduplicated.
    pub fn image_references(&self) -> Vec<String> {
        let mut refs: Vec<String> = Vec::new();
        for bucket in &self.images {
            for img in &bucket.images {
                if !refs.contains(&img.reference) {
                    refs.push(img.reference.clone());
                }
            }
        }
        refs
    }

    /// Heading for a page, e.g. `Team (2/3)`.
    pub fn page_heading(&self, page: &PageDescriptor) -> String {
        let base = self.kind_heading(&page.kind);
        if page.parts > 1 {
            format!("{base} ({}/{})", page.part, page.parts)
        } else {
            base
        }
    }

    /// Heading for a page kind without the part counter.
    pub fn kind_heading(&self, kind: &PageKind) -> String {
        match kind {
            PageKind::Cover => self.title.clone(),
            PageKind::Table { table } => self
                .schema
                .table(table)
                .map(|t| t.title.clone())
                .unwrap_or_else(|| table.clone()),
            PageKind::Charts => self
                .schema
                .feedback
                .as_ref()
                .map(|f| f.title.clone())
                .unwrap_or_else(|| "Feedback".to_string()),
            PageKind::Images { bucket } => self
                .schema
                .bucket(bucket)
                .map(|b| b.title.clone())
                .unwrap_or_else(|| bucket.clone()),
            PageKind::Sections => "Additional Information".to_string(),
        }
    }

    /// Notice printed on an empty-collection page.
    pub fn notice_text(&self, kind: &PageKind) -> &'static str {
        match kind {
            PageKind::Cover => "",
            PageKind::Table { .. } => "No rows were uploaded for this table.",
            PageKind::Charts => "No feedback responses were collected.",
            PageKind::Images { .. } => "No photos were added to this category.",
            PageKind::Sections => "No additional sections were added.",
        }
    }
}

fn normalise_field(value: &FieldValue) -> FieldValue {
    match value {
        FieldValue::Text(s) => FieldValue::Text(normalise_text(s)),
        FieldValue::List(items) => FieldValue::List(
            items
                .iter()
                .map(|i| normalise_text(i))
                .filter(|i| !i.is_empty())
                .collect(),
        ),
    }
}

fn normalise_section(section: Section) -> Section {
    let body = match section.body {
        SectionBody::Text(s) => SectionBody::Text(normalise_text(&s)),
        SectionBody::Items(items) => SectionBody::Items(
            items
                .iter()
                .map(|i| normalise_text(i))
                .filter(|i| !i.is_empty())
                .collect(),
        ),
    };
    Section {
        title: normalise_text(&section.title),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChartContent, ResponseCounts};
    use crate::schema::ReportKind;

    fn empty_aggregate(label: &str) -> QuestionAggregate {
        QuestionAggregate {
            question_label: label.into(),
            response_counts: ResponseCounts::new(),
        }
    }

    #[test]
    fn slots_pad_last_page() {
        let page = PageDescriptor {
            kind: PageKind::Images {
                bucket: "team".into(),
            },
            content: 8..9,
            capacity: 4,
            part: 3,
            parts: 3,
        };
        let slots: Vec<_> = page.slots().collect();
        assert_eq!(
            slots,
            vec![Slot::Filled(8), Slot::Padding, Slot::Padding, Slot::Padding]
        );
    }

    #[test]
    fn notice_page_has_no_slots() {
        let page = PageDescriptor {
            kind: PageKind::Charts,
            content: 0..0,
            capacity: 2,
            part: 1,
            parts: 1,
        };
        assert!(page.is_notice());
        assert_eq!(page.slots().count(), 0);
    }

    #[test]
    fn cover_is_not_a_notice_page() {
        let schema = ReportKind::Event.schema();
        let doc = ReportDocument::assemble(&schema, ReportContent::default()).unwrap();
        let cover = &doc.pages()[0];
        assert_eq!(cover.kind, PageKind::Cover);
        assert!(cover.content.is_empty());
        assert!(!cover.is_notice());
        assert!(doc.pages()[1..].iter().all(|p| p.is_notice()));
    }

    #[test]
    fn assemble_rejects_chart_count_mismatch() {
        let schema = ReportKind::Feedback.schema();
        let content = ReportContent {
            aggregates: vec![empty_aggregate("Q1?"), empty_aggregate("Q2?")],
            charts: vec![ChartArtifact {
                index: 0,
                title: "Q1?".into(),
                content: ChartContent::NoResponses,
            }],
            ..Default::default()
        };
        let err = ReportDocument::assemble(&schema, content).unwrap_err();
        assert!(matches!(err, ComposeError::InvariantViolation(_)));
    }

    #[test]
    fn title_comes_from_title_field() {
        let schema = ReportKind::Event.schema();
        let mut content = ReportContent::default();
        content
            .fields
            .insert("event_name".into(), FieldValue::from("  Hack Night "));
        content
            .fields
            .insert("venue".into(), FieldValue::from("Hall A\r\n"));
        let doc = ReportDocument::assemble(&schema, content).unwrap();
        assert_eq!(doc.title(), "Hack Night");
        let venue = doc.fields().iter().find(|f| f.key == "venue").unwrap();
        assert_eq!(venue.value, Some(FieldValue::Text("Hall A".into())));
        let date = doc.fields().iter().find(|f| f.key == "event_date").unwrap();
        assert_eq!(date.value, None);
    }

    #[test]
    fn missing_title_falls_back_to_display_name() {
        let schema = ReportKind::Assessment.schema();
        let doc = ReportDocument::assemble(&schema, ReportContent::default()).unwrap();
        assert_eq!(doc.title(), "Assessment Report");
        // cover + performance + charts + 3 buckets + sections
        assert_eq!(doc.pages().len(), 7);
    }

    #[test]
    fn page_heading_shows_part_counter() {
        let schema = ReportKind::Event.schema();
        let doc = ReportDocument::assemble(&schema, ReportContent::default()).unwrap();
        let page = PageDescriptor {
            kind: PageKind::Images {
                bucket: "general".into(),
            },
            content: 0..4,
            capacity: 4,
            part: 2,
            parts: 3,
        };
        assert_eq!(doc.page_heading(&page), "Event Photos (2/3)");
    }
}
