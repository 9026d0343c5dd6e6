//! Flow linearisation shared by the DOCX and Markdown writers.
//!
//! Flow formats have no fixed pages, so the page plan collapses back into
//! one block run per page kind, in page order. Padding and part counters
//! disappear; tables and charts become one-line summaries; list values
//! become enumerated lists.

use crate::document::{PageKind, ReportDocument};
use crate::model::{FieldValue, SectionBody};
use crate::pipeline::text::paragraphs;
use serde::Serialize;

/// One block of flowing output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "block", rename_all = "snake_case")]
pub enum FlowBlock {
    Heading { level: u8, text: String },
    Paragraph(String),
    /// `label: value`; an empty value prints the label alone.
    Field { label: String, value: String },
    List { ordered: bool, items: Vec<String> },
    Image { caption: String, reference: String },
}

/// Walk `document` in page order and emit its flow blocks.
pub fn linearize(document: &ReportDocument) -> Vec<FlowBlock> {
    let mut blocks = Vec::new();

    for page in document.pages().iter().filter(|p| p.part == 1) {
        if page.kind == PageKind::Cover {
            cover(document, &mut blocks);
            continue;
        }

        blocks.push(FlowBlock::Heading {
            level: 2,
            text: document.kind_heading(&page.kind),
        });
        if page.is_notice() {
            blocks.push(FlowBlock::Paragraph(
                document.notice_text(&page.kind).to_string(),
            ));
            continue;
        }

        match &page.kind {
            PageKind::Cover => {}
            PageKind::Table { table } => {
                if let Some(table) = document.table(table) {
                    let noun = if table.row_count() == 1 { "row" } else { "rows" };
                    blocks.push(FlowBlock::Paragraph(format!(
                        "{} {} ({})",
                        table.row_count(),
                        noun,
                        table.columns.join(", ")
                    )));
                }
            }
            PageKind::Charts => {
                for aggregate in document.aggregates() {
                    blocks.push(FlowBlock::Field {
                        label: aggregate.question_label.clone(),
                        value: aggregate.summary(),
                    });
                }
            }
            PageKind::Images { bucket } => {
                if let Some(bucket) = document.bucket(bucket) {
                    for img in &bucket.images {
                        blocks.push(FlowBlock::Image {
                            caption: img.file_name.clone(),
                            reference: img.reference.clone(),
                        });
                    }
                }
            }
            PageKind::Sections => {
                for section in document.sections() {
                    blocks.push(FlowBlock::Heading {
                        level: 3,
                        text: section.title.clone(),
                    });
                    match &section.body {
                        SectionBody::Text(text) => {
                            blocks.extend(paragraphs(text).into_iter().map(FlowBlock::Paragraph));
                        }
                        SectionBody::Items(items) => blocks.push(FlowBlock::List {
                            ordered: true,
                            items: items.clone(),
                        }),
                    }
                }
            }
        }
    }

    blocks
}

fn cover(document: &ReportDocument, blocks: &mut Vec<FlowBlock>) {
    blocks.push(FlowBlock::Heading {
        level: 1,
        text: document.title().to_string(),
    });
    if document.title() != document.schema().display_name {
        blocks.push(FlowBlock::Paragraph(document.schema().display_name.clone()));
    }
    for field in document.fields() {
        match &field.value {
            None => blocks.push(FlowBlock::Field {
                label: field.label.clone(),
                value: "-".to_string(),
            }),
            Some(FieldValue::Text(text)) => blocks.push(FlowBlock::Field {
                label: field.label.clone(),
                value: text.clone(),
            }),
            Some(FieldValue::List(items)) => {
                blocks.push(FlowBlock::Field {
                    label: field.label.clone(),
                    value: String::new(),
                });
                blocks.push(FlowBlock::List {
                    ordered: true,
                    items: items.clone(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{BucketImages, ReportContent};
    use crate::model::{
        CategorizedImage, ChartArtifact, ChartContent, QuestionAggregate, ResponseCounts, Section,
    };
    use crate::schema::ReportKind;

    fn team_images(n: usize) -> BucketImages {
        BucketImages {
            bucket: "team".into(),
            title: "Team".into(),
            images: (0..n)
                .map(|i| CategorizedImage {
                    category: "team".into(),
                    reference: format!("team/{i}.jpg"),
                    file_name: format!("{i}.jpg"),
                    ordinal: i,
                })
                .collect(),
        }
    }

    #[test]
    fn multi_page_bucket_is_one_run() {
        let schema = ReportKind::Feedback.schema();
        let content = ReportContent {
            images: vec![team_images(9)],
            ..Default::default()
        };
        let doc = ReportDocument::assemble(&schema, content).unwrap();
        let blocks = linearize(&doc);

        let team_headings = blocks
            .iter()
            .filter(|b| matches!(b, FlowBlock::Heading { text, .. } if text == "Team"))
            .count();
        assert_eq!(team_headings, 1);

        let captions: Vec<_> = blocks
            .iter()
            .filter_map(|b| match b {
                FlowBlock::Image { caption, .. } => Some(caption.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(captions.len(), 9);
        assert_eq!(captions[0], "0.jpg");
        assert_eq!(captions[8], "8.jpg");
    }

    #[test]
    fn charts_become_summaries() {
        let schema = ReportKind::Feedback.schema();
        let mut counts = ResponseCounts::new();
        counts.record("Yes");
        let content = ReportContent {
            aggregates: vec![QuestionAggregate {
                question_label: "Useful?".into(),
                response_counts: counts,
            }],
            charts: vec![ChartArtifact {
                index: 0,
                title: "Useful?".into(),
                content: ChartContent::NoResponses,
            }],
            ..Default::default()
        };
        let doc = ReportDocument::assemble(&schema, content).unwrap();
        let blocks = linearize(&doc);
        assert!(blocks.contains(&FlowBlock::Field {
            label: "Useful?".into(),
            value: "Yes: 1 (1 responses)".into(),
        }));
    }

    #[test]
    fn empty_collections_keep_their_notice() {
        let schema = ReportKind::Event.schema();
        let doc = ReportDocument::assemble(&schema, ReportContent::default()).unwrap();
        let blocks = linearize(&doc);
        assert!(blocks.contains(&FlowBlock::Paragraph(
            "No photos were added to this category.".into()
        )));
        assert!(
            matches!(&blocks[0], FlowBlock::Heading { level: 1, text } if text == "Event Report")
        );
    }

    #[test]
    fn item_sections_become_ordered_lists() {
        let schema = ReportKind::Event.schema();
        let content = ReportContent {
            sections: vec![
                Section::items("Highlights", vec!["Demo".into(), "Q&A".into()]),
                Section::text("Notes", "one\n\ntwo"),
            ],
            ..Default::default()
        };
        let doc = ReportDocument::assemble(&schema, content).unwrap();
        let blocks = linearize(&doc);
        let pos = blocks
            .iter()
            .position(|b| matches!(b, FlowBlock::Heading { text, .. } if text == "Highlights"))
            .unwrap();
        assert_eq!(
            blocks[pos + 1],
            FlowBlock::List {
                ordered: true,
                items: vec!["Demo".into(), "Q&A".into()],
            }
        );
        assert_eq!(blocks[pos + 3], FlowBlock::Paragraph("one".into()));
        assert_eq!(blocks[pos + 4], FlowBlock::Paragraph("two".into()));
    }
}
