//! Page layout: item counts in, ordered page descriptors out.
//!
//! The engine never looks at content, only at how many items each collection
//! holds. Every collection is cut into contiguous, fixed-capacity pages in
//! source order; the last page of a kind keeps the full capacity and the
//! renderer pads the unused slots. Tables are the exception: one page per
//! table regardless of row count.
//!
//! ```text
//! cover │ tables… │ charts… │ bucket 1… │ bucket 2… │ … │ sections…
//! ```

use crate::document::{PageDescriptor, PageKind};
use crate::error::ComposeError;
use crate::schema::ReportSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Collection sizes the plan is computed from.
///
/// Buckets and tables absent from the lists count as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutInput {
    pub image_counts: Vec<(String, usize)>,
    pub chart_count: usize,
    pub section_count: usize,
    pub table_rows: Vec<(String, usize)>,
}

/// Pagination over one [`ReportSchema`].
#[derive(Debug, Clone, Copy)]
pub struct PageLayoutEngine<'a> {
    schema: &'a ReportSchema,
}

impl<'a> PageLayoutEngine<'a> {
    /// Bind the engine to a schema, rejecting zero capacities and duplicate
    /// bucket or table names.
    pub fn new(schema: &'a ReportSchema) -> Result<Self, ComposeError> {
        if schema.chart_capacity == 0 {
            return Err(ComposeError::InvariantViolation(
                "chart page capacity must be at least 1".into(),
            ));
        }
        if schema.section_capacity == 0 {
            return Err(ComposeError::InvariantViolation(
                "section page capacity must be at least 1".into(),
            ));
        }
        if let Some(bucket) = schema.buckets.iter().find(|b| b.capacity == 0) {
            return Err(ComposeError::InvariantViolation(format!(
                "bucket '{}' has zero capacity",
                bucket.name
            )));
        }
        ensure_unique("bucket", schema.buckets.iter().map(|b| b.name.as_str()))?;
        ensure_unique("table", schema.tables.iter().map(|t| t.name.as_str()))?;
        Ok(Self { schema })
    }

    /// Compute the full page sequence.
    ///
    /// # Errors
    /// [`ComposeError::InvariantViolation`] for counts naming an unknown or
    /// repeated bucket/table, or charts on a schema without feedback.
    pub fn plan(&self, input: &LayoutInput) -> Result<Vec<PageDescriptor>, ComposeError> {
        let schema = self.schema;

        ensure_unique("bucket", input.image_counts.iter().map(|(n, _)| n.as_str()))?;
        ensure_unique("table", input.table_rows.iter().map(|(n, _)| n.as_str()))?;
        if let Some((name, _)) = input
            .image_counts
            .iter()
            .find(|(n, _)| schema.bucket(n).is_none())
        {
            return Err(ComposeError::InvariantViolation(format!(
                "image count for unknown bucket '{name}'"
            )));
        }
        if let Some((name, _)) = input
            .table_rows
            .iter()
            .find(|(n, _)| schema.table(n).is_none())
        {
            return Err(ComposeError::InvariantViolation(format!(
                "row count for unknown table '{name}'"
            )));
        }
        if schema.feedback.is_none() && input.chart_count > 0 {
            return Err(ComposeError::InvariantViolation(format!(
                "{} charts supplied but '{}' has no feedback section",
                input.chart_count, schema.kind
            )));
        }

        let mut pages = vec![PageDescriptor {
            kind: PageKind::Cover,
            content: 0..0,
            capacity: 0,
            part: 1,
            parts: 1,
        }];

        for table in &schema.tables {
            let rows = lookup(&input.table_rows, &table.name);
            pages.push(PageDescriptor {
                kind: PageKind::Table {
                    table: table.name.clone(),
                },
                content: 0..rows,
                capacity: rows.max(1),
                part: 1,
                parts: 1,
            });
        }

        if schema.feedback.is_some() {
            pages.extend(paginate(
                PageKind::Charts,
                input.chart_count,
                schema.chart_capacity,
            ));
        }

        for bucket in &schema.buckets {
            pages.extend(paginate(
                PageKind::Images {
                    bucket: bucket.name.clone(),
                },
                lookup(&input.image_counts, &bucket.name),
                bucket.capacity,
            ));
        }

        pages.extend(paginate(
            PageKind::Sections,
            input.section_count,
            schema.section_capacity,
        ));

        debug!(
            "Planned {} pages for '{}' ({} charts, {} sections)",
            pages.len(),
            schema.kind,
            input.chart_count,
            input.section_count
        );
        Ok(pages)
    }
}

/// Cut `count` items into `ceil(count / capacity)` pages, or one notice page
/// when `count` is zero. `capacity` must be non-zero.
fn paginate(kind: PageKind, count: usize, capacity: usize) -> Vec<PageDescriptor> {
    if count == 0 {
        return vec![PageDescriptor {
            kind,
            content: 0..0,
            capacity,
            part: 1,
            parts: 1,
        }];
    }
    let parts = count.div_ceil(capacity);
    (0..parts)
        .map(|i| {
            let start = i * capacity;
            PageDescriptor {
                kind: kind.clone(),
                content: start..(start + capacity).min(count),
                capacity,
                part: i + 1,
                parts,
            }
        })
        .collect()
}

fn lookup(counts: &[(String, usize)], name: &str) -> usize {
    counts
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, c)| *c)
        .unwrap_or(0)
}

fn ensure_unique<'n>(
    what: &str,
    names: impl Iterator<Item = &'n str>,
) -> Result<(), ComposeError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ComposeError::InvariantViolation(format!(
                "duplicate {what} name '{name}'"
            )));
        }
    }
    Ok(())
}

/// Plan pages for `schema` without binding an engine.
pub fn plan_pages(
    schema: &ReportSchema,
    input: &LayoutInput,
) -> Result<Vec<PageDescriptor>, ComposeError> {
    PageLayoutEngine::new(schema)?.plan(input)
}
