//! Plain data values flowing through the composition pipeline.
//!
//! Everything here is an immutable value once built: rows come out of the
//! ingestor, aggregates out of the aggregator, artifacts out of the capture
//! orchestrator. Nothing is patched in place; new uploads produce new values.

use crate::error::ArtifactError;
use crate::schema::normalize_header;
use serde::{Deserialize, Serialize};

// ── Spreadsheet rows ─────────────────────────────────────────────────────

/// One parsed spreadsheet record.
///
/// Cells keep the source column order. Lookups accept either the header as
/// it appeared in the file or the canonical name of a required column, so
/// `row.get("Sr No")` works even when the sheet spelled it `S.No`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTableRow {
    cells: Vec<(String, String)>,
    canonical: Vec<(String, usize)>,
}

impl RawTableRow {
    pub(crate) fn new(cells: Vec<(String, String)>, canonical: Vec<(String, usize)>) -> Self {
        Self { cells, canonical }
    }

    /// Value for `key`, matched case-insensitively against canonical column
    /// names first and source headers second. Empty cells return `Some("")`.
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = normalize_header(key);
        self.canonical
            .iter()
            .find(|(name, _)| normalize_header(name) == key)
            .and_then(|(_, idx)| self.cells.get(*idx))
            .or_else(|| {
                self.cells
                    .iter()
                    .find(|(header, _)| normalize_header(header) == key)
            })
            .map(|(_, value)| value.as_str())
    }

    /// `(header, value)` pairs in source column order.
    pub fn cells(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells.iter().map(|(h, v)| (h.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// A fully ingested sheet: header row plus data rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableData {
    /// Table identifier from the schema (`"attendance"`, `"feedback"`, …).
    pub name: String,
    /// Header cells in source order.
    pub columns: Vec<String>,
    pub rows: Vec<RawTableRow>,
}

impl TableData {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ── Survey aggregates ────────────────────────────────────────────────────

/// Response → count tally in first-seen order.
///
/// Order is significant: it drives chart bar order and legend order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCounts(Vec<(String, usize)>);

impl ResponseCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence of `response`, appending it if unseen.
    pub fn record(&mut self, response: &str) {
        match self.0.iter_mut().find(|(r, _)| r == response) {
            Some((_, count)) => *count += 1,
            None => self.0.push((response.to_string(), 1)),
        }
    }

    pub fn get(&self, response: &str) -> Option<usize> {
        self.0.iter().find(|(r, _)| r == response).map(|(_, c)| *c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(r, c)| (r.as_str(), *c))
    }

    pub fn total(&self) -> usize {
        self.0.iter().map(|(_, c)| c).sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Frequency tally of one survey question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAggregate {
    pub question_label: String,
    pub response_counts: ResponseCounts,
}

impl QuestionAggregate {
    /// One-line textual summary, e.g. `Yes: 3, No: 1 (4 responses)`.
    pub fn summary(&self) -> String {
        if self.response_counts.is_empty() {
            return "No responses".to_string();
        }
        let parts: Vec<String> = self
            .response_counts
            .iter()
            .map(|(r, c)| format!("{r}: {c}"))
            .collect();
        format!(
            "{} ({} responses)",
            parts.join(", "),
            self.response_counts.total()
        )
    }
}

// ── Chart artifacts ──────────────────────────────────────────────────────

/// What a chart slot shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChartContent {
    /// Both views rasterised to PNG.
    Rendered {
        #[serde(with = "b64")]
        distribution: Vec<u8>,
        #[serde(with = "b64")]
        proportion: Vec<u8>,
    },
    /// The question had no non-empty answers; nothing to draw.
    NoResponses,
    /// Capture failed; the slot shows a placeholder.
    Placeholder { error: ArtifactError },
}

/// Rasterised charts for one [`QuestionAggregate`], at the same index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartArtifact {
    pub index: usize,
    pub title: String,
    pub content: ChartContent,
}

impl ChartArtifact {
    pub fn is_placeholder(&self) -> bool {
        matches!(self.content, ChartContent::Placeholder { .. })
    }

    pub fn is_rendered(&self) -> bool {
        matches!(self.content, ChartContent::Rendered { .. })
    }
}

// ── Photos ───────────────────────────────────────────────────────────────

/// A photograph assigned to a named bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorizedImage {
    pub category: String,
    /// Hosted reference: local path, `http(s)://` URL or `data:` URI.
    pub reference: String,
    /// Original upload file name.
    pub file_name: String,
    /// Zero-based position within the category; always contiguous.
    pub ordinal: usize,
}

// ── Free text ────────────────────────────────────────────────────────────

/// Body of a user-added section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectionBody {
    Text(String),
    Items(Vec<String>),
}

/// A user-added section; the report keeps them in user order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub body: SectionBody,
}

impl Section {
    pub fn text(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: SectionBody::Text(body.into()),
        }
    }

    pub fn items(title: impl Into<String>, items: Vec<String>) -> Self {
        Self {
            title: title.into(),
            body: SectionBody::Items(items),
        }
    }
}

/// Value of a scalar form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.iter().all(|i| i.trim().is_empty()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        FieldValue::List(items)
    }
}

/// A field as it appears on the cover: template label plus value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarField {
    pub key: String,
    pub label: String,
    pub value: Option<FieldValue>,
}

/// Serde adapter storing raster bytes as base64 strings.
pub(crate) mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> RawTableRow {
        RawTableRow::new(
            vec![
                ("S.No".into(), "1".into()),
                ("Full Name".into(), "Asha".into()),
            ],
            vec![("Sr No".into(), 0), ("Full Name".into(), 1)],
        )
    }

    #[test]
    fn row_lookup_by_canonical_alias_and_header() {
        let r = row();
        assert_eq!(r.get("Sr No"), Some("1"));
        assert_eq!(r.get("sr no"), Some("1"));
        assert_eq!(r.get("s.no"), Some("1"));
        assert_eq!(r.get("FULL NAME"), Some("Asha"));
        assert_eq!(r.get("Email"), None);
    }

    #[test]
    fn response_counts_keep_first_seen_order() {
        let mut counts = ResponseCounts::new();
        for r in ["No", "Yes", "No", "Maybe", "Yes", "No"] {
            counts.record(r);
        }
        let order: Vec<_> = counts.iter().collect();
        assert_eq!(order, vec![("No", 3), ("Yes", 2), ("Maybe", 1)]);
        assert_eq!(counts.total(), 6);
    }

    #[test]
    fn aggregate_summary() {
        let mut counts = ResponseCounts::new();
        counts.record("Good");
        counts.record("Good");
        let agg = QuestionAggregate {
            question_label: "How was it?".into(),
            response_counts: counts,
        };
        assert_eq!(agg.summary(), "Good: 2 (2 responses)");

        let empty = QuestionAggregate {
            question_label: "Anything else?".into(),
            response_counts: ResponseCounts::new(),
        };
        assert_eq!(empty.summary(), "No responses");
    }

    #[test]
    fn rendered_chart_serialises_as_base64() {
        let artifact = ChartArtifact {
            index: 0,
            title: "Q".into(),
            content: ChartContent::Rendered {
                distribution: vec![1, 2, 3],
                proportion: vec![4],
            },
        };
        let json = serde_json::to_string(&artifact).unwrap();
        assert!(json.contains("\"AQID\""), "got: {json}");
        let back: ChartArtifact = serde_json::from_str(&json).unwrap();
        assert_eq!(back, artifact);
    }

    #[test]
    fn field_value_accepts_string_or_list() {
        let v: FieldValue = serde_json::from_str("\"Hall A\"").unwrap();
        assert_eq!(v, FieldValue::Text("Hall A".into()));
        let v: FieldValue = serde_json::from_str("[\"a\",\"b\"]").unwrap();
        assert_eq!(v, FieldValue::List(vec!["a".into(), "b".into()]));
        assert!(FieldValue::List(vec![" ".into()]).is_blank());
    }
}
