//! Declarative per-kind report schemas.
//!
//! Everything that differs between report kinds — required spreadsheet
//! columns, image buckets and their page capacities, the scalar fields shown
//! on the cover — lives in a [`ReportSchema`] value. The layout engine, the
//! ingestor and both renderers are written once against this description.
//!
//! Three built-in kinds are provided through [`ReportKind`]; callers with
//! other needs can build a `ReportSchema` directly.

use serde::{Deserialize, Serialize};

/// Default number of photographs on one image-grid page (2 × 2).
pub const DEFAULT_IMAGE_CAPACITY: usize = 4;
/// Default number of question charts on one chart page.
pub const DEFAULT_CHART_CAPACITY: usize = 2;
/// Default number of extra sections on one section page.
pub const DEFAULT_SECTION_CAPACITY: usize = 2;

/// Normalise a header for comparison: trimmed, lower-cased, inner
/// whitespace collapsed to single spaces.
pub fn normalize_header(header: &str) -> String {
    header
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A required spreadsheet column and the alternative spellings accepted
/// for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Canonical name; reported in `missing_columns` and used for lookups.
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    /// True when `header` spells this column or one of its aliases.
    pub fn matches(&self, header: &str) -> bool {
        let header = normalize_header(header);
        normalize_header(&self.name) == header
            || self.aliases.iter().any(|a| normalize_header(a) == header)
    }
}

/// How survey-question columns are told apart from metadata columns.
///
/// The marker heuristic is fragile: a non-question header that happens to
/// contain the marker is classified as a question. It is kept as an explicit,
/// named policy so that changing it is a visible decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionColumnPolicy {
    /// A column is a question when its header contains this character.
    HeaderContains(char),
}

impl Default for QuestionColumnPolicy {
    fn default() -> Self {
        QuestionColumnPolicy::HeaderContains('?')
    }
}

impl QuestionColumnPolicy {
    pub fn is_question(&self, header: &str) -> bool {
        match self {
            QuestionColumnPolicy::HeaderContains(marker) => header.contains(*marker),
        }
    }

    /// Human-readable requirement, used in validation errors.
    pub fn describe(&self) -> String {
        match self {
            QuestionColumnPolicy::HeaderContains(marker) => {
                format!("any column containing '{marker}'")
            }
        }
    }
}

/// What a spreadsheet's header row must contain to be accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SheetRequirement {
    /// Every listed column must be present (case-insensitive, alias-aware).
    Columns(Vec<ColumnSpec>),
    /// At least one header must be classified as a question column.
    QuestionColumns(QuestionColumnPolicy),
}

/// A tabular section of the report (attendance, marks, …).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Stable identifier, used as the page-kind key.
    pub name: String,
    /// Heading printed above the table.
    pub title: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn requirement(&self) -> SheetRequirement {
        SheetRequirement::Columns(self.columns.clone())
    }
}

/// Survey feedback settings for kinds that carry charts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackSchema {
    pub title: String,
    #[serde(default)]
    pub policy: QuestionColumnPolicy,
}

impl FeedbackSchema {
    pub fn requirement(&self) -> SheetRequirement {
        SheetRequirement::QuestionColumns(self.policy)
    }
}

/// A named photo bucket. Each bucket lays out as its own run of image-grid
/// pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSpec {
    pub name: String,
    pub title: String,
    pub capacity: usize,
}

impl BucketSpec {
    pub fn new(name: &str, title: &str) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            capacity: DEFAULT_IMAGE_CAPACITY,
        }
    }
}

/// A scalar form field shown on the cover page, in template order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub key: String,
    pub label: String,
}

impl FieldSpec {
    pub fn new(key: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
        }
    }
}

/// Complete declarative description of one report kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSchema {
    /// Machine name of the kind, e.g. `"event"`.
    pub kind: String,
    /// Fallback document title, e.g. `"Event Report"`.
    pub display_name: String,
    /// Field whose value, when present, becomes the document title.
    pub title_field: Option<String>,
    pub fields: Vec<FieldSpec>,
    pub tables: Vec<TableSchema>,
    pub feedback: Option<FeedbackSchema>,
    pub buckets: Vec<BucketSpec>,
    pub chart_capacity: usize,
    pub section_capacity: usize,
}

impl ReportSchema {
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn bucket(&self, name: &str) -> Option<&BucketSpec> {
        self.buckets.iter().find(|b| b.name == name)
    }

    pub fn bucket_names(&self) -> Vec<String> {
        self.buckets.iter().map(|b| b.name.clone()).collect()
    }
}

/// Built-in report kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// Event report: attendance table, feedback charts, team / winners /
    /// certificates / general photos.
    Event,
    /// Assessment report: performance (marks) table, feedback charts, team /
    /// question-set / documents photos.
    Assessment,
    /// Feedback-only report: charts plus team / general photos.
    Feedback,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Event => "event",
            ReportKind::Assessment => "assessment",
            ReportKind::Feedback => "feedback",
        }
    }

    pub fn schema(&self) -> ReportSchema {
        match self {
            ReportKind::Event => event_schema(),
            ReportKind::Assessment => assessment_schema(),
            ReportKind::Feedback => feedback_only_schema(),
        }
    }
}

impl std::str::FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "event" => Ok(ReportKind::Event),
            "assessment" => Ok(ReportKind::Assessment),
            "feedback" => Ok(ReportKind::Feedback),
            other => Err(format!(
                "unknown report kind '{other}' (expected event, assessment or feedback)"
            )),
        }
    }
}

/// Attendance sheet columns: `Sr No`, `Full Name`, `User Action`, `TimeStamp`.
pub fn attendance_table() -> TableSchema {
    TableSchema {
        name: "attendance".into(),
        title: "Attendance".into(),
        columns: vec![
            ColumnSpec::new("Sr No")
                .with_aliases(&["Sr. No", "Sr. No.", "S.No", "S. No", "Serial No"]),
            ColumnSpec::new("Full Name").with_aliases(&["Participant Name", "Student Name"]),
            ColumnSpec::new("User Action").with_aliases(&["Action"]),
            ColumnSpec::new("TimeStamp").with_aliases(&["Time Stamp", "Date Time"]),
        ],
    }
}

/// Performance sheet columns: `Sr No`, `Roll Number`, `Name`, `Marks`.
pub fn performance_table() -> TableSchema {
    TableSchema {
        name: "performance".into(),
        title: "Performance".into(),
        columns: vec![
            ColumnSpec::new("Sr No")
                .with_aliases(&["Sr. No", "Sr. No.", "S.No", "S. No", "Serial No"]),
            ColumnSpec::new("Roll Number").with_aliases(&["Roll No", "Roll No.", "Roll"]),
            ColumnSpec::new("Name").with_aliases(&["Student Name"]),
            ColumnSpec::new("Marks").with_aliases(&["Score", "Marks Obtained"]),
        ],
    }
}

fn feedback_section() -> FeedbackSchema {
    FeedbackSchema {
        title: "Feedback".into(),
        policy: QuestionColumnPolicy::default(),
    }
}

fn event_schema() -> ReportSchema {
    ReportSchema {
        kind: "event".into(),
        display_name: "Event Report".into(),
        title_field: Some("event_name".into()),
        fields: vec![
            FieldSpec::new("event_name", "Event"),
            FieldSpec::new("event_date", "Date"),
            FieldSpec::new("venue", "Venue"),
            FieldSpec::new("organized_by", "Organized by"),
            FieldSpec::new("description", "Description"),
            FieldSpec::new("objectives", "Objectives"),
            FieldSpec::new("outcomes", "Outcomes"),
        ],
        tables: vec![attendance_table()],
        feedback: Some(feedback_section()),
        buckets: vec![
            BucketSpec::new("team", "Team"),
            BucketSpec::new("winners", "Winners"),
            BucketSpec::new("certificates", "Certificates"),
            BucketSpec::new("general", "Event Photos"),
        ],
        chart_capacity: DEFAULT_CHART_CAPACITY,
        section_capacity: DEFAULT_SECTION_CAPACITY,
    }
}

fn assessment_schema() -> ReportSchema {
    ReportSchema {
        kind: "assessment".into(),
        display_name: "Assessment Report".into(),
        title_field: Some("assessment_name".into()),
        fields: vec![
            FieldSpec::new("assessment_name", "Assessment"),
            FieldSpec::new("assessment_date", "Date"),
            FieldSpec::new("subject", "Subject"),
            FieldSpec::new("conducted_by", "Conducted by"),
            FieldSpec::new("summary", "Summary"),
            FieldSpec::new("topics", "Topics covered"),
        ],
        tables: vec![performance_table()],
        feedback: Some(feedback_section()),
        buckets: vec![
            BucketSpec::new("team", "Team"),
            BucketSpec::new("question-set", "Question Set"),
            BucketSpec::new("documents", "Documents"),
        ],
        chart_capacity: DEFAULT_CHART_CAPACITY,
        section_capacity: DEFAULT_SECTION_CAPACITY,
    }
}

fn feedback_only_schema() -> ReportSchema {
    ReportSchema {
        kind: "feedback".into(),
        display_name: "Feedback Report".into(),
        title_field: Some("session_name".into()),
        fields: vec![
            FieldSpec::new("session_name", "Session"),
            FieldSpec::new("session_date", "Date"),
            FieldSpec::new("facilitator", "Facilitator"),
            FieldSpec::new("summary", "Summary"),
        ],
        tables: Vec::new(),
        feedback: Some(feedback_section()),
        buckets: vec![
            BucketSpec::new("team", "Team"),
            BucketSpec::new("general", "Photos"),
        ],
        chart_capacity: DEFAULT_CHART_CAPACITY,
        section_capacity: DEFAULT_SECTION_CAPACITY,
    }
}
