//! Core domain model for reelsync: required schema, live schema view, canonical and target records.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "reelsync-core";

/// Canonical field names of the target database.
pub mod fields {
    pub const TITLE: &str = "Title";
    pub const URL: &str = "IMDB";
    pub const DIRECTOR: &str = "Director/Creator";
    pub const DURATION: &str = "Duration [min]";
    pub const RATING: &str = "IMDB Rating";
    pub const DESCRIPTION: &str = "Description";
    pub const GENRE: &str = "Genre";
    pub const SYNC_STATUS: &str = "Sync Status";
}

/// Detail-page URL template; `{id}` is replaced with the full external id (`tt...`).
pub const DETAIL_URL_TEMPLATE: &str = "https://www.imdb.com/title/{id}";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Title,
    Url,
    Select,
    MultiSelect,
    Number,
    RichText,
    /// Any kind the pipeline does not manage (date, checkbox, ...), kept verbatim.
    Other(String),
}

impl FieldKind {
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "title" => Self::Title,
            "url" => Self::Url,
            "select" => Self::Select,
            "multi_select" => Self::MultiSelect,
            "number" => Self::Number,
            "rich_text" => Self::RichText,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Self::Title => "title",
            Self::Url => "url",
            Self::Select => "select",
            Self::MultiSelect => "multi_select",
            Self::Number => "number",
            Self::RichText => "rich_text",
            Self::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub label: &'static str,
    pub color: &'static str,
}

/// Declared name, kind and (for choice kinds) option list of one required field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub options: &'static [SelectOption],
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            options: &[],
        }
    }

    pub const fn with_options(
        name: &'static str,
        kind: FieldKind,
        options: &'static [SelectOption],
    ) -> Self {
        Self {
            name,
            kind,
            options,
        }
    }
}

const SYNC_STATUS_OPTIONS: &[SelectOption] = &[
    SelectOption {
        label: SyncStatus::Updated.label(),
        color: "green",
    },
    SelectOption {
        label: SyncStatus::NotFound.label(),
        color: "red",
    },
    SelectOption {
        label: SyncStatus::Pending.label(),
        color: "gray",
    },
];

/// The full set of fields the pipeline needs in the target database.
pub fn required_schema() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new(fields::TITLE, FieldKind::Title),
        FieldSpec::new(fields::URL, FieldKind::Url),
        FieldSpec::new(fields::DIRECTOR, FieldKind::Select),
        FieldSpec::new(fields::DURATION, FieldKind::Number),
        FieldSpec::new(fields::RATING, FieldKind::Number),
        FieldSpec::new(fields::DESCRIPTION, FieldKind::RichText),
        FieldSpec::new(fields::GENRE, FieldKind::MultiSelect),
        FieldSpec::with_options(fields::SYNC_STATUS, FieldKind::Select, SYNC_STATUS_OPTIONS),
    ]
}

/// One field as currently present in the target database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveField {
    pub kind: FieldKind,
    #[serde(default)]
    pub options: Vec<String>,
}

impl LiveField {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            options: Vec::new(),
        }
    }
}

/// Field name -> observed field, read fresh at reconciliation time.
pub type LiveFieldSet = BTreeMap<String, LiveField>;

/// One additive schema change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SchemaChange {
    Create(FieldSpec),
    Rename { from: String, to: String },
}

impl SchemaChange {
    /// Name of the existing or new field this change is keyed on.
    pub fn key(&self) -> &str {
        match self {
            Self::Create(spec) => spec.name,
            Self::Rename { from, .. } => from,
        }
    }
}

/// Field names positively confirmed to exist in the target database.
///
/// Every optional behaviour (status tracking, filter clauses, written fields) is gated on
/// membership in this set; an empty set means "assume nothing".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AvailableFields {
    names: BTreeSet<String>,
}

impl AvailableFields {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn tracks_status(&self) -> bool {
        self.contains(fields::SYNC_STATUS)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for AvailableFields {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// External-source identifier in its full prefixed form, e.g. `tt0111161`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn detail_url(&self) -> String {
        DETAIL_URL_TEMPLATE.replace("{id}", &self.0)
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The external source's view of an item. Read-only; discarded after one mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub external_id: ExternalId,
    pub title: String,
    #[serde(default)]
    pub primary_attribution: Option<String>,
    #[serde(default)]
    pub secondary_attributions: Vec<String>,
    /// Running time in minutes.
    #[serde(default)]
    pub duration_minutes: Option<f64>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub is_series: bool,
}

/// The subset of an existing database record the pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub record_id: String,
    pub title: Option<String>,
    pub external_reference_url: Option<String>,
}

impl TargetRecord {
    /// Best human-readable label for log lines.
    pub fn label(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or(self.external_reference_url.as_deref())
            .unwrap_or(&self.record_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Updated,
    NotFound,
    Pending,
}

impl SyncStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Updated => "Updated",
            Self::NotFound => "Not Found",
            Self::Pending => "Pending",
        }
    }
}

/// A typed value for one field of a target record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldValue {
    Title(String),
    Url(String),
    Select(String),
    MultiSelect(Vec<String>),
    Number(f64),
    RichText(String),
}

/// Field name -> value payload for one record write.
pub type FieldValues = BTreeMap<String, FieldValue>;

/// Identifier of the queryable data source inside the target database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataSourceId(String);

impl DataSourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
