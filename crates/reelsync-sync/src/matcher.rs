//! Identity resolution for target records.

use std::sync::OnceLock;

use regex::Regex;
use reelsync_core::{ExternalId, TargetRecord};

/// Which lookup to run against the metadata source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    ById(ExternalId),
    ByTitle(String),
    Unresolvable,
}

pub fn external_id_from_url(url: &str) -> Option<ExternalId> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| Regex::new(r"tt\d+").expect("static pattern compiles"));
    re.find(url).map(|m| ExternalId::new(m.as_str()))
}

/// An embedded id in the url wins over the title; a url without an id falls through to the title.
pub fn resolve_identity(record: &TargetRecord) -> Identity {
    if let Some(id) = record
        .external_reference_url
        .as_deref()
        .and_then(external_id_from_url)
    {
        return Identity::ById(id);
    }

    match record.title.as_deref().map(str::trim) {
        Some(title) if !title.is_empty() => Identity::ByTitle(title.to_string()),
        _ => Identity::Unresolvable,
    }
}
