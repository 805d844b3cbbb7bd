//! Canonical record -> field-value payload.

use reelsync_core::{fields, CanonicalRecord, FieldValue, FieldValues};

pub const DIRECTOR_FALLBACK: &str = "N/A";
pub const SERIES_CATEGORY: &str = "TV Series";
pub const DESCRIPTION_MAX_CHARS: usize = 1000;
const ELLIPSIS: &str = "...";

/// Every mapped field except the status, which the pipeline owns.
pub fn map_canonical(canonical: &CanonicalRecord) -> FieldValues {
    let mut values = FieldValues::new();

    values.insert(
        fields::TITLE.to_string(),
        FieldValue::Title(canonical.title.clone()),
    );
    values.insert(
        fields::URL.to_string(),
        FieldValue::Url(canonical.external_id.detail_url()),
    );
    values.insert(
        fields::DIRECTOR.to_string(),
        FieldValue::Select(director_or_creator(canonical)),
    );

    if let Some(minutes) = canonical.duration_minutes {
        values.insert(fields::DURATION.to_string(), FieldValue::Number(minutes));
    }
    if let Some(rating) = canonical.rating {
        values.insert(fields::RATING.to_string(), FieldValue::Number(rating));
    }
    if let Some(description) = canonical.description.as_deref() {
        values.insert(
            fields::DESCRIPTION.to_string(),
            FieldValue::RichText(truncate_description(description)),
        );
    }

    let genres = genre_list(canonical);
    if !genres.is_empty() {
        values.insert(fields::GENRE.to_string(), FieldValue::MultiSelect(genres));
    }

    values
}

fn director_or_creator(canonical: &CanonicalRecord) -> String {
    canonical
        .primary_attribution
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .or_else(|| {
            canonical
                .secondary_attributions
                .iter()
                .map(|name| name.trim())
                .find(|name| !name.is_empty())
        })
        .unwrap_or(DIRECTOR_FALLBACK)
        .to_string()
}

fn genre_list(canonical: &CanonicalRecord) -> Vec<String> {
    let mut genres = Vec::with_capacity(canonical.categories.len() + 1);
    if canonical.is_series {
        genres.push(SERIES_CATEGORY.to_string());
    }
    genres.extend(
        canonical
            .categories
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string),
    );
    genres
}

/// Cap at [`DESCRIPTION_MAX_CHARS`] characters, ending with `...` when cut.
pub fn truncate_description(text: &str) -> String {
    if text.chars().count() <= DESCRIPTION_MAX_CHARS {
        return text.to_string();
    }
    let keep = DESCRIPTION_MAX_CHARS - ELLIPSIS.chars().count();
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}
