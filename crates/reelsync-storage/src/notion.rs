//! Notion data-source API implementation of [`RecordStore`].

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use reelsync_core::{
    fields, AvailableFields, DataSourceId, FieldKind, FieldSpec, FieldValue, FieldValues,
    LiveField, LiveFieldSet, SchemaChange, TargetRecord,
};
use reqwest::Method;
use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{HttpFetcher, RecordStore, StoreError};

pub const NOTION_API_BASE: &str = "https://api.notion.com/v1";
pub const NOTION_VERSION: &str = "2025-09-03";
const QUERY_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub api_base: String,
    pub token: String,
}

pub struct NotionStore {
    http: HttpFetcher,
    config: NotionConfig,
}

impl NotionStore {
    pub fn new(http: HttpFetcher, config: NotionConfig) -> Self {
        Self { http, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
    ) -> Result<JsonValue, StoreError> {
        let mut request = self
            .http
            .request(method, &self.url(path))
            .bearer_auth(&self.config.token)
            .header("Notion-Version", NOTION_VERSION);
        if let Some(body) = body {
            request = request.json(&body);
        }
        Ok(self.http.send_json(request).await?)
    }

    /// Resolve the queryable data source from a database URL, falling back to a name search.
    ///
    /// `Ok(None)` means neither input led to a data source.
    pub async fn resolve_location(
        &self,
        database_url: Option<&str>,
        database_name: Option<&str>,
    ) -> Result<Option<DataSourceId>, StoreError> {
        if let Some(url) = database_url {
            match database_id_from_url(url) {
                Some(database_id) => match self.data_source_for_database(&database_id).await {
                    Ok(Some(id)) => return Ok(Some(id)),
                    Ok(None) => {
                        warn!(%database_id, "database lists no data sources; using its id directly");
                        return Ok(Some(DataSourceId::new(database_id)));
                    }
                    Err(err) => {
                        warn!(%database_id, error = %err, "failed to resolve data source; using database id directly");
                        return Ok(Some(DataSourceId::new(database_id)));
                    }
                },
                None => warn!(url, "database url does not contain a database id"),
            }
        }

        match database_name {
            Some(name) => self.find_data_source_by_name(name).await,
            None => Ok(None),
        }
    }

    async fn data_source_for_database(
        &self,
        database_id: &str,
    ) -> Result<Option<DataSourceId>, StoreError> {
        let db = self
            .call(Method::GET, &format!("databases/{database_id}"), None)
            .await?;
        Ok(db
            .get("data_sources")
            .and_then(JsonValue::as_array)
            .and_then(|sources| sources.first())
            .and_then(|source| source.get("id"))
            .and_then(JsonValue::as_str)
            .map(DataSourceId::new))
    }

    async fn find_data_source_by_name(&self, name: &str) -> Result<Option<DataSourceId>, StoreError> {
        let body = json!({
            "query": name,
            "filter": { "property": "object", "value": "data_source" },
        });
        let found = self.call(Method::POST, "search", Some(body)).await?;
        Ok(found
            .get("results")
            .and_then(JsonValue::as_array)
            .and_then(|results| results.first())
            .and_then(|first| first.get("id"))
            .and_then(JsonValue::as_str)
            .map(DataSourceId::new))
    }
}

#[async_trait]
impl RecordStore for NotionStore {
    async fn read_fields(&self, location: &DataSourceId) -> Result<LiveFieldSet, StoreError> {
        let source = self
            .call(Method::GET, &format!("data_sources/{location}"), None)
            .await?;
        decode_live_fields(&source)
    }

    async fn write_fields(
        &self,
        location: &DataSourceId,
        changes: &[SchemaChange],
    ) -> Result<(), StoreError> {
        let body = json!({ "properties": encode_schema_changes(changes) });
        self.call(Method::PATCH, &format!("data_sources/{location}"), Some(body))
            .await?;
        Ok(())
    }

    async fn query_candidates(
        &self,
        location: &DataSourceId,
        available: &AvailableFields,
    ) -> Result<Vec<TargetRecord>, StoreError> {
        let filter = candidate_filter(available);
        let path = format!("data_sources/{location}/query");
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({ "page_size": QUERY_PAGE_SIZE, "filter": filter });
            if let Some(cursor) = &cursor {
                body["start_cursor"] = json!(cursor);
            }

            let page = self.call(Method::POST, &path, Some(body)).await?;
            let results = page
                .get("results")
                .and_then(JsonValue::as_array)
                .ok_or_else(|| StoreError::Payload("query response has no results array".into()))?;
            records.extend(results.iter().filter_map(decode_target_record));

            cursor = match page.get("has_more").and_then(JsonValue::as_bool) {
                Some(true) => page
                    .get("next_cursor")
                    .and_then(JsonValue::as_str)
                    .map(str::to_string),
                _ => None,
            };
            if cursor.is_none() {
                break;
            }
            debug!(fetched = records.len(), "fetching next candidate page");
        }

        info!(count = records.len(), "queried candidate records");
        Ok(records)
    }

    async fn write_record(&self, record_id: &str, values: &FieldValues) -> Result<(), StoreError> {
        let body = json!({ "properties": encode_field_values(values) });
        self.call(Method::PATCH, &format!("pages/{record_id}"), Some(body))
            .await?;
        Ok(())
    }
}

/// Extract the 32-hex database id from a Notion URL and format it as a hyphenated UUID.
pub fn database_id_from_url(url: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"notion\.so/(?:[^/?#]+/)?(?:[^/?#]*-)?([0-9a-fA-F]{32})(?:[/?#]|$)")
            .expect("static pattern compiles")
    });
    let raw = re.captures(url)?.get(1)?.as_str();
    Uuid::parse_str(raw).ok().map(|id| id.hyphenated().to_string())
}

pub fn decode_live_fields(source: &JsonValue) -> Result<LiveFieldSet, StoreError> {
    let properties = source
        .get("properties")
        .and_then(JsonValue::as_object)
        .ok_or_else(|| StoreError::Payload("data source has no properties object".into()))?;

    let mut live = LiveFieldSet::new();
    for (name, prop) in properties {
        let Some(type_name) = prop.get("type").and_then(JsonValue::as_str) else {
            continue;
        };
        let options = prop
            .get(type_name)
            .and_then(|config| config.get("options"))
            .and_then(JsonValue::as_array)
            .map(|options| {
                options
                    .iter()
                    .filter_map(|o| o.get("name").and_then(JsonValue::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        live.insert(
            name.clone(),
            LiveField {
                kind: FieldKind::from_type_name(type_name),
                options,
            },
        );
    }
    Ok(live)
}

pub fn encode_schema_changes(changes: &[SchemaChange]) -> JsonValue {
    let mut properties = Map::new();
    for change in changes {
        let value = match change {
            SchemaChange::Rename { to, .. } => json!({ "name": to }),
            SchemaChange::Create(spec) => encode_field_spec(spec),
        };
        properties.insert(change.key().to_string(), value);
    }
    JsonValue::Object(properties)
}

fn encode_field_spec(spec: &FieldSpec) -> JsonValue {
    let config = match spec.kind {
        FieldKind::Number => json!({ "format": "number" }),
        FieldKind::Select | FieldKind::MultiSelect if !spec.options.is_empty() => json!({
            "options": spec
                .options
                .iter()
                .map(|o| json!({ "name": o.label, "color": o.color }))
                .collect::<Vec<_>>(),
        }),
        _ => json!({}),
    };
    let mut encoded = Map::new();
    encoded.insert(spec.kind.type_name().to_string(), config);
    JsonValue::Object(encoded)
}

pub fn encode_field_values(values: &FieldValues) -> JsonValue {
    let mut properties = Map::new();
    for (name, value) in values {
        let encoded = match value {
            FieldValue::Title(text) => json!({ "title": [text_object(text)] }),
            FieldValue::Url(url) => json!({ "url": url }),
            FieldValue::Select(option) => json!({ "select": { "name": option_name(option) } }),
            FieldValue::MultiSelect(options) => json!({
                "multi_select": options
                    .iter()
                    .map(|o| json!({ "name": option_name(o) }))
                    .collect::<Vec<_>>(),
            }),
            FieldValue::Number(n) => json!({ "number": n }),
            FieldValue::RichText(text) => json!({ "rich_text": [text_object(text)] }),
        };
        properties.insert(name.clone(), encoded);
    }
    JsonValue::Object(properties)
}

fn text_object(content: &str) -> JsonValue {
    json!({ "type": "text", "text": { "content": content } })
}

/// Notion rejects select option names containing commas.
fn option_name(name: &str) -> String {
    name.replace(',', "")
}

/// Records with a title or url that still miss data. The empty-status clause is added only
/// when the status field is confirmed.
pub fn candidate_filter(available: &AvailableFields) -> JsonValue {
    let mut clauses = Vec::with_capacity(3);

    if available.tracks_status() {
        clauses.push(json!({
            "property": fields::SYNC_STATUS,
            "select": { "is_empty": true },
        }));
    }

    clauses.push(json!({
        "or": [
            { "property": fields::TITLE, "title": { "is_not_empty": true } },
            { "property": fields::URL, "url": { "is_not_empty": true } },
        ]
    }));
    clauses.push(json!({
        "or": [
            { "property": fields::DURATION, "number": { "is_empty": true } },
            { "property": fields::DIRECTOR, "select": { "is_empty": true } },
            { "property": fields::URL, "url": { "is_empty": true } },
        ]
    }));

    json!({ "and": clauses })
}

/// Decode one queried page. The title is read from whichever property has kind `title`.
pub fn decode_target_record(page: &JsonValue) -> Option<TargetRecord> {
    let record_id = page.get("id")?.as_str()?.to_string();
    let properties = page.get("properties")?.as_object()?;

    let title = properties
        .values()
        .find(|p| p.get("type").and_then(JsonValue::as_str) == Some("title"))
        .and_then(|p| p.get("title"))
        .and_then(JsonValue::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| {
                    part.get("plain_text")
                        .or_else(|| part.get("text").and_then(|t| t.get("content")))
                        .and_then(JsonValue::as_str)
                })
                .collect::<String>()
        })
        .and_then(non_blank);

    let external_reference_url = properties
        .get(fields::URL)
        .and_then(|p| p.get("url"))
        .and_then(JsonValue::as_str)
        .and_then(|url| non_blank(url.to_string()));

    Some(TargetRecord {
        record_id,
        title,
        external_reference_url,
    })
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelsync_core::required_schema;

    #[test]
    fn database_ids_are_extracted_from_workspace_and_slug_urls() {
        let expected = Some("01234567-89ab-cdef-0123-456789abcdef".to_string());
        assert_eq!(
            database_id_from_url("https://www.notion.so/my-space/0123456789abcdef0123456789abcdef?v=1"),
            expected
        );
        assert_eq!(
            database_id_from_url("https://www.notion.so/my-space/Movies-0123456789abcdef0123456789abcdef"),
            expected
        );
        assert_eq!(database_id_from_url("https://www.notion.so/my-space/short"), None);
        assert_eq!(database_id_from_url("https://example.com/0123456789abcdef0123456789abcdef"), None);
    }

    #[test]
    fn live_fields_keep_kind_and_select_options() {
        let source = json!({
            "properties": {
                "Name": { "id": "title", "type": "title", "title": {} },
                "Sync Status": {
                    "id": "a", "type": "select",
                    "select": { "options": [{ "name": "Updated", "color": "green" }] }
                },
                "Seen": { "id": "b", "type": "checkbox", "checkbox": {} }
            }
        });
        let live = decode_live_fields(&source).expect("decode");
        assert_eq!(live["Name"].kind, FieldKind::Title);
        assert_eq!(live["Sync Status"].options, vec!["Updated".to_string()]);
        assert_eq!(live["Seen"].kind, FieldKind::Other("checkbox".into()));
        assert!(decode_live_fields(&json!({})).is_err());
    }

    #[test]
    fn schema_changes_encode_renames_and_typed_creations() {
        let schema = required_schema();
        let duration = schema.iter().find(|s| s.name == fields::DURATION).unwrap().clone();
        let status = schema.iter().find(|s| s.name == fields::SYNC_STATUS).unwrap().clone();
        let changes = vec![
            SchemaChange::Rename {
                from: "Name".into(),
                to: fields::TITLE.into(),
            },
            SchemaChange::Create(duration),
            SchemaChange::Create(status),
        ];

        let encoded = encode_schema_changes(&changes);
        assert_eq!(encoded["Name"], json!({ "name": "Title" }));
        assert_eq!(encoded[fields::DURATION], json!({ "number": { "format": "number" } }));
        assert_eq!(
            encoded[fields::SYNC_STATUS]["select"]["options"][1],
            json!({ "name": "Not Found", "color": "red" })
        );
    }

    #[test]
    fn field_values_encode_notion_property_shapes() {
        let mut values = FieldValues::new();
        values.insert(fields::TITLE.into(), FieldValue::Title("Heat".into()));
        values.insert(fields::DIRECTOR.into(), FieldValue::Select("Mann, Michael".into()));
        values.insert(
            fields::GENRE.into(),
            FieldValue::MultiSelect(vec!["Crime".into(), "Drama".into()]),
        );
        values.insert(fields::RATING.into(), FieldValue::Number(8.3));

        let encoded = encode_field_values(&values);
        assert_eq!(encoded[fields::TITLE]["title"][0]["text"]["content"], "Heat");
        assert_eq!(encoded[fields::DIRECTOR]["select"]["name"], "Mann Michael");
        assert_eq!(encoded[fields::GENRE]["multi_select"][1]["name"], "Drama");
        assert_eq!(encoded[fields::RATING]["number"], 8.3);
        assert_eq!(encoded.as_object().unwrap().len(), 4);
    }

    #[test]
    fn full_schema_filter_requires_empty_status_identity_and_missing_data() {
        let available: AvailableFields = required_schema().iter().map(|s| s.name).collect();
        let filter = candidate_filter(&available);
        let and = filter["and"].as_array().expect("and clauses");
        assert_eq!(and.len(), 3);
        assert_eq!(and[0]["property"], fields::SYNC_STATUS);
        assert_eq!(and[1]["or"].as_array().unwrap().len(), 2);
        assert_eq!(and[2]["or"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn filter_without_status_keeps_identity_and_missing_data_groups() {
        for available in [
            AvailableFields::empty(),
            [fields::TITLE, fields::DURATION].into_iter().collect(),
        ] {
            let filter = candidate_filter(&available);
            let and = filter["and"].as_array().expect("and clauses");
            assert_eq!(and.len(), 2);
            assert_eq!(and[0]["or"][0]["property"], fields::TITLE);
            assert_eq!(and[0]["or"][1]["property"], fields::URL);
            assert_eq!(and[1]["or"].as_array().unwrap().len(), 3);
            assert!(!filter.to_string().contains(fields::SYNC_STATUS));
        }
    }

    #[test]
    fn target_records_read_any_title_property_and_the_url_field() {
        let page = json!({
            "id": "page-1",
            "properties": {
                "Name": { "type": "title", "title": [
                    { "plain_text": "The ", "text": { "content": "The " } },
                    { "plain_text": "Wire", "text": { "content": "Wire" } }
                ] },
                "IMDB": { "type": "url", "url": "https://www.imdb.com/title/tt0306414/" }
            }
        });
        let record = decode_target_record(&page).expect("record");
        assert_eq!(record.record_id, "page-1");
        assert_eq!(record.title.as_deref(), Some("The Wire"));
        assert_eq!(
            record.external_reference_url.as_deref(),
            Some("https://www.imdb.com/title/tt0306414/")
        );

        let blank = json!({
            "id": "page-2",
            "properties": { "Title": { "type": "title", "title": [] }, "IMDB": { "type": "url", "url": null } }
        });
        let record = decode_target_record(&blank).expect("record");
        assert_eq!(record.title, None);
        assert_eq!(record.external_reference_url, None);
    }
}
