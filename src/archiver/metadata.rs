//! Metadata bundle attached to every archival upload.

use serde_json::Value;

use super::identifier::format_date;
use crate::ia::Metadata;
use crate::store::ItemRecord;

/// Record fields that track progress and are never forwarded.
const PRIVATE_FIELDS: [&str; 3] = ["id", "downloaded", "uploaded"];

/// Build the metadata bundle for a record.
///
/// Fixed `collection`/`mediatype`, a synthesized `description`, the channel
/// as `subject`, the record id, and every other record field forwarded
/// verbatim. Forwarded fields win over the synthesized ones.
#[must_use]
pub fn archive_metadata(record: &ItemRecord, collection: &str, mediatype: &str) -> Metadata {
    let mut metadata = Metadata::new();
    let publish_date = format!("{} 00:00:00", format_date(&record.upload_date));

    metadata.insert("collection".to_string(), vec![collection.to_string()]);
    metadata.insert("mediatype".to_string(), vec![mediatype.to_string()]);
    metadata.insert(
        "description".to_string(),
        vec![format!(
            "Title: {}\nPublished on: {publish_date}\nOriginal video URL: {}",
            record.title, record.url
        )],
    );
    metadata.insert("subject".to_string(), vec![record.channel_name.clone()]);
    metadata.insert("id".to_string(), vec![record.id.clone()]);

    let Ok(Value::Object(fields)) = serde_json::to_value(record) else {
        return metadata;
    };
    for (key, value) in fields {
        if PRIVATE_FIELDS.contains(&key.as_str()) {
            continue;
        }
        let values = metadata_values(&value);
        if !values.is_empty() {
            metadata.insert(key, values);
        }
    }

    metadata
}

fn metadata_values(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(metadata_values).collect(),
        other => vec![other.to_string()],
    }
}
