//! Registry payload decoding.
//!
//! Both registries serve a JSON list of sign objects, either bare or wrapped
//! in a paginated `{"results": [...]}` envelope. Field names vary between
//! deployments, so each field is looked up under a few known names.
//! Coordinates may arrive as numbers or numeric strings; anything unreadable
//! becomes NaN and is flagged downstream instead of failing the fetch.

use chrono::{DateTime, Utc};
use serde_json::Value;

use roadsigns_recon::{FetchError, GeoPoint, SourceId, SourceRecord};

const ID_FIELDS: &[&str] = &["external_id", "id"];
const LAT_FIELDS: &[&str] = &["latitude", "lat"];
const LON_FIELDS: &[&str] = &["longitude", "lon", "lng"];
const TIME_FIELDS: &[&str] = &["observed_at", "updated_at", "last_update"];

/// Source-specific names tried before the generic ones.
fn id_aliases(source: SourceId) -> &'static [&'static str] {
    match source {
        SourceId::Authority => &["gibdd_unical_id"],
        SourceId::Commercial => &["commerce_internal_id"],
    }
}

fn description_aliases(source: SourceId) -> &'static [&'static str] {
    match source {
        SourceId::Authority => &["gibdd_description", "description"],
        SourceId::Commercial => &["commerce_description", "description"],
    }
}

/// Decode a whole feed response.
pub fn parse_payload(
    source: SourceId,
    body: &Value,
    fetched_at: DateTime<Utc>,
) -> Result<Vec<SourceRecord>, FetchError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("results") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(FetchError::Malformed(
                    "expected a list of signs or a {\"results\": [...]} object".into(),
                ))
            }
        },
        other => {
            return Err(FetchError::Malformed(format!(
                "expected a list of signs, got {}",
                kind(other)
            )))
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            parse_record(source, item, fetched_at)
                .map_err(|e| FetchError::Malformed(format!("item {i}: {e}")))
        })
        .collect()
}

/// Decode one sign object.
pub fn parse_record(
    source: SourceId,
    item: &Value,
    fetched_at: DateTime<Utc>,
) -> Result<SourceRecord, FetchError> {
    let Value::Object(_) = item else {
        return Err(FetchError::Malformed(format!(
            "expected an object, got {}",
            kind(item)
        )));
    };

    let external_id = id_aliases(source)
        .iter()
        .chain(ID_FIELDS)
        .find_map(|f| identifier(item.get(*f)?));

    let name = match item.get("name") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(FetchError::Malformed(format!(
                "name must be a string, got {}",
                kind(other)
            )))
        }
    };

    let description = description_aliases(source)
        .iter()
        .find_map(|f| item.get(*f)?.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from);

    let observed_at = TIME_FIELDS
        .iter()
        .find_map(|f| item.get(*f)?.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(fetched_at);

    Ok(SourceRecord {
        source,
        external_id,
        name,
        position: GeoPoint::new(coordinate(item, LAT_FIELDS), coordinate(item, LON_FIELDS)),
        description,
        observed_at,
    })
}

fn identifier(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn coordinate(item: &Value, fields: &[&str]) -> f64 {
    fields
        .iter()
        .find_map(|f| match item.get(*f)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .unwrap_or(f64::NAN)
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
