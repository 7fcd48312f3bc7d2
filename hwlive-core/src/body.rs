//! Body - Map attributes to API request bodies and back
//!
//! `build_body` and `flatten_body` walk a [`BlockSchema`], so nested blocks of
//! any depth are converted without per-block code. Wire keys come from
//! [`AttributeSchema::wire_name`] and zero values are dropped according to
//! [`WireMode`].

use std::collections::HashMap;

use serde_json::{Map, Value as Json};

use crate::path_search::path_search;
use crate::resource::Value;
use crate::schema::{AttributeSchema, AttributeType, BlockSchema, WireMode};

/// Recursively drop nulls, and the objects and arrays that end up empty
pub fn remove_nil(value: Json) -> Json {
    match value {
        Json::Object(map) => Json::Object(
            map.into_iter()
                .filter_map(|(k, v)| prune(v).map(|v| (k, v)))
                .collect(),
        ),
        Json::Array(items) => Json::Array(items.into_iter().filter_map(prune).collect()),
        other => other,
    }
}

fn prune(value: Json) -> Option<Json> {
    match remove_nil(value) {
        Json::Null => None,
        Json::Object(map) if map.is_empty() => None,
        Json::Array(items) if items.is_empty() => None,
        other => Some(other),
    }
}

/// `null` for zero values, the JSON value otherwise
pub fn value_ignore_empty(value: &Value) -> Json {
    if value.is_empty() {
        Json::Null
    } else {
        value.to_json()
    }
}

/// Build a request body object from attributes
///
/// Keys whose value is absent or dropped are present as `null`; pass the
/// result through [`remove_nil`] before sending.
pub fn build_body(block: &BlockSchema, attributes: &HashMap<String, Value>) -> Json {
    let mut body = Map::new();
    for attr in &block.attributes {
        let value = match attributes.get(&attr.name) {
            Some(value) => build_attribute(attr, value),
            None => Json::Null,
        };
        body.insert(attr.wire_name().to_string(), value);
    }
    Json::Object(body)
}

/// Build the wire value of a single attribute
pub fn build_attribute(attr: &AttributeSchema, value: &Value) -> Json {
    if let AttributeType::Block(block) = &attr.attr_type {
        return build_block(attr, block, value);
    }
    match attr.wire {
        WireMode::Raw => value.to_json(),
        WireMode::OmitEmpty => value_ignore_empty(value),
    }
}

fn build_block(attr: &AttributeSchema, block: &BlockSchema, value: &Value) -> Json {
    let items: Vec<&HashMap<String, Value>> = match value {
        Value::List(items) => items.iter().filter_map(Value::as_map).collect(),
        Value::Map(map) => vec![map],
        _ => Vec::new(),
    };
    if items.is_empty() {
        return Json::Null;
    }

    if attr.is_single_block() {
        build_body(block, items[0])
    } else {
        Json::Array(items.into_iter().map(|item| build_body(block, item)).collect())
    }
}

/// Convert a response object into attributes
///
/// Each attribute is looked up by its wire key. Nested objects become
/// one-element block lists. Keys missing from the response are left out.
pub fn flatten_body(block: &BlockSchema, body: &Json) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();
    for attr in &block.attributes {
        let Some(found) = path_search(&wire_expression(attr.wire_name()), body) else {
            continue;
        };
        let value = match &attr.attr_type {
            AttributeType::Block(inner) => flatten_block(inner, &found),
            _ => Value::from_json(&found),
        };
        if let Some(value) = value {
            attributes.insert(attr.name.clone(), value);
        }
    }
    attributes
}

fn flatten_block(block: &BlockSchema, found: &Json) -> Option<Value> {
    match found {
        Json::Object(_) => Some(Value::List(vec![Value::Map(flatten_body(block, found))])),
        Json::Array(items) => Some(Value::List(
            items
                .iter()
                .filter(|item| item.is_object())
                .map(|item| Value::Map(flatten_body(block, item)))
                .collect(),
        )),
        _ => None,
    }
}

/// Quote keys that are not plain identifiers
fn wire_expression(key: &str) -> String {
    let plain = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        key.to_string()
    } else {
        Json::String(key.to_string()).to_string()
    }
}
