//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the desired state declared in configuration with the current
//! state fetched from the Provider, and generates the required Effects.
//!
//! The comparison is schema aware: only what the configuration says is
//! compared, so attributes filled in by the API do not show up as drift.

use std::collections::HashMap;

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::{AttributeType, BlockSchema, ResourceSchema};

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// A force-new attribute changed -> delete and create
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        forced_by: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
    /// Resource exists but not in desired state -> needs deletion
    Delete { id: ResourceId, from: State },
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes, schema);

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let mut forced_by = Vec::new();
    for name in &changed {
        let Some(attr) = schema.and_then(|s| s.get(name)) else {
            continue;
        };
        if attr.force_new {
            forced_by.push(name.clone());
        } else if let AttributeType::Block(block) = &attr.attr_type
            && let Some(desired_value) = desired.attributes.get(name)
        {
            find_forced_paths(
                block,
                name,
                desired_value,
                current.attributes.get(name),
                &mut forced_by,
            );
        }
    }

    if forced_by.is_empty() {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            forced_by,
        }
    }
}

/// Find changed attributes between desired and current state
///
/// Returned names are sorted.
pub fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    schema: Option<&ResourceSchema>,
) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in desired {
        // Skip internal attributes (starting with _)
        if key.starts_with('_') {
            continue;
        }
        if let Some(attr) = schema.and_then(|s| s.get(key))
            && !attr.is_settable()
        {
            continue;
        }

        let same = match current.get(key) {
            Some(current_value) => values_match(desired_value, current_value),
            None => is_empty_deep(desired_value),
        };
        if !same {
            changed.push(key.clone());
        }
    }

    // Optional attributes removed from the configuration but still set remotely
    if let Some(schema) = schema {
        for attr in schema.attributes() {
            if attr.optional
                && !attr.computed
                && !desired.contains_key(&attr.name)
                && current.get(&attr.name).is_some_and(|v| !is_empty_deep(v))
            {
                changed.push(attr.name.clone());
            }
        }
    }

    changed.sort();
    changed
}

/// Collect dotted paths (`input.0.input_protocol`) of changed force-new
/// attributes inside block items
///
/// Items only present in state count as removed, so their force-new
/// values are changes as well.
fn find_forced_paths(
    block: &BlockSchema,
    prefix: &str,
    desired: &Value,
    current: Option<&Value>,
    forced_by: &mut Vec<String>,
) {
    let empty_map = HashMap::new();
    let empty_list = Value::List(Vec::new());
    let desired_items = desired.as_list().unwrap_or(&[]);
    let current_items = current.and_then(Value::as_list).unwrap_or(&[]);

    for i in 0..desired_items.len().max(current_items.len()) {
        let removed = i >= desired_items.len();
        let d = desired_items.get(i).and_then(Value::as_map).unwrap_or(&empty_map);
        let c = current_items.get(i).and_then(Value::as_map).unwrap_or(&empty_map);

        for attr in block.attributes.iter().filter(|a| a.is_settable()) {
            let path = format!("{}.{}.{}", prefix, i, attr.name);
            let dv = d.get(&attr.name);
            let cv = c.get(&attr.name);

            if attr.force_new {
                let changed = match (dv, cv) {
                    (Some(dv), Some(cv)) => !values_match(dv, cv),
                    (Some(dv), None) => !is_empty_deep(dv),
                    (None, Some(cv)) => removed && !is_empty_deep(cv),
                    (None, None) => false,
                };
                if changed {
                    forced_by.push(path);
                }
            } else if let AttributeType::Block(inner) = &attr.attr_type
                && (dv.is_some() || removed)
            {
                find_forced_paths(inner, &path, dv.unwrap_or(&empty_list), cv, forced_by);
            }
        }
    }
}

/// Whether `desired` is satisfied by `current`
///
/// Maps compare as a subset: keys the desired side does not mention are
/// ignored, and keys it sets to a zero value match a missing key.
pub fn values_match(desired: &Value, current: &Value) -> bool {
    match (desired, current) {
        (Value::Map(d), Value::Map(c)) => d.iter().all(|(k, dv)| match c.get(k) {
            Some(cv) => values_match(dv, cv),
            None => is_empty_deep(dv),
        }),
        (Value::List(d), Value::List(c)) => {
            d.len() == c.len() && d.iter().zip(c).all(|(dv, cv)| values_match(dv, cv))
        }
        (Value::Int(d), Value::Float(c)) => (*d as f64) == *c,
        _ => desired == current,
    }
}

fn is_empty_deep(value: &Value) -> bool {
    match value {
        Value::Map(map) => map.values().all(is_empty_deep),
        other => other.is_empty(),
    }
}

/// Compute Diff for multiple resources and generate a Plan
///
/// Data sources become Read effects. Existing states with no desired
/// counterpart are scheduled for deletion after everything else.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    schemas: &HashMap<String, ResourceSchema>,
) -> Plan {
    let mut plan = Plan::new();

    for resource in desired {
        if resource.is_data_source() {
            plan.add(Effect::Read(resource.clone()));
            continue;
        }

        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        let d = diff(resource, &current, schemas.get(&resource.id.resource_type));

        match d {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Update {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::Replace {
                id,
                from,
                to,
                forced_by,
            } => plan.add(Effect::Replace {
                id,
                from,
                to,
                forced_by,
            }),
            Diff::NoChange(_) => {}
            Diff::Delete { id, from } => plan.add(Effect::Delete { id, from }),
        }
    }

    let mut orphans: Vec<&State> = current_states
        .values()
        .filter(|s| s.exists && !desired.iter().any(|r| r.id == s.id))
        .collect();
    orphans.sort_by(|a, b| a.id.cmp(&b.id));
    for state in orphans {
        plan.add(Effect::Delete {
            id: state.id.clone(),
            from: state.clone(),
        });
    }

    plan
}

/// Plan deleting every existing resource, in reverse of the given order
pub fn destroy_plan(states: &[State]) -> Plan {
    let mut plan = Plan::new();
    for state in states.iter().rev().filter(|s| s.exists) {
        plan.add(Effect::Delete {
            id: state.id.clone(),
            from: state.clone(),
        });
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttributeSchema;

    fn schema() -> ResourceSchema {
        ResourceSchema::new("live_channel")
            .attribute(
                AttributeSchema::new("app_name", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("state", AttributeType::String).required())
            .attribute(AttributeSchema::new("name", AttributeType::String))
            .attribute(
                AttributeSchema::new("region", AttributeType::String)
                    .computed()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::block(
                    "input",
                    BlockSchema::new()
                        .attribute(
                            AttributeSchema::new("input_protocol", AttributeType::String)
                                .required()
                                .force_new(),
                        )
                        .attribute(AttributeSchema::block(
                            "sources",
                            BlockSchema::new()
                                .attribute(AttributeSchema::new("url", AttributeType::String))
                                .attribute(
                                    AttributeSchema::new("stream_id", AttributeType::String)
                                        .force_new(),
                                ),
                        )),
                )
                .max_items(1),
            )
            .attribute(AttributeSchema::block(
                "record_settings",
                BlockSchema::new().attribute(AttributeSchema::new(
                    "rollingbuffer_duration",
                    AttributeType::Int,
                )),
            ))
    }

    fn existing(attrs: Vec<(&str, Value)>) -> State {
        State::existing(
            ResourceId::new("live_channel", "main"),
            attrs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
        .with_identifier("ch-1")
    }

    fn map(entries: Vec<(&str, Value)>) -> Value {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    #[test]
    fn diff_create_when_not_exists() {
        let desired = Resource::new("live_channel", "main");
        let current = State::not_found(ResourceId::new("live_channel", "main"));

        let result = diff(&desired, &current, None);
        assert!(matches!(result, Diff::Create(_)));
        assert!(result.is_change());
    }

    #[test]
    fn diff_no_change_ignores_computed_nested_fields() {
        let desired = Resource::new("live_channel", "main").with_attribute(
            "record_settings",
            Value::List(vec![map(vec![("rollingbuffer_duration", Value::Int(3600))])]),
        );
        let current = existing(vec![
            ("region", Value::from("cn-north-4")),
            (
                "record_settings",
                Value::List(vec![map(vec![
                    ("rollingbuffer_duration", Value::Int(3600)),
                    ("extra", Value::from("server side")),
                ])]),
            ),
        ]);

        let result = diff(&desired, &current, Some(&schema()));
        assert!(matches!(result, Diff::NoChange(_)));
        assert!(!result.is_change());
    }

    #[test]
    fn diff_update_when_different() {
        let desired = Resource::new("live_channel", "main")
            .with_attribute("state", Value::from("OFF"))
            .with_attribute("app_name", Value::from("live"));
        let current = existing(vec![
            ("state", Value::from("ON")),
            ("app_name", Value::from("live")),
        ]);

        match diff(&desired, &current, Some(&schema())) {
            Diff::Update {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, vec!["state".to_string()]),
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn diff_replace_when_force_new_changes() {
        let desired = Resource::new("live_channel", "main")
            .with_attribute("state", Value::from("OFF"))
            .with_attribute("app_name", Value::from("other"));
        let current = existing(vec![
            ("state", Value::from("ON")),
            ("app_name", Value::from("live")),
        ]);

        match diff(&desired, &current, Some(&schema())) {
            Diff::Replace { forced_by, .. } => assert_eq!(forced_by, vec!["app_name".to_string()]),
            other => panic!("Expected Replace, got {:?}", other),
        }
    }

    fn input(protocol: &str, sources: Vec<Value>) -> Value {
        Value::List(vec![map(vec![
            ("input_protocol", Value::from(protocol)),
            ("sources", Value::List(sources)),
        ])])
    }

    #[test]
    fn diff_replace_when_nested_force_new_changes() {
        let source = map(vec![("url", Value::from("rtmp://a"))]);
        let desired = Resource::new("live_channel", "main")
            .with_attribute("input", input("HLS_PULL", vec![source.clone()]));
        let current = existing(vec![("input", input("RTMP_PUSH", vec![source]))]);

        match diff(&desired, &current, Some(&schema())) {
            Diff::Replace { forced_by, .. } => {
                assert_eq!(forced_by, vec!["input.0.input_protocol".to_string()])
            }
            other => panic!("Expected Replace, got {:?}", other),
        }
    }

    #[test]
    fn diff_nested_change_without_force_new_is_update() {
        let desired = Resource::new("live_channel", "main").with_attribute(
            "input",
            input("RTMP_PUSH", vec![map(vec![("url", Value::from("rtmp://b"))])]),
        );
        let current = existing(vec![(
            "input",
            input("RTMP_PUSH", vec![map(vec![("url", Value::from("rtmp://a"))])]),
        )]);

        match diff(&desired, &current, Some(&schema())) {
            Diff::Update {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, vec!["input".to_string()]),
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn removed_block_item_with_force_new_value_replaces() {
        let desired = Resource::new("live_channel", "main").with_attribute(
            "input",
            input("RTMP_PUSH", vec![map(vec![("url", Value::from("rtmp://a"))])]),
        );
        let current = existing(vec![(
            "input",
            input(
                "RTMP_PUSH",
                vec![
                    map(vec![("url", Value::from("rtmp://a"))]),
                    map(vec![
                        ("url", Value::from("rtmp://b")),
                        ("stream_id", Value::from("backup")),
                    ]),
                ],
            ),
        )]);

        match diff(&desired, &current, Some(&schema())) {
            Diff::Replace { forced_by, .. } => {
                assert_eq!(forced_by, vec!["input.0.sources.1.stream_id".to_string()])
            }
            other => panic!("Expected Replace, got {:?}", other),
        }
    }

    #[test]
    fn removed_optional_attribute_is_a_change() {
        let desired = Resource::new("live_channel", "main");
        let current = existing(vec![("name", Value::from("old name"))]);

        let changed = find_changed_attributes(&desired.attributes, &current.attributes, Some(&schema()));
        assert_eq!(changed, vec!["name".to_string()]);
    }

    #[test]
    fn empty_desired_value_matches_missing_attribute() {
        let desired = Resource::new("live_channel", "main").with_attribute("name", Value::from(""));
        let current = existing(vec![]);

        assert!(matches!(diff(&desired, &current, Some(&schema())), Diff::NoChange(_)));
    }

    #[test]
    fn list_length_change_is_detected() {
        let d = Value::List(vec![Value::from("a")]);
        let c = Value::List(vec![Value::from("a"), Value::from("b")]);
        assert!(!values_match(&d, &c));
    }

    #[test]
    fn create_plan_from_resources() {
        let resources = vec![
            Resource::new("live_channel", "new"),
            Resource::new("live_channel", "main").with_attribute("state", Value::from("OFF")),
            Resource::new("live_channels", "all").with_read_only(true),
        ];

        let mut current_states = HashMap::new();
        current_states.insert(
            ResourceId::new("live_channel", "main"),
            existing(vec![("state", Value::from("ON"))]),
        );
        let orphan_id = ResourceId::new("live_channel", "orphan");
        current_states.insert(
            orphan_id.clone(),
            State::existing(orphan_id.clone(), HashMap::new()).with_identifier("ch-2"),
        );

        let mut schemas = HashMap::new();
        schemas.insert("live_channel".to_string(), schema());

        let plan = create_plan(&resources, &current_states, &schemas);

        assert_eq!(plan.effects().len(), 4);
        assert!(matches!(plan.effects()[0], Effect::Create(_)));
        assert!(matches!(plan.effects()[1], Effect::Update { .. }));
        assert!(matches!(plan.effects()[2], Effect::Read(_)));
        assert!(matches!(&plan.effects()[3], Effect::Delete { id, .. } if *id == orphan_id));
    }

    #[test]
    fn destroy_plan_reverses_order_and_skips_missing() {
        let a = existing(vec![]);
        let b = State::not_found(ResourceId::new("live_channel", "gone"));
        let mut c = existing(vec![]);
        c.id = ResourceId::new("live_channel", "second");

        let plan = destroy_plan(&[a, b, c]);
        let ids: Vec<String> = plan.effects().iter().map(|e| e.resource_id().to_string()).collect();
        assert_eq!(ids, vec!["live_channel.second", "live_channel.main"]);
    }
}
