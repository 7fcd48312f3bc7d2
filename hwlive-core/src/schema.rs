//! Schema - Define type schemas for resources
//!
//! Providers define schemas for each resource type. A schema drives
//! validation of the configuration, change detection in the differ
//! and the mapping between attributes and request/response bodies.

use std::collections::HashMap;
use std::fmt;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
    /// Nested block, represented as a list of maps
    Block(BlockSchema),
}

impl AttributeType {
    /// Check if a value conforms to this type
    ///
    /// Blocks are only checked for shape here; their contents are
    /// validated by [`BlockSchema::validate`].
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { validate, base, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Block(_), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    if !matches!(item, Value::Map(_)) {
                        return Err(TypeError::ListItemError {
                            index: i,
                            inner: Box::new(TypeError::TypeMismatch {
                                expected: "Block".to_string(),
                                got: item.type_name().to_string(),
                            }),
                        });
                    }
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name().to_string(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Block(_) => "Block".to_string(),
        }
    }

    /// Nested block schema, if this is a block
    pub fn as_block(&self) -> Option<&BlockSchema> {
        match self {
            AttributeType::Block(block) => Some(block),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{name}' is computed and cannot be set")]
    ComputedOnly { name: String },

    #[error("Attribute '{name}' allows at most {max} item(s), got {got}")]
    TooManyItems { name: String, max: usize, got: usize },

    #[error("Attribute '{name}' requires at least {min} item(s), got {got}")]
    TooFewItems { name: String, min: usize, got: usize },

    #[error("Attribute '{name}': {inner}")]
    AttributeError { name: String, inner: Box<TypeError> },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

/// How an attribute is written into a request body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireMode {
    /// Sent as configured, zero values included
    Raw,
    /// Dropped when it holds the zero value of its type
    OmitEmpty,
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    /// Changing this attribute requires replacing the resource
    pub force_new: bool,
    pub sensitive: bool,
    pub max_items: Option<usize>,
    pub min_items: Option<usize>,
    pub default: Option<Value>,
    pub description: Option<String>,
    /// Key used in API request/response bodies, when it differs from `name`
    pub provider_name: Option<String>,
    pub wire: WireMode,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        let wire = match attr_type {
            AttributeType::Int => WireMode::Raw,
            _ => WireMode::OmitEmpty,
        };
        Self {
            name: name.into(),
            attr_type,
            required: false,
            optional: true,
            computed: false,
            force_new: false,
            sensitive: false,
            max_items: None,
            min_items: None,
            default: None,
            description: None,
            provider_name: None,
            wire,
        }
    }

    /// Nested block attribute
    pub fn block(name: impl Into<String>, block: BlockSchema) -> Self {
        Self::new(name, AttributeType::Block(block))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self.optional = false;
        if matches!(self.attr_type, AttributeType::Block(_)) && self.min_items.is_none() {
            self.min_items = Some(1);
        }
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Computed and not settable from configuration
    pub fn computed_only(mut self) -> Self {
        self.computed = true;
        self.optional = false;
        self.required = false;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    pub fn min_items(mut self, min: usize) -> Self {
        self.min_items = Some(min);
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    pub fn raw(mut self) -> Self {
        self.wire = WireMode::Raw;
        self
    }

    pub fn omit_empty(mut self) -> Self {
        self.wire = WireMode::OmitEmpty;
        self
    }

    /// Key of this attribute in API bodies
    pub fn wire_name(&self) -> &str {
        self.provider_name.as_deref().unwrap_or(&self.name)
    }

    /// Whether the value can be set from configuration
    pub fn is_settable(&self) -> bool {
        self.required || self.optional
    }

    /// Block with `max_items = 1`, sent as a JSON object rather than an array
    pub fn is_single_block(&self) -> bool {
        matches!(self.attr_type, AttributeType::Block(_)) && self.max_items == Some(1)
    }

    fn validate_value(&self, path: &str, value: &Value, errors: &mut Vec<TypeError>) {
        if !self.is_settable() {
            errors.push(TypeError::ComputedOnly {
                name: path.to_string(),
            });
            return;
        }

        if let Err(e) = self.attr_type.validate(value) {
            errors.push(TypeError::AttributeError {
                name: path.to_string(),
                inner: Box::new(e),
            });
            return;
        }

        if let Value::List(items) = value {
            if let Some(max) = self.max_items
                && items.len() > max
            {
                errors.push(TypeError::TooManyItems {
                    name: path.to_string(),
                    max,
                    got: items.len(),
                });
            }
            if let Some(min) = self.min_items
                && items.len() < min
            {
                errors.push(TypeError::TooFewItems {
                    name: path.to_string(),
                    min,
                    got: items.len(),
                });
            }

            if let AttributeType::Block(block) = &self.attr_type {
                for (i, item) in items.iter().enumerate() {
                    if let Value::Map(attrs) = item {
                        block.validate_at(&format!("{}.{}", path, i), attrs, errors);
                    }
                }
            }
        }
    }
}

/// Ordered set of attributes forming a resource body or a nested block
#[derive(Debug, Clone, Default)]
pub struct BlockSchema {
    pub attributes: Vec<AttributeSchema>,
}

impl BlockSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.push(schema);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Validate attributes of this block, collecting every error
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();
        self.validate_at("", attributes, &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_at(
        &self,
        prefix: &str,
        attributes: &HashMap<String, Value>,
        errors: &mut Vec<TypeError>,
    ) {
        let path_of = |name: &str| {
            if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{}.{}", prefix, name)
            }
        };

        for schema in &self.attributes {
            if schema.required
                && !attributes.contains_key(&schema.name)
                && schema.default.is_none()
            {
                errors.push(TypeError::MissingRequired {
                    name: path_of(&schema.name),
                });
            }
        }

        let mut names: Vec<&String> = attributes.keys().collect();
        names.sort();
        for name in names {
            let value = &attributes[name];
            match self.get(name) {
                Some(schema) => schema.validate_value(&path_of(name), value, errors),
                None => errors.push(TypeError::UnknownAttribute {
                    name: path_of(name),
                }),
            }
        }
    }

    /// Wrap bare maps given for block attributes into one-element lists,
    /// recursively. Lets configuration files write `"input": {..}`.
    pub fn normalize(&self, attributes: &mut HashMap<String, Value>) {
        for schema in &self.attributes {
            let Some(block) = schema.attr_type.as_block() else {
                continue;
            };
            let Some(value) = attributes.get_mut(&schema.name) else {
                continue;
            };
            if let Value::Map(map) = value {
                let map = std::mem::take(map);
                *value = Value::List(vec![Value::Map(map)]);
            }
            if let Value::List(items) = value {
                for item in items.iter_mut() {
                    if let Value::Map(inner) = item {
                        block.normalize(inner);
                    }
                }
            }
        }
    }

    /// Copy of this block where every attribute is computed only
    pub fn computed_copy(&self) -> BlockSchema {
        BlockSchema {
            attributes: self
                .attributes
                .iter()
                .map(|attr| {
                    let mut attr = attr.clone();
                    if let AttributeType::Block(inner) = &attr.attr_type {
                        attr.attr_type = AttributeType::Block(inner.computed_copy());
                    }
                    attr.required = false;
                    attr.optional = false;
                    attr.computed = true;
                    attr.force_new = false;
                    attr.min_items = None;
                    attr.default = None;
                    attr
                })
                .collect(),
        }
    }
}

/// Whether a schema describes a managed resource or a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Managed,
    Data,
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub kind: SchemaKind,
    pub block: BlockSchema,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            kind: SchemaKind::Managed,
            block: BlockSchema::new(),
            description: None,
        }
    }

    /// Schema of a data source
    pub fn data(resource_type: impl Into<String>) -> Self {
        Self {
            kind: SchemaKind::Data,
            ..Self::new(resource_type)
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.block.attributes.push(schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeSchema> {
        self.block.get(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeSchema> {
        self.block.attributes.iter()
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        self.block.validate(attributes)
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Integer greater than or equal to zero
    pub fn non_negative_int() -> AttributeType {
        AttributeType::Custom {
            name: "NonNegativeInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| match value {
                Value::Int(n) if *n >= 0 => Ok(()),
                Value::Int(_) => Err("Value must not be negative".to_string()),
                _ => Err("Expected integer".to_string()),
            },
        }
    }

    /// List of strings
    pub fn string_list() -> AttributeType {
        AttributeType::List(Box::new(AttributeType::String))
    }

    /// Enum built from string slices
    pub fn one_of(values: &[&str]) -> AttributeType {
        AttributeType::Enum(values.iter().map(|v| v.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_block() -> BlockSchema {
        BlockSchema::new()
            .attribute(AttributeSchema::new("url", AttributeType::String).required())
            .attribute(AttributeSchema::new("bitrate", AttributeType::Int))
    }

    fn channel_schema() -> ResourceSchema {
        ResourceSchema::new("channel")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("state", types::one_of(&["ON", "OFF"])))
            .attribute(
                AttributeSchema::block("input", BlockSchema::new().attribute(
                    AttributeSchema::block("sources", source_block()),
                ))
                .required()
                .max_items(1),
            )
            .attribute(AttributeSchema::new("channel_id", AttributeType::String).computed_only())
    }

    fn input_with_sources(sources: Vec<Value>) -> Value {
        Value::List(vec![Value::Map(
            [("sources".to_string(), Value::List(sources))]
                .into_iter()
                .collect(),
        )])
    }

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = types::one_of(&["ON", "OFF"]);
        assert!(t.validate(&Value::from("ON")).is_ok());
        assert!(t.validate(&Value::from("on")).is_err());
    }

    #[test]
    fn validate_non_negative_int() {
        let t = types::non_negative_int();
        assert!(t.validate(&Value::Int(0)).is_ok());
        assert!(t.validate(&Value::Int(30)).is_ok());
        assert!(t.validate(&Value::Int(-1)).is_err());
        assert!(t.validate(&Value::from("1")).is_err());
    }

    #[test]
    fn default_satisfies_required() {
        let schema = ResourceSchema::new("channel").attribute(
            AttributeSchema::new("state", types::one_of(&["ON", "OFF"]))
                .required()
                .with_default(Value::from("ON")),
        );
        assert!(schema.validate(&HashMap::new()).is_ok());
    }

    #[test]
    fn validate_nested_blocks() {
        let schema = channel_schema();
        let mut source = HashMap::new();
        source.insert("url".to_string(), Value::from("rtmp://origin/live"));
        source.insert("bitrate".to_string(), Value::Int(800));

        let attrs: HashMap<String, Value> = [
            ("name".to_string(), Value::from("ch")),
            ("state".to_string(), Value::from("ON")),
            ("input".to_string(), input_with_sources(vec![Value::Map(source)])),
        ]
        .into_iter()
        .collect();

        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn missing_required_in_nested_block_reports_path() {
        let schema = channel_schema();
        let attrs: HashMap<String, Value> = [
            ("name".to_string(), Value::from("ch")),
            (
                "input".to_string(),
                input_with_sources(vec![Value::Map(HashMap::new())]),
            ),
        ]
        .into_iter()
        .collect();

        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].to_string(),
            "Required attribute 'input.0.sources.0.url' is missing"
        );
    }

    #[test]
    fn max_items_and_computed_only_are_enforced() {
        let schema = channel_schema();
        let block = Value::Map(HashMap::new());
        let attrs: HashMap<String, Value> = [
            ("name".to_string(), Value::from("ch")),
            ("input".to_string(), Value::List(vec![block.clone(), block])),
            ("channel_id".to_string(), Value::from("abc")),
            ("bogus".to_string(), Value::Bool(true)),
        ]
        .into_iter()
        .collect();

        let errors = schema.validate(&attrs).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, TypeError::TooManyItems { .. })));
        assert!(errors.iter().any(|e| matches!(e, TypeError::ComputedOnly { .. })));
        assert!(errors.iter().any(|e| matches!(e, TypeError::UnknownAttribute { .. })));
    }

    #[test]
    fn required_block_needs_an_element() {
        let schema = channel_schema();
        let attrs: HashMap<String, Value> = [
            ("name".to_string(), Value::from("ch")),
            ("input".to_string(), Value::List(vec![])),
        ]
        .into_iter()
        .collect();

        let errors = schema.validate(&attrs).unwrap_err();
        assert!(matches!(errors[0], TypeError::TooFewItems { min: 1, .. }));
    }

    #[test]
    fn normalize_wraps_single_maps() {
        let schema = channel_schema();
        let mut source = HashMap::new();
        source.insert("url".to_string(), Value::from("rtmp://origin/live"));
        let mut input = HashMap::new();
        input.insert("sources".to_string(), Value::Map(source));

        let mut attrs = HashMap::new();
        attrs.insert("input".to_string(), Value::Map(input));
        schema.block.normalize(&mut attrs);

        let input = &attrs["input"].as_list().unwrap()[0];
        let sources = input.as_map().unwrap()["sources"].as_list().unwrap();
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn computed_copy_clears_flags() {
        let copy = channel_schema().block.computed_copy();
        for attr in &copy.attributes {
            assert!(attr.computed);
            assert!(!attr.required);
            assert!(!attr.is_settable());
        }
        let input = copy.get("input").unwrap().attr_type.as_block().unwrap();
        let sources = input.get("sources").unwrap().attr_type.as_block().unwrap();
        assert!(!sources.get("url").unwrap().required);
    }
}
