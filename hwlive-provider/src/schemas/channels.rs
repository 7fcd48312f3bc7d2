//! Live channels data source schema

use hwlive_core::schema::{AttributeSchema, AttributeType, BlockSchema, ResourceSchema};

use super::channel::channel_schema;

/// Attributes of one listed channel
///
/// Same as the `live_channel` resource, with the channel ID reported as
/// `id` and every attribute computed.
pub fn channel_item_block() -> BlockSchema {
    let resource = channel_schema();
    let mut block = BlockSchema::new();
    for attr in resource.block.attributes {
        if attr.name == "region" || attr.name == "channel_id" {
            continue;
        }
        block = block.attribute(attr);
    }
    block
        .attribute(AttributeSchema::new("id", AttributeType::String))
        .computed_copy()
}

/// Returns the schema for the Live channels data source
pub fn channels_schema() -> ResourceSchema {
    ResourceSchema::data("live_channels")
        .with_description("Lists Live channels, optionally filtered")
        .attribute(
            AttributeSchema::new("region", AttributeType::String)
                .computed()
                .with_description("Region to query (inherited from provider if not specified)"),
        )
        .attribute(
            AttributeSchema::new("domain_name", AttributeType::String)
                .with_description("Only channels of this ingest domain"),
        )
        .attribute(
            AttributeSchema::new("app_name", AttributeType::String)
                .with_description("Only channels of this application"),
        )
        .attribute(
            AttributeSchema::new("channel_id", AttributeType::String)
                .with_description("Only the channel with this ID"),
        )
        .attribute(
            AttributeSchema::block("channels", channel_item_block())
                .computed_only()
                .with_description("Matching channels"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwlive_core::resource::Value;
    use std::collections::HashMap;

    #[test]
    fn filters_are_optional() {
        assert!(channels_schema().validate(&HashMap::new()).is_ok());
    }

    #[test]
    fn channels_cannot_be_set() {
        let mut attrs = HashMap::new();
        attrs.insert("channels".to_string(), Value::List(vec![]));
        assert!(channels_schema().validate(&attrs).is_err());
    }

    #[test]
    fn item_block_reports_id_and_is_computed() {
        let item = channel_item_block();
        assert!(item.get("region").is_none());
        assert!(item.get("channel_id").is_none());
        assert_eq!(item.get("domain_name").unwrap().wire_name(), "domain");
        assert!(item.get("id").is_some());
        assert!(item.attributes.iter().all(|a| a.computed && !a.required));
    }
}
