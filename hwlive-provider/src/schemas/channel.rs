//! Live channel schema definition

use hwlive_core::schema::{AttributeSchema, AttributeType, BlockSchema, ResourceSchema, types};

fn string(name: &str) -> AttributeSchema {
    AttributeSchema::new(name, AttributeType::String)
}

fn int(name: &str) -> AttributeSchema {
    AttributeSchema::new(name, AttributeType::Int)
}

fn boolean(name: &str) -> AttributeSchema {
    AttributeSchema::new(name, AttributeType::Bool)
}

fn string_list(name: &str) -> AttributeSchema {
    AttributeSchema::new(name, types::string_list())
}

fn single_block(name: &str, block: BlockSchema) -> AttributeSchema {
    AttributeSchema::block(name, block).max_items(1)
}

/// Returns the schema for Live channels
pub fn channel_schema() -> ResourceSchema {
    ResourceSchema::new("live_channel")
        .with_description("A Live transcoding channel (OTT)")
        .attribute(
            string("region")
                .computed()
                .force_new()
                .with_description("Region of the channel (inherited from provider if not specified)"),
        )
        .attribute(
            string("domain_name")
                .required()
                .force_new()
                .with_provider_name("domain")
                .with_description("Ingest domain name"),
        )
        .attribute(
            string("app_name")
                .required()
                .force_new()
                .with_description("Application name"),
        )
        .attribute(
            AttributeSchema::new("state", types::one_of(&["ON", "OFF"]))
                .required()
                .with_description("Channel state, ON or OFF"),
        )
        .attribute(
            single_block("input", input_block())
                .required()
                .with_description("Channel input"),
        )
        .attribute(
            single_block("record_settings", record_settings_block())
                .required()
                .with_description("Time shift recording settings"),
        )
        .attribute(
            AttributeSchema::block("endpoints", endpoint_block())
                .required()
                .with_description("Packaging endpoints"),
        )
        .attribute(
            single_block("encoder_settings_expand", encoder_settings_expand_block())
                .with_description("Extended transcoding settings"),
        )
        .attribute(
            AttributeSchema::block("encoder_settings", encoder_settings_block())
                .with_description("Transcoding templates"),
        )
        .attribute(string("name").with_description("Channel name"))
        .attribute(
            string("channel_id")
                .computed()
                .force_new()
                .with_provider_name("id")
                .with_description("Channel ID (generated when not specified)"),
        )
}

// =============================================================================
// Input
// =============================================================================

fn input_block() -> BlockSchema {
    BlockSchema::new()
        .attribute(string("input_protocol").required().force_new())
        .attribute(AttributeSchema::block("sources", source_block(true)))
        .attribute(AttributeSchema::block("secondary_sources", source_block(false)))
        .attribute(
            single_block(
                "failover_conditions",
                BlockSchema::new()
                    .attribute(int("input_loss_threshold_msec").computed())
                    .attribute(string("input_preference").computed()),
            )
            .computed(),
        )
        .attribute(int("max_bandwidth_limit").computed())
        .attribute(boolean("ip_port_mode").computed())
        .attribute(string("ip_whitelist").computed())
        .attribute(string("scte35_source").computed())
        .attribute(string_list("ad_triggers").computed())
        .attribute(AttributeSchema::block("audio_selectors", audio_selector_block()))
}

/// Primary sources can take snapshots, secondary sources cannot
fn source_block(with_snapshot: bool) -> BlockSchema {
    let mut block = BlockSchema::new()
        .attribute(string("url").computed())
        .attribute(int("bitrate").computed())
        .attribute(int("width").computed())
        .attribute(int("height").computed());
    if with_snapshot {
        block = block.attribute(boolean("enable_snapshot").computed());
    }
    block
        .attribute(boolean("bitrate_for3u8").computed())
        .attribute(string("passphrase").computed().sensitive())
        .attribute(string_list("backup_urls").computed())
        .attribute(string("stream_id").computed())
        .attribute(int("latency").computed())
}

fn audio_selector_block() -> BlockSchema {
    BlockSchema::new()
        .attribute(string("name").required())
        .attribute(single_block(
            "selector_settings",
            BlockSchema::new()
                .attribute(single_block(
                    "audio_language_selection",
                    BlockSchema::new()
                        .attribute(string("language_code").required())
                        .attribute(string("language_selection_policy").computed()),
                ))
                .attribute(single_block(
                    "audio_pid_selection",
                    BlockSchema::new().attribute(int("pid").required()),
                ))
                .attribute(single_block(
                    "audio_hls_selection",
                    BlockSchema::new()
                        .attribute(string("name").required())
                        .attribute(string("group_id").required()),
                )),
        ))
}

fn record_settings_block() -> BlockSchema {
    BlockSchema::new().attribute(
        int("rollingbuffer_duration")
            .required()
            .with_description("Maximum time shift duration, in seconds"),
    )
}

// =============================================================================
// Endpoints
// =============================================================================

fn endpoint_block() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::block("hls_package", hls_package_block()))
        .attribute(AttributeSchema::block("dash_package", dash_package_block()))
        .attribute(AttributeSchema::block("mss_package", mss_package_block()))
}

/// Attributes shared by every package type
fn package_block() -> BlockSchema {
    BlockSchema::new()
        .attribute(string("url").required())
        .attribute(AttributeSchema::block("stream_selection", stream_selection_block()))
        .attribute(int("segment_duration_seconds").required())
        .attribute(int("playlist_window_seconds").computed())
        .attribute(single_block("encryption", encryption_block()))
        .attribute(single_block("request_args", request_args_block()))
}

fn hls_package_block() -> BlockSchema {
    package_block()
        .attribute(string("hls_version").computed())
        .attribute(string_list("ad_marker"))
}

fn dash_package_block() -> BlockSchema {
    package_block().attribute(string("ad_marker").computed())
}

fn mss_package_block() -> BlockSchema {
    package_block().attribute(int("delay_segment").computed().omit_empty())
}

fn stream_selection_block() -> BlockSchema {
    BlockSchema::new()
        .attribute(string("key").computed())
        .attribute(int("max_bandwidth").computed())
        .attribute(int("min_bandwidth").computed())
}

fn encryption_block() -> BlockSchema {
    BlockSchema::new()
        .attribute(string("resource_id").required())
        .attribute(string_list("system_ids").required())
        .attribute(string("url").required())
        .attribute(string("speke_version").required())
        .attribute(string("request_mode").required())
        .attribute(int("key_rotation_interval_seconds").computed())
        .attribute(string("encryption_method").computed())
        .attribute(string("level").computed())
        .attribute(AttributeSchema::block(
            "http_headers",
            BlockSchema::new()
                .attribute(string("key").required())
                .attribute(string("value").required()),
        ))
        .attribute(string("urn"))
}

fn request_args_block() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::block(
            "record",
            BlockSchema::new()
                .attribute(string("start_time").computed())
                .attribute(string("end_time").computed())
                .attribute(string("format").computed())
                .attribute(string("unit").computed()),
        ))
        .attribute(AttributeSchema::block(
            "timeshift",
            BlockSchema::new()
                .attribute(string("back_time").computed())
                .attribute(string("unit").computed()),
        ))
        .attribute(AttributeSchema::block(
            "live",
            BlockSchema::new()
                .attribute(string("delay").computed())
                .attribute(string("unit").computed()),
        ))
}

// =============================================================================
// Encoding
// =============================================================================

fn encoder_settings_expand_block() -> BlockSchema {
    BlockSchema::new().attribute(AttributeSchema::block(
        "audio_descriptions",
        BlockSchema::new()
            .attribute(string("name").required())
            .attribute(string("audio_selector_name").required())
            .attribute(string("language_code_control").computed())
            .attribute(string("language_code").computed())
            .attribute(string("stream_name").computed()),
    ))
}

fn encoder_settings_block() -> BlockSchema {
    BlockSchema::new().attribute(string("template_id").computed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwlive_core::resource::Value;
    use hwlive_core::schema::{TypeError, WireMode};
    use std::collections::HashMap;

    fn map(entries: Vec<(&str, Value)>) -> Value {
        Value::Map(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    fn block(entries: Vec<(&str, Value)>) -> Value {
        Value::List(vec![map(entries)])
    }

    fn valid_attributes() -> HashMap<String, Value> {
        [
            ("domain_name", Value::from("play.example.com")),
            ("app_name", Value::from("live")),
            ("state", Value::from("OFF")),
            (
                "input",
                block(vec![
                    ("input_protocol", Value::from("RTMP_PUSH")),
                    (
                        "sources",
                        Value::List(vec![map(vec![
                            ("url", Value::from("rtmp://origin/live/s1")),
                            ("bitrate", Value::Int(800)),
                        ])]),
                    ),
                ]),
            ),
            (
                "record_settings",
                block(vec![("rollingbuffer_duration", Value::Int(3600))]),
            ),
            (
                "endpoints",
                block(vec![(
                    "hls_package",
                    Value::List(vec![map(vec![
                        ("url", Value::from("/hls/index.m3u8")),
                        ("segment_duration_seconds", Value::Int(4)),
                    ])]),
                )]),
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[test]
    fn valid_channel() {
        assert!(channel_schema().validate(&valid_attributes()).is_ok());
    }

    #[test]
    fn missing_record_settings() {
        let mut attrs = valid_attributes();
        attrs.remove("record_settings");
        let errors = channel_schema().validate(&attrs).unwrap_err();
        assert!(matches!(
            &errors[0],
            TypeError::MissingRequired { name } if name == "record_settings"
        ));
    }

    #[test]
    fn invalid_state() {
        let mut attrs = valid_attributes();
        attrs.insert("state".to_string(), Value::from("RUNNING"));
        assert!(channel_schema().validate(&attrs).is_err());
    }

    #[test]
    fn encryption_requires_key_server_fields() {
        let mut attrs = valid_attributes();
        attrs.insert(
            "endpoints".to_string(),
            block(vec![(
                "hls_package",
                Value::List(vec![map(vec![
                    ("url", Value::from("/hls/index.m3u8")),
                    ("segment_duration_seconds", Value::Int(4)),
                    ("encryption", block(vec![("url", Value::from("https://kms"))])),
                ])]),
            )]),
        );
        let errors = channel_schema().validate(&attrs).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string()
            == "Required attribute 'endpoints.0.hls_package.0.encryption.0.resource_id' is missing"));
    }

    #[test]
    fn wire_names_and_modes() {
        let schema = channel_schema();
        assert_eq!(schema.get("domain_name").unwrap().wire_name(), "domain");
        assert_eq!(schema.get("channel_id").unwrap().wire_name(), "id");
        assert_eq!(schema.get("app_name").unwrap().wire_name(), "app_name");

        let endpoints = schema.get("endpoints").unwrap().attr_type.as_block().unwrap();
        let mss = endpoints.get("mss_package").unwrap().attr_type.as_block().unwrap();
        assert_eq!(mss.get("delay_segment").unwrap().wire, WireMode::OmitEmpty);
        assert_eq!(
            mss.get("segment_duration_seconds").unwrap().wire,
            WireMode::Raw
        );
        assert!(mss.get("hls_version").is_none());
    }

    #[test]
    fn secondary_sources_have_no_snapshot() {
        let schema = channel_schema();
        let input = schema.get("input").unwrap().attr_type.as_block().unwrap();
        let primary = input.get("sources").unwrap().attr_type.as_block().unwrap();
        let secondary = input
            .get("secondary_sources")
            .unwrap()
            .attr_type
            .as_block()
            .unwrap();
        assert!(primary.get("enable_snapshot").is_some());
        assert!(secondary.get("enable_snapshot").is_none());
        assert!(input.get("input_protocol").unwrap().force_new);
    }
}
