//! `live_channel` resource operations

use hwlive_core::body::{build_attribute, build_body, flatten_body, remove_nil};
use hwlive_core::path_search::path_search;
use hwlive_core::provider::{ErrorKind, ProviderError, ProviderResult};
use hwlive_core::refresh::{StateChangeConf, WaitError};
use hwlive_core::resource::{Resource, ResourceId, State, Value};
use hwlive_core::resource_data::ResourceData;
use hwlive_core::schema::ResourceSchema;
use log::{debug, info};
use serde_json::{Map, Value as Json, json};
use uuid::Uuid;

use crate::client::ServiceClient;
use crate::error::ClientError;
use crate::provider::LiveProvider;
use crate::schemas::channel::channel_schema;

pub(crate) const CHANNELS_PATH: &str = "v1/{project_id}/ott/channels";

/// Attributes updated together, and the path suffix of their update API
///
/// `encorder-settings` is the API's own spelling.
const UPDATE_GROUPS: &[(&[&str], &str)] = &[
    (&["encoder_settings", "encoder_settings_expand"], "encorder-settings"),
    (&["endpoints"], "endpoints"),
    (&["name"], "general"),
    (&["input"], "input"),
    (&["record_settings"], "record-settings"),
];

/// Tolerated "not found" polls while a new channel becomes listable
const CREATE_NOT_FOUND_CHECKS: usize = 5;

impl LiveProvider {
    pub async fn create_channel(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let d = ResourceData::new(resource);
        let region = self.region_or_default(d.get_str("region")).to_string();
        let client = self.client_for(id, &region).await?;

        let channel_id = match d.get_ok("channel_id").and_then(Value::as_str) {
            Some(channel_id) => channel_id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        let body = create_body(&channel_schema(), &d, &channel_id);

        info!("Creating Live channel {} in {}", channel_id, region);
        client
            .post(CHANNELS_PATH, &body)
            .await
            .map_err(|e| e.into_provider_error("creating Live channel", id))?;

        let conf = StateChangeConf::new(&[], &["ON", "OFF"])
            .with_timeout(self.config().timeouts.create())
            .with_not_found_checks(CREATE_NOT_FOUND_CHECKS);
        wait_for_channel(&client, &channel_id, &conf)
            .await
            .map_err(|e| wait_error("waiting for Live channel creation", id, e))?;

        let state = self.read_channel(id, &region, &channel_id).await?;
        if !state.exists {
            return Err(ProviderError::not_found(format!(
                "Live channel {} disappeared after creation",
                channel_id
            ))
            .for_resource(id.clone()));
        }
        Ok(state)
    }

    /// Read a channel by ID; a missing channel yields `State::not_found`
    pub async fn read_channel(
        &self,
        id: &ResourceId,
        region: &str,
        channel_id: &str,
    ) -> ProviderResult<State> {
        let client = self.client_for(id, region).await?;
        let channel = fetch_channel(&client, channel_id)
            .await
            .map_err(|e| e.into_provider_error("reading Live channel", id))?;

        let Some(channel) = channel else {
            info!("Live channel {} not found", channel_id);
            return Ok(State::not_found(id.clone()));
        };

        let mut attributes = flatten_body(&channel_schema().block, &channel);
        attributes.insert("region".to_string(), Value::from(client.region()));
        Ok(State::existing(id.clone(), attributes).with_identifier(channel_id))
    }

    pub async fn update_channel(
        &self,
        id: &ResourceId,
        channel_id: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let d = ResourceData::with_prior(to, from);
        let region = self.region_or_default(d.get_str("region")).to_string();
        let client = self.client_for(id, &region).await?;
        let schema = channel_schema();

        for (keys, suffix) in UPDATE_GROUPS {
            if d.has_changes(keys) {
                self.put_group(&client, &schema, &d, channel_id, keys, suffix)
                    .await?;
            }
        }
        // Switching state last lets a channel start with its new settings
        if d.has_change("state")
            && let Some(target) = d.get_str("state")
        {
            self.put_group(&client, &schema, &d, channel_id, &["state"], "state")
                .await?;

            let pending = if target == "ON" { "OFF" } else { "ON" };
            let conf = StateChangeConf::new(&[pending], &[target])
                .with_timeout(self.config().timeouts.update());
            wait_for_channel(&client, channel_id, &conf)
                .await
                .map_err(|e| wait_error("waiting for Live channel state switch", id, e))?;
        }

        self.read_channel(id, &region, channel_id).await
    }

    async fn put_group(
        &self,
        client: &ServiceClient,
        schema: &ResourceSchema,
        d: &ResourceData,
        channel_id: &str,
        keys: &[&str],
        suffix: &str,
    ) -> ProviderResult<()> {
        let body = update_body(schema, d, channel_id, keys);
        info!("Updating Live channel {} ({})", channel_id, suffix);
        client
            .put(&format!("{}/{}", CHANNELS_PATH, suffix), &body)
            .await
            .map_err(|e| {
                e.into_provider_error(
                    &format!("updating Live channel {}", keys.join(", ")),
                    d.resource_id(),
                )
            })?;
        Ok(())
    }

    /// Delete a channel, switching it off first when it is running
    ///
    /// A channel that is already gone counts as deleted.
    pub async fn delete_channel(
        &self,
        id: &ResourceId,
        channel_id: &str,
        from: &State,
    ) -> ProviderResult<()> {
        let region = self.region_or_default(from.get_str("region")).to_string();
        let client = self.client_for(id, &region).await?;
        let domain = from.get_str("domain_name").unwrap_or_default();
        let app_name = from.get_str("app_name").unwrap_or_default();

        if from.get_str("state") == Some("ON") {
            info!("Stopping Live channel {} before deletion", channel_id);
            let body = remove_nil(json!({
                "domain": domain,
                "app_name": app_name,
                "id": channel_id,
                "state": "OFF",
            }));
            match client.put(&format!("{}/state", CHANNELS_PATH), &body).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(e.into_provider_error("stopping Live channel", id)),
            }

            let conf = StateChangeConf::new(&["ON"], &["OFF"])
                .with_timeout(self.config().timeouts.delete())
                .with_not_found_checks(0);
            match wait_for_channel(&client, channel_id, &conf).await {
                Ok(_) => {}
                Err(WaitError::NotFound { .. }) => return Ok(()),
                Err(e) => return Err(wait_error("waiting for Live channel to stop", id, e)),
            }
        }

        info!("Deleting Live channel {}", channel_id);
        let query = [("domain", domain), ("app_name", app_name), ("id", channel_id)];
        match client.delete(CHANNELS_PATH, &query).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("Live channel {} was already deleted", channel_id);
                Ok(())
            }
            Err(e) => Err(e.into_provider_error("deleting Live channel", id)),
        }
    }
}

/// First channel listed under `id`, if any
pub(crate) async fn fetch_channel(
    client: &ServiceClient,
    channel_id: &str,
) -> Result<Option<Json>, ClientError> {
    match client.get(CHANNELS_PATH, &[("id", channel_id)]).await {
        Ok(body) => Ok(path_search("channels|[0]", &body)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

async fn channel_status(
    client: &ServiceClient,
    channel_id: &str,
) -> Result<Option<(Json, String)>, ClientError> {
    let channel = fetch_channel(client, channel_id).await?;
    Ok(channel.map(|channel| {
        let status = match path_search("state", &channel) {
            Some(Json::String(status)) => status,
            _ => String::new(),
        };
        (channel, status)
    }))
}

async fn wait_for_channel(
    client: &ServiceClient,
    channel_id: &str,
    conf: &StateChangeConf,
) -> Result<Option<Json>, WaitError> {
    conf.wait_for_state(|| channel_status(client, channel_id))
        .await
}

fn wait_error(action: &str, id: &ResourceId, e: WaitError) -> ProviderError {
    let kind = match e {
        WaitError::Timeout { .. } => ErrorKind::Timeout,
        WaitError::NotFound { .. } => ErrorKind::NotFound,
        _ => ErrorKind::Other,
    };
    ProviderError::new(format!("error {}", action))
        .with_kind(kind)
        .for_resource(id.clone())
        .with_cause(e)
}

/// Body of the create request: every configured attribute plus the ID
fn create_body(schema: &ResourceSchema, d: &ResourceData, channel_id: &str) -> Json {
    let mut body = build_body(&schema.block, d.attributes());
    if let Json::Object(map) = &mut body {
        map.remove("region");
        map.insert("id".to_string(), Json::String(channel_id.to_string()));
    }
    remove_nil(body)
}

/// Body of a group update: the channel address plus the group's attributes
///
/// Group values come from the configuration only, so a removed attribute is
/// sent as absent rather than as its prior value.
fn update_body(schema: &ResourceSchema, d: &ResourceData, channel_id: &str, keys: &[&str]) -> Json {
    let address = |key: &str| d.get(key).map(Value::to_json).unwrap_or(Json::Null);

    let mut body = Map::new();
    body.insert("domain".to_string(), address("domain_name"));
    body.insert("app_name".to_string(), address("app_name"));
    body.insert("id".to_string(), Json::String(channel_id.to_string()));
    for key in keys {
        let Some(attr) = schema.get(key) else {
            continue;
        };
        let value = d
            .attributes()
            .get(*key)
            .map(|value| build_attribute(attr, value))
            .unwrap_or(Json::Null);
        body.insert(attr.wire_name().to_string(), value);
    }
    remove_nil(Json::Object(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn map(entries: Vec<(&str, Value)>) -> Value {
        Value::Map(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    fn channel(entries: Vec<(&str, Value)>) -> Resource {
        let mut resource = Resource::new("live_channel", "main");
        for (k, v) in entries {
            resource = resource.with_attribute(k, v);
        }
        resource
    }

    #[test]
    fn create_body_uses_wire_names_and_drops_empty_values() {
        let resource = channel(vec![
            ("region", Value::from("cn-north-4")),
            ("domain_name", Value::from("play.example.com")),
            ("app_name", Value::from("live")),
            ("state", Value::from("OFF")),
            ("name", Value::from("")),
            (
                "input",
                Value::List(vec![map(vec![
                    ("input_protocol", Value::from("RTMP_PUSH")),
                    ("ip_port_mode", Value::Bool(false)),
                    ("max_bandwidth_limit", Value::Int(0)),
                ])]),
            ),
            (
                "record_settings",
                Value::List(vec![map(vec![("rollingbuffer_duration", Value::Int(3600))])]),
            ),
        ]);
        let body = create_body(&channel_schema(), &ResourceData::new(&resource), "ch-1");

        assert_eq!(
            body,
            json!({
                "domain": "play.example.com",
                "app_name": "live",
                "state": "OFF",
                "id": "ch-1",
                "input": {"input_protocol": "RTMP_PUSH", "max_bandwidth_limit": 0},
                "record_settings": {"rollingbuffer_duration": 3600}
            })
        );
    }

    #[test]
    fn create_body_keeps_configured_channel_id() {
        let resource = channel(vec![("channel_id", Value::from("fixed"))]);
        let body = create_body(&channel_schema(), &ResourceData::new(&resource), "fixed");
        assert_eq!(body["id"], json!("fixed"));
        assert!(body.get("channel_id").is_none());
    }

    #[test]
    fn update_body_addresses_channel_and_sends_group() {
        let prior = State::existing(
            ResourceId::new("live_channel", "main"),
            [
                ("domain_name".to_string(), Value::from("play.example.com")),
                ("app_name".to_string(), Value::from("live")),
                ("name".to_string(), Value::from("old")),
            ]
            .into_iter()
            .collect::<HashMap<_, _>>(),
        );
        let desired = channel(vec![("name", Value::from("new"))]);
        let d = ResourceData::with_prior(&desired, &prior);

        let body = update_body(&channel_schema(), &d, "ch-1", &["name"]);
        assert_eq!(
            body,
            json!({"domain": "play.example.com", "app_name": "live", "id": "ch-1", "name": "new"})
        );

        let body = update_body(&channel_schema(), &d, "ch-1", &["encoder_settings"]);
        assert!(body.get("encoder_settings").is_none());
    }

    #[test]
    fn mss_delay_segment_zero_is_omitted() {
        let resource = channel(vec![(
            "endpoints",
            Value::List(vec![map(vec![(
                "mss_package",
                Value::List(vec![map(vec![
                    ("url", Value::from("/mss")),
                    ("segment_duration_seconds", Value::Int(2)),
                    ("delay_segment", Value::Int(0)),
                ])]),
            )])]),
        )]);
        let body = create_body(&channel_schema(), &ResourceData::new(&resource), "ch-1");
        assert_eq!(
            body["endpoints"],
            json!([{"mss_package": [{"url": "/mss", "segment_duration_seconds": 2}]}])
        );
    }

    #[test]
    fn wait_errors_keep_their_kind() {
        let id = ResourceId::new("live_channel", "main");
        let err = wait_error(
            "waiting",
            &id,
            WaitError::Timeout {
                last_state: "ON".to_string(),
                expected: vec!["OFF".to_string()],
            },
        );
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(wait_error("waiting", &id, WaitError::NotFound { checks: 5 }).is_not_found());
    }
}
