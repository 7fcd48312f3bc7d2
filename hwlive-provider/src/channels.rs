//! `live_channels` data source

use hwlive_core::body::flatten_body;
use hwlive_core::provider::ProviderResult;
use hwlive_core::resource::{Resource, State, Value};
use hwlive_core::resource_data::ResourceData;
use log::info;
use uuid::Uuid;

use crate::channel::CHANNELS_PATH;
use crate::client::OffsetPager;
use crate::provider::LiveProvider;
use crate::schemas::channels::channel_item_block;

/// Filter attributes and the query keys they are sent as
const FILTERS: &[(&str, &str)] = &[
    ("domain_name", "domain"),
    ("app_name", "app_name"),
    ("channel_id", "id"),
];

impl LiveProvider {
    /// List channels matching the configured filters
    pub async fn read_channels(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let d = ResourceData::new(resource);
        let region = self.region_or_default(d.get_str("region")).to_string();
        let client = self.client_for(id, &region).await?;

        let query: Vec<(&str, &str)> = FILTERS
            .iter()
            .filter_map(|(attr, key)| {
                d.get_ok(attr)
                    .and_then(Value::as_str)
                    .map(|value| (*key, value))
            })
            .collect();

        let items = OffsetPager::new("channels")
            .all(&client, CHANNELS_PATH, &query)
            .await
            .map_err(|e| e.into_provider_error("listing Live channels", id))?;
        info!("Found {} Live channel(s) in {}", items.len(), region);

        let item_block = channel_item_block();
        let channels = items
            .iter()
            .map(|item| Value::Map(flatten_body(&item_block, item)))
            .collect();

        let mut attributes = resource.attributes.clone();
        attributes.insert("region".to_string(), Value::from(region));
        attributes.insert("channels".to_string(), Value::List(channels));
        Ok(State::existing(id.clone(), attributes).with_identifier(Uuid::new_v4().to_string()))
    }
}
