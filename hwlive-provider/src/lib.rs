//! hwlive Huawei Cloud Live Provider
//!
//! Manages Live OTT channels through the Huawei Cloud REST API.
//!
//! ## Module Structure
//!
//! - `config` - Provider settings and environment overrides
//! - `signer` - AK/SK request signing
//! - `client` - Signed JSON client, retries and pagination
//! - `provider` - LiveProvider and its per-region clients
//! - `channel` - `live_channel` resource operations
//! - `channels` - `live_channels` data source
//! - `schemas` - Resource schemas

pub mod channel;
pub mod channels;
pub mod client;
pub mod config;
pub mod error;
pub mod provider;
pub mod resources;
pub mod schemas;
pub mod signer;

// Re-export main types
pub use config::{Config, ConfigError};
pub use error::ClientError;
pub use provider::LiveProvider;

use hwlive_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult, ResourceType};
use hwlive_core::resource::{Resource, ResourceId, State};

use resources::resource_types;

const CHANNEL_TYPE: &str = "live_channel";
const CHANNELS_TYPE: &str = "live_channels";

fn unsupported(id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("Unsupported resource type: {}", id.resource_type))
        .for_resource(id.clone())
}

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for LiveProvider {
    fn name(&self) -> &'static str {
        "huaweicloud"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        Box::pin(async move {
            if id.resource_type != CHANNEL_TYPE {
                return Err(unsupported(&id));
            }
            match identifier {
                Some(channel_id) => {
                    let region = self.config().region.clone();
                    self.read_channel(&id, &region, &channel_id).await
                }
                None => Ok(State::not_found(id)),
            }
        })
    }

    fn refresh(&self, state: &State) -> BoxFuture<'_, ProviderResult<State>> {
        let state = state.clone();
        Box::pin(async move {
            if state.id.resource_type != CHANNEL_TYPE {
                return Err(unsupported(&state.id));
            }
            match state.identifier.as_deref() {
                Some(channel_id) => {
                    let region = self.region_or_default(state.get_str("region")).to_string();
                    self.read_channel(&state.id, &region, channel_id).await
                }
                None => Ok(State::not_found(state.id.clone())),
            }
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            if resource.id.resource_type != CHANNEL_TYPE {
                return Err(unsupported(&resource.id));
            }
            self.create_channel(&resource).await
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move {
            if id.resource_type != CHANNEL_TYPE {
                return Err(unsupported(&id));
            }
            self.update_channel(&id, &identifier, &from, &to).await
        })
    }

    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        Box::pin(async move {
            if id.resource_type != CHANNEL_TYPE {
                return Err(unsupported(&id));
            }
            self.delete_channel(&id, &identifier, &from).await
        })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            if resource.id.resource_type != CHANNELS_TYPE {
                return Err(unsupported(&resource.id));
            }
            self.read_channels(&resource).await
        })
    }
}
