//! Resource type definitions for Huawei Cloud Live

use hwlive_core::provider::ResourceType;
use hwlive_core::schema::ResourceSchema;

use crate::schemas::{channel, channels};

// =============================================================================
// Resource Type Definitions
// =============================================================================

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr, $schema:path) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn schema(&self) -> ResourceSchema {
                $schema()
            }
        }
    };
}

define_resource_type!(LiveChannelType, "live_channel", channel::channel_schema);
define_resource_type!(LiveChannelsType, "live_channels", channels::channels_schema);

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![Box::new(LiveChannelType), Box::new(LiveChannelsType)]
}
