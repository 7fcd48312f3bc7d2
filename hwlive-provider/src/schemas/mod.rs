//! Huawei Cloud Live schema definitions

pub mod channel;
pub mod channels;

use hwlive_core::schema::ResourceSchema;

/// Returns all Live schemas
pub fn all_schemas() -> Vec<ResourceSchema> {
    vec![channel::channel_schema(), channels::channels_schema()]
}
