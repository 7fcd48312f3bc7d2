//! hwlive Core
//!
//! Core library for declaratively managing Huawei Cloud Live resources.
//! Desired state is compared against observed state and turned into a
//! [`plan::Plan`] of effects, which an [`interpreter::Interpreter`] executes
//! through a [`provider::Provider`].

pub mod body;
pub mod differ;
pub mod effect;
pub mod interpreter;
pub mod path_search;
pub mod plan;
pub mod provider;
pub mod refresh;
pub mod resource;
pub mod resource_data;
pub mod schema;
