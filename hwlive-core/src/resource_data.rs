//! ResourceData - Desired attributes alongside the prior state
//!
//! Providers build request bodies from a `ResourceData` so they can ask
//! which attributes changed without repeating the differ's rules.

use std::collections::HashMap;

use crate::differ::values_match;
use crate::resource::{Resource, ResourceId, State, Value};

#[derive(Debug, Clone)]
pub struct ResourceData {
    id: ResourceId,
    identifier: Option<String>,
    desired: HashMap<String, Value>,
    prior: HashMap<String, Value>,
}

impl ResourceData {
    /// Data for a resource that does not exist yet
    pub fn new(resource: &Resource) -> Self {
        Self {
            id: resource.id.clone(),
            identifier: None,
            desired: resource.attributes.clone(),
            prior: HashMap::new(),
        }
    }

    /// Data for an update of an existing resource
    pub fn with_prior(resource: &Resource, prior: &State) -> Self {
        Self {
            id: resource.id.clone(),
            identifier: prior.identifier.clone(),
            desired: resource.attributes.clone(),
            prior: prior.attributes.clone(),
        }
    }

    /// Data built from state alone, e.g. for deletion
    pub fn from_state(state: &State) -> Self {
        Self {
            id: state.id.clone(),
            identifier: state.identifier.clone(),
            desired: state.attributes.clone(),
            prior: state.attributes.clone(),
        }
    }

    pub fn resource_id(&self) -> &ResourceId {
        &self.id
    }

    /// Remote identifier, if known
    pub fn id(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn set_id(&mut self, identifier: impl Into<String>) {
        self.identifier = Some(identifier.into());
    }

    /// Configured value, falling back to the prior state
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.desired.get(key).or_else(|| self.prior.get(key))
    }

    /// Value only when set to something other than a zero value
    pub fn get_ok(&self, key: &str) -> Option<&Value> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Desired attributes
    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.desired
    }

    pub fn has_change(&self, key: &str) -> bool {
        match (self.desired.get(key), self.prior.get(key)) {
            (Some(desired), Some(prior)) => !values_match(desired, prior),
            (Some(desired), None) => !desired.is_empty(),
            (None, Some(prior)) => !prior.is_empty(),
            (None, None) => false,
        }
    }

    pub fn has_changes(&self, keys: &[&str]) -> bool {
        keys.iter().any(|key| self.has_change(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prior() -> State {
        State::existing(
            ResourceId::new("live_channel", "main"),
            [
                ("name".to_string(), Value::from("old")),
                ("state".to_string(), Value::from("ON")),
                ("app_name".to_string(), Value::from("live")),
            ]
            .into_iter()
            .collect(),
        )
        .with_identifier("ch-1")
    }

    #[test]
    fn get_falls_back_to_prior_state() {
        let resource = Resource::new("live_channel", "main")
            .with_attribute("name", Value::from("new"))
            .with_attribute("encoder_settings", Value::List(vec![]));
        let data = ResourceData::with_prior(&resource, &prior());

        assert_eq!(data.id(), Some("ch-1"));
        assert_eq!(data.get_str("name"), Some("new"));
        assert_eq!(data.get_str("app_name"), Some("live"));
        assert!(data.get("encoder_settings").is_some());
        assert!(data.get_ok("encoder_settings").is_none());
    }

    #[test]
    fn detects_changes() {
        let resource = Resource::new("live_channel", "main")
            .with_attribute("name", Value::from("new"))
            .with_attribute("state", Value::from("ON"))
            .with_attribute("app_name", Value::from("live"));
        let data = ResourceData::with_prior(&resource, &prior());

        assert!(data.has_change("name"));
        assert!(!data.has_change("state"));
        assert!(!data.has_change("endpoints"));
        assert!(data.has_changes(&["state", "name"]));
        assert!(!data.has_changes(&["state", "app_name"]));
    }

    #[test]
    fn new_resource_has_no_identifier() {
        let mut data = ResourceData::new(&Resource::new("live_channel", "main"));
        assert_eq!(data.id(), None);
        data.set_id("generated");
        assert_eq!(data.id(), Some("generated"));
    }
}
