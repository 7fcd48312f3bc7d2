//! State file structures for persisting managed channels

use std::collections::BTreeMap;

use hwlive_core::resource::{ResourceId, State, Value};
use serde::{Deserialize, Serialize};

/// The main state file structure that persists to the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Incremented on every write
    pub serial: u64,
    /// Identifies one state history; two files with different lineages never merge
    pub lineage: String,
    /// Version of hwlive that last modified this state
    pub hwlive_version: String,
    /// Managed resources in the order they were first recorded
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    /// Current state file format version
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self::with_lineage(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_lineage(lineage: impl Into<String>) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage: lineage.into(),
            hwlive_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Bump the serial and stamp the running version before a write
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.hwlive_version = env!("CARGO_PKG_VERSION").to_string();
    }

    pub fn find(&self, id: &ResourceId) -> Option<&ResourceState> {
        self.resources.iter().find(|r| r.matches(id))
    }

    /// Add or replace a resource, keeping its position
    pub fn upsert(&mut self, resource: ResourceState) {
        let id = resource.id();
        match self.resources.iter_mut().find(|r| r.matches(&id)) {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
    }

    pub fn remove(&mut self, id: &ResourceId) -> Option<ResourceState> {
        let pos = self.resources.iter().position(|r| r.matches(id))?;
        Some(self.resources.remove(pos))
    }

    /// Record an observed state: existing resources are upserted, missing ones removed
    pub fn record(&mut self, state: &State, provider: &str) {
        if state.exists {
            let protected = self.find(&state.id).is_some_and(|r| r.protected);
            self.upsert(ResourceState::from_state(state, provider).with_protected(protected));
        } else {
            self.remove(&state.id);
        }
    }

    /// All recorded resources as core states
    pub fn states(&self) -> Vec<State> {
        self.resources.iter().map(ResourceState::to_state).collect()
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type (e.g., "live_channel")
    pub resource_type: String,
    pub name: String,
    /// Provider name (e.g., "huaweicloud")
    pub provider: String,
    /// Remote identifier (the channel ID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Protected resources are never deleted by `destroy`
    #[serde(default)]
    pub protected: bool,
}

impl ResourceState {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            provider: provider.into(),
            identifier: None,
            attributes: BTreeMap::new(),
            protected: false,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    fn matches(&self, id: &ResourceId) -> bool {
        self.resource_type == id.resource_type && self.name == id.name
    }

    pub fn from_state(state: &State, provider: impl Into<String>) -> Self {
        Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            provider: provider.into(),
            identifier: state.identifier.clone(),
            attributes: state
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
            protected: false,
        }
    }

    /// Recorded resources always exist; null attributes are dropped
    pub fn to_state(&self) -> State {
        let attributes = self
            .attributes
            .iter()
            .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
            .collect();
        let state = State::existing(self.id(), attributes);
        match &self.identifier {
            Some(identifier) => state.with_identifier(identifier),
            None => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn channel_state(name: &str, channel_id: &str) -> State {
        State::existing(
            ResourceId::new("live_channel", name),
            [
                ("domain_name".to_string(), Value::from("play.example.com")),
                ("state".to_string(), Value::from("ON")),
            ]
            .into_iter()
            .collect(),
        )
        .with_identifier(channel_id)
    }

    #[test]
    fn new_state_file() {
        let state = StateFile::new();
        assert_eq!(state.version, StateFile::CURRENT_VERSION);
        assert_eq!(state.serial, 0);
        assert!(!state.lineage.is_empty());
        assert!(state.resources.is_empty());
    }

    #[test]
    fn increment_serial() {
        let mut state = StateFile::new();
        state.increment_serial();
        state.increment_serial();
        assert_eq!(state.serial, 2);
    }

    #[test]
    fn upsert_keeps_position() {
        let mut state = StateFile::new();
        state.upsert(ResourceState::new("live_channel", "a", "huaweicloud"));
        state.upsert(ResourceState::new("live_channel", "b", "huaweicloud"));
        state.upsert(
            ResourceState::new("live_channel", "a", "huaweicloud").with_identifier("ch-a"),
        );

        assert_eq!(state.resources.len(), 2);
        assert_eq!(state.resources[0].name, "a");
        assert_eq!(state.resources[0].identifier.as_deref(), Some("ch-a"));
    }

    #[test]
    fn record_upserts_existing_and_drops_missing() {
        let mut file = StateFile::new();
        file.record(&channel_state("main", "ch-1"), "huaweicloud");
        assert_eq!(file.resources.len(), 1);

        let id = ResourceId::new("live_channel", "main");
        file.record(&State::not_found(id.clone()), "huaweicloud");
        assert!(file.find(&id).is_none());
        assert!(file.remove(&id).is_none());
    }

    #[test]
    fn record_keeps_protection() {
        let mut file = StateFile::new();
        file.upsert(ResourceState::new("live_channel", "main", "huaweicloud").with_protected(true));
        file.record(&channel_state("main", "ch-1"), "huaweicloud");
        let id = ResourceId::new("live_channel", "main");
        assert!(file.find(&id).unwrap().protected);
    }

    #[test]
    fn converts_to_and_from_core_state() {
        let state = channel_state("main", "ch-1");
        let recorded = ResourceState::from_state(&state, "huaweicloud");
        assert_eq!(recorded.attributes["state"], json!("ON"));
        assert_eq!(recorded.to_state(), state);
    }

    #[test]
    fn serialization_round_trip() {
        let mut file = StateFile::new();
        file.record(&channel_state("main", "ch-1"), "huaweicloud");

        let text = serde_json::to_string_pretty(&file).unwrap();
        assert!(text.contains("\"hwlive_version\""));
        let parsed: StateFile = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.lineage, file.lineage);
        assert_eq!(parsed.states(), file.states());
    }
}
