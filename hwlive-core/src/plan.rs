//! Plan - Collection of Effects
//!
//! A Plan is an ordered list of Effects to be executed.
//! No side effects occur until the Plan is applied.

use crate::effect::Effect;

/// Plan containing Effects to be executed
#[derive(Debug, Clone, Default)]
pub struct Plan {
    effects: Vec<Effect>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Number of mutating Effects
    pub fn mutation_count(&self) -> usize {
        self.effects.iter().filter(|e| e.is_mutating()).count()
    }

    /// True when nothing but data source reads is planned
    pub fn has_changes(&self) -> bool {
        self.mutation_count() > 0
    }

    /// Generate a summary of the Plan for display
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for effect in &self.effects {
            match effect {
                Effect::Read(_) => summary.read += 1,
                Effect::Create(_) => summary.create += 1,
                Effect::Update { .. } => summary.update += 1,
                Effect::Replace { .. } => summary.replace += 1,
                Effect::Delete { .. } => summary.delete += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub read: usize,
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Plan: {} to create, {} to update, {} to replace, {} to delete",
            self.create, self.update, self.replace, self.delete
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Resource, ResourceId, State};

    #[test]
    fn summary_counts_each_kind() {
        let id = ResourceId::new("live_channel", "main");
        let state = State::not_found(id.clone());
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("live_channel", "a")));
        plan.add(Effect::Read(
            Resource::new("live_channels", "all").with_read_only(true),
        ));
        plan.add(Effect::Replace {
            id: id.clone(),
            from: state.clone(),
            to: Resource::new("live_channel", "main"),
            forced_by: vec!["app_name".to_string()],
        });
        plan.add(Effect::Delete { id, from: state });

        let summary = plan.summary();
        assert_eq!(summary.read, 1);
        assert_eq!(plan.mutation_count(), 3);
        assert_eq!(
            summary.to_string(),
            "Plan: 1 to create, 0 to update, 1 to replace, 1 to delete"
        );
    }

    #[test]
    fn read_only_plan_has_no_changes() {
        let mut plan = Plan::new();
        plan.add(Effect::Read(
            Resource::new("live_channels", "all").with_read_only(true),
        ));
        assert!(!plan.is_empty());
        assert!(!plan.has_changes());
    }
}
