//! Effect - Side effects represented as values

use crate::resource::{Resource, ResourceId, State};

/// A single operation against the remote API
///
/// Effects are plain data; nothing happens until an
/// [`Interpreter`](crate::interpreter::Interpreter) executes them.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Evaluate a data source
    Read(Resource),
    Create(Resource),
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Delete then create, because a force-new attribute changed
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        forced_by: Vec<String>,
    },
    Delete {
        id: ResourceId,
        from: State,
    },
}

impl Effect {
    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Read(r) | Effect::Create(r) => &r.id,
            Effect::Update { id, .. } | Effect::Replace { id, .. } | Effect::Delete { id, .. } => {
                id
            }
        }
    }

    /// Whether executing this Effect changes remote objects
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Effect::Read(_))
    }
}
