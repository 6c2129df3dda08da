//! Event delegation: one root listener per event name, logical targets
//! resolved through the node table.

mod native;

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::dom::{Document, NodeHandle};
use crate::interpreter::{NodeId, NodeTable};
use crate::value::BoundaryValue;

pub use native::{
    normalize, AnimationData, CompositionData, DeltaMode, EventData, KeyboardData, MouseData,
    NativeEvent, NormalizeError, PointerData, TouchData, TransitionData, WheelData,
};

/// Report delivered to the engine for one captured event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub target_node_id: NodeId,
    pub event_name: String,
    pub bubbles: bool,
    pub normalized_fields: JsonMap<String, JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<BoundaryValue>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DispatchOutcome {
    pub record: Option<EventRecord>,
    pub default_prevented: bool,
}

#[derive(Debug, Clone)]
struct Interest {
    handler: BoundaryValue,
    count: usize,
}

/// Reference-counted delegation table.
#[derive(Debug, Default)]
pub struct Delegator {
    interests: HashMap<(NodeId, String), Interest>,
    root_counts: HashMap<String, usize>,
}

impl Delegator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records interest of `id` in `name`. Returns `true` when this installed
    /// the shared root listener.
    pub fn add_listener(
        &mut self,
        document: &mut Document,
        id: NodeId,
        name: &str,
        handler: BoundaryValue,
    ) -> bool {
        let interest = self
            .interests
            .entry((id, name.to_string()))
            .or_insert(Interest {
                handler: BoundaryValue::Null,
                count: 0,
            });
        interest.count += 1;
        interest.handler = handler;

        let count = self.root_counts.entry(name.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            let installed = document.install_root_listener(name);
            tracing::debug!(target: "events", event = name, "installed root listener");
            return installed;
        }
        false
    }

    /// Drops one unit of interest. Returns `true` when this removed the shared
    /// root listener. Unknown registrations are ignored.
    pub fn remove_listener(&mut self, document: &mut Document, id: NodeId, name: &str) -> bool {
        let key = (id, name.to_string());
        let Some(interest) = self.interests.get_mut(&key) else {
            tracing::debug!(
                target: "events",
                id = %id,
                event = name,
                "ignoring removal of unknown listener"
            );
            return false;
        };
        interest.count -= 1;
        if interest.count == 0 {
            self.interests.remove(&key);
        }

        self.release_root(document, name, 1)
    }

    /// Drops all interest registered under `id`, for when the id stops naming
    /// its node. Returns the number of registrations released.
    pub fn forget(&mut self, document: &mut Document, id: NodeId) -> usize {
        let doomed: Vec<(String, usize)> = self
            .interests
            .iter()
            .filter(|((owner, _), _)| *owner == id)
            .map(|((_, name), interest)| (name.clone(), interest.count))
            .collect();
        let mut released = 0;
        for (name, count) in doomed {
            self.interests.remove(&(id, name.clone()));
            self.release_root(document, &name, count);
            released += count;
        }
        if released > 0 {
            tracing::debug!(target: "events", id = %id, released, "dropped listeners of unbound id");
        }
        released
    }

    fn release_root(&mut self, document: &mut Document, name: &str, units: usize) -> bool {
        let Some(count) = self.root_counts.get_mut(name) else {
            return false;
        };
        *count = count.saturating_sub(units);
        if *count > 0 {
            return false;
        }
        self.root_counts.remove(name);
        tracing::debug!(target: "events", event = name, "uninstalled root listener");
        document.uninstall_root_listener(name)
    }

    pub fn is_listening(&self, id: NodeId, name: &str) -> bool {
        self.interests.contains_key(&(id, name.to_string()))
    }

    pub fn interest_count(&self, id: NodeId, name: &str) -> usize {
        self.interests
            .get(&(id, name.to_string()))
            .map(|interest| interest.count)
            .unwrap_or(0)
    }

    pub fn handler(&self, id: NodeId, name: &str) -> Option<&BoundaryValue> {
        self.interests
            .get(&(id, name.to_string()))
            .map(|interest| &interest.handler)
    }

    /// Number of logical registrations behind the root listener for `name`.
    pub fn root_count(&self, name: &str) -> usize {
        self.root_counts.get(name).copied().unwrap_or(0)
    }

    /// Handles one native event inside its event turn.
    pub fn dispatch(
        &self,
        document: &Document,
        table: &NodeTable,
        event: &NativeEvent,
    ) -> DispatchOutcome {
        if !document.has_root_listener(&event.name) {
            return DispatchOutcome::default();
        }

        let Some((target_node, target_id)) = resolve_target(document, table, event.target) else {
            tracing::debug!(
                target: "events",
                event = %event.name,
                native_target = %event.target,
                "dropping event without a tracked target"
            );
            return DispatchOutcome::default();
        };

        let bubbles = document.ancestors(target_node).any(|ancestor| {
            table
                .ids_of(ancestor)
                .iter()
                .any(|id| self.is_listening(*id, &event.name))
        });
        let handler = table
            .ids_of(target_node)
            .iter()
            .rev()
            .find_map(|id| self.handler(*id, &event.name))
            .cloned();

        let (fields, gap) = normalize(event, document);
        if let Some(gap) = gap {
            tracing::debug!(target: "events", "{gap}");
        }

        let default_prevented = prevents_default(document, target_node, &event.name);
        tracing::trace!(
            target: "events",
            event = %event.name,
            id = %target_id,
            bubbles,
            default_prevented,
            "dispatching"
        );

        DispatchOutcome {
            record: Some(EventRecord {
                target_node_id: target_id,
                event_name: event.name.clone(),
                bubbles,
                normalized_fields: fields,
                handler,
            }),
            default_prevented,
        }
    }
}

/// Nearest node at or above `native` that the table knows about.
fn resolve_target(
    document: &Document,
    table: &NodeTable,
    native: NodeHandle,
) -> Option<(NodeHandle, NodeId)> {
    std::iter::once(native)
        .chain(document.ancestors(native))
        .find_map(|node| table.id_of(node).map(|id| (node, id)))
}

fn prevents_default(document: &Document, target: NodeHandle, name: &str) -> bool {
    if name == "submit" {
        return true;
    }
    let handler_name = format!("on{name}");
    document
        .attribute(target, "prevent-default")
        .is_some_and(|list| list.split_whitespace().any(|entry| entry == handler_name))
}
