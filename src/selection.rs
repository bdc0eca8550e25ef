use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::model::{Node, NodeId};
use crate::tree::{TreeChange, TreeStore};

/// Pure UI state: current selection plus the set of expanded folders.
///
/// No invariant beyond referencing live node ids; feeding it the store's
/// change notifications keeps stale ids from lingering.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionState {
    selected: Option<NodeId>,
    expanded: HashSet<NodeId>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&NodeId> {
        self.selected.as_ref()
    }

    /// Select `id` if it exists in the tree. Returns whether the selection
    /// changed.
    pub fn select(&mut self, id: &NodeId, tree: &TreeStore) -> bool {
        if !tree.contains(id) || self.selected.as_ref() == Some(id) {
            return false;
        }
        self.selected = Some(id.clone());
        true
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn is_expanded(&self, id: &NodeId) -> bool {
        self.expanded.contains(id)
    }

    pub fn expanded(&self) -> &HashSet<NodeId> {
        &self.expanded
    }

    pub fn toggle_expanded(&mut self, id: &NodeId, tree: &TreeStore) {
        if self.expanded.remove(id) {
            return;
        }
        if tree.node(id).map(Node::is_folder).unwrap_or(false) {
            self.expanded.insert(id.clone());
        }
    }

    pub fn collapse_all(&mut self) {
        self.expanded.clear();
    }

    /// Expand every folder on the path to `id`, so a search hit inside a
    /// collapsed subtree becomes visible.
    pub fn expand_ancestors(&mut self, id: &NodeId, tree: &TreeStore) {
        for ancestor in tree.ancestors(id) {
            self.expanded.insert(ancestor);
        }
    }

    /// Drop ids that no longer exist after a tree change.
    pub fn apply(&mut self, change: &TreeChange, tree: &TreeStore) {
        match change {
            TreeChange::Loaded => {
                if let Some(selected) = &self.selected {
                    if !tree.contains(selected) {
                        self.selected = None;
                    }
                }
                self.expanded.retain(|id| tree.contains(id));
            }
            TreeChange::Removed { nodes } => {
                for node in nodes {
                    if self.selected.as_ref() == Some(&node.id) {
                        self.selected = None;
                    }
                    self.expanded.remove(&node.id);
                }
            }
            TreeChange::Added { .. } | TreeChange::Moved { .. } | TreeChange::Updated { .. } => {}
        }
    }
}
