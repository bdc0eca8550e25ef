use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::model::{Node, NodeId};
use crate::tree::{TreeChange, TreeStore};

/// A derived grouping of profiles sharing one tag. Never persisted and never
/// a parent in `parent_id` relations; "dropping" a profile into one is a tag
/// edit, not a move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualFolder {
    pub tag: String,
    pub member_ids: BTreeSet<NodeId>,
}

/// Tag-to-members index over the profile nodes of a [`TreeStore`].
///
/// Kept current by feeding it the store's change notifications; every event
/// except `Loaded` is applied in O(changed nodes). Tags with no remaining
/// members disappear from the index.
#[derive(Default)]
pub struct VirtualFolderIndex {
    by_tag: BTreeMap<String, BTreeSet<NodeId>>,
    /// Reverse map, so removals need not scan every tag bucket.
    tags_by_id: HashMap<NodeId, BTreeSet<String>>,
}

impl VirtualFolderIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full recomputation. Only needed at startup and after `Loaded`.
    pub fn rebuild(&mut self, tree: &TreeStore) {
        self.by_tag.clear();
        self.tags_by_id.clear();
        for node in tree.iter_depth_first() {
            self.index_node(node);
        }
    }

    /// Apply one change notification.
    pub fn apply(&mut self, change: &TreeChange, tree: &TreeStore) {
        match change {
            TreeChange::Loaded => self.rebuild(tree),
            TreeChange::Added { node } => self.index_node(node),
            TreeChange::Removed { nodes } => {
                for node in nodes {
                    self.unindex_node(&node.id);
                }
            }
            // Structure does not affect tag membership.
            TreeChange::Moved { .. } => {}
            TreeChange::Updated { after, .. } => {
                self.unindex_node(&after.id);
                self.index_node(after);
            }
        }
    }

    fn index_node(&mut self, node: &Node) {
        let Some(tags) = node.tags() else { return };
        if tags.is_empty() {
            return;
        }
        for tag in tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(node.id.clone());
        }
        self.tags_by_id.insert(node.id.clone(), tags.clone());
    }

    fn unindex_node(&mut self, id: &NodeId) {
        let Some(tags) = self.tags_by_id.remove(id) else {
            return;
        };
        for tag in tags {
            let Some(members) = self.by_tag.get_mut(&tag) else {
                continue;
            };
            members.remove(id);
            if members.is_empty() {
                self.by_tag.remove(&tag);
            }
        }
    }

    /// Distinct tags present across profiles, sorted.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.by_tag.keys().map(String::as_str)
    }

    pub fn members(&self, tag: &str) -> Option<&BTreeSet<NodeId>> {
        self.by_tag.get(tag)
    }

    pub fn contains(&self, tag: &str, id: &NodeId) -> bool {
        self.by_tag.get(tag).map(|m| m.contains(id)).unwrap_or(false)
    }

    pub fn member_count(&self, tag: &str) -> usize {
        self.by_tag.get(tag).map(BTreeSet::len).unwrap_or(0)
    }

    pub fn folders(&self) -> Vec<VirtualFolder> {
        self.by_tag
            .iter()
            .map(|(tag, member_ids)| VirtualFolder {
                tag: tag.clone(),
                member_ids: member_ids.clone(),
            })
            .collect()
    }
}
