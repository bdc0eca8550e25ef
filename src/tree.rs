use std::collections::{BTreeSet, HashMap, HashSet};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::error::{Result, SidebarError};
use crate::model::{ConnectionSettings, Node, NodeId, TreeSnapshot};

/// Change notification emitted after every successful mutation.
///
/// Carries enough of the affected nodes that downstream indexes can update
/// in O(changed nodes) without re-reading the whole tree.
#[derive(Clone, Debug)]
pub enum TreeChange {
    /// The whole tree was replaced via `load()`.
    Loaded,
    Added {
        node: Node,
    },
    /// A subtree was removed; nodes are listed post-order (deepest first).
    Removed {
        nodes: Vec<Node>,
    },
    Moved {
        id: NodeId,
        old_parent: Option<NodeId>,
        new_parent: Option<NodeId>,
        new_index: usize,
    },
    /// A leaf mutation (rename, tag edit, settings update).
    Updated {
        before: Node,
        after: Node,
    },
}

/// Authoritative in-memory mirror of the persisted profile/folder hierarchy.
///
/// Owns every node exclusively; consumers read through the query surface and
/// mutate through the validated operations below. Each operation validates
/// fully before touching any structure, so a failed call leaves the tree
/// exactly as it was.
#[derive(Default)]
pub struct TreeStore {
    nodes: HashMap<NodeId, Node>,
    /// Root-level ordering (children of the implicit root).
    roots: Vec<NodeId>,
    subscribers: Vec<Sender<TreeChange>>,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to change notifications. Each subscriber gets its own
    /// unbounded channel; senders for dropped receivers are pruned on emit.
    pub fn subscribe(&mut self) -> Receiver<TreeChange> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, change: TreeChange) {
        self.subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }

    // ---- query surface ----

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Sibling ids under `parent`; `None` means the root level.
    pub fn children_of(&self, parent: Option<&NodeId>) -> &[NodeId] {
        match parent {
            None => &self.roots,
            Some(id) => self
                .nodes
                .get(id)
                .and_then(|n| n.children())
                .map(|c| c.as_slice())
                .unwrap_or(&[]),
        }
    }

    pub fn root_ids(&self) -> &[NodeId] {
        &self.roots
    }

    /// Ancestor chain of `id`, nearest parent first. Empty for root-level
    /// nodes and unknown ids.
    pub fn ancestors(&self, id: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.nodes.get(id).and_then(|n| n.parent_id.clone());
        while let Some(parent) = current {
            current = self.nodes.get(&parent).and_then(|n| n.parent_id.clone());
            out.push(parent);
        }
        out
    }

    /// True if `id` sits anywhere below `ancestor`.
    pub fn is_descendant(&self, id: &NodeId, ancestor: &NodeId) -> bool {
        self.ancestors(id).iter().any(|a| a == ancestor)
    }

    /// All nodes in depth-first order (root ordering, then each subtree).
    pub fn iter_depth_first(&self) -> impl Iterator<Item = &Node> + '_ {
        let mut out = Vec::with_capacity(self.nodes.len());
        self.push_depth_first(&self.roots, &mut out);
        out.into_iter()
    }

    fn push_depth_first<'a>(&'a self, ids: &'a [NodeId], out: &mut Vec<&'a Node>) {
        for id in ids {
            if let Some(node) = self.nodes.get(id) {
                out.push(node);
                if let Some(children) = node.children() {
                    self.push_depth_first(children, out);
                }
            }
        }
    }

    /// Case-insensitive profile lookup by display name.
    pub fn find_profile_by_name(&self, name: &str) -> Option<&Node> {
        self.iter_depth_first()
            .find(|n| n.is_profile() && n.name.eq_ignore_ascii_case(name))
    }

    /// Immutable full copy, flattened depth-first. Used for rollback and for
    /// persistence payloads.
    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            nodes: self.iter_depth_first().cloned().collect(),
        }
    }

    // ---- mutations ----

    /// Replace the entire tree. The snapshot is validated against all
    /// structural invariants before anything is swapped in.
    pub fn load(&mut self, snapshot: TreeSnapshot) -> Result<()> {
        let (nodes, roots) = validate_snapshot(&snapshot)?;
        self.nodes = nodes;
        self.roots = roots;
        debug!(nodes = self.nodes.len(), "tree loaded");
        self.emit(TreeChange::Loaded);
        Ok(())
    }

    /// Insert a new node under `parent` at sibling position `index`
    /// (clamped to `[0, child_count]`).
    pub fn insert(&mut self, mut node: Node, parent: Option<NodeId>, index: usize) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(SidebarError::Validation(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
        if node.children().map(|c| !c.is_empty()).unwrap_or(false) {
            return Err(SidebarError::Validation(
                "inserted folder must start empty".into(),
            ));
        }
        if node.name.trim().is_empty() {
            return Err(SidebarError::Validation("node name is empty".into()));
        }
        self.check_parent_is_folder(parent.as_ref())?;

        node.parent_id = parent.clone();
        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        self.attach_to_siblings(parent.as_ref(), &id, index);

        let node = self.nodes[&id].clone();
        debug!(id = %id, parent = ?node.parent_id, "node inserted");
        self.emit(TreeChange::Added { node });
        Ok(())
    }

    /// Reparent/reorder an existing node. `new_index` is interpreted after
    /// the node has left its old sibling list, then clamped.
    pub fn move_node(
        &mut self,
        id: &NodeId,
        new_parent: Option<NodeId>,
        new_index: usize,
    ) -> Result<()> {
        if !self.nodes.contains_key(id) {
            return Err(SidebarError::NotFound(id.clone()));
        }
        self.check_parent_is_folder(new_parent.as_ref())?;
        if let Some(target) = &new_parent {
            // Cyclic move: dropping a folder into itself or its own subtree.
            if target == id || self.is_descendant(target, id) {
                return Err(SidebarError::Validation("cyclic move".into()));
            }
        }

        let old_parent = self.nodes[id].parent_id.clone();
        self.detach_from_siblings(old_parent.as_ref(), id);
        let new_index = self.attach_to_siblings(new_parent.as_ref(), id, new_index);
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent_id = new_parent.clone();
        }

        debug!(id = %id, from = ?old_parent, to = ?new_parent, index = new_index, "node moved");
        self.emit(TreeChange::Moved {
            id: id.clone(),
            old_parent,
            new_parent,
            new_index,
        });
        Ok(())
    }

    /// Delete a node. Folders cascade through all descendants (post-order).
    pub fn remove(&mut self, id: &NodeId) -> Result<()> {
        if !self.nodes.contains_key(id) {
            return Err(SidebarError::NotFound(id.clone()));
        }

        let parent = self.nodes[id].parent_id.clone();
        self.detach_from_siblings(parent.as_ref(), id);

        let mut order = Vec::new();
        self.collect_post_order(id, &mut order);
        let mut removed = Vec::with_capacity(order.len());
        for victim in order {
            if let Some(node) = self.nodes.remove(&victim) {
                removed.push(node);
            }
        }

        debug!(id = %id, cascade = removed.len(), "node removed");
        self.emit(TreeChange::Removed { nodes: removed });
        Ok(())
    }

    /// Rename a node. The name is trimmed and must stay non-empty.
    pub fn rename(&mut self, id: &NodeId, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SidebarError::Validation("node name is empty".into()));
        }
        let Some(node) = self.nodes.get_mut(id) else {
            return Err(SidebarError::NotFound(id.clone()));
        };
        let before = node.clone();
        node.name = name.to_string();
        let after = node.clone();
        self.emit(TreeChange::Updated { before, after });
        Ok(())
    }

    /// Replace a profile's tag set. Folders carry no tags.
    pub fn set_tags(&mut self, id: &NodeId, tags: BTreeSet<String>) -> Result<()> {
        let Some(node) = self.nodes.get_mut(id) else {
            return Err(SidebarError::NotFound(id.clone()));
        };
        let before = node.clone();
        let Some(profile) = node.profile_mut() else {
            return Err(SidebarError::Validation(
                "tags can only be set on profiles".into(),
            ));
        };
        profile.tags = tags;
        let after = self.nodes[id].clone();
        self.emit(TreeChange::Updated { before, after });
        Ok(())
    }

    /// Replace a profile's connection payload (content update, independent
    /// of structural position).
    pub fn set_profile_settings(
        &mut self,
        id: &NodeId,
        settings: ConnectionSettings,
        remember_password: bool,
        remember_key_passphrase: bool,
    ) -> Result<()> {
        let Some(node) = self.nodes.get_mut(id) else {
            return Err(SidebarError::NotFound(id.clone()));
        };
        let before = node.clone();
        let Some(profile) = node.profile_mut() else {
            return Err(SidebarError::Validation(
                "connection settings can only be set on profiles".into(),
            ));
        };
        profile.settings = settings;
        profile.remember_password = remember_password;
        profile.remember_key_passphrase = remember_key_passphrase;
        let after = self.nodes[id].clone();
        self.emit(TreeChange::Updated { before, after });
        Ok(())
    }

    // ---- internals ----

    /// `None` is the implicit root and always accepts children.
    fn check_parent_is_folder(&self, parent: Option<&NodeId>) -> Result<()> {
        let Some(parent) = parent else { return Ok(()) };
        let Some(node) = self.nodes.get(parent) else {
            return Err(SidebarError::NotFound(parent.clone()));
        };
        if !node.is_folder() {
            return Err(SidebarError::Validation(format!(
                "'{}' is not a folder",
                node.name
            )));
        }
        Ok(())
    }

    fn sibling_list_mut(&mut self, parent: Option<&NodeId>) -> Option<&mut Vec<NodeId>> {
        match parent {
            None => Some(&mut self.roots),
            Some(id) => self.nodes.get_mut(id).and_then(|n| n.children_mut()),
        }
    }

    fn detach_from_siblings(&mut self, parent: Option<&NodeId>, id: &NodeId) {
        if let Some(list) = self.sibling_list_mut(parent) {
            list.retain(|c| c != id);
        }
        self.renumber_siblings(parent);
    }

    /// Insert `id` into the sibling list at `index` (clamped) and renumber.
    /// Returns the index actually used.
    fn attach_to_siblings(&mut self, parent: Option<&NodeId>, id: &NodeId, index: usize) -> usize {
        let mut used = index;
        if let Some(list) = self.sibling_list_mut(parent) {
            used = index.min(list.len());
            list.insert(used, id.clone());
        }
        self.renumber_siblings(parent);
        used
    }

    fn renumber_siblings(&mut self, parent: Option<&NodeId>) {
        let ids: Vec<NodeId> = self.children_of(parent).to_vec();
        for (i, id) in ids.iter().enumerate() {
            if let Some(node) = self.nodes.get_mut(id) {
                node.order = i;
            }
        }
    }

    fn collect_post_order(&self, id: &NodeId, out: &mut Vec<NodeId>) {
        if let Some(children) = self.nodes.get(id).and_then(|n| n.children()) {
            for child in children {
                self.collect_post_order(child, out);
            }
        }
        out.push(id.clone());
    }
}

/// Check a snapshot against invariants 1-5 and build the internal maps.
/// Nothing about the live tree is touched until this succeeds.
fn validate_snapshot(snapshot: &TreeSnapshot) -> Result<(HashMap<NodeId, Node>, Vec<NodeId>)> {
    let mut nodes: HashMap<NodeId, Node> = HashMap::with_capacity(snapshot.nodes.len());
    for node in &snapshot.nodes {
        if node.name.trim().is_empty() {
            return Err(SidebarError::Validation(format!(
                "node '{}' has an empty name",
                node.id
            )));
        }
        if nodes.insert(node.id.clone(), node.clone()).is_some() {
            return Err(SidebarError::Validation(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
    }

    // Parent references point at existing folders.
    for node in nodes.values() {
        if let Some(parent) = &node.parent_id {
            let Some(parent_node) = nodes.get(parent) else {
                return Err(SidebarError::Validation(format!(
                    "node '{}' references missing parent '{}'",
                    node.id, parent
                )));
            };
            if !parent_node.is_folder() {
                return Err(SidebarError::Validation(format!(
                    "node '{}' has non-folder parent '{}'",
                    node.id, parent
                )));
            }
        }
    }

    // Children lists agree with parent pointers: every listed child exists,
    // points back, and appears exactly once.
    let mut listed: HashSet<&NodeId> = HashSet::new();
    for node in nodes.values() {
        let Some(children) = node.children() else {
            continue;
        };
        for child in children {
            let Some(child_node) = nodes.get(child) else {
                return Err(SidebarError::Validation(format!(
                    "folder '{}' lists missing child '{}'",
                    node.id, child
                )));
            };
            if child_node.parent_id.as_ref() != Some(&node.id) {
                return Err(SidebarError::Validation(format!(
                    "child '{}' does not point back at folder '{}'",
                    child, node.id
                )));
            }
            if !listed.insert(child) {
                return Err(SidebarError::Validation(format!(
                    "node '{}' appears in more than one sibling list",
                    child
                )));
            }
        }
    }
    for node in nodes.values() {
        if node.parent_id.is_some() && !listed.contains(&node.id) {
            return Err(SidebarError::Validation(format!(
                "node '{}' is missing from its parent's children",
                node.id
            )));
        }
    }

    // Root ordering comes from the `order` field; it must be dense.
    let mut roots: Vec<&Node> = nodes.values().filter(|n| n.parent_id.is_none()).collect();
    roots.sort_by_key(|n| n.order);
    for (i, root) in roots.iter().enumerate() {
        if root.order != i {
            return Err(SidebarError::Validation(
                "root order values are not a contiguous 0..n sequence".into(),
            ));
        }
    }
    let roots: Vec<NodeId> = roots.into_iter().map(|n| n.id.clone()).collect();

    // Child order fields mirror list positions.
    for node in nodes.values() {
        let Some(children) = node.children() else {
            continue;
        };
        for (i, child) in children.iter().enumerate() {
            if nodes[child].order != i {
                return Err(SidebarError::Validation(format!(
                    "order values under '{}' are not a contiguous 0..n sequence",
                    node.id
                )));
            }
        }
    }

    // Forest check: everything must be reachable from the roots. A detached
    // parent/child cycle satisfies all the local checks above but not this.
    let mut visited: HashSet<&NodeId> = HashSet::new();
    let mut stack: Vec<&NodeId> = roots.iter().collect();
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        if let Some(children) = nodes.get(id).and_then(|n| n.children()) {
            stack.extend(children.iter());
        }
    }
    if visited.len() != nodes.len() {
        return Err(SidebarError::Validation(
            "tree contains unreachable nodes (cycle or orphan)".into(),
        ));
    }

    Ok((nodes, roots))
}
