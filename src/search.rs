use std::collections::{BTreeSet, HashMap, HashSet};

use crate::model::{Node, NodeId};
use crate::tree::TreeStore;

/// Current text/tag filter over the profile tree.
///
/// Never mutates the store: `filter()` walks a borrowed tree and yields the
/// ids that stay visible. Folders stay visible when any descendant matches,
/// so the ancestor chain of every hit survives the collapse.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchIndex {
    query: String,
    selected_tags: BTreeSet<String>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn set_selected_tags(&mut self, tags: BTreeSet<String>) {
        self.selected_tags = tags;
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn selected_tags(&self) -> &BTreeSet<String> {
        &self.selected_tags
    }

    pub fn clear(&mut self) {
        self.query.clear();
        self.selected_tags.clear();
    }

    /// True when some filtering is in effect.
    pub fn is_active(&self) -> bool {
        !self.query.trim().is_empty() || !self.selected_tags.is_empty()
    }

    /// Lazy, restartable sequence of visible node ids in depth-first order.
    /// Each call starts a fresh walk over the current tree state.
    pub fn filter<'a>(&self, tree: &'a TreeStore) -> FilterMatches<'a> {
        FilterMatches {
            tree,
            query: self.query.trim().to_lowercase(),
            selected_tags: self.selected_tags.clone(),
            stack: tree.root_ids().iter().rev().collect(),
            verdicts: HashMap::new(),
        }
    }

    /// Convenience for renderers that want a membership set instead of a
    /// sequence.
    pub fn visible_set(&self, tree: &TreeStore) -> HashSet<NodeId> {
        self.filter(tree).collect()
    }
}

/// Depth-first iterator over the ids the current filter keeps visible.
/// Subtree verdicts are memoized, and subtrees with no hits are skipped
/// without visiting their nodes.
pub struct FilterMatches<'a> {
    tree: &'a TreeStore,
    query: String,
    selected_tags: BTreeSet<String>,
    stack: Vec<&'a NodeId>,
    verdicts: HashMap<&'a NodeId, bool>,
}

impl<'a> FilterMatches<'a> {
    /// The node itself satisfies query and tag constraints. Folders carry no
    /// tags, so any selected tag disqualifies them from a direct match.
    fn direct_match(&self, node: &Node) -> bool {
        let name_ok =
            self.query.is_empty() || node.name.to_lowercase().contains(self.query.as_str());
        let tags_ok = self.selected_tags.is_empty()
            || node
                .tags()
                .map(|tags| self.selected_tags.iter().all(|t| tags.contains(t)))
                .unwrap_or(false);
        name_ok && tags_ok
    }

    /// Any strict descendant of `id` is a direct match.
    fn subtree_matches(&mut self, id: &'a NodeId) -> bool {
        if let Some(&verdict) = self.verdicts.get(id) {
            return verdict;
        }
        let tree = self.tree;
        let mut found = false;
        if let Some(children) = tree.node(id).and_then(|n| n.children()) {
            for child in children {
                let Some(node) = tree.node(child) else { continue };
                if self.direct_match(node) || (node.is_folder() && self.subtree_matches(child)) {
                    found = true;
                    break;
                }
            }
        }
        self.verdicts.insert(id, found);
        found
    }
}

impl<'a> Iterator for FilterMatches<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let tree = self.tree;
        while let Some(id) = self.stack.pop() {
            let Some(node) = tree.node(id) else {
                continue;
            };
            if node.is_folder() {
                let descend = self.subtree_matches(id);
                let visible = descend || self.direct_match(node);
                if descend {
                    if let Some(children) = node.children() {
                        self.stack.extend(children.iter().rev());
                    }
                }
                if visible {
                    return Some(id.clone());
                }
            } else if self.direct_match(node) {
                return Some(id.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConnectionSettings;

    fn profile(id: &str, name: &str, tags: &[&str]) -> Node {
        let mut node = Node::new_profile(name, ConnectionSettings::default());
        node.id = id.to_string();
        node.profile_mut().unwrap().tags = tags.iter().map(|t| t.to_string()).collect();
        node
    }

    fn folder(id: &str, name: &str) -> Node {
        let mut node = Node::new_folder(name);
        node.id = id.to_string();
        node
    }

    /// root -> [Servers -> [alpha-web(prod), beta-db(prod,db)], scratch]
    fn sample_tree() -> TreeStore {
        let mut tree = TreeStore::new();
        tree.insert(folder("servers", "Servers"), None, 0).unwrap();
        tree.insert(
            profile("alpha", "alpha-web", &["prod"]),
            Some("servers".into()),
            0,
        )
        .unwrap();
        tree.insert(
            profile("beta", "beta-db", &["prod", "db"]),
            Some("servers".into()),
            1,
        )
        .unwrap();
        tree.insert(profile("scratch", "scratch", &[]), None, 1)
            .unwrap();
        tree
    }

    fn ids(index: &SearchIndex, tree: &TreeStore) -> Vec<String> {
        index.filter(tree).collect()
    }

    #[test]
    fn empty_filter_yields_every_node() {
        let tree = sample_tree();
        let index = SearchIndex::new();
        assert_eq!(ids(&index, &tree), ["servers", "alpha", "beta", "scratch"]);
    }

    #[test]
    fn query_matches_names_case_insensitively_plus_ancestors() {
        let tree = sample_tree();
        let mut index = SearchIndex::new();
        index.set_query("ALPHA");
        // alpha-web matches; Servers survives as its ancestor.
        assert_eq!(ids(&index, &tree), ["servers", "alpha"]);
    }

    #[test]
    fn folder_name_match_does_not_reveal_children() {
        let tree = sample_tree();
        let mut index = SearchIndex::new();
        index.set_query("serv");
        assert_eq!(ids(&index, &tree), ["servers"]);
    }

    #[test]
    fn tag_filter_requires_every_selected_tag() {
        let tree = sample_tree();
        let mut index = SearchIndex::new();

        index.set_selected_tags(BTreeSet::from(["prod".to_string()]));
        assert_eq!(ids(&index, &tree), ["servers", "alpha", "beta"]);

        index.set_selected_tags(BTreeSet::from(["prod".to_string(), "db".to_string()]));
        assert_eq!(ids(&index, &tree), ["servers", "beta"]);
    }

    #[test]
    fn query_and_tags_are_conjunctive() {
        let tree = sample_tree();
        let mut index = SearchIndex::new();
        index.set_query("db");
        index.set_selected_tags(BTreeSet::from(["prod".to_string()]));
        assert_eq!(ids(&index, &tree), ["servers", "beta"]);
    }

    #[test]
    fn no_hits_yields_nothing() {
        let tree = sample_tree();
        let mut index = SearchIndex::new();
        index.set_query("no such profile");
        assert!(ids(&index, &tree).is_empty());
    }

    #[test]
    fn filter_is_restartable() {
        let tree = sample_tree();
        let mut index = SearchIndex::new();
        index.set_query("a");

        let first: Vec<_> = index.filter(&tree).collect();
        let second: Vec<_> = index.filter(&tree).collect();
        assert_eq!(first, second);

        // Partial consumption does not poison a later walk.
        let mut partial = index.filter(&tree);
        let _ = partial.next();
        drop(partial);
        assert_eq!(index.filter(&tree).collect::<Vec<_>>(), first);
    }

    #[test]
    fn is_active_reflects_state() {
        let mut index = SearchIndex::new();
        assert!(!index.is_active());
        index.set_query("  ");
        assert!(!index.is_active());
        index.set_query("web");
        assert!(index.is_active());
        index.clear();
        assert!(!index.is_active());
    }
}
