use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::error::{Result, SidebarError};
use crate::model::{
    sanitized_settings, ConnectionSettings, Node, NodeId, ProfileNode, TreeSnapshot,
};
use crate::tree::TreeStore;

/// Asynchronous persistence surface of the backend service.
///
/// Single-threaded cooperative model: these calls are the only suspension
/// points, the embedding shell owns the runtime, and nothing here requires
/// `Send`. Failures carry the underlying transport cause.
#[allow(async_fn_in_trait)]
pub trait ProfileBackend {
    async fn load_tree(&mut self) -> anyhow::Result<TreeSnapshot>;
    async fn persist_tree(&mut self, tree: &TreeSnapshot) -> anyhow::Result<()>;
    async fn create_profile(
        &mut self,
        name: &str,
        settings: &ConnectionSettings,
    ) -> anyhow::Result<Node>;
    async fn update_profile(
        &mut self,
        id: &NodeId,
        settings: &ConnectionSettings,
    ) -> anyhow::Result<()>;
    async fn delete_profile(&mut self, id: &NodeId) -> anyhow::Result<()>;
    /// Server-side search, for datasets too large to filter client-side.
    async fn search(&mut self, query: &str, tags: &BTreeSet<String>) -> anyhow::Result<Vec<Node>>;
}

/// One outstanding tree write. The payload is already sanitized for the
/// wire; the generation decides whether its ack still matters when it
/// resolves.
#[derive(Clone, Debug)]
pub struct PersistTicket {
    generation: u64,
    payload: TreeSnapshot,
}

impl PersistTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn payload(&self) -> &TreeSnapshot {
        &self.payload
    }
}

/// Owns the optimistic-update discipline over a [`ProfileBackend`].
///
/// Structural mutations hit the [`TreeStore`] first and persist afterwards;
/// the gateway keeps the last confirmed snapshot until the backend acks.
/// Rapid sequential writes coalesce: every persist carries a generation and
/// only the newest one's outcome is applied, so a stale ack resolving after
/// a newer write has been issued is ignored.
pub struct SyncGateway<B> {
    backend: B,
    /// Last confirmed state; present while an optimistic change awaits an ack.
    retained: Option<TreeSnapshot>,
    issued: u64,
}

impl<B: ProfileBackend> SyncGateway<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            retained: None,
            issued: 0,
        }
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Authoritative refresh from the backend, used at startup. Replaces the
    /// tree and drops any pending rollback point.
    pub async fn load(&mut self, tree: &mut TreeStore) -> Result<()> {
        let snapshot = self.backend.load_tree().await.map_err(SidebarError::Sync)?;
        tree.load(snapshot)?;
        self.retained = None;
        Ok(())
    }

    /// Record the rollback point for an optimistic mutation. Call before the
    /// first local change of a burst; later calls are no-ops until a persist
    /// confirms, so an unconfirmed burst rolls back as one unit.
    pub fn retain_rollback_point(&mut self, tree: &TreeStore) {
        if self.retained.is_none() {
            self.retained = Some(tree.snapshot());
        }
    }

    pub fn has_pending_rollback(&self) -> bool {
        self.retained.is_some()
    }

    /// Issue a persist for the tree's current state. The returned ticket is
    /// what the embedding shell hands to `ProfileBackend::persist_tree`; its
    /// outcome goes back through [`complete_persist`](Self::complete_persist).
    pub fn begin_persist(&mut self, tree: &TreeStore) -> PersistTicket {
        self.issued += 1;
        PersistTicket {
            generation: self.issued,
            payload: tree.snapshot().sanitized_for_write(),
        }
    }

    /// Apply the outcome of a persist call.
    ///
    /// Stale acks (a newer persist was issued meanwhile) are ignored either
    /// way. A current failure rolls the tree back to the retained snapshot
    /// and surfaces the `Sync` error; by the time the caller sees it, the
    /// tree already matches the last confirmed state.
    pub fn complete_persist(
        &mut self,
        generation: u64,
        outcome: anyhow::Result<()>,
        tree: &mut TreeStore,
    ) -> Result<()> {
        if generation != self.issued {
            debug!(generation, newest = self.issued, "stale persist ack ignored");
            return Ok(());
        }
        match outcome {
            Ok(()) => {
                self.retained = None;
                Ok(())
            }
            Err(cause) => {
                if let Some(snapshot) = self.retained.take() {
                    warn!(error = %cause, "persist failed; rolling back optimistic changes");
                    tree.load(snapshot)?;
                }
                Err(SidebarError::Sync(cause))
            }
        }
    }

    /// Serial convenience: begin, call the backend, complete.
    pub async fn persist(&mut self, tree: &mut TreeStore) -> Result<()> {
        let ticket = self.begin_persist(tree);
        let outcome = self.backend.persist_tree(ticket.payload()).await;
        self.complete_persist(ticket.generation(), outcome, tree)
    }

    /// Create a profile through the backend and insert the authoritative
    /// node (backend-assigned id included) at the end of `parent`.
    pub async fn create_profile(
        &mut self,
        tree: &mut TreeStore,
        name: &str,
        settings: ConnectionSettings,
        parent: Option<NodeId>,
    ) -> Result<NodeId> {
        let node = self
            .backend
            .create_profile(name, &settings)
            .await
            .map_err(SidebarError::Sync)?;
        let id = node.id.clone();
        let index = tree.children_of(parent.as_ref()).len();
        tree.insert(node, parent, index)?;
        Ok(id)
    }

    /// Update a profile's connection payload. Content-only: structural
    /// position is untouched. The wire copy is stripped of secrets the user
    /// chose not to remember; the in-memory node keeps them for the session.
    pub async fn update_profile(
        &mut self,
        tree: &mut TreeStore,
        id: &NodeId,
        settings: ConnectionSettings,
        remember_password: bool,
        remember_key_passphrase: bool,
    ) -> Result<()> {
        let wire = sanitized_settings(&ProfileNode {
            tags: BTreeSet::new(),
            settings: settings.clone(),
            remember_password,
            remember_key_passphrase,
        });
        self.backend
            .update_profile(id, &wire)
            .await
            .map_err(SidebarError::Sync)?;
        tree.set_profile_settings(id, settings, remember_password, remember_key_passphrase)
    }

    /// Delete a profile through the backend, then drop it locally. Folder
    /// deletion is a structural change and goes through `remove` + persist
    /// instead.
    pub async fn delete_profile(&mut self, tree: &mut TreeStore, id: &NodeId) -> Result<()> {
        if tree.node(id).map(Node::is_folder).unwrap_or(false) {
            return Err(SidebarError::Validation(
                "delete_profile cannot remove a folder".into(),
            ));
        }
        self.backend
            .delete_profile(id)
            .await
            .map_err(SidebarError::Sync)?;
        tree.remove(id)
    }

    pub async fn search_remote(
        &mut self,
        query: &str,
        tags: &BTreeSet<String>,
    ) -> Result<Vec<Node>> {
        self.backend
            .search(query, tags)
            .await
            .map_err(SidebarError::Sync)
    }
}
