use std::collections::BTreeSet;

use tracing::warn;

use crate::error::{Result, SidebarError};
use crate::model::{Node, NodeId};
use crate::tree::TreeStore;

/// Typed mutation intents. Drag gestures, context-menu CRUD, and tests all
/// normalize into these before touching the store, so the input source is
/// decoupled from the mutation logic.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    MoveNode {
        id: NodeId,
        new_parent: Option<NodeId>,
        new_index: usize,
    },
    InsertNode {
        node: Node,
        parent: Option<NodeId>,
        index: usize,
    },
    RemoveNode {
        id: NodeId,
    },
    RenameNode {
        id: NodeId,
        name: String,
    },
    SetTags {
        id: NodeId,
        tags: BTreeSet<String>,
    },
}

/// Apply a command to the store.
///
/// `NotFound` means the command raced a concurrent reload and references an
/// id that no longer exists; it is logged and swallowed as a no-op.
/// `Validation` failures are returned so the call site can discard the
/// gesture that produced them. Neither escapes to the UI layer as a
/// user-visible failure.
pub fn dispatch(tree: &mut TreeStore, command: Command) -> Result<()> {
    let outcome = match command {
        Command::MoveNode {
            id,
            new_parent,
            new_index,
        } => tree.move_node(&id, new_parent, new_index),
        Command::InsertNode {
            node,
            parent,
            index,
        } => tree.insert(node, parent, index),
        Command::RemoveNode { id } => tree.remove(&id),
        Command::RenameNode { id, name } => tree.rename(&id, &name),
        Command::SetTags { id, tags } => tree.set_tags(&id, tags),
    };

    match outcome {
        Err(SidebarError::NotFound(id)) => {
            warn!(id = %id, "command referenced a stale node id; ignored");
            Ok(())
        }
        other => other,
    }
}
