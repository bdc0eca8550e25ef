//! Profile tree engine for the Rusty terminal sidebar.
//!
//! Owns the saved-connection hierarchy (folders + profiles) and everything a
//! sidebar needs on top of it: drag-and-drop, tag-derived virtual folders,
//! search, selection, and optimistic sync against the persistence backend.
//! Rendering stays outside: the GUI subscribes to [`tree::TreeChange`]
//! notifications, reads snapshots, and feeds pointer gestures back in.

pub mod command;
pub mod dragdrop;
pub mod error;
pub mod model;
pub mod search;
pub mod selection;
pub mod sync;
pub mod tree;
pub mod virtual_folders;

pub use command::{dispatch, Command};
pub use dragdrop::{DragDropController, DropTarget, DropZone, HoverRow, PointerPos};
pub use error::{Result, SidebarError};
pub use model::{ConnectionSettings, Node, NodeId, SshSettings, TreeSnapshot};
pub use search::SearchIndex;
pub use selection::SelectionState;
pub use sync::{ProfileBackend, SyncGateway};
pub use tree::{TreeChange, TreeStore};
pub use virtual_folders::{VirtualFolder, VirtualFolderIndex};
