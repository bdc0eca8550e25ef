use thiserror::Error;

use crate::model::NodeId;

pub type Result<T> = std::result::Result<T, SidebarError>;

/// Error taxonomy for the sidebar engine.
///
/// `Validation` and `NotFound` are detected synchronously, before any
/// structure is touched, and are handled close to where they occur. `Sync`
/// is the only kind surfaced to the UI layer, and only after rollback has
/// already restored a consistent tree.
#[derive(Debug, Error)]
pub enum SidebarError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unknown node id: '{0}'")]
    NotFound(NodeId),

    #[error("backend sync failed: {0}")]
    Sync(anyhow::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SidebarError {
    pub fn is_validation(&self) -> bool {
        matches!(self, SidebarError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SidebarError::NotFound(_))
    }
}
