use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Stable node identifier. Minted once (UUID v4) and kept across sessions.
pub type NodeId = String;

pub fn mint_node_id() -> NodeId {
    Uuid::new_v4().to_string()
}

fn default_ssh_port() -> u16 {
    22
}

/// Connection payload of a profile node. Opaque to the tree algorithms:
/// nothing in this crate reads it except to hand it to the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionSettings {
    LocalShell {
        #[serde(default)]
        shell: String,
    },
    Ssh(SshSettings),
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::Ssh(SshSettings::default())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshSettings {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub private_key_path: String,
    #[serde(default)]
    pub key_passphrase: String,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: String::new(),
            password: String::new(),
            private_key_path: String::new(),
            key_passphrase: String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileNode {
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub settings: ConnectionSettings,
    #[serde(default)]
    pub remember_password: bool,
    #[serde(default)]
    pub remember_key_passphrase: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FolderNode {
    /// Sibling order of the folder's children. Authoritative: per-node
    /// `order` fields mirror positions in this list.
    #[serde(default)]
    pub children: Vec<NodeId>,
}

/// Kind-specific payload. A node carries `children` iff it is a folder and
/// `tags`/`settings` iff it is a profile, so invariant 5 holds by
/// construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodePayload {
    Profile(ProfileNode),
    Folder(FolderNode),
}

/// One entry of the profile tree: a saved connection or a folder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    /// Containing folder, `None` for root-level nodes.
    pub parent_id: Option<NodeId>,
    /// Dense zero-based rank among siblings.
    #[serde(default)]
    pub order: usize,
    #[serde(flatten)]
    pub payload: NodePayload,
}

impl Node {
    pub fn new_profile(name: impl Into<String>, settings: ConnectionSettings) -> Self {
        Self {
            id: mint_node_id(),
            name: name.into(),
            parent_id: None,
            order: 0,
            payload: NodePayload::Profile(ProfileNode {
                tags: BTreeSet::new(),
                settings,
                remember_password: false,
                remember_key_passphrase: false,
            }),
        }
    }

    pub fn new_folder(name: impl Into<String>) -> Self {
        Self {
            id: mint_node_id(),
            name: name.into(),
            parent_id: None,
            order: 0,
            payload: NodePayload::Folder(FolderNode {
                children: Vec::new(),
            }),
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.payload, NodePayload::Folder(_))
    }

    pub fn is_profile(&self) -> bool {
        matches!(self.payload, NodePayload::Profile(_))
    }

    pub fn children(&self) -> Option<&Vec<NodeId>> {
        match &self.payload {
            NodePayload::Folder(folder) => Some(&folder.children),
            NodePayload::Profile(_) => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match &mut self.payload {
            NodePayload::Folder(folder) => Some(&mut folder.children),
            NodePayload::Profile(_) => None,
        }
    }

    pub fn profile(&self) -> Option<&ProfileNode> {
        match &self.payload {
            NodePayload::Profile(profile) => Some(profile),
            NodePayload::Folder(_) => None,
        }
    }

    pub(crate) fn profile_mut(&mut self) -> Option<&mut ProfileNode> {
        match &mut self.payload {
            NodePayload::Profile(profile) => Some(profile),
            NodePayload::Folder(_) => None,
        }
    }

    pub fn tags(&self) -> Option<&BTreeSet<String>> {
        self.profile().map(|p| &p.tags)
    }
}

/// Strip secrets the user did not ask to keep. Applied to outgoing
/// persistence payloads only; the in-memory tree keeps what was typed.
pub fn sanitized_settings(profile: &ProfileNode) -> ConnectionSettings {
    let mut settings = profile.settings.clone();
    if let ConnectionSettings::Ssh(ssh) = &mut settings {
        if !profile.remember_password {
            ssh.password.clear();
        }
        if !profile.remember_key_passphrase {
            ssh.key_passphrase.clear();
        }
    }
    settings
}

pub fn display_name(node: &Node, default_profile: Option<&str>) -> String {
    let mut s = node.name.clone();
    if node.is_profile()
        && default_profile
            .map(|d| d.eq_ignore_ascii_case(&node.name))
            .unwrap_or(false)
    {
        s.push_str(" (default)");
    }
    s
}

/// Immutable full-tree copy: every node, flattened depth-first. Structure is
/// encoded twice (`parent_id`/`order` and folder `children`); `load()`
/// cross-checks both.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub nodes: Vec<Node>,
}

impl TreeSnapshot {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Copy of the snapshot with un-remembered secrets cleared, for handing
    /// to the persistence backend.
    pub fn sanitized_for_write(&self) -> Self {
        let mut out = self.clone();
        for node in &mut out.nodes {
            if let NodePayload::Profile(profile) = &mut node.payload {
                profile.settings = sanitized_settings(profile);
            }
        }
        out
    }
}
