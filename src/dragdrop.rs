use tracing::debug;

use crate::command::Command;
use crate::model::NodeId;
use crate::tree::TreeStore;

/// Pointer travel required before a press turns into a drag.
pub const DRAG_THRESHOLD_PX: f32 = 4.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointerPos {
    pub x: f32,
    pub y: f32,
}

impl PointerPos {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn distance(self, other: PointerPos) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Sub-region of a hovered row deciding what a drop means.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropZone {
    Before,
    Into,
    After,
}

/// Map the cursor's vertical fraction within a row to a zone.
///
/// Thirds, with each boundary belonging to the zone below it: `[0, 1/3)` is
/// `Before`, `[1/3, 2/3)` is `Into`, `[2/3, 1]` is `After`. The middle third
/// only means `Into` on folders; on profiles it degrades to `After`.
pub fn zone_for_fraction(fraction: f32, target_is_folder: bool) -> DropZone {
    let f = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.5
    };
    if f < 1.0 / 3.0 {
        DropZone::Before
    } else if f < 2.0 / 3.0 {
        if target_is_folder {
            DropZone::Into
        } else {
            DropZone::After
        }
    } else {
        DropZone::After
    }
}

/// What the cursor is over: a real row or a derived tag grouping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropTarget {
    Node(NodeId),
    VirtualFolder(String),
}

/// Geometry of the row under the cursor, reported by the renderer on every
/// pointer move.
#[derive(Clone, Debug, PartialEq)]
pub struct HoverRow {
    pub target: DropTarget,
    pub row_top: f32,
    pub row_height: f32,
    /// Explicit insertion slot among an open folder's children, when the
    /// renderer shows a gap between two child rows. Overrides append-at-end
    /// for `Into` drops.
    pub insert_slot: Option<usize>,
}

/// Gesture states. `Dropped`/`Cancelled` are momentary: `pointer_up` and
/// `cancel` collapse straight back to `Idle`, reporting the outcome through
/// their return values.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum DragState {
    #[default]
    Idle,
    /// Pointer is down on a row but has not crossed the drag threshold.
    Armed { source: NodeId, origin: PointerPos },
    Dragging { source: NodeId },
    Hovering {
        source: NodeId,
        target: DropTarget,
        zone: DropZone,
        slot: Option<usize>,
    },
}

/// Turns pointer events into validated tree commands.
///
/// One gesture at a time by construction: a press while a gesture is live is
/// ignored, and every exit path lands back in `Idle`. The controller never
/// mutates the store itself; a drop yields a [`Command`] for the caller to
/// dispatch.
#[derive(Default)]
pub struct DragDropController {
    state: DragState,
}

impl DragDropController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    /// True once the threshold has been crossed (a visual drag is showing).
    pub fn is_dragging(&self) -> bool {
        matches!(
            self.state,
            DragState::Dragging { .. } | DragState::Hovering { .. }
        )
    }

    pub fn source(&self) -> Option<&NodeId> {
        match &self.state {
            DragState::Idle => None,
            DragState::Armed { source, .. }
            | DragState::Dragging { source }
            | DragState::Hovering { source, .. } => Some(source),
        }
    }

    /// Pointer pressed on a node row.
    pub fn pointer_down(&mut self, node: NodeId, pos: PointerPos) {
        if !matches!(self.state, DragState::Idle) {
            return;
        }
        self.state = DragState::Armed {
            source: node,
            origin: pos,
        };
    }

    /// Pointer moved. `hover` describes the row currently under the cursor,
    /// `None` when the cursor is outside every drop target.
    pub fn pointer_move(&mut self, pos: PointerPos, hover: Option<HoverRow>, tree: &TreeStore) {
        match &self.state {
            DragState::Idle => return,
            DragState::Armed { source, origin } => {
                if pos.distance(*origin) < DRAG_THRESHOLD_PX {
                    return;
                }
                let source = source.clone();
                debug!(source = %source, "drag started");
                self.state = DragState::Dragging { source };
            }
            DragState::Dragging { .. } | DragState::Hovering { .. } => {}
        }

        let source = match &self.state {
            DragState::Dragging { source } | DragState::Hovering { source, .. } => source.clone(),
            _ => return,
        };

        let Some(row) = hover else {
            self.state = DragState::Dragging { source };
            return;
        };
        // A node is not a drop target for itself.
        if row.target == DropTarget::Node(source.clone()) {
            self.state = DragState::Dragging { source };
            return;
        }

        let zone = match &row.target {
            // Virtual folders have a single meaning; no zone thirds.
            DropTarget::VirtualFolder(_) => DropZone::Into,
            DropTarget::Node(id) => {
                let is_folder = tree.node(id).map(|n| n.is_folder()).unwrap_or(false);
                let fraction = if row.row_height > 0.0 {
                    (pos.y - row.row_top) / row.row_height
                } else {
                    0.5
                };
                zone_for_fraction(fraction, is_folder)
            }
        };
        self.state = DragState::Hovering {
            source,
            target: row.target,
            zone,
            slot: row.insert_slot,
        };
    }

    /// Pointer released. A recorded target translates into a command; a
    /// release with no target cancels the gesture. Either way the controller
    /// is back in `Idle`.
    pub fn pointer_up(&mut self, tree: &TreeStore) -> Option<Command> {
        let state = std::mem::take(&mut self.state);
        let DragState::Hovering {
            source,
            target,
            zone,
            slot,
        } = state
        else {
            return None;
        };
        let command = translate_drop(tree, &source, &target, zone, slot);
        if command.is_none() {
            debug!(source = %source, "drop had no effect; gesture discarded");
        }
        command
    }

    /// Abort the gesture (escape key, focus loss). No command, no backend
    /// interaction.
    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
    }
}

/// Translate `(target, zone)` into a concrete mutation command.
///
/// `new_index` is computed against the post-removal sibling list the store
/// operates on, so dropping next to a sibling that sits after the source
/// compensates for the source leaving the list first.
fn translate_drop(
    tree: &TreeStore,
    source: &NodeId,
    target: &DropTarget,
    zone: DropZone,
    slot: Option<usize>,
) -> Option<Command> {
    let source_node = tree.node(source)?;

    let target_id = match target {
        DropTarget::VirtualFolder(tag) => {
            // Tag edit, never a structural move.
            let tags = source_node.tags()?;
            if tags.contains(tag) {
                return None;
            }
            let mut tags = tags.clone();
            tags.insert(tag.clone());
            return Some(Command::SetTags {
                id: source.clone(),
                tags,
            });
        }
        DropTarget::Node(id) => id,
    };
    let target_node = tree.node(target_id)?;

    let (new_parent, new_index) = match zone {
        DropZone::Into => {
            let child_count = target_node.children()?.len();
            let index = slot.unwrap_or(child_count).min(child_count);
            (Some(target_id.clone()), index)
        }
        DropZone::Before | DropZone::After => {
            let mut index = target_node.order;
            if zone == DropZone::After {
                index += 1;
            }
            let same_parent = source_node.parent_id == target_node.parent_id;
            if same_parent && source_node.order < target_node.order {
                index -= 1;
            }
            (target_node.parent_id.clone(), index)
        }
    };

    Some(Command::MoveNode {
        id: source.clone(),
        new_parent,
        new_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::dispatch;
    use crate::model::{ConnectionSettings, Node};

    const ROW_H: f32 = 30.0;

    fn profile(id: &str, name: &str) -> Node {
        let mut node = Node::new_profile(name, ConnectionSettings::default());
        node.id = id.to_string();
        node
    }

    fn folder(id: &str, name: &str) -> Node {
        let mut node = Node::new_folder(name);
        node.id = id.to_string();
        node
    }

    /// `root -> [FolderA(1) -> [ProfileX(10)], ProfileY(11)]`
    fn sample_tree() -> TreeStore {
        let mut tree = TreeStore::new();
        tree.insert(folder("1", "FolderA"), None, 0).unwrap();
        tree.insert(profile("10", "ProfileX"), Some("1".into()), 0)
            .unwrap();
        tree.insert(profile("11", "ProfileY"), None, 1).unwrap();
        tree
    }

    fn hover_node(id: &str) -> HoverRow {
        HoverRow {
            target: DropTarget::Node(id.to_string()),
            row_top: 0.0,
            row_height: ROW_H,
            insert_slot: None,
        }
    }

    /// Start a drag of `source` and hover `row` at vertical fraction `f`.
    fn drag_to(
        ctl: &mut DragDropController,
        tree: &TreeStore,
        source: &str,
        row: HoverRow,
        f: f32,
    ) {
        ctl.pointer_down(source.to_string(), PointerPos::new(0.0, 0.0));
        ctl.pointer_move(PointerPos::new(DRAG_THRESHOLD_PX + 1.0, 0.0), None, tree);
        assert!(ctl.is_dragging());
        ctl.pointer_move(PointerPos::new(0.0, row.row_top + f * row.row_height), Some(row), tree);
    }

    #[test]
    fn press_without_threshold_never_drags() {
        let tree = sample_tree();
        let mut ctl = DragDropController::new();
        ctl.pointer_down("10".to_string(), PointerPos::new(0.0, 0.0));
        ctl.pointer_move(PointerPos::new(1.0, 1.0), None, &tree);
        assert!(!ctl.is_dragging());
        assert!(ctl.pointer_up(&tree).is_none());
        assert_eq!(ctl.state(), &DragState::Idle);
    }

    #[test]
    fn zone_boundaries_belong_to_the_zone_below() {
        assert_eq!(zone_for_fraction(0.0, true), DropZone::Before);
        assert_eq!(zone_for_fraction(0.33, true), DropZone::Before);
        assert_eq!(zone_for_fraction(1.0 / 3.0, true), DropZone::Into);
        assert_eq!(zone_for_fraction(0.5, true), DropZone::Into);
        assert_eq!(zone_for_fraction(2.0 / 3.0, true), DropZone::After);
        assert_eq!(zone_for_fraction(1.0, true), DropZone::After);
        // Middle third degrades to After on non-folders.
        assert_eq!(zone_for_fraction(0.5, false), DropZone::After);
    }

    #[test]
    fn only_one_gesture_at_a_time() {
        let tree = sample_tree();
        let mut ctl = DragDropController::new();
        ctl.pointer_down("10".to_string(), PointerPos::new(0.0, 0.0));
        ctl.pointer_move(PointerPos::new(10.0, 0.0), None, &tree);
        // Second press while dragging is ignored.
        ctl.pointer_down("11".to_string(), PointerPos::new(0.0, 0.0));
        assert_eq!(ctl.source().map(String::as_str), Some("10"));
    }

    #[test]
    fn hovering_the_source_itself_is_not_a_target() {
        let tree = sample_tree();
        let mut ctl = DragDropController::new();
        drag_to(&mut ctl, &tree, "10", hover_node("10"), 0.5);
        assert!(matches!(ctl.state(), DragState::Dragging { .. }));
        assert!(ctl.pointer_up(&tree).is_none());
    }

    #[test]
    fn cancel_discards_the_gesture() {
        let tree = sample_tree();
        let mut ctl = DragDropController::new();
        drag_to(&mut ctl, &tree, "10", hover_node("11"), 0.1);
        ctl.cancel();
        assert_eq!(ctl.state(), &DragState::Idle);
        assert!(ctl.pointer_up(&tree).is_none());
    }

    #[test]
    fn release_outside_any_target_cancels() {
        let tree = sample_tree();
        let mut ctl = DragDropController::new();
        drag_to(&mut ctl, &tree, "10", hover_node("11"), 0.1);
        ctl.pointer_move(PointerPos::new(500.0, 500.0), None, &tree);
        assert!(ctl.pointer_up(&tree).is_none());
    }

    #[test]
    fn drop_before_a_root_sibling_inserts_at_its_slot() {
        // Drag ProfileX out of FolderA onto the top third of ProfileY.
        let mut tree = sample_tree();
        let mut ctl = DragDropController::new();
        drag_to(&mut ctl, &tree, "10", hover_node("11"), 0.1);

        let command = ctl.pointer_up(&tree).expect("drop should move");
        assert_eq!(
            command,
            Command::MoveNode {
                id: "10".into(),
                new_parent: None,
                new_index: 1,
            }
        );

        dispatch(&mut tree, command).unwrap();
        assert_eq!(
            tree.root_ids(),
            ["1".to_string(), "10".to_string(), "11".to_string()]
        );
        assert!(tree.children_of(Some(&"1".to_string())).is_empty());
    }

    #[test]
    fn drop_into_folder_appends() {
        let tree = sample_tree();
        let mut ctl = DragDropController::new();
        drag_to(&mut ctl, &tree, "11", hover_node("1"), 0.5);

        let command = ctl.pointer_up(&tree).unwrap();
        assert_eq!(
            command,
            Command::MoveNode {
                id: "11".into(),
                new_parent: Some("1".into()),
                new_index: 1,
            }
        );
    }

    #[test]
    fn drop_into_folder_honors_explicit_slot() {
        let tree = sample_tree();
        let mut ctl = DragDropController::new();
        let row = HoverRow {
            insert_slot: Some(0),
            ..hover_node("1")
        };
        drag_to(&mut ctl, &tree, "11", row, 0.5);

        let command = ctl.pointer_up(&tree).unwrap();
        assert_eq!(
            command,
            Command::MoveNode {
                id: "11".into(),
                new_parent: Some("1".into()),
                new_index: 0,
            }
        );
    }

    #[test]
    fn same_parent_after_drop_compensates_for_removal() {
        // [F(1), Y(11), Z(12)]: drag Y after Z -> post-removal index 2.
        let mut tree = sample_tree();
        tree.insert(profile("12", "ProfileZ"), None, 2).unwrap();
        let mut ctl = DragDropController::new();
        drag_to(&mut ctl, &tree, "11", hover_node("12"), 0.9);

        let command = ctl.pointer_up(&tree).unwrap();
        assert_eq!(
            command,
            Command::MoveNode {
                id: "11".into(),
                new_parent: None,
                new_index: 2,
            }
        );
        dispatch(&mut tree, command).unwrap();
        assert_eq!(
            tree.root_ids(),
            ["1".to_string(), "12".to_string(), "11".to_string()]
        );
    }

    #[test]
    fn dropping_folder_into_descendant_is_discarded_without_mutation() {
        let mut tree = sample_tree();
        tree.insert(folder("2", "FolderB"), Some("1".into()), 1)
            .unwrap();
        let before = tree.snapshot();

        let mut ctl = DragDropController::new();
        drag_to(&mut ctl, &tree, "1", hover_node("2"), 0.5);
        let command = ctl.pointer_up(&tree).unwrap();

        // The translation is legal on its face; validation rejects it and
        // the tree stays untouched.
        let err = dispatch(&mut tree, command).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(tree.snapshot(), before);
        assert_eq!(ctl.state(), &DragState::Idle);
    }

    #[test]
    fn virtual_folder_drop_edits_tags_not_structure() {
        let mut tree = sample_tree();
        let mut ctl = DragDropController::new();
        let row = HoverRow {
            target: DropTarget::VirtualFolder("prod".into()),
            row_top: 0.0,
            row_height: ROW_H,
            insert_slot: None,
        };
        drag_to(&mut ctl, &tree, "10", row, 0.5);

        let command = ctl.pointer_up(&tree).unwrap();
        let Command::SetTags { id, tags } = &command else {
            panic!("expected SetTags, got {command:?}");
        };
        assert_eq!(id, "10");
        assert!(tags.contains("prod"));

        let parent_before = tree.node(&"10".to_string()).unwrap().parent_id.clone();
        dispatch(&mut tree, command).unwrap();
        let node = tree.node(&"10".to_string()).unwrap();
        assert!(node.tags().unwrap().contains("prod"));
        assert_eq!(node.parent_id, parent_before);
    }

    #[test]
    fn virtual_folder_drop_is_noop_when_already_tagged() {
        let mut tree = sample_tree();
        tree.set_tags(
            &"10".to_string(),
            std::collections::BTreeSet::from(["prod".to_string()]),
        )
        .unwrap();
        let mut ctl = DragDropController::new();
        let row = HoverRow {
            target: DropTarget::VirtualFolder("prod".into()),
            row_top: 0.0,
            row_height: ROW_H,
            insert_slot: None,
        };
        drag_to(&mut ctl, &tree, "10", row, 0.5);
        assert!(ctl.pointer_up(&tree).is_none());
    }
}
