//! Screen Group
//!
//! The single non-trivial composition: which screens are mirrored,
//! expanded, or presented uniquely, and where each one sits.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{Point, Region, ScreenId, SCREEN_GROUP_ID};

/// How the members of a group relate to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combination {
    /// Every member shows the anchor's content
    Mirror,
    /// Members are tiled into one larger virtual desktop
    Expand,
    /// Members are presented in isolation
    Unique,
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combination::Mirror => write!(f, "mirror"),
            Combination::Expand => write!(f, "expand"),
            Combination::Unique => write!(f, "unique"),
        }
    }
}

/// Where a member sits in its group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Placement {
    /// Start point in the virtual desktop (expand / unique)
    Point(Point),
    /// Source rectangle on the anchor (mirror)
    Region(Region),
}

impl Placement {
    /// Start point of this placement; a region starts at its top-left corner
    pub fn start_point(&self) -> Point {
        match self {
            Placement::Point(p) => *p,
            Placement::Region(r) => Point::new(r.x, r.y),
        }
    }
}

/// The active composition
///
/// Members are kept in ascending id order. A group with no members must not
/// outlive the operation that emptied it.
#[derive(Debug, Clone)]
pub struct ScreenGroup {
    /// Group identity (always [`SCREEN_GROUP_ID`])
    id: ScreenId,

    /// Current combination
    combination: Combination,

    /// Mirror source, or first-joined screen for expand / unique
    anchor: ScreenId,

    /// Member id → placement
    members: BTreeMap<ScreenId, Placement>,
}

impl ScreenGroup {
    /// Create an empty group anchored on `anchor`
    pub fn new(combination: Combination, anchor: ScreenId) -> Self {
        Self {
            id: SCREEN_GROUP_ID,
            combination,
            anchor,
            members: BTreeMap::new(),
        }
    }

    /// Group identity
    pub fn id(&self) -> ScreenId {
        self.id
    }

    /// Current combination
    pub fn combination(&self) -> Combination {
        self.combination
    }

    /// Change the combination
    pub fn set_combination(&mut self, combination: Combination) {
        self.combination = combination;
    }

    /// Anchor screen id
    pub fn anchor(&self) -> ScreenId {
        self.anchor
    }

    /// Re-point the anchor
    pub fn set_anchor(&mut self, anchor: ScreenId) {
        self.anchor = anchor;
    }

    /// Insert a member; returns `false` if it was already present
    pub fn add_member(&mut self, screen_id: ScreenId, placement: Placement) -> bool {
        if self.members.contains_key(&screen_id) {
            return false;
        }
        self.members.insert(screen_id, placement);
        true
    }

    /// Remove a member; returns its placement if it was present
    pub fn remove_member(&mut self, screen_id: ScreenId) -> Option<Placement> {
        self.members.remove(&screen_id)
    }

    /// Whether `screen_id` is a member
    pub fn has_member(&self, screen_id: ScreenId) -> bool {
        self.members.contains_key(&screen_id)
    }

    /// Placement of a member
    pub fn placement(&self, screen_id: ScreenId) -> Option<Placement> {
        self.members.get(&screen_id).copied()
    }

    /// Member ids in ascending order
    pub fn member_ids(&self) -> Vec<ScreenId> {
        self.members.keys().copied().collect()
    }

    /// Member count
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group has no members
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Snapshot for callers
    pub fn to_info(&self) -> GroupInfo {
        GroupInfo {
            id: self.id,
            combination: self.combination,
            anchor: self.anchor,
            children: self.members.keys().copied().collect(),
            placements: self.members.values().copied().collect(),
        }
    }
}

/// Cloned view of a [`ScreenGroup`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    /// Group identity
    pub id: ScreenId,
    /// Combination
    pub combination: Combination,
    /// Anchor screen
    pub anchor: ScreenId,
    /// Member ids, ascending
    pub children: Vec<ScreenId>,
    /// Placements, parallel to `children`
    pub placements: Vec<Placement>,
}

impl GroupInfo {
    /// Placement of a child, if it is one
    pub fn placement_of(&self, screen_id: ScreenId) -> Option<Placement> {
        self.children
            .iter()
            .position(|&id| id == screen_id)
            .map(|idx| self.placements[idx])
    }
}
