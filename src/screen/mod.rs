//! Screen Data Model
//!
//! Logical screens, their composition membership, and the identity table that
//! maps backend hardware ids onto logical ids.
//!
//! # Identities
//!
//! ```text
//!   hardware id (backend)  <──ScreenIdTable──>  logical id (platform)
//!                                                   │
//!                                                   └─ group_id: 0 (ALONE) or 1 (the active group)
//! ```
//!
//! Cross references are always ids. A [`Screen`] never owns its group; the
//! engine looks the group up by id when it needs it.

pub mod group;
pub mod id_table;

pub use group::{Combination, GroupInfo, Placement, ScreenGroup};
pub use id_table::ScreenIdTable;

use serde::{Deserialize, Serialize};

/// Logical or hardware screen identity
pub type ScreenId = u64;

/// Group id carried by a screen that belongs to no group
pub const GROUP_ID_NONE: ScreenId = 0;

/// Identity of the single active composition group
pub const SCREEN_GROUP_ID: ScreenId = 1;

/// Kind of logical screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenKind {
    /// Physical panel or external monitor
    Real,
    /// Casting target, recorder, or other allocated surface
    Virtual,
    /// Not yet classified; never eligible for composition
    Undefined,
}

/// 2-D point in virtual desktop space
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate in pixels
    pub x: i32,
    /// Y coordinate in pixels
    pub y: i32,
}

impl Point {
    /// Origin of the virtual desktop
    pub const ORIGIN: Point = Point { x: 0, y: 0 };

    /// Create a point
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// Source rectangle of a mirror
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Region {
    /// Create a region
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A zero-sized region means "the whole source screen"
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Rotation hint forwarded to the geometry collaborator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rotation {
    /// No rotation
    #[default]
    Rotation0,
    /// 90 degrees clockwise
    Rotation90,
    /// 180 degrees
    Rotation180,
    /// 270 degrees clockwise
    Rotation270,
}

impl Rotation {
    /// Whether width and height swap under this rotation
    pub fn is_portrait_swap(self) -> bool {
        matches!(self, Rotation::Rotation90 | Rotation::Rotation270)
    }
}

/// Active mode of a screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenMode {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl ScreenMode {
    /// Create a mode
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width after applying a rotation
    pub fn active_width(&self, rotation: Rotation) -> u32 {
        if rotation.is_portrait_swap() {
            self.height
        } else {
            self.width
        }
    }
}

/// Descriptive properties supplied when a screen appears
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenProfile {
    /// Human readable name, also used for region-rotation exclusion
    pub name: String,
    /// Active mode
    pub mode: ScreenMode,
}

impl ScreenProfile {
    /// Create a profile
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            mode: ScreenMode::new(width, height),
        }
    }
}

/// One logical display
#[derive(Debug, Clone)]
pub struct Screen {
    /// Logical identity
    pub id: ScreenId,

    /// Backend identity, `None` for a virtual screen not yet bound
    pub hardware_id: Option<ScreenId>,

    /// Screen kind
    pub kind: ScreenKind,

    /// Name reported by the backend or the virtual-screen creator
    pub name: String,

    /// Active mode
    pub mode: ScreenMode,

    /// Current group ([`GROUP_ID_NONE`] when ungrouped)
    pub group_id: ScreenId,

    /// Group the screen belonged to before its last membership change
    pub last_group_id: ScreenId,

    /// Hardware id of the mirrored source, set only on the anchor of a mirror group
    pub mirror_source: Option<ScreenId>,

    /// Mirror source rectangle last applied to this screen
    pub mirror_region: Option<Region>,

    /// Whether the mirror region follows the source rotation
    pub region_rotation_enabled: bool,

    /// Last known start position in the virtual desktop
    pub start_point: Point,

    /// Rotation last forwarded by an expand request
    pub rotation: Rotation,
}

impl Screen {
    /// Create an ungrouped screen
    pub fn new(id: ScreenId, hardware_id: Option<ScreenId>, kind: ScreenKind, profile: ScreenProfile) -> Self {
        Self {
            id,
            hardware_id,
            kind,
            name: profile.name,
            mode: profile.mode,
            group_id: GROUP_ID_NONE,
            last_group_id: GROUP_ID_NONE,
            mirror_source: None,
            mirror_region: None,
            region_rotation_enabled: false,
            start_point: Point::ORIGIN,
            rotation: Rotation::Rotation0,
        }
    }

    /// Whether the screen currently belongs to a group
    pub fn is_grouped(&self) -> bool {
        self.group_id != GROUP_ID_NONE
    }

    /// Screens of undefined kind never take part in composition
    pub fn is_composable(&self) -> bool {
        self.kind != ScreenKind::Undefined
    }

    /// Snapshot for listeners and callers
    pub fn to_info(&self) -> ScreenInfo {
        ScreenInfo {
            id: self.id,
            hardware_id: self.hardware_id,
            kind: self.kind,
            name: self.name.clone(),
            mode: self.mode,
            group_id: self.group_id,
            last_group_id: self.last_group_id,
            mirror_region: self.mirror_region,
            region_rotation_enabled: self.region_rotation_enabled,
            start_point: self.start_point,
            rotation: self.rotation,
        }
    }
}

/// Cloned view of a [`Screen`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenInfo {
    /// Logical identity
    pub id: ScreenId,
    /// Backend identity
    pub hardware_id: Option<ScreenId>,
    /// Screen kind
    pub kind: ScreenKind,
    /// Name
    pub name: String,
    /// Active mode
    pub mode: ScreenMode,
    /// Current group
    pub group_id: ScreenId,
    /// Previous group
    pub last_group_id: ScreenId,
    /// Applied mirror region
    pub mirror_region: Option<Region>,
    /// Region rotation flag
    pub region_rotation_enabled: bool,
    /// Start position
    pub start_point: Point,
    /// Last rotation hint applied
    pub rotation: Rotation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_screen_is_ungrouped() {
        let screen = Screen::new(1000, Some(10), ScreenKind::Real, ScreenProfile::new("HDMI-1", 1920, 1080));
        assert!(!screen.is_grouped());
        assert!(screen.is_composable());
        assert_eq!(screen.to_info().group_id, GROUP_ID_NONE);
    }

    #[test]
    fn test_undefined_screen_not_composable() {
        let screen = Screen::new(1001, None, ScreenKind::Undefined, ScreenProfile::new("?", 0, 0));
        assert!(!screen.is_composable());
    }

    #[test]
    fn test_active_width_swaps_on_portrait_rotation() {
        let mode = ScreenMode::new(1080, 2340);
        assert_eq!(mode.active_width(Rotation::Rotation0), 1080);
        assert_eq!(mode.active_width(Rotation::Rotation90), 2340);
        assert_eq!(mode.active_width(Rotation::Rotation270), 2340);
    }
}
