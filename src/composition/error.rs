//! Composition error types

use thiserror::Error;

use crate::screen::ScreenId;

/// Composition result type
pub type Result<T> = std::result::Result<T, CompositionError>;

/// Composition error types
///
/// Only whole-request failures surface here. Individual screens that cannot
/// be processed inside a batch are skipped, not reported.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositionError {
    /// Anchor unresolvable or no usable candidate screens
    #[error("No target screen to compose")]
    NoTarget,

    /// Screen id does not resolve
    #[error("Screen not found: {0}")]
    ScreenNotFound(ScreenId),

    /// Screen belongs to no group
    #[error("Screen {0} is not in a group")]
    NotGrouped(ScreenId),

    /// Screen already belongs to the group
    #[error("Screen {0} is already a group member")]
    AlreadyMember(ScreenId),

    /// Malformed request
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Mirroring has been disabled
    #[error("Mirroring is disabled")]
    MirrorDisabled,

    /// Caller failed the permission gate
    #[error("Permission denied: {0}")]
    PermissionDenied(&'static str),

    /// Placement service could not place the screen
    #[error("Screen {0} could not be placed")]
    PlacementFailed(ScreenId),

    /// Operation requires a virtual screen
    #[error("Screen {0} is not a virtual screen")]
    NotVirtual(ScreenId),
}
