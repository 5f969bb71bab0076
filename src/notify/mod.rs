//! Screen Notifications
//!
//! Typed events emitted by the composition engine and the machinery that
//! fans them out to listeners.
//!
//! Events are queued on a single-consumer channel in the order the engine
//! produced them, and delivered on a dedicated worker thread. Listeners
//! therefore never run while the engine lock is held and may call back into
//! the engine freely.
//!
//! Within one recomposition the engine always queues
//! `GroupChanged { kind: Remove }` before `Change` before `Add`.

mod dispatcher;

pub use dispatcher::{ChannelListener, NotificationDispatcher};

use serde::{Deserialize, Serialize};

use crate::screen::{Combination, Placement, ScreenId, ScreenInfo};

/// Kind of group membership change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupChangeKind {
    /// Screens joined the group
    Add,
    /// Screens left the group
    Remove,
    /// Screens left and re-joined with a new configuration
    Change,
}

/// Why a screen or display changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// The screen's content source (mirror / expand / unique) changed
    SourceModeChanged,
    /// The screen was switched into a unique presentation
    SwitchChanged,
}

/// Display view of a grouped screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayInfo {
    /// Display identity (same value as the screen id)
    pub display_id: ScreenId,
    /// Backing screen
    pub screen_id: ScreenId,
    /// Group the screen belongs to
    pub group_id: ScreenId,
    /// Combination of that group, if any
    pub combination: Option<Combination>,
    /// Placement inside the group, if any
    pub placement: Option<Placement>,
}

/// Event published to listeners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScreenEvent {
    /// A screen appeared (hardware connect, virtual creation, unique re-registration)
    ScreenConnected(ScreenInfo),

    /// A screen went away, or a stale registration must be dropped
    ScreenDisconnected(ScreenId),

    /// Group membership changed for a batch of screens
    GroupChanged {
        /// Kind of change
        kind: GroupChangeKind,
        /// Affected screens, in processing order
        screens: Vec<ScreenInfo>,
    },

    /// A display became visible in a composition
    DisplayCreated(DisplayInfo),

    /// A display was detached from its composition
    DisplayDestroyed(ScreenId),

    /// Screen-level property change
    ScreenChanged {
        /// Updated screen
        screen: ScreenInfo,
        /// Reason
        reason: ChangeReason,
    },

    /// Display-level property change
    DisplayChanged {
        /// Updated display
        display: DisplayInfo,
        /// Reason
        reason: ChangeReason,
    },
}

impl ScreenEvent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ScreenEvent::ScreenConnected(_) => "screen_connected",
            ScreenEvent::ScreenDisconnected(_) => "screen_disconnected",
            ScreenEvent::GroupChanged { .. } => "group_changed",
            ScreenEvent::DisplayCreated(_) => "display_created",
            ScreenEvent::DisplayDestroyed(_) => "display_destroyed",
            ScreenEvent::ScreenChanged { .. } => "screen_changed",
            ScreenEvent::DisplayChanged { .. } => "display_changed",
        }
    }
}

/// Receives screen events on the dispatcher thread
pub trait ScreenEventListener: Send + Sync {
    /// Handle one event
    fn on_event(&self, event: &ScreenEvent);
}

impl<F> ScreenEventListener for F
where
    F: Fn(&ScreenEvent) + Send + Sync,
{
    fn on_event(&self, event: &ScreenEvent) {
        self(event)
    }
}
