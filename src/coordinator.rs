//! Screen Coordinator
//!
//! Boundary between external callers and the [`CompositionEngine`]: feeds
//! hardware connect/disconnect events in, applies the permission gate to
//! composition requests, and exposes listener registration.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub use crate::composition::StateSnapshot;

use crate::composition::{CastInfo, CompositionEngine, CompositionError, Result};
use crate::config::Config;
use crate::geometry::{PlacementService, TilingPlacement};
use crate::notify::{NotificationDispatcher, ScreenEvent, ScreenEventListener};
use crate::screen::{
    Combination, GroupInfo, Point, Region, Rotation, ScreenId, ScreenInfo, ScreenKind, ScreenProfile,
};

/// Event delivered by the hardware feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareEvent {
    /// A hardware screen appeared
    Connected {
        /// Screen kind reported by the backend
        kind: ScreenKind,
        /// Name and mode
        profile: ScreenProfile,
    },
    /// A hardware screen went away
    Disconnected,
}

/// Caller-facing composition request, as seen by the permission gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// make_mirror
    MakeMirror,
    /// make_expand
    MakeExpand,
    /// make_unique
    MakeUnique,
    /// stop_screens and its wrappers
    StopScreens,
    /// remove_virtual_screens_from_group
    RemoveVirtualScreens,
    /// disable_mirror
    DisableMirror,
}

impl Request {
    fn name(self) -> &'static str {
        match self {
            Request::MakeMirror => "make_mirror",
            Request::MakeExpand => "make_expand",
            Request::MakeUnique => "make_unique",
            Request::StopScreens => "stop_screens",
            Request::RemoveVirtualScreens => "remove_virtual_screens_from_group",
            Request::DisableMirror => "disable_mirror",
        }
    }
}

/// Policy check applied before a request reaches the engine
pub trait PermissionGate: Send + Sync {
    /// Whether the current caller may issue `request`
    fn allows(&self, request: Request) -> bool;
}

/// Gate that admits every request
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl PermissionGate for AllowAll {
    fn allows(&self, _request: Request) -> bool {
        true
    }
}

/// Screen coordinator
pub struct ScreenCoordinator {
    engine: Arc<CompositionEngine>,
    gate: Arc<dyn PermissionGate>,
}

impl ScreenCoordinator {
    /// Build a coordinator from configuration with the default placement policy
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.composition.clone(),
            Arc::new(TilingPlacement::new()),
            Arc::new(AllowAll),
        )
    }

    /// Build a coordinator from its collaborators
    pub fn new(
        config: crate::config::CompositionConfig,
        placement: Arc<dyn PlacementService>,
        gate: Arc<dyn PermissionGate>,
    ) -> Self {
        let dispatcher = Arc::new(NotificationDispatcher::new());
        Self {
            engine: Arc::new(CompositionEngine::new(config, placement, dispatcher)),
            gate,
        }
    }

    /// Underlying engine
    pub fn engine(&self) -> &Arc<CompositionEngine> {
        &self.engine
    }

    fn check(&self, request: Request) -> Result<()> {
        if self.gate.allows(request) {
            Ok(())
        } else {
            warn!("Permission denied for {}", request.name());
            Err(CompositionError::PermissionDenied(request.name()))
        }
    }

    // -------------------------------------------------------------------------
    // Notifications
    // -------------------------------------------------------------------------

    /// Register a listener
    pub fn add_listener(&self, listener: Arc<dyn ScreenEventListener>) {
        self.engine.dispatcher().add_listener(listener);
    }

    /// Register an async subscriber
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ScreenEvent> {
        self.engine.dispatcher().subscribe()
    }

    /// Wait until every queued event has reached the listeners
    pub fn flush_notifications(&self) {
        self.engine.dispatcher().flush();
    }

    // -------------------------------------------------------------------------
    // Hardware feed
    // -------------------------------------------------------------------------

    /// Apply a hardware connect/disconnect; returns the logical id involved
    pub fn on_hardware_event(&self, hardware_id: ScreenId, event: HardwareEvent) -> Option<ScreenId> {
        match event {
            HardwareEvent::Connected { kind, profile } => {
                Some(self.engine.connect_hardware(hardware_id, kind, profile))
            }
            HardwareEvent::Disconnected => self.engine.disconnect_hardware(hardware_id),
        }
    }

    // -------------------------------------------------------------------------
    // Virtual screens
    // -------------------------------------------------------------------------

    /// Create a virtual screen
    pub fn create_virtual_screen(&self, profile: ScreenProfile) -> ScreenId {
        self.engine.create_virtual_screen(profile)
    }

    /// Attach a hardware surface to a virtual screen
    pub fn bind_virtual_hardware(&self, screen_id: ScreenId, hardware_id: ScreenId) -> Result<()> {
        self.engine.bind_virtual_hardware(screen_id, hardware_id)
    }

    /// Destroy a virtual screen
    pub fn destroy_virtual_screen(&self, screen_id: ScreenId) -> Result<()> {
        self.engine.destroy_virtual_screen(screen_id)
    }

    // -------------------------------------------------------------------------
    // Composition requests
    // -------------------------------------------------------------------------

    /// Mirror `anchor` onto `screens`
    pub fn make_mirror(
        &self,
        anchor: ScreenId,
        screens: &[ScreenId],
        region: Option<Region>,
        rotation: Option<Rotation>,
        force: bool,
    ) -> Result<ScreenId> {
        self.check(Request::MakeMirror)?;
        self.engine.make_mirror(anchor, screens, region, rotation, force)
    }

    /// Extend onto `screens` at `start_points`
    pub fn make_expand(&self, screens: &[ScreenId], start_points: &[Point]) -> Result<ScreenId> {
        self.check(Request::MakeExpand)?;
        self.engine.make_expand(screens, start_points)
    }

    /// Switch virtual screens to unique content
    pub fn make_unique(&self, screens: &[ScreenId]) -> Result<Vec<ScreenId>> {
        self.check(Request::MakeUnique)?;
        self.engine.make_unique(screens)
    }

    /// Detach screens from a group of combination `expected`
    pub fn stop_screens(&self, screens: &[ScreenId], expected: Combination) -> Result<()> {
        self.check(Request::StopScreens)?;
        self.engine.stop_screens(screens, expected)
    }

    /// Stop mirroring onto `screens`
    pub fn stop_mirror(&self, screens: &[ScreenId]) -> Result<()> {
        self.stop_screens(screens, Combination::Mirror)
    }

    /// Stop extending onto `screens`
    pub fn stop_expand(&self, screens: &[ScreenId]) -> Result<()> {
        self.stop_screens(screens, Combination::Expand)
    }

    /// Detach casting targets from the group
    pub fn remove_virtual_screens_from_group(&self, screens: &[ScreenId]) -> Result<()> {
        self.check(Request::RemoveVirtualScreens)?;
        self.engine.remove_virtual_screens_from_group(screens);
        Ok(())
    }

    /// Enable or disable mirror requests
    pub fn disable_mirror(&self, disabled: bool) -> Result<()> {
        self.check(Request::DisableMirror)?;
        info!("Mirroring {}", if disabled { "disabled" } else { "enabled" });
        self.engine.set_mirror_disabled(disabled);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Snapshot of the group with `group_id`
    pub fn get_group(&self, group_id: ScreenId) -> Option<GroupInfo> {
        self.engine.get_group(group_id)
    }

    /// Snapshot of the group `screen_id` belongs to
    pub fn group_info_for_screen(&self, screen_id: ScreenId) -> Option<GroupInfo> {
        self.engine.group_info_for_screen(screen_id)
    }

    /// Dedup, existence and kind filter
    pub fn get_all_valid_screen_ids(&self, candidates: &[ScreenId]) -> Vec<ScreenId> {
        self.engine.get_all_valid_screen_ids(candidates)
    }

    /// Snapshot of one screen
    pub fn screen_info(&self, screen_id: ScreenId) -> Option<ScreenInfo> {
        self.engine.screen_info(screen_id)
    }

    /// Composition a screen was last configured for
    pub fn cast_info(&self, screen_id: ScreenId) -> Option<CastInfo> {
        self.engine.cast_info(screen_id)
    }

    /// Current default screen
    pub fn default_screen_id(&self) -> Option<ScreenId> {
        self.engine.default_screen_id()
    }

    /// Snapshot of every screen and the active group
    pub fn snapshot(&self) -> StateSnapshot {
        self.engine.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompositionConfig;
    use crate::screen::SCREEN_GROUP_ID;

    struct DenyMirror;

    impl PermissionGate for DenyMirror {
        fn allows(&self, request: Request) -> bool {
            request != Request::MakeMirror
        }
    }

    fn connected(coordinator: &ScreenCoordinator, hw: ScreenId) -> ScreenId {
        coordinator
            .on_hardware_event(
                hw,
                HardwareEvent::Connected {
                    kind: ScreenKind::Real,
                    profile: ScreenProfile::new(format!("HW-{hw}"), 1920, 1080),
                },
            )
            .unwrap()
    }

    #[test]
    fn test_permission_gate_blocks_before_engine() {
        let coordinator = ScreenCoordinator::new(
            CompositionConfig::default(),
            Arc::new(TilingPlacement),
            Arc::new(DenyMirror),
        );
        let a = connected(&coordinator, 10);
        let b = connected(&coordinator, 11);

        assert_eq!(
            coordinator.make_mirror(a, &[b], None, None, false),
            Err(CompositionError::PermissionDenied("make_mirror"))
        );
        assert!(coordinator.get_group(SCREEN_GROUP_ID).is_none());

        assert!(coordinator.make_expand(&[b], &[Point::new(1920, 0)]).is_ok());
    }

    #[test]
    fn test_disconnect_unknown_hardware() {
        let coordinator = ScreenCoordinator::from_config(&Config::default());
        assert_eq!(coordinator.on_hardware_event(99, HardwareEvent::Disconnected), None);
    }

    #[test]
    fn test_snapshot_serializes() {
        let coordinator = ScreenCoordinator::from_config(&Config::default());
        let a = connected(&coordinator, 10);
        let v = coordinator.create_virtual_screen(ScreenProfile::new("CastEngine", 1280, 720));
        coordinator.make_mirror(a, &[v], None, None, false).unwrap();

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.default_screen, Some(a));
        assert_eq!(snapshot.screens.len(), 2);
        assert_eq!(snapshot.group.as_ref().map(|g| g.anchor), Some(a));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["group"]["anchor"], a);
    }
}
