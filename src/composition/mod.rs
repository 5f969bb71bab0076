//! Composition Engine
//!
//! Owns the screen map, the hardware/logical id table, and the single active
//! [`ScreenGroup`](crate::screen::ScreenGroup). It is the only component that
//! mutates group membership.
//!
//! # Locking
//!
//! Every public operation takes the engine lock once and runs to completion
//! under it, including the detach-then-rejoin sequence of a recomposition, so
//! no caller ever observes a screen transiently ungrouped. Events produced by
//! the operation are queued on the [`NotificationDispatcher`] before the lock
//! is released; listeners run later on the dispatcher thread.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use screen_coordinator::composition::CompositionEngine;
//! use screen_coordinator::config::CompositionConfig;
//! use screen_coordinator::geometry::TilingPlacement;
//! use screen_coordinator::notify::NotificationDispatcher;
//! use screen_coordinator::screen::{ScreenKind, ScreenProfile};
//!
//! let engine = CompositionEngine::new(
//!     CompositionConfig::default(),
//!     Arc::new(TilingPlacement),
//!     Arc::new(NotificationDispatcher::new()),
//! );
//! let a = engine.connect_hardware(10, ScreenKind::Real, ScreenProfile::new("HDMI-A", 1920, 1080));
//! let b = engine.connect_hardware(11, ScreenKind::Real, ScreenProfile::new("HDMI-B", 1920, 1080));
//! engine.make_mirror(a, &[b], None, None, false)?;
//! # Ok::<(), screen_coordinator::composition::CompositionError>(())
//! ```

mod error;
mod operations;
mod recompose;
mod state;

pub use error::{CompositionError, Result};
pub use state::CastInfo;

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::config::CompositionConfig;
use crate::geometry::PlacementService;
use crate::notify::NotificationDispatcher;
use crate::screen::{
    Combination, GroupInfo, Point, Region, Rotation, ScreenId, ScreenInfo, ScreenKind, ScreenProfile,
};
use state::EngineState;

/// Serializable view of every screen and the active group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    /// Default screen, if any
    pub default_screen: Option<ScreenId>,
    /// Every live screen, ascending id
    pub screens: Vec<ScreenInfo>,
    /// Active group, if any
    pub group: Option<GroupInfo>,
}

/// Screen identity and composition engine
pub struct CompositionEngine {
    state: Mutex<EngineState>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl CompositionEngine {
    /// Create an engine with no screens and no group
    pub fn new(
        config: CompositionConfig,
        placement: Arc<dyn PlacementService>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            state: Mutex::new(EngineState::new(config, placement)),
            dispatcher,
        }
    }

    /// Dispatcher this engine publishes to
    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    /// Run one operation under the lock and queue its events
    fn mutate<T>(&self, op: impl FnOnce(&mut EngineState) -> T) -> T {
        let mut state = self.state.lock();
        let result = op(&mut state);
        let events = std::mem::take(&mut state.outbox);
        if !events.is_empty() {
            debug!("Queueing {} screen events", events.len());
            self.dispatcher.publish_all(events);
        }
        result
    }

    // -------------------------------------------------------------------------
    // Screen lifecycle
    // -------------------------------------------------------------------------

    /// Register a connected hardware screen, returning its logical id
    ///
    /// Re-enumeration of a known hardware id refreshes the existing screen.
    pub fn connect_hardware(&self, hardware_id: ScreenId, kind: ScreenKind, profile: ScreenProfile) -> ScreenId {
        self.mutate(|state| state.connect_hardware(hardware_id, kind, profile))
    }

    /// Forget a disconnected hardware screen, returning the logical id it had
    pub fn disconnect_hardware(&self, hardware_id: ScreenId) -> Option<ScreenId> {
        self.mutate(|state| state.disconnect_hardware(hardware_id))
    }

    /// Create a virtual screen with no hardware backing yet
    pub fn create_virtual_screen(&self, profile: ScreenProfile) -> ScreenId {
        self.mutate(|state| state.create_virtual(profile))
    }

    /// Attach a hardware surface to a virtual screen
    pub fn bind_virtual_hardware(&self, screen_id: ScreenId, hardware_id: ScreenId) -> Result<()> {
        self.mutate(|state| state.bind_virtual_hardware(screen_id, hardware_id))
    }

    /// Destroy a virtual screen, detaching it from the group first
    pub fn destroy_virtual_screen(&self, screen_id: ScreenId) -> Result<()> {
        self.mutate(|state| state.destroy_virtual(screen_id))
    }

    // -------------------------------------------------------------------------
    // Membership
    // -------------------------------------------------------------------------

    /// Add a screen to the group, creating the group if none exists
    pub fn join(&self, screen_id: ScreenId) -> Result<ScreenId> {
        self.mutate(|state| {
            let group_id = state.join(screen_id, false)?;
            state.emit_group_changed(crate::notify::GroupChangeKind::Add, &[screen_id]);
            Ok(group_id)
        })
    }

    /// Remove a screen from the group; returns whether the group was destroyed
    pub fn leave(&self, screen_id: ScreenId) -> Result<bool> {
        self.mutate(|state| {
            let destroyed = state.leave(screen_id)?;
            state.emit_group_changed(crate::notify::GroupChangeKind::Remove, &[screen_id]);
            Ok(destroyed)
        })
    }

    /// Mirror `anchor` onto `screens`
    pub fn make_mirror(
        &self,
        anchor: ScreenId,
        screens: &[ScreenId],
        region: Option<Region>,
        rotation: Option<Rotation>,
        force: bool,
    ) -> Result<ScreenId> {
        self.mutate(|state| state.make_mirror(anchor, screens, region, rotation, force))
    }

    /// Extend the default screen onto `screens` at `start_points`
    pub fn make_expand(&self, screens: &[ScreenId], start_points: &[Point]) -> Result<ScreenId> {
        self.mutate(|state| state.make_expand(screens, start_points))
    }

    /// Give virtual screens their own content; returns the screens switched
    pub fn make_unique(&self, screens: &[ScreenId]) -> Result<Vec<ScreenId>> {
        self.mutate(|state| state.make_unique(screens))
    }

    /// Detach screens whose group currently has `expected` combination
    pub fn stop_screens(&self, screens: &[ScreenId], expected: Combination) -> Result<()> {
        self.mutate(|state| state.stop_screens(screens, expected))
    }

    /// Stop mirroring onto `screens`
    pub fn stop_mirror(&self, screens: &[ScreenId]) -> Result<()> {
        self.stop_screens(screens, Combination::Mirror)
    }

    /// Stop extending onto `screens`
    pub fn stop_expand(&self, screens: &[ScreenId]) -> Result<()> {
        self.stop_screens(screens, Combination::Expand)
    }

    /// Detach virtual screens regardless of the group combination
    pub fn remove_virtual_screens_from_group(&self, screens: &[ScreenId]) {
        self.mutate(|state| state.remove_virtual_screens_from_group(screens))
    }

    /// Enable or disable mirror requests
    pub fn set_mirror_disabled(&self, disabled: bool) {
        self.state.lock().config.mirror_disabled = disabled;
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Snapshot of the group with `group_id`, if active
    pub fn get_group(&self, group_id: ScreenId) -> Option<GroupInfo> {
        let state = self.state.lock();
        state
            .group
            .as_ref()
            .filter(|g| g.id() == group_id)
            .map(|g| g.to_info())
    }

    /// Snapshot of the group `screen_id` belongs to
    pub fn group_info_for_screen(&self, screen_id: ScreenId) -> Option<GroupInfo> {
        let state = self.state.lock();
        state
            .group
            .as_ref()
            .filter(|g| g.has_member(screen_id))
            .map(|g| g.to_info())
    }

    /// Dedup, existence and kind filter, preserving input order
    pub fn get_all_valid_screen_ids(&self, candidates: &[ScreenId]) -> Vec<ScreenId> {
        self.state.lock().valid_screen_ids(candidates)
    }

    /// Snapshot of one screen
    pub fn screen_info(&self, screen_id: ScreenId) -> Option<ScreenInfo> {
        self.state.lock().info(screen_id)
    }

    /// All live screen ids, ascending
    pub fn screen_ids(&self) -> Vec<ScreenId> {
        self.state.lock().screens.keys().copied().collect()
    }

    /// Hardware id backing a logical screen
    pub fn translate_to_hardware(&self, screen_id: ScreenId) -> Option<ScreenId> {
        self.state.lock().ids.translate_to_hardware(screen_id)
    }

    /// Logical screen for a hardware id
    pub fn translate_to_logical(&self, hardware_id: ScreenId) -> Option<ScreenId> {
        self.state.lock().ids.translate_to_logical(hardware_id)
    }

    /// Composition a screen was last configured for
    pub fn cast_info(&self, screen_id: ScreenId) -> Option<CastInfo> {
        self.state.lock().cast_info.get(&screen_id).copied()
    }

    /// Current default screen
    pub fn default_screen_id(&self) -> Option<ScreenId> {
        self.state.lock().default_screen
    }

    /// Screens and group read under one lock acquisition
    pub fn snapshot(&self) -> StateSnapshot {
        let state = self.state.lock();
        StateSnapshot {
            default_screen: state.default_screen,
            screens: state.screens.values().map(|s| s.to_info()).collect(),
            group: state.group.as_ref().map(|g| g.to_info()),
        }
    }

    /// Verify every screen/group cross reference
    pub fn check_invariants(&self) -> bool {
        self.state.lock().check_invariants()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{MockPlacementService, TilingPlacement};
    use crate::notify::{GroupChangeKind, ScreenEvent};
    use crate::screen::{Placement, SCREEN_GROUP_ID};

    struct Harness {
        engine: CompositionEngine,
        events: Arc<Mutex<Vec<ScreenEvent>>>,
    }

    impl Harness {
        fn new(config: CompositionConfig, placement: Arc<dyn PlacementService>) -> Self {
            let dispatcher = Arc::new(NotificationDispatcher::new());
            let events = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&events);
            dispatcher.add_listener(Arc::new(move |event: &ScreenEvent| {
                sink.lock().push(event.clone());
            }));
            Self {
                engine: CompositionEngine::new(config, placement, dispatcher),
                events,
            }
        }

        fn take_events(&self) -> Vec<ScreenEvent> {
            self.engine.dispatcher().flush();
            std::mem::take(&mut *self.events.lock())
        }

        fn connect(&self, hw: ScreenId) -> ScreenId {
            self.engine
                .connect_hardware(hw, ScreenKind::Real, ScreenProfile::new(format!("HW-{hw}"), 1920, 1080))
        }
    }

    fn harness() -> Harness {
        Harness::new(CompositionConfig::default(), Arc::new(TilingPlacement))
    }

    #[test]
    fn test_events_reach_listeners() {
        let h = harness();
        let a = h.connect(10);
        let events = h.take_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ScreenEvent::ScreenConnected(info) if info.id == a));
    }

    #[test]
    fn test_snapshot_is_consistent_under_concurrent_churn() {
        let h = harness();
        let a = h.connect(10);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..200 {
                    let b = h.connect(11);
                    let _ = h.engine.make_mirror(a, &[b], None, None, false);
                    h.engine.disconnect_hardware(11);
                }
            });

            for _ in 0..200 {
                let snapshot = h.engine.snapshot();
                if let Some(group) = &snapshot.group {
                    for child in &group.children {
                        let screen = snapshot.screens.iter().find(|s| s.id == *child);
                        assert!(screen.is_some_and(|s| s.group_id == group.id));
                    }
                }
            }
        });

        assert!(h.engine.check_invariants());
    }

    #[test]
    fn test_get_group_and_group_for_screen() {
        let h = harness();
        let a = h.connect(10);
        let b = h.connect(11);
        let c = h.connect(12);
        assert!(h.engine.get_group(SCREEN_GROUP_ID).is_none());

        h.engine.make_mirror(a, &[b], None, None, false).unwrap();

        let info = h.engine.get_group(SCREEN_GROUP_ID).unwrap();
        assert_eq!(info.anchor, a);
        assert_eq!(info.children, vec![a, b]);
        assert!(h.engine.get_group(7).is_none());
        assert_eq!(h.engine.group_info_for_screen(b), Some(info));
        assert!(h.engine.group_info_for_screen(c).is_none());
    }

    #[test]
    fn test_join_and_leave_publish_membership() {
        let h = harness();
        let a = h.connect(10);
        h.take_events();

        assert_eq!(h.engine.join(a), Ok(SCREEN_GROUP_ID));
        assert!(matches!(
            &h.take_events()[..],
            [ScreenEvent::GroupChanged { kind: GroupChangeKind::Add, .. }]
        ));

        assert_eq!(h.engine.leave(a), Ok(true));
        assert!(h.engine.get_group(SCREEN_GROUP_ID).is_none());
        assert!(h.engine.check_invariants());
    }

    #[test]
    fn test_failed_request_publishes_nothing() {
        let h = harness();
        let a = h.connect(10);
        h.take_events();

        assert_eq!(
            h.engine.make_mirror(a, &[a, 777], None, None, false),
            Err(CompositionError::NoTarget)
        );
        assert!(h.take_events().is_empty());
    }

    #[test]
    fn test_mirror_disabled_toggle() {
        let h = harness();
        let a = h.connect(10);
        let b = h.connect(11);

        h.engine.set_mirror_disabled(true);
        assert_eq!(
            h.engine.make_mirror(a, &[b], None, None, false),
            Err(CompositionError::MirrorDisabled)
        );
        h.engine.set_mirror_disabled(false);
        assert!(h.engine.make_mirror(a, &[b], None, None, false).is_ok());
    }

    #[test]
    fn test_placement_service_drives_member_geometry() {
        let mut placement = MockPlacementService::new();
        placement
            .expect_compute_member_placement()
            .returning(|request| Some(Placement::Point(Point::new(request.screen.id as i32, 7))));

        let h = Harness::new(CompositionConfig::default(), Arc::new(placement));
        let a = h.connect(10);
        let b = h.connect(11);

        h.engine.make_expand(&[b], &[Point::new(1920, 0)]).unwrap();

        let info = h.engine.group_info_for_screen(b).unwrap();
        assert_eq!(info.anchor, a);
        assert_eq!(info.placement_of(b), Some(Placement::Point(Point::new(b as i32, 7))));
    }

    #[test]
    fn test_translation_round_trip() {
        let h = harness();
        let a = h.connect(10);
        assert_eq!(h.engine.translate_to_hardware(a), Some(10));
        assert_eq!(h.engine.translate_to_logical(10), Some(a));

        h.engine.disconnect_hardware(10);
        assert_eq!(h.engine.translate_to_hardware(a), None);
        assert!(h.engine.screen_ids().is_empty());
    }
}
