//! Engine State
//!
//! Everything the engine owns, plus the membership primitives (join, leave,
//! settle) every higher-level operation is built from. All methods take
//! `&mut self`; the caller holds the engine lock for the whole operation, so
//! nested join/leave sequences run under a single acquisition.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::error::{CompositionError, Result};
use crate::config::{CompositionConfig, ExternalScreenMode};
use crate::geometry::{PlacementRequest, PlacementService};
use crate::notify::{DisplayInfo, GroupChangeKind, ScreenEvent};
use crate::screen::{
    Combination, Placement, Point, Region, Rotation, Screen, ScreenGroup, ScreenId, ScreenIdTable,
    ScreenInfo, ScreenKind, ScreenProfile, GROUP_ID_NONE, SCREEN_GROUP_ID,
};

/// Composition a screen was last configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastInfo {
    /// Anchor of the target group
    pub anchor: ScreenId,
    /// Target combination
    pub combination: Combination,
}

pub(crate) struct EngineState {
    pub(crate) config: CompositionConfig,
    pub(crate) ids: ScreenIdTable,
    pub(crate) screens: BTreeMap<ScreenId, Screen>,
    pub(crate) group: Option<ScreenGroup>,
    pub(crate) cast_info: HashMap<ScreenId, CastInfo>,
    pub(crate) default_screen: Option<ScreenId>,
    pub(crate) placement: Arc<dyn PlacementService>,
    /// Events produced by the current operation, drained by the engine
    pub(crate) outbox: Vec<ScreenEvent>,
}

impl EngineState {
    pub(crate) fn new(config: CompositionConfig, placement: Arc<dyn PlacementService>) -> Self {
        Self {
            ids: ScreenIdTable::new(config.first_logical_id),
            config,
            screens: BTreeMap::new(),
            group: None,
            cast_info: HashMap::new(),
            default_screen: None,
            placement,
            outbox: Vec::new(),
        }
    }

    pub(crate) fn emit(&mut self, event: ScreenEvent) {
        self.outbox.push(event);
    }

    pub(crate) fn emit_group_changed(&mut self, kind: GroupChangeKind, ids: &[ScreenId]) {
        if ids.is_empty() {
            return;
        }
        let screens = self.infos(ids);
        self.emit(ScreenEvent::GroupChanged { kind, screens });
    }

    pub(crate) fn info(&self, id: ScreenId) -> Option<ScreenInfo> {
        self.screens.get(&id).map(Screen::to_info)
    }

    pub(crate) fn infos(&self, ids: &[ScreenId]) -> Vec<ScreenInfo> {
        ids.iter().filter_map(|&id| self.info(id)).collect()
    }

    pub(crate) fn display_info(&self, id: ScreenId) -> DisplayInfo {
        let group_id = self
            .screens
            .get(&id)
            .map(|s| s.group_id)
            .unwrap_or(GROUP_ID_NONE);
        let group = self.group.as_ref().filter(|g| g.has_member(id));
        DisplayInfo {
            display_id: id,
            screen_id: id,
            group_id,
            combination: group.map(ScreenGroup::combination),
            placement: group.and_then(|g| g.placement(id)),
        }
    }

    // ---------------------------------------------------------------------
    // Screen lifecycle
    // ---------------------------------------------------------------------

    pub(crate) fn connect_hardware(
        &mut self,
        hardware_id: ScreenId,
        kind: ScreenKind,
        profile: ScreenProfile,
    ) -> ScreenId {
        let id = self.ids.resolve_or_create(hardware_id);

        if let Some(screen) = self.screens.get_mut(&id) {
            debug!(
                "Hardware screen {} re-enumerated as {}, refreshing profile",
                hardware_id, id
            );
            screen.name = profile.name;
            screen.mode = profile.mode;
            return id;
        }

        let screen = Screen::new(id, Some(hardware_id), kind, profile);
        info!(
            "Screen {} connected (hardware {}, {:?}, {}x{})",
            id, hardware_id, kind, screen.mode.width, screen.mode.height
        );
        let info = screen.to_info();
        self.screens.insert(id, screen);

        if self.default_screen.is_none() && kind == ScreenKind::Real {
            info!("Screen {} is now the default screen", id);
            self.default_screen = Some(id);
        }

        self.emit(ScreenEvent::ScreenConnected(info));

        if self.config.join_on_connect && kind != ScreenKind::Undefined {
            match self.join(id, false) {
                Ok(_) => self.emit_group_changed(GroupChangeKind::Add, &[id]),
                Err(e) => warn!("Screen {} could not join the group on connect: {}", id, e),
            }
        }

        id
    }

    pub(crate) fn disconnect_hardware(&mut self, hardware_id: ScreenId) -> Option<ScreenId> {
        let Some(id) = self.ids.translate_to_logical(hardware_id) else {
            debug!("Disconnect for unknown hardware screen {}", hardware_id);
            return None;
        };
        self.remove_screen(id);
        Some(id)
    }

    pub(crate) fn create_virtual(&mut self, profile: ScreenProfile) -> ScreenId {
        let id = self.ids.allocate();
        let screen = Screen::new(id, None, ScreenKind::Virtual, profile);
        info!("Virtual screen {} created ({})", id, screen.name);
        let info = screen.to_info();
        self.screens.insert(id, screen);
        self.emit(ScreenEvent::ScreenConnected(info));
        id
    }

    pub(crate) fn bind_virtual_hardware(&mut self, id: ScreenId, hardware_id: ScreenId) -> Result<()> {
        match self.screens.get(&id) {
            None => return Err(CompositionError::ScreenNotFound(id)),
            Some(screen) if screen.kind != ScreenKind::Virtual => {
                return Err(CompositionError::NotVirtual(id))
            }
            Some(_) => {}
        }

        if let Some(previous) = self.ids.translate_to_logical(hardware_id) {
            if previous != id {
                if let Some(stale) = self.screens.get_mut(&previous) {
                    stale.hardware_id = None;
                }
            }
        }

        self.ids.bind(hardware_id, id);
        if let Some(screen) = self.screens.get_mut(&id) {
            screen.hardware_id = Some(hardware_id);
        }
        debug!("Virtual screen {} bound to hardware {}", id, hardware_id);
        Ok(())
    }

    pub(crate) fn destroy_virtual(&mut self, id: ScreenId) -> Result<()> {
        match self.screens.get(&id) {
            None => Err(CompositionError::ScreenNotFound(id)),
            Some(screen) if screen.kind != ScreenKind::Virtual => Err(CompositionError::NotVirtual(id)),
            Some(_) => {
                self.remove_screen(id);
                Ok(())
            }
        }
    }

    /// Detach a screen from any group and forget it
    fn remove_screen(&mut self, id: ScreenId) {
        if self.live_group_of(id).is_some() {
            self.emit(ScreenEvent::DisplayDestroyed(id));
            if self.leave_inner(id).is_ok() {
                self.emit_group_changed(GroupChangeKind::Remove, &[id]);
            }
            self.settle_group();
        }

        self.screens.remove(&id);
        self.ids.release(id);
        self.cast_info.remove(&id);

        if self.default_screen == Some(id) {
            self.default_screen = self
                .screens
                .values()
                .find(|s| s.kind == ScreenKind::Real)
                .map(|s| s.id);
            if let Some(next) = self.default_screen {
                info!("Default screen {} removed, promoting {}", id, next);
            }
        }

        info!("Screen {} removed", id);
        self.emit(ScreenEvent::ScreenDisconnected(id));
    }

    // ---------------------------------------------------------------------
    // Membership primitives
    // ---------------------------------------------------------------------

    /// Group the screen actually belongs to
    ///
    /// A screen that claims a group which does not exist, or which does not
    /// list it, is healed back to ungrouped.
    pub(crate) fn live_group_of(&mut self, id: ScreenId) -> Option<&ScreenGroup> {
        let screen = self.screens.get_mut(&id)?;
        if screen.group_id == GROUP_ID_NONE {
            return None;
        }

        let consistent = self
            .group
            .as_ref()
            .is_some_and(|g| g.id() == screen.group_id && g.has_member(id));

        if !consistent {
            warn!(
                "Screen {} references group {} it is not a member of, treating as ungrouped",
                id, screen.group_id
            );
            screen.last_group_id = screen.group_id;
            screen.group_id = GROUP_ID_NONE;
            return None;
        }

        self.group.as_ref()
    }

    /// Add a screen to the group, creating the group if none exists
    pub(crate) fn join(&mut self, id: ScreenId, unique_hint: bool) -> Result<ScreenId> {
        match self.screens.get(&id) {
            None => return Err(CompositionError::ScreenNotFound(id)),
            Some(screen) if !screen.is_composable() => {
                return Err(CompositionError::InvalidArgument(format!(
                    "screen {} has undefined kind",
                    id
                )))
            }
            Some(_) => {}
        }

        if self.live_group_of(id).is_some() {
            return Err(CompositionError::AlreadyMember(id));
        }

        if self.group.is_none() {
            self.add_as_first(id, unique_hint)
        } else {
            self.add_as_succedent(id)
        }
    }

    fn add_as_first(&mut self, id: ScreenId, unique_hint: bool) -> Result<ScreenId> {
        let combination = self.config.initial_combination(unique_hint);
        let screen = self
            .screens
            .get(&id)
            .ok_or(CompositionError::ScreenNotFound(id))?;

        let start = match self.config.external_screen_default_mode {
            ExternalScreenMode::Extend => screen.start_point,
            ExternalScreenMode::Mirror => Point::ORIGIN,
        };

        let info = screen.to_info();
        let placement = self
            .placement
            .compute_member_placement(&PlacementRequest {
                anchor: info.clone(),
                screen: info,
                requested_point: Some(start),
                combination,
                region: None,
                rotation: None,
            })
            .ok_or(CompositionError::PlacementFailed(id))?;

        self.group = Some(ScreenGroup::new(combination, id));
        if !self.add_child(id, placement) {
            self.group = None;
            return Err(CompositionError::AlreadyMember(id));
        }
        self.settle_group();

        info!("Screen group created: {} anchored on screen {}", combination, id);
        Ok(SCREEN_GROUP_ID)
    }

    fn add_as_succedent(&mut self, id: ScreenId) -> Result<ScreenId> {
        let combination = self
            .group
            .as_ref()
            .map(ScreenGroup::combination)
            .ok_or(CompositionError::NotGrouped(id))?;

        let placement = self
            .compute_placement(id, None, combination, None, None)
            .ok_or(CompositionError::PlacementFailed(id))?;
        if !self.add_child(id, placement) {
            return Err(CompositionError::AlreadyMember(id));
        }

        debug!("Screen {} joined the {} group", id, combination);
        Ok(SCREEN_GROUP_ID)
    }

    /// Ask the placement service where `id` goes, relative to the anchor
    pub(crate) fn compute_placement(
        &self,
        id: ScreenId,
        requested_point: Option<Point>,
        combination: Combination,
        region: Option<Region>,
        rotation: Option<Rotation>,
    ) -> Option<Placement> {
        let screen = self.info(id)?;
        let anchor_id = self.group.as_ref().map(ScreenGroup::anchor)?;
        // The anchor may be mid-recompose and briefly outside the group; it is
        // still a valid geometry reference.
        let anchor = self.info(anchor_id).unwrap_or_else(|| screen.clone());

        let placement = self.placement.compute_member_placement(&PlacementRequest {
            anchor,
            screen,
            requested_point,
            combination,
            region,
            rotation,
        });
        if placement.is_none() {
            warn!("No {} placement for screen {}", combination, id);
        }
        placement
    }

    /// Place `id` and insert it; false if placement or insertion fails
    pub(crate) fn place_and_add(
        &mut self,
        id: ScreenId,
        requested_point: Option<Point>,
        combination: Combination,
        region: Option<Region>,
        rotation: Option<Rotation>,
    ) -> bool {
        match self.compute_placement(id, requested_point, combination, region, rotation) {
            Some(placement) => self.add_child(id, placement),
            None => false,
        }
    }

    fn add_child(&mut self, id: ScreenId, placement: Placement) -> bool {
        let Some(group) = self.group.as_mut() else {
            return false;
        };
        let Some(screen) = self.screens.get_mut(&id) else {
            return false;
        };
        if !group.add_member(id, placement) {
            debug!("Screen {} already in group {}", id, group.id());
            return false;
        }
        screen.last_group_id = screen.group_id;
        screen.group_id = group.id();
        screen.start_point = placement.start_point();
        true
    }

    /// Remove a screen from its group without settling the group
    ///
    /// Recompose relies on this: the group may be briefly empty between its
    /// detach and re-join passes.
    pub(crate) fn leave_inner(&mut self, id: ScreenId) -> Result<()> {
        if self.live_group_of(id).is_none() {
            return Err(if self.screens.contains_key(&id) {
                CompositionError::NotGrouped(id)
            } else {
                CompositionError::ScreenNotFound(id)
            });
        }

        if let Some(group) = self.group.as_mut() {
            group.remove_member(id);
        }
        if let Some(screen) = self.screens.get_mut(&id) {
            screen.last_group_id = screen.group_id;
            screen.group_id = GROUP_ID_NONE;
            screen.mirror_source = None;
        }
        debug!("Screen {} left the group", id);
        Ok(())
    }

    /// Remove a screen from its group; returns whether the group was destroyed
    pub(crate) fn leave(&mut self, id: ScreenId) -> Result<bool> {
        self.leave_inner(id)?;
        Ok(self.settle_group())
    }

    /// Restore group invariants after membership changes
    ///
    /// Destroys an empty group, promotes a new anchor if the old one is gone,
    /// and keeps the anchor's mirror source in sync with the combination.
    /// Returns whether the group was destroyed.
    pub(crate) fn settle_group(&mut self) -> bool {
        let mut destroyed = false;

        if let Some(group) = self.group.as_mut() {
            if group.is_empty() {
                info!("Screen group {} emptied, destroying", group.id());
                self.group = None;
                destroyed = true;
            } else if !group.has_member(group.anchor()) {
                let old_anchor = group.anchor();
                if let Some(&next) = group.member_ids().first() {
                    warn!("Anchor {} left the group, promoting {}", old_anchor, next);
                    group.set_anchor(next);
                }
            }
        }

        let mirror_anchor = self
            .group
            .as_ref()
            .filter(|g| g.combination() == Combination::Mirror)
            .map(ScreenGroup::anchor);
        for screen in self.screens.values_mut() {
            screen.mirror_source = if Some(screen.id) == mirror_anchor {
                screen.hardware_id
            } else {
                None
            };
        }

        destroyed
    }

    /// Check every cross reference between screens and the group
    pub(crate) fn check_invariants(&self) -> bool {
        let Some(group) = self.group.as_ref() else {
            return self.screens.values().all(|s| !s.is_grouped())
                && self.ids.is_consistent();
        };

        if group.is_empty() {
            error!("Screen group {} exists with no members", group.id());
            return false;
        }

        let members_ok = group.member_ids().into_iter().all(|id| {
            self.screens
                .get(&id)
                .is_some_and(|s| s.group_id == group.id())
        });
        let screens_ok = self
            .screens
            .values()
            .all(|s| !s.is_grouped() || group.has_member(s.id));

        members_ok && screens_ok && group.has_member(group.anchor()) && self.ids.is_consistent()
    }

    /// Dedup, existence and kind filter, preserving first-occurrence order
    pub(crate) fn valid_screen_ids(&self, candidates: &[ScreenId]) -> Vec<ScreenId> {
        let mut valid = Vec::with_capacity(candidates.len());
        for &id in candidates {
            if valid.contains(&id) {
                continue;
            }
            match self.screens.get(&id) {
                Some(screen) if screen.is_composable() => valid.push(id),
                Some(_) => debug!("Screen {} has undefined kind, ignoring", id),
                None => debug!("Screen {} not found, ignoring", id),
            }
        }
        valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::TilingPlacement;

    fn state() -> EngineState {
        EngineState::new(CompositionConfig::default(), Arc::new(TilingPlacement))
    }

    fn connect(state: &mut EngineState, hw: ScreenId) -> ScreenId {
        state.connect_hardware(hw, ScreenKind::Real, ScreenProfile::new(format!("HW-{hw}"), 1920, 1080))
    }

    #[test]
    fn test_connect_leaves_screens_ungrouped() {
        let mut state = state();
        let a = connect(&mut state, 10);
        let b = connect(&mut state, 11);

        assert_ne!(a, b);
        assert!(state.group.is_none());
        assert_eq!(state.screens[&a].group_id, GROUP_ID_NONE);
        assert_eq!(state.screens[&b].group_id, GROUP_ID_NONE);
        assert_eq!(state.default_screen, Some(a));
        assert!(state.check_invariants());
    }

    #[test]
    fn test_join_creates_group_then_tiles() {
        let mut state = state();
        state.config.expand_enabled = true;
        let a = connect(&mut state, 10);
        let b = connect(&mut state, 11);

        assert_eq!(state.join(a, false), Ok(SCREEN_GROUP_ID));
        assert_eq!(state.join(b, false), Ok(SCREEN_GROUP_ID));

        let group = state.group.as_ref().unwrap();
        assert_eq!(group.combination(), Combination::Expand);
        assert_eq!(group.anchor(), a);
        assert_eq!(group.placement(a), Some(Placement::Point(Point::ORIGIN)));
        assert_eq!(group.placement(b), Some(Placement::Point(Point::new(1920, 0))));
        assert!(state.check_invariants());
    }

    #[test]
    fn test_join_unplaceable_screen_creates_no_group() {
        let mut state = state();
        let a = state.connect_hardware(10, ScreenKind::Real, ScreenProfile::new("HW-10", 0, 0));
        assert_eq!(state.join(a, false), Err(CompositionError::PlacementFailed(a)));
        assert!(state.group.is_none());
        assert_eq!(state.screens[&a].group_id, GROUP_ID_NONE);
        assert!(state.check_invariants());
    }

    #[test]
    fn test_join_twice_fails() {
        let mut state = state();
        let a = connect(&mut state, 10);
        state.join(a, false).unwrap();
        assert_eq!(state.join(a, false), Err(CompositionError::AlreadyMember(a)));
    }

    #[test]
    fn test_join_extend_mode_keeps_start_point() {
        let mut state = state();
        state.config.expand_enabled = true;
        state.config.external_screen_default_mode = ExternalScreenMode::Extend;
        let a = connect(&mut state, 10);
        state.screens.get_mut(&a).unwrap().start_point = Point::new(3840, 0);

        state.join(a, false).unwrap();
        let group = state.group.as_ref().unwrap();
        assert_eq!(group.placement(a), Some(Placement::Point(Point::new(3840, 0))));
    }

    #[test]
    fn test_leave_last_member_destroys_group() {
        let mut state = state();
        let a = connect(&mut state, 10);
        state.join(a, false).unwrap();

        assert_eq!(state.leave(a), Ok(true));
        assert!(state.group.is_none());
        assert_eq!(state.leave(a), Err(CompositionError::NotGrouped(a)));
        assert!(state.check_invariants());
    }

    #[test]
    fn test_leave_anchor_promotes_next_member() {
        let mut state = state();
        let a = connect(&mut state, 10);
        let b = connect(&mut state, 11);
        state.join(a, false).unwrap();
        state.join(b, false).unwrap();

        assert_eq!(state.leave(a), Ok(false));
        assert_eq!(state.group.as_ref().unwrap().anchor(), b);
        assert!(state.check_invariants());
    }

    #[test]
    fn test_dangling_group_reference_is_healed() {
        let mut state = state();
        let a = connect(&mut state, 10);
        state.screens.get_mut(&a).unwrap().group_id = SCREEN_GROUP_ID;

        assert!(state.live_group_of(a).is_none());
        assert_eq!(state.screens[&a].group_id, GROUP_ID_NONE);
        assert_eq!(state.leave(a), Err(CompositionError::NotGrouped(a)));
    }

    #[test]
    fn test_mirror_anchor_tracks_hardware_source() {
        let mut state = state();
        let a = connect(&mut state, 10);
        state.join(a, false).unwrap();
        assert_eq!(state.screens[&a].mirror_source, Some(10));

        state.leave(a).unwrap();
        assert_eq!(state.screens[&a].mirror_source, None);
    }

    #[test]
    fn test_disconnect_removes_member_and_mapping() {
        let mut state = state();
        let a = connect(&mut state, 10);
        let b = connect(&mut state, 11);
        state.join(a, false).unwrap();
        state.join(b, false).unwrap();
        state.outbox.clear();

        assert_eq!(state.disconnect_hardware(11), Some(b));
        assert!(!state.screens.contains_key(&b));
        assert_eq!(state.ids.translate_to_logical(11), None);
        assert!(!state.group.as_ref().unwrap().has_member(b));
        assert_eq!(state.outbox[0], ScreenEvent::DisplayDestroyed(b));
        assert_eq!(state.outbox.last(), Some(&ScreenEvent::ScreenDisconnected(b)));
        assert!(state.check_invariants());
    }

    #[test]
    fn test_default_screen_promoted_on_disconnect() {
        let mut state = state();
        let a = connect(&mut state, 10);
        let b = connect(&mut state, 11);
        state.disconnect_hardware(10);
        assert_eq!(state.default_screen, Some(b));
        assert!(!state.screens.contains_key(&a));
    }

    #[test]
    fn test_reconnect_refreshes_profile() {
        let mut state = state();
        let a = connect(&mut state, 10);
        let again = state.connect_hardware(10, ScreenKind::Real, ScreenProfile::new("HW-10", 2560, 1440));
        assert_eq!(a, again);
        assert_eq!(state.screens.len(), 1);
        assert_eq!(state.screens[&a].mode.width, 2560);
    }

    #[test]
    fn test_virtual_screen_binding() {
        let mut state = state();
        let v = state.create_virtual(ScreenProfile::new("CastEngine", 1280, 720));
        assert!(!state.ids.contains_hardware(v));

        state.bind_virtual_hardware(v, 42).unwrap();
        assert!(state.ids.contains_hardware(v));
        assert_eq!(state.screens[&v].hardware_id, Some(42));

        let a = connect(&mut state, 10);
        assert_eq!(state.bind_virtual_hardware(a, 43), Err(CompositionError::NotVirtual(a)));

        state.destroy_virtual(v).unwrap();
        assert_eq!(state.ids.translate_to_logical(42), None);
        assert_eq!(state.destroy_virtual(v), Err(CompositionError::ScreenNotFound(v)));
    }

    #[test]
    fn test_valid_screen_ids_filters_and_dedups() {
        let mut state = state();
        let a = connect(&mut state, 10);
        let u = state.connect_hardware(12, ScreenKind::Undefined, ScreenProfile::new("?", 0, 0));
        let b = connect(&mut state, 11);

        assert_eq!(state.valid_screen_ids(&[b, 9999, a, u, b]), vec![b, a]);
    }

    #[test]
    fn test_join_on_connect() {
        let mut state = state();
        state.config.join_on_connect = true;
        let a = connect(&mut state, 10);
        assert!(state.group.as_ref().unwrap().has_member(a));
        assert!(matches!(
            state.outbox.last(),
            Some(ScreenEvent::GroupChanged { kind: GroupChangeKind::Add, .. })
        ));
    }
}
