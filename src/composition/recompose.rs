//! Group Recomposition
//!
//! Reconciles the active group with a batch of requested screens. Every
//! mirror / expand / unique request funnels through [`EngineState::recompose`].
//!
//! # Algorithm
//!
//! 1. Detach pass, per screen in input order: skip unresolvable or unchanged
//!    screens, detach members from their current composition, apply mirror
//!    settings, publish the screen-level source-mode change, record the cast
//!    target.
//! 2. Set the group combination.
//! 3. Join pass: place every detached or new screen against the anchor.
//! 4. Publish the display-level source-mode change for every processed
//!    screen, then membership changes as REMOVE, then CHANGE, then ADD,
//!    followed by a display-created event for every screen that joined.

use tracing::{debug, info};

use super::state::{CastInfo, EngineState};
use crate::notify::{ChangeReason, GroupChangeKind, ScreenEvent};
use crate::screen::{Combination, Placement, Point, Region, Rotation, ScreenId};

/// Parameters of one recomposition
#[derive(Debug, Clone)]
pub(crate) struct RecomposeRequest<'a> {
    pub(crate) screens: &'a [ScreenId],
    /// Parallel to `screens`; missing entries default to the origin
    pub(crate) points: &'a [Point],
    pub(crate) skip_if_unchanged: bool,
    pub(crate) combination: Combination,
    pub(crate) region: Option<Region>,
    pub(crate) rotation: Option<Rotation>,
    /// Drop stale virtual-screen registrations before reprocessing a screen
    pub(crate) clear_stale_registration: bool,
}

/// Per-screen classification of a recomposition
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct RecomposeOutcome {
    pub(crate) removed: Vec<ScreenId>,
    pub(crate) changed: Vec<ScreenId>,
    pub(crate) added: Vec<ScreenId>,
    pub(crate) untouched: Vec<ScreenId>,
}

impl RecomposeOutcome {
    pub(crate) fn is_noop(&self) -> bool {
        self.removed.is_empty() && self.changed.is_empty() && self.added.is_empty()
    }
}

struct PendingJoin {
    id: ScreenId,
    point: Point,
    was_removed: bool,
}

impl EngineState {
    pub(crate) fn recompose(&mut self, request: RecomposeRequest<'_>) -> RecomposeOutcome {
        let mut outcome = RecomposeOutcome::default();

        let Some(anchor) = self.group.as_ref().map(|g| g.anchor()) else {
            debug!("Recompose requested with no active group");
            return outcome;
        };
        let target = CastInfo {
            anchor,
            combination: request.combination,
        };

        let mut pending = Vec::with_capacity(request.screens.len());

        for (idx, &id) in request.screens.iter().enumerate() {
            let Some(screen) = self.screens.get(&id) else {
                debug!("Screen {} not found, skipping", id);
                continue;
            };
            let current_region = screen.mirror_region;
            let point = request.points.get(idx).copied().unwrap_or(Point::ORIGIN);

            let mut skip_if_unchanged = request.skip_if_unchanged;
            if self.cast_info.get(&id) != Some(&target) {
                skip_if_unchanged = false;
            }

            let in_group = self.live_group_of(id).is_some();
            let same_combination = self
                .group
                .as_ref()
                .is_some_and(|g| g.combination() == request.combination);
            let same_region =
                request.combination != Combination::Mirror || current_region == request.region;

            if skip_if_unchanged && in_group && same_combination && same_region {
                debug!("Screen {} already {} on {}, skipping", id, request.combination, anchor);
                continue;
            }

            if request.clear_stale_registration {
                self.emit(ScreenEvent::ScreenDisconnected(id));
            }

            let mut was_removed = false;
            if in_group {
                self.emit(ScreenEvent::DisplayDestroyed(id));
                was_removed = self.leave_inner(id).is_ok();
            }
            pending.push(PendingJoin {
                id,
                point,
                was_removed,
            });

            if request.combination == Combination::Mirror {
                let rotation_enabled = self
                    .screens
                    .get(&id)
                    .map(|s| self.config.region_rotation_for(&s.name))
                    .unwrap_or(false);
                if let Some(screen) = self.screens.get_mut(&id) {
                    screen.mirror_region = request.region;
                    screen.region_rotation_enabled = rotation_enabled;
                }
            }

            if let Some(info) = self.info(id) {
                self.emit(ScreenEvent::ScreenChanged {
                    screen: info,
                    reason: ChangeReason::SourceModeChanged,
                });
            }

            self.cast_info.insert(id, target);
        }

        if let Some(group) = self.group.as_mut() {
            group.set_combination(request.combination);
        }
        self.retarget_anchor_placement();

        let rotation = match request.combination {
            Combination::Expand => request.rotation,
            _ => None,
        };

        let mut joined = Vec::with_capacity(pending.len());
        let mut processed = Vec::with_capacity(pending.len());
        for PendingJoin {
            id,
            point,
            was_removed,
        } in pending
        {
            processed.push(id);
            let ok = self.place_and_add(id, Some(point), request.combination, request.region, rotation);
            if ok {
                if let (Some(rotation), Some(screen)) = (rotation, self.screens.get_mut(&id)) {
                    screen.rotation = rotation;
                }
                joined.push(id);
            }

            match (was_removed, ok) {
                (true, true) => outcome.changed.push(id),
                (true, false) => outcome.removed.push(id),
                (false, true) => outcome.added.push(id),
                (false, false) => outcome.untouched.push(id),
            }
        }

        // Display state is published once the screen has its new placement.
        for id in processed {
            let display = self.display_info(id);
            self.emit(ScreenEvent::DisplayChanged {
                display,
                reason: ChangeReason::SourceModeChanged,
            });
        }

        self.emit_group_changed(GroupChangeKind::Remove, &outcome.removed);
        self.emit_group_changed(GroupChangeKind::Change, &outcome.changed);
        self.emit_group_changed(GroupChangeKind::Add, &outcome.added);
        for id in joined {
            let display = self.display_info(id);
            self.emit(ScreenEvent::DisplayCreated(display));
        }

        self.settle_group();

        if !outcome.is_noop() {
            info!(
                "Recomposed {} group: {} added, {} changed, {} removed, {} untouched",
                request.combination,
                outcome.added.len(),
                outcome.changed.len(),
                outcome.removed.len(),
                outcome.untouched.len()
            );
        }

        outcome
    }

    /// Re-place the anchor when its placement kind no longer fits the combination
    fn retarget_anchor_placement(&mut self) {
        let Some(group) = self.group.as_ref() else {
            return;
        };
        let anchor = group.anchor();
        let combination = group.combination();
        let Some(current) = group.placement(anchor) else {
            return;
        };

        let fits = matches!(
            (combination, current),
            (Combination::Mirror, Placement::Region(_))
                | (Combination::Expand | Combination::Unique, Placement::Point(_))
        );
        if fits {
            return;
        }

        let start = current.start_point();
        let Some(placement) = self.compute_placement(anchor, Some(start), combination, None, None) else {
            debug!("Anchor {} keeps its {:?} placement", anchor, current);
            return;
        };
        if let Some(group) = self.group.as_mut() {
            group.remove_member(anchor);
            group.add_member(anchor, placement);
        }
        if let Some(screen) = self.screens.get_mut(&anchor) {
            screen.start_point = placement.start_point();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompositionConfig;
    use crate::geometry::{MockPlacementService, PlacementRequest, TilingPlacement};
    use crate::notify::ScreenEvent;
    use crate::screen::{ScreenKind, ScreenProfile, GROUP_ID_NONE, SCREEN_GROUP_ID};
    use std::sync::Arc;

    fn state_with(hws: &[ScreenId]) -> (EngineState, Vec<ScreenId>) {
        let mut state = EngineState::new(CompositionConfig::default(), Arc::new(TilingPlacement));
        let ids = hws
            .iter()
            .map(|&hw| {
                state.connect_hardware(hw, ScreenKind::Real, ScreenProfile::new(format!("HW-{hw}"), 1920, 1080))
            })
            .collect();
        state.outbox.clear();
        (state, ids)
    }

    fn mirror_request(screens: &[ScreenId], skip: bool, region: Option<Region>) -> RecomposeRequest<'_> {
        RecomposeRequest {
            screens,
            points: &[],
            skip_if_unchanged: skip,
            combination: Combination::Mirror,
            region,
            rotation: None,
            clear_stale_registration: false,
        }
    }

    fn group_kinds(events: &[ScreenEvent]) -> Vec<GroupChangeKind> {
        events
            .iter()
            .filter_map(|e| match e {
                ScreenEvent::GroupChanged { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_recompose_without_group_is_noop() {
        let (mut state, ids) = state_with(&[10, 11]);
        let outcome = state.recompose(mirror_request(&ids, false, None));
        assert!(outcome.is_noop());
        assert!(state.outbox.is_empty());
    }

    #[test]
    fn test_new_members_are_added() {
        let (mut state, ids) = state_with(&[10, 11, 12]);
        state.join(ids[0], false).unwrap();
        state.outbox.clear();

        let region = Region::new(0, 0, 960, 540);
        let outcome = state.recompose(mirror_request(&ids[1..], true, Some(region)));

        assert_eq!(outcome.added, vec![ids[1], ids[2]]);
        let group = state.group.as_ref().unwrap();
        assert_eq!(group.placement(ids[1]), Some(Placement::Region(region)));
        assert_eq!(state.screens[&ids[2]].mirror_region, Some(region));
        assert_eq!(
            state.cast_info.get(&ids[1]),
            Some(&CastInfo {
                anchor: ids[0],
                combination: Combination::Mirror
            })
        );
        assert!(state.check_invariants());
    }

    #[test]
    fn test_unchanged_members_are_skipped() {
        let (mut state, ids) = state_with(&[10, 11]);
        state.join(ids[0], false).unwrap();
        state.recompose(mirror_request(&ids[1..], true, None));
        state.outbox.clear();

        let outcome = state.recompose(mirror_request(&ids[1..], true, None));
        assert!(outcome.is_noop());
        assert!(state.outbox.is_empty());
    }

    #[test]
    fn test_changed_region_is_reprocessed() {
        let (mut state, ids) = state_with(&[10, 11]);
        state.join(ids[0], false).unwrap();
        state.recompose(mirror_request(&ids[1..], true, None));
        state.outbox.clear();

        let region = Region::new(0, 0, 100, 100);
        let outcome = state.recompose(mirror_request(&ids[1..], true, Some(region)));
        assert_eq!(outcome.changed, vec![ids[1]]);
        assert_eq!(state.outbox[0], ScreenEvent::DisplayDestroyed(ids[1]));
        assert_eq!(group_kinds(&state.outbox), vec![GroupChangeKind::Change]);
    }

    #[test]
    fn test_changed_cast_target_forces_reprocessing() {
        let (mut state, ids) = state_with(&[10, 11]);
        state.join(ids[0], false).unwrap();
        state.recompose(mirror_request(&ids[1..], true, None));
        state.cast_info.insert(
            ids[1],
            CastInfo {
                anchor: 4242,
                combination: Combination::Mirror,
            },
        );
        state.outbox.clear();

        let outcome = state.recompose(mirror_request(&ids[1..], true, None));
        assert_eq!(outcome.changed, vec![ids[1]]);
    }

    #[test]
    fn test_notification_batches_ordered() {
        let (mut state, ids) = state_with(&[10, 11, 12]);
        state.join(ids[0], false).unwrap();
        state.recompose(mirror_request(&ids[1..2], false, None));
        state.outbox.clear();

        // ids[1] is re-joined (change), ids[2] is new (add)
        state.recompose(RecomposeRequest {
            screens: &ids[1..],
            points: &[Point::new(1920, 0), Point::new(3840, 0)],
            skip_if_unchanged: false,
            combination: Combination::Expand,
            region: None,
            rotation: Some(Rotation::Rotation90),
            clear_stale_registration: false,
        });

        assert_eq!(
            group_kinds(&state.outbox),
            vec![GroupChangeKind::Change, GroupChangeKind::Add]
        );
        let created: Vec<_> = state
            .outbox
            .iter()
            .filter(|e| matches!(e, ScreenEvent::DisplayCreated(_)))
            .collect();
        assert_eq!(created.len(), 2);

        let display_changed = state
            .outbox
            .iter()
            .find_map(|e| match e {
                ScreenEvent::DisplayChanged { display, .. } if display.screen_id == ids[1] => {
                    Some(display.clone())
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(display_changed.group_id, SCREEN_GROUP_ID);
        assert_eq!(display_changed.combination, Some(Combination::Expand));
        assert_eq!(
            display_changed.placement,
            Some(Placement::Point(Point::new(1920, 0)))
        );

        let group = state.group.as_ref().unwrap();
        assert_eq!(group.combination(), Combination::Expand);
        assert_eq!(group.placement(ids[0]), Some(Placement::Point(Point::ORIGIN)));
        assert_eq!(group.placement(ids[2]), Some(Placement::Point(Point::new(3840, 0))));
        assert_eq!(state.screens[&ids[2]].rotation, Rotation::Rotation90);
        assert!(state.check_invariants());
    }

    #[test]
    fn test_failed_placement_publishes_remove_first() {
        let mut placement = MockPlacementService::new();
        placement
            .expect_compute_member_placement()
            .returning(|request: &PlacementRequest| match request.combination {
                Combination::Mirror => Some(Placement::Region(Region::new(0, 0, 1920, 1080))),
                // Second screen cannot be extended
                _ if request.screen.id == 1001 => None,
                _ => Some(Placement::Point(request.requested_point.unwrap_or(Point::ORIGIN))),
            });

        let mut state = EngineState::new(CompositionConfig::default(), Arc::new(placement));
        let ids: Vec<ScreenId> = (10..14)
            .map(|hw| {
                state.connect_hardware(hw, ScreenKind::Real, ScreenProfile::new(format!("HW-{hw}"), 1920, 1080))
            })
            .collect();
        state.join(ids[0], false).unwrap();
        state.recompose(mirror_request(&ids[1..3], false, None));
        state.outbox.clear();

        let points = [Point::new(1920, 0), Point::new(3840, 0), Point::new(5760, 0)];
        let outcome = state.recompose(RecomposeRequest {
            screens: &ids[1..],
            points: &points,
            skip_if_unchanged: false,
            combination: Combination::Expand,
            region: None,
            rotation: None,
            clear_stale_registration: false,
        });

        assert_eq!(outcome.removed, vec![ids[1]]);
        assert_eq!(outcome.changed, vec![ids[2]]);
        assert_eq!(outcome.added, vec![ids[3]]);
        assert_eq!(
            group_kinds(&state.outbox),
            vec![GroupChangeKind::Remove, GroupChangeKind::Change, GroupChangeKind::Add]
        );

        let created: Vec<ScreenId> = state
            .outbox
            .iter()
            .filter_map(|e| match e {
                ScreenEvent::DisplayCreated(display) => Some(display.screen_id),
                _ => None,
            })
            .collect();
        assert_eq!(created, vec![ids[2], ids[3]]);

        assert_eq!(state.screens[&ids[1]].group_id, GROUP_ID_NONE);
        let group = state.group.as_ref().unwrap();
        assert_eq!(group.placement(ids[0]), Some(Placement::Point(Point::ORIGIN)));
        assert!(state.check_invariants());
    }

    #[test]
    fn test_recomposing_anchor_keeps_group_alive() {
        let (mut state, ids) = state_with(&[10, 11]);
        state.join(ids[0], false).unwrap();
        state.recompose(mirror_request(&ids[1..], false, None));
        state.outbox.clear();

        // Anchor is recomposed too; the group is briefly empty but must
        // survive until the join pass.
        let outcome = state.recompose(mirror_request(&ids, false, None));
        assert_eq!(outcome.changed, ids);
        assert!(state.group.is_some());
        assert!(state.check_invariants());
    }

    #[test]
    fn test_unresolvable_screens_skipped() {
        let (mut state, ids) = state_with(&[10, 11]);
        state.join(ids[0], false).unwrap();
        let outcome = state.recompose(mirror_request(&[9999, ids[1]], false, None));
        assert_eq!(outcome.added, vec![ids[1]]);
    }

    #[test]
    fn test_region_rotation_excluded_names() {
        let (mut state, ids) = state_with(&[10]);
        let recorder = state.create_virtual(ScreenProfile::new("ScreenRecorder", 1280, 720));
        let cast = state.create_virtual(ScreenProfile::new("Miracast", 1280, 720));
        state.join(ids[0], false).unwrap();

        state.recompose(mirror_request(&[recorder, cast], false, None));
        assert!(!state.screens[&recorder].region_rotation_enabled);
        assert!(state.screens[&cast].region_rotation_enabled);
    }

    #[test]
    fn test_clear_stale_registration_precedes_detach() {
        let (mut state, ids) = state_with(&[10, 11]);
        state.join(ids[0], false).unwrap();
        state.join(ids[1], false).unwrap();
        state.outbox.clear();

        let mut request = mirror_request(&ids[1..], false, None);
        request.clear_stale_registration = true;
        state.recompose(request);

        assert_eq!(state.outbox[0], ScreenEvent::ScreenDisconnected(ids[1]));
        assert_eq!(state.outbox[1], ScreenEvent::DisplayDestroyed(ids[1]));
    }
}
