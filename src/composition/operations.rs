//! Composition Requests
//!
//! Validation and group bootstrapping for the caller-facing requests. Each
//! request resolves its targets, makes sure a group exists, and hands the
//! batch to [`EngineState::recompose`]; stop requests detach members directly.

use tracing::{debug, info};

use super::error::{CompositionError, Result};
use super::recompose::RecomposeRequest;
use super::state::EngineState;
use crate::notify::{ChangeReason, GroupChangeKind, ScreenEvent};
use crate::screen::{Combination, Point, Region, Rotation, ScreenId, ScreenKind, SCREEN_GROUP_ID};

impl EngineState {
    /// Make sure `anchor` is in the group, creating the group if needed
    fn ensure_group_for(&mut self, anchor: ScreenId, unique_hint: bool) -> Result<()> {
        if self.live_group_of(anchor).is_some() {
            return Ok(());
        }
        self.join(anchor, unique_hint)?;
        self.emit_group_changed(GroupChangeKind::Add, &[anchor]);
        Ok(())
    }

    pub(crate) fn make_mirror(
        &mut self,
        anchor: ScreenId,
        candidates: &[ScreenId],
        region: Option<Region>,
        rotation: Option<Rotation>,
        force: bool,
    ) -> Result<ScreenId> {
        if self.config.mirror_disabled {
            info!("Mirror request rejected: mirroring is disabled");
            return Err(CompositionError::MirrorDisabled);
        }

        let anchor_ok = self.screens.get(&anchor).is_some_and(|s| s.is_composable());
        if !anchor_ok {
            info!("Mirror anchor {} not found", anchor);
            return Err(CompositionError::NoTarget);
        }

        let mut targets = self.valid_screen_ids(candidates);
        targets.retain(|&id| id != anchor);
        if targets.is_empty() {
            info!("No valid mirror targets for anchor {}", anchor);
            return Err(CompositionError::NoTarget);
        }

        info!("Make mirror: anchor {} -> {:?}", anchor, targets);

        self.ensure_group_for(anchor, false)?;

        let skip_if_unchanged = match self.group.as_mut() {
            Some(group) => {
                let unchanged = group.combination() == Combination::Mirror && group.anchor() == anchor;
                group.set_anchor(anchor);
                unchanged && !force
            }
            None => return Err(CompositionError::NoTarget),
        };

        self.recompose(RecomposeRequest {
            screens: &targets,
            points: &[],
            skip_if_unchanged,
            combination: Combination::Mirror,
            region,
            rotation,
            clear_stale_registration: true,
        });

        Ok(SCREEN_GROUP_ID)
    }

    pub(crate) fn make_expand(&mut self, candidates: &[ScreenId], start_points: &[Point]) -> Result<ScreenId> {
        if candidates.len() != start_points.len() {
            return Err(CompositionError::InvalidArgument(format!(
                "{} screens but {} start points",
                candidates.len(),
                start_points.len()
            )));
        }

        let valid = self.valid_screen_ids(candidates);
        let mut targets = Vec::with_capacity(valid.len());
        let mut points = Vec::with_capacity(valid.len());
        for id in valid {
            if Some(id) == self.default_screen {
                continue;
            }
            // First occurrence wins for a repeated id.
            if let Some(idx) = candidates.iter().position(|&c| c == id) {
                targets.push(id);
                points.push(start_points[idx]);
            }
        }
        if targets.is_empty() {
            info!("No valid expand targets");
            return Err(CompositionError::NoTarget);
        }

        let anchor = self
            .default_screen
            .filter(|id| self.screens.contains_key(id))
            .unwrap_or(targets[0]);

        info!("Make expand: anchor {} -> {:?}", anchor, targets);

        self.ensure_group_for(anchor, false)?;

        let skip_if_unchanged = self
            .group
            .as_ref()
            .is_some_and(|g| g.combination() == Combination::Expand);

        self.recompose(RecomposeRequest {
            screens: &targets,
            points: &points,
            skip_if_unchanged,
            combination: Combination::Expand,
            region: None,
            rotation: None,
            clear_stale_registration: false,
        });

        Ok(SCREEN_GROUP_ID)
    }

    pub(crate) fn make_unique(&mut self, candidates: &[ScreenId]) -> Result<Vec<ScreenId>> {
        let targets: Vec<ScreenId> = self
            .valid_screen_ids(candidates)
            .into_iter()
            .filter(|id| self.screens.get(id).is_some_and(|s| s.kind == ScreenKind::Virtual))
            .collect();
        if targets.is_empty() {
            info!("No virtual screens to switch to unique");
            return Err(CompositionError::NoTarget);
        }

        info!("Make unique: {:?}", targets);

        if self.group.is_none() {
            // Virtual targets are never the anchor while a default screen exists.
            let base = self
                .default_screen
                .filter(|id| self.screens.contains_key(id))
                .unwrap_or(targets[0]);
            self.ensure_group_for(base, true)?;
        }

        let points = vec![Point::ORIGIN; targets.len()];
        self.recompose(RecomposeRequest {
            screens: &targets,
            points: &points,
            skip_if_unchanged: true,
            combination: Combination::Unique,
            region: None,
            rotation: None,
            clear_stale_registration: false,
        });

        for &id in &targets {
            if let Some(info) = self.info(id) {
                self.emit(ScreenEvent::ScreenChanged {
                    screen: info.clone(),
                    reason: ChangeReason::SwitchChanged,
                });
                self.emit(ScreenEvent::ScreenConnected(info));
            }
        }

        Ok(targets)
    }

    pub(crate) fn stop_screens(&mut self, screen_ids: &[ScreenId], expected: Combination) -> Result<()> {
        let mut removed = Vec::new();

        for &id in screen_ids {
            let Some(group) = self.live_group_of(id) else {
                debug!("Screen {} not grouped, nothing to stop", id);
                continue;
            };
            if group.combination() != expected {
                debug!(
                    "Screen {} is in a {} group, not {}, skipping",
                    id,
                    group.combination(),
                    expected
                );
                continue;
            }
            if group.anchor() == id {
                debug!("Screen {} anchors the group and cannot be stopped alone", id);
                continue;
            }
            if self.leave_inner(id).is_ok() {
                self.cast_info.remove(&id);
                removed.push(id);
            }
        }

        if !removed.is_empty() {
            info!("Stopped {} screens: {:?}", expected, removed);
        }
        self.emit_group_changed(GroupChangeKind::Remove, &removed);
        self.settle_group();
        Ok(())
    }

    pub(crate) fn remove_virtual_screens_from_group(&mut self, screen_ids: &[ScreenId]) {
        let mut removed = Vec::new();

        for &id in screen_ids {
            let is_virtual = self
                .screens
                .get(&id)
                .is_some_and(|s| s.kind == ScreenKind::Virtual);
            if !is_virtual {
                continue;
            }
            let Some(group) = self.live_group_of(id) else {
                continue;
            };
            if group.anchor() == id {
                debug!("Virtual screen {} anchors the group, keeping it", id);
                continue;
            }
            if self.leave_inner(id).is_ok() {
                self.cast_info.remove(&id);
                removed.push(id);
            }
        }

        if !removed.is_empty() {
            info!("Removed virtual screens from group: {:?}", removed);
        }
        self.emit_group_changed(GroupChangeKind::Remove, &removed);
        self.settle_group();
    }
}
