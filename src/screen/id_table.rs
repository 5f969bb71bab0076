//! Screen Identity Table
//!
//! Bijection between backend hardware ids and logical screen ids.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::ScreenId;

/// Hardware ⇄ logical id table
///
/// Both directions are updated together; every `(h, l)` in the forward map
/// has exactly `(l, h)` in the reverse map.
#[derive(Debug)]
pub struct ScreenIdTable {
    /// Next logical id to hand out
    next_id: ScreenId,

    /// Hardware id → logical id
    hardware_to_logical: BTreeMap<ScreenId, ScreenId>,

    /// Logical id → hardware id
    logical_to_hardware: BTreeMap<ScreenId, ScreenId>,
}

impl ScreenIdTable {
    /// Create a table whose first allocated logical id is `first_id`
    pub fn new(first_id: ScreenId) -> Self {
        Self {
            next_id: first_id,
            hardware_to_logical: BTreeMap::new(),
            logical_to_hardware: BTreeMap::new(),
        }
    }

    /// Allocate a fresh logical id without any hardware mapping
    pub fn allocate(&mut self) -> ScreenId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Return the logical id for `hardware_id`, allocating one if needed
    pub fn resolve_or_create(&mut self, hardware_id: ScreenId) -> ScreenId {
        if let Some(&logical) = self.hardware_to_logical.get(&hardware_id) {
            return logical;
        }
        let logical = self.allocate();
        self.bind(hardware_id, logical);
        debug!(hardware_id, logical_id = logical, "Allocated logical screen id");
        logical
    }

    /// Install `hardware_id ⇄ logical_id`, replacing whatever either side mapped to
    ///
    /// Hardware re-enumeration can legitimately reuse ids, so an overwrite is
    /// logged rather than rejected.
    pub fn bind(&mut self, hardware_id: ScreenId, logical_id: ScreenId) {
        if let Some(old_logical) = self.hardware_to_logical.insert(hardware_id, logical_id) {
            if old_logical != logical_id {
                warn!(
                    "Hardware id {} rebound: logical {} -> {}",
                    hardware_id, old_logical, logical_id
                );
                self.logical_to_hardware.remove(&old_logical);
            }
        }
        if let Some(old_hardware) = self.logical_to_hardware.insert(logical_id, hardware_id) {
            if old_hardware != hardware_id {
                warn!(
                    "Logical id {} rebound: hardware {} -> {}",
                    logical_id, old_hardware, hardware_id
                );
                self.hardware_to_logical.remove(&old_hardware);
            }
        }
    }

    /// Hardware id backing `logical_id`
    pub fn translate_to_hardware(&self, logical_id: ScreenId) -> Option<ScreenId> {
        self.logical_to_hardware.get(&logical_id).copied()
    }

    /// Logical id assigned to `hardware_id`
    pub fn translate_to_logical(&self, hardware_id: ScreenId) -> Option<ScreenId> {
        self.hardware_to_logical.get(&hardware_id).copied()
    }

    /// Remove both directions for `logical_id`; returns whether anything was removed
    pub fn release(&mut self, logical_id: ScreenId) -> bool {
        match self.logical_to_hardware.remove(&logical_id) {
            Some(hardware_id) => {
                self.hardware_to_logical.remove(&hardware_id);
                debug!(hardware_id, logical_id, "Released screen id mapping");
                true
            }
            None => false,
        }
    }

    /// Whether `logical_id` has hardware backing
    pub fn contains_hardware(&self, logical_id: ScreenId) -> bool {
        self.logical_to_hardware.contains_key(&logical_id)
    }

    /// Number of registered mappings
    pub fn len(&self) -> usize {
        self.logical_to_hardware.len()
    }

    /// Whether no mappings are registered
    pub fn is_empty(&self) -> bool {
        self.logical_to_hardware.is_empty()
    }

    /// Iterate `(hardware, logical)` pairs in hardware id order
    pub fn iter(&self) -> impl Iterator<Item = (ScreenId, ScreenId)> + '_ {
        self.hardware_to_logical.iter().map(|(&h, &l)| (h, l))
    }

    /// Check that both directions are exact inverses
    pub fn is_consistent(&self) -> bool {
        self.hardware_to_logical.len() == self.logical_to_hardware.len()
            && self
                .hardware_to_logical
                .iter()
                .all(|(h, l)| self.logical_to_hardware.get(l) == Some(h))
    }
}
