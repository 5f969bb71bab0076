//! Member Placement
//!
//! The composition engine decides *who* is in the group; this module decides
//! *where* each member sits. The default [`TilingPlacement`] tiles expand
//! members left to right and mirrors the whole anchor when no region is given.

use tracing::{debug, trace};

use crate::screen::{Combination, Placement, Point, Region, Rotation, ScreenInfo};

/// Inputs for one placement decision
///
/// Screens are passed as snapshots; the placement service never sees the
/// engine's own state.
#[derive(Debug, Clone)]
pub struct PlacementRequest {
    /// Geometry reference (the group anchor)
    pub anchor: ScreenInfo,
    /// Screen being placed
    pub screen: ScreenInfo,
    /// Caller-requested start point, if any
    pub requested_point: Option<Point>,
    /// Combination the screen is joining
    pub combination: Combination,
    /// Mirror source rectangle, if any
    pub region: Option<Region>,
    /// Rotation hint applied to the reference width for expand
    pub rotation: Option<Rotation>,
}

/// Geometry collaborator
#[cfg_attr(test, mockall::automock)]
pub trait PlacementService: Send + Sync {
    /// Compute where `request.screen` sits relative to `request.anchor`
    ///
    /// `None` means the screen cannot be placed and must not join.
    fn compute_member_placement(&self, request: &PlacementRequest) -> Option<Placement>;
}

/// Default placement policy
#[derive(Debug, Default, Clone, Copy)]
pub struct TilingPlacement;

impl TilingPlacement {
    /// Create the default policy
    pub fn new() -> Self {
        Self
    }
}

impl PlacementService for TilingPlacement {
    fn compute_member_placement(&self, request: &PlacementRequest) -> Option<Placement> {
        let anchor = &request.anchor;
        if request.screen.mode.width == 0 || request.screen.mode.height == 0 {
            debug!("Screen {} has no usable mode, cannot place it", request.screen.id);
            return None;
        }

        let placement = match request.combination {
            Combination::Mirror => {
                let region = request
                    .region
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| Region::new(0, 0, anchor.mode.width, anchor.mode.height));
                Placement::Region(region)
            }
            Combination::Expand => {
                let point = request.requested_point.unwrap_or_else(|| {
                    let rotation = request.rotation.unwrap_or(anchor.rotation);
                    let width = i32::try_from(anchor.mode.active_width(rotation)).unwrap_or(i32::MAX);
                    Point::new(anchor.start_point.x.saturating_add(width), anchor.start_point.y)
                });
                Placement::Point(point)
            }
            Combination::Unique => Placement::Point(request.requested_point.unwrap_or(Point::ORIGIN)),
        };

        trace!(
            "Placed screen {} against anchor {}: {:?}",
            request.screen.id,
            anchor.id,
            placement
        );

        Some(placement)
    }
}
