//! # screen-coordinator
//!
//! Logical screen identity and composition engine.
//!
//! Hardware screens and virtual casting targets are given stable logical
//! ids, and at most one non-trivial composition (a mirror, expand, or unique
//! group) is maintained across them as screens come and go and callers
//! request recompositions.
//!
//! # Architecture
//!
//! ```text
//! screen-coordinator
//!   ├─> ScreenCoordinator (hardware feed, permission gate, public API)
//!   │     └─> CompositionEngine (single lock, owns all state)
//!   │           ├─> ScreenIdTable (hardware id <-> logical id bijection)
//!   │           ├─> Screens + the active ScreenGroup
//!   │           └─> PlacementService (member geometry)
//!   └─> NotificationDispatcher (ordered fan-out on a worker thread)
//! ```
//!
//! # Data Flow
//!
//! **Hardware:** connect event → id table → Screen → optional group join → events
//!
//! **Requests:** make_mirror / make_expand / stop_screens → recompose → REMOVE, CHANGE, ADD batches

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Composition engine
pub mod composition;

/// Configuration
pub mod config;

/// Caller-facing boundary
pub mod coordinator;

/// Member placement
pub mod geometry;

/// Event types and dispatch
pub mod notify;

/// Scripted scenario replay
pub mod scenario;

/// Screen and group data model
pub mod screen;

/// Utility functions
pub mod utils;

pub use composition::{CompositionEngine, CompositionError};
pub use config::Config;
pub use coordinator::{HardwareEvent, ScreenCoordinator};
pub use notify::{ScreenEvent, ScreenEventListener};
pub use screen::{Combination, ScreenId, ScreenKind};
