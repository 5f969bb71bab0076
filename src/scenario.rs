//! Scenario Replay
//!
//! Scripted sequences of hardware events and composition requests, loaded
//! from TOML and replayed against a [`ScreenCoordinator`].
//!
//! ```toml
//! [[step]]
//! action = "connect"
//! hardware_id = 10
//! name = "HDMI-A"
//! width = 1920
//! height = 1080
//!
//! [[step]]
//! action = "make_mirror"
//! anchor = "HDMI-A"
//! screens = ["HDMI-B", 1002]
//! region = { x = 0, y = 0, width = 960, height = 540 }
//! ```
//!
//! Screens are referenced either by logical id or by the name they were
//! connected / created with.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::coordinator::{HardwareEvent, ScreenCoordinator};
use crate::screen::{Point, Region, Rotation, ScreenId, ScreenKind, ScreenProfile};

/// Reference to a screen inside a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScreenRef {
    /// Logical id
    Id(ScreenId),
    /// Name given at connect / create time
    Name(String),
}

fn default_kind() -> ScreenKind {
    ScreenKind::Real
}

/// One scenario step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Hardware screen connected
    Connect {
        /// Hardware id
        hardware_id: ScreenId,
        /// Screen name
        name: String,
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
        /// Screen kind
        #[serde(default = "default_kind")]
        kind: ScreenKind,
    },
    /// Hardware screen disconnected
    Disconnect {
        /// Hardware id
        hardware_id: ScreenId,
    },
    /// Create a virtual screen
    CreateVirtual {
        /// Screen name
        name: String,
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
    },
    /// Attach hardware to a virtual screen
    BindVirtual {
        /// Virtual screen
        screen: ScreenRef,
        /// Hardware id
        hardware_id: ScreenId,
    },
    /// Destroy a virtual screen
    DestroyVirtual {
        /// Virtual screen
        screen: ScreenRef,
    },
    /// Mirror request
    MakeMirror {
        /// Mirror source
        anchor: ScreenRef,
        /// Targets
        screens: Vec<ScreenRef>,
        /// Source rectangle
        #[serde(default)]
        region: Option<Region>,
        /// Rotation hint
        #[serde(default)]
        rotation: Option<Rotation>,
        /// Reprocess even when unchanged
        #[serde(default)]
        force: bool,
    },
    /// Expand request
    MakeExpand {
        /// Targets
        screens: Vec<ScreenRef>,
        /// Start points, parallel to `screens`
        points: Vec<Point>,
    },
    /// Unique request
    MakeUnique {
        /// Virtual targets
        screens: Vec<ScreenRef>,
    },
    /// Stop mirroring
    StopMirror {
        /// Targets
        screens: Vec<ScreenRef>,
    },
    /// Stop extending
    StopExpand {
        /// Targets
        screens: Vec<ScreenRef>,
    },
    /// Detach casting targets
    RemoveVirtual {
        /// Targets
        screens: Vec<ScreenRef>,
    },
    /// Toggle mirror requests
    DisableMirror {
        /// New state
        disabled: bool,
    },
}

impl Step {
    /// Action name as written in the file
    pub fn action(&self) -> &'static str {
        match self {
            Step::Connect { .. } => "connect",
            Step::Disconnect { .. } => "disconnect",
            Step::CreateVirtual { .. } => "create_virtual",
            Step::BindVirtual { .. } => "bind_virtual",
            Step::DestroyVirtual { .. } => "destroy_virtual",
            Step::MakeMirror { .. } => "make_mirror",
            Step::MakeExpand { .. } => "make_expand",
            Step::MakeUnique { .. } => "make_unique",
            Step::StopMirror { .. } => "stop_mirror",
            Step::StopExpand { .. } => "stop_expand",
            Step::RemoveVirtual { .. } => "remove_virtual",
            Step::DisableMirror { .. } => "disable_mirror",
        }
    }
}

/// Scripted sequence of steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Steps in replay order
    #[serde(rename = "step", default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Load a scenario file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid scenario file: {}", path.display()))
    }

    /// Parse scenario TOML
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse scenario")
    }
}

/// Result of a replay
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// Steps the coordinator accepted
    pub applied: usize,
    /// Steps the coordinator rejected, with the reason
    pub rejected: Vec<(usize, String)>,
}

/// Replays scenarios, tracking screen names
pub struct ScenarioRunner<'a> {
    coordinator: &'a ScreenCoordinator,
    names: HashMap<String, ScreenId>,
}

impl<'a> ScenarioRunner<'a> {
    /// Create a runner over `coordinator`
    pub fn new(coordinator: &'a ScreenCoordinator) -> Self {
        Self {
            coordinator,
            names: HashMap::new(),
        }
    }

    /// Logical id registered under `name`
    pub fn id_of(&self, name: &str) -> Option<ScreenId> {
        self.names.get(name).copied()
    }

    /// Replay every step
    ///
    /// Rejected composition requests are recorded and replay continues; an
    /// unknown screen name aborts the replay.
    pub fn run(&mut self, scenario: &Scenario) -> Result<ReplaySummary> {
        let mut summary = ReplaySummary::default();

        for (index, step) in scenario.steps.iter().enumerate() {
            debug!("Step {}: {}", index, step.action());
            match self.apply(step) {
                Ok(Ok(())) => summary.applied += 1,
                Ok(Err(e)) => {
                    warn!("Step {} ({}) rejected: {}", index, step.action(), e);
                    summary.rejected.push((index, e.to_string()));
                }
                Err(e) => return Err(e.context(format!("Step {} ({})", index, step.action()))),
            }
        }

        info!(
            "Scenario replayed: {} applied, {} rejected",
            summary.applied,
            summary.rejected.len()
        );
        Ok(summary)
    }

    fn resolve(&self, screen: &ScreenRef) -> Result<ScreenId> {
        match screen {
            ScreenRef::Id(id) => Ok(*id),
            ScreenRef::Name(name) => self
                .id_of(name)
                .with_context(|| format!("Unknown screen name: {}", name)),
        }
    }

    fn resolve_all(&self, screens: &[ScreenRef]) -> Result<Vec<ScreenId>> {
        screens.iter().map(|s| self.resolve(s)).collect()
    }

    fn apply(&mut self, step: &Step) -> Result<crate::composition::Result<()>> {
        let coordinator = self.coordinator;
        let outcome = match step {
            Step::Connect {
                hardware_id,
                name,
                width,
                height,
                kind,
            } => {
                let event = HardwareEvent::Connected {
                    kind: *kind,
                    profile: ScreenProfile::new(name.clone(), *width, *height),
                };
                if let Some(id) = coordinator.on_hardware_event(*hardware_id, event) {
                    self.names.insert(name.clone(), id);
                }
                Ok(())
            }
            Step::Disconnect { hardware_id } => {
                if let Some(id) = coordinator.on_hardware_event(*hardware_id, HardwareEvent::Disconnected) {
                    self.names.retain(|_, v| *v != id);
                }
                Ok(())
            }
            Step::CreateVirtual { name, width, height } => {
                let id = coordinator.create_virtual_screen(ScreenProfile::new(name.clone(), *width, *height));
                self.names.insert(name.clone(), id);
                Ok(())
            }
            Step::BindVirtual { screen, hardware_id } => {
                coordinator.bind_virtual_hardware(self.resolve(screen)?, *hardware_id)
            }
            Step::DestroyVirtual { screen } => {
                let id = self.resolve(screen)?;
                let result = coordinator.destroy_virtual_screen(id);
                if result.is_ok() {
                    self.names.retain(|_, v| *v != id);
                }
                result
            }
            Step::MakeMirror {
                anchor,
                screens,
                region,
                rotation,
                force,
            } => coordinator
                .make_mirror(self.resolve(anchor)?, &self.resolve_all(screens)?, *region, *rotation, *force)
                .map(|_| ()),
            Step::MakeExpand { screens, points } => coordinator
                .make_expand(&self.resolve_all(screens)?, points)
                .map(|_| ()),
            Step::MakeUnique { screens } => coordinator.make_unique(&self.resolve_all(screens)?).map(|_| ()),
            Step::StopMirror { screens } => coordinator.stop_mirror(&self.resolve_all(screens)?),
            Step::StopExpand { screens } => coordinator.stop_expand(&self.resolve_all(screens)?),
            Step::RemoveVirtual { screens } => {
                coordinator.remove_virtual_screens_from_group(&self.resolve_all(screens)?)
            }
            Step::DisableMirror { disabled } => coordinator.disable_mirror(*disabled),
        };
        Ok(outcome)
    }
}
