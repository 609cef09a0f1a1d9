//! Step catalog: the immutable demo script
//!
//! A [`Catalog`] is an ordered list of [`Step`]s. Each step declares the
//! effects it has on the two hosts (resource creation, QP state changes,
//! connection visuals) plus display directives the presentation layer reads
//! directly. Catalogs are built once and shared as `Arc<Catalog>`.
//!
//! The JSON shape matches the scripts the visualization was authored in:
//! camelCase keys and a `type` tag on every action.

pub mod builtin;

use crate::error::{CatalogError, CatalogResult};
use log::{debug, info};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub use builtin::{builtin, builtin_ids};

/// Longest step a catalog may declare (10 minutes at 1x)
pub const MAX_STEP_DURATION_MS: u64 = 10 * 60 * 1000;

/// One of the two animated hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HostId {
    #[serde(rename = "A", alias = "hostA")]
    A,
    #[serde(rename = "B", alias = "hostB")]
    B,
}

impl HostId {
    pub const ALL: [HostId; 2] = [HostId::A, HostId::B];

    pub fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    pub fn peer(self) -> HostId {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "Host A"),
            Self::B => write!(f, "Host B"),
        }
    }
}

/// Where an action is directed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Target {
    HostA,
    HostB,
    Network,
    Panel,
}

impl Target {
    /// The host this target names, if it names one
    pub fn host(self) -> Option<HostId> {
        match self {
            Self::HostA => Some(HostId::A),
            Self::HostB => Some(HostId::B),
            Self::Network | Self::Panel => None,
        }
    }
}

impl From<HostId> for Target {
    fn from(host: HostId) -> Self {
        match host {
            HostId::A => Self::HostA,
            HostId::B => Self::HostB,
        }
    }
}

/// Resource badge tracked per host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceKind {
    /// Protection domain
    Pd,
    /// Completion queue
    Cq,
    /// Memory region
    Mr,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Pd, ResourceKind::Cq, ResourceKind::Mr];

    pub fn label(self) -> &'static str {
        match self {
            Self::Pd => "PD",
            Self::Cq => "CQ",
            Self::Mr => "MR",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Pd => "Protection Domain",
            Self::Cq => "Completion Queue",
            Self::Mr => "Memory Region",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Queue pair lifecycle label
///
/// Purely cosmetic: the legal order RESET → INIT → RTR → RTS is a property of
/// the scripted steps, not something the player checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QpState {
    #[default]
    Uninitialized,
    Reset,
    Init,
    Rtr,
    Rts,
}

impl QpState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Uninitialized => "-",
            Self::Reset => "RESET",
            Self::Init => "INIT",
            Self::Rtr => "RTR",
            Self::Rts => "RTS",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Uninitialized => "not created",
            Self::Reset => "created, not configured",
            Self::Init => "port and access flags set",
            Self::Rtr => "ready to receive",
            Self::Rts => "ready to send",
        }
    }
}

impl fmt::Display for QpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Scripts write `null` for a QP that does not exist yet
fn nullable_state<'de, D>(deserializer: D) -> Result<QpState, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<QpState>::deserialize(deserializer)?.unwrap_or_default())
}

/// Line style of the host-to-host connection visual
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStyle {
    /// Out-of-band control channel (QP info exchange)
    #[default]
    Dashed,
    /// Established RDMA connection
    Solid,
}

/// A declared effect or display directive within a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Action {
    Highlight {
        element: String,
    },
    CreateResource {
        resource: ResourceKind,
    },
    #[serde(rename = "createQP")]
    CreateQueuePair,
    #[serde(rename = "modifyQP")]
    ModifyQueuePair {
        #[serde(default, deserialize_with = "nullable_state")]
        from: QpState,
        to: QpState,
    },
    ShowCode {
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<String>,
    },
    #[serde(rename = "showParams")]
    ShowParameters {
        params: Vec<String>,
    },
    ShowInfo {
        text: String,
    },
    ShowSuccess {
        text: String,
    },
    DataExchange {
        from_host: HostId,
        to_host: HostId,
        #[serde(rename = "data")]
        payload: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    ShowConnection {
        #[serde(default)]
        style: ConnectionStyle,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
}

impl Action {
    /// Tag name as written in scripts
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Highlight { .. } => "highlight",
            Self::CreateResource { .. } => "createResource",
            Self::CreateQueuePair => "createQP",
            Self::ModifyQueuePair { .. } => "modifyQP",
            Self::ShowCode { .. } => "showCode",
            Self::ShowParameters { .. } => "showParams",
            Self::ShowInfo { .. } => "showInfo",
            Self::ShowSuccess { .. } => "showSuccess",
            Self::DataExchange { .. } => "dataExchange",
            Self::ShowConnection { .. } => "showConnection",
        }
    }
}

/// An action together with its target selector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepAction {
    pub target: Target,
    #[serde(flatten)]
    pub action: Action,
}

impl StepAction {
    pub fn new(target: Target, action: Action) -> Self {
        Self { target, action }
    }
}

/// QP state transition declared by a step (single host)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub host: HostId,
    #[serde(default, deserialize_with = "nullable_state")]
    pub from: QpState,
    pub to: QpState,
}

/// One scripted unit of the demo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub phase: u8,
    pub title: String,
    pub description: String,
    /// Autoplay pacing at 1x speed
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    #[serde(default)]
    pub actions: Vec<StepAction>,
    #[serde(default)]
    pub state_change: Option<StateChange>,
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        phase: u8,
        title: impl Into<String>,
        description: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            phase,
            title: title.into(),
            description: description.into(),
            duration_ms,
            actions: Vec::new(),
            state_change: None,
        }
    }

    pub fn with_action(mut self, target: Target, action: Action) -> Self {
        self.actions.push(StepAction::new(target, action));
        self
    }

    pub fn with_state_change(mut self, host: HostId, from: QpState, to: QpState) -> Self {
        self.state_change = Some(StateChange { host, from, to });
        self
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// First code snippet and its source location
    pub fn code(&self) -> Option<(&str, Option<&str>)> {
        self.actions.iter().find_map(|a| match &a.action {
            Action::ShowCode { code, location } => Some((code.as_str(), location.as_deref())),
            _ => None,
        })
    }

    pub fn parameters(&self) -> impl Iterator<Item = &str> {
        self.actions
            .iter()
            .flat_map(|a| match &a.action {
                Action::ShowParameters { params } => params.iter(),
                _ => [].iter(),
            })
            .map(String::as_str)
    }

    pub fn info(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().filter_map(|a| match &a.action {
            Action::ShowInfo { text } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn success(&self) -> Option<&str> {
        self.actions.iter().find_map(|a| match &a.action {
            Action::ShowSuccess { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Elements highlighted on a given host
    pub fn highlights(&self, host: HostId) -> impl Iterator<Item = &str> {
        self.actions.iter().filter_map(move |a| match &a.action {
            Action::Highlight { element } if a.target.host() == Some(host) => {
                Some(element.as_str())
            }
            _ => None,
        })
    }

    pub fn has_data_exchange(&self) -> bool {
        self.actions
            .iter()
            .any(|a| matches!(a.action, Action::DataExchange { .. }))
    }

    fn validate(&self) -> CatalogResult<()> {
        if self.phase == 0 {
            return Err(CatalogError::invalid_step(&self.id, "phase must be 1 or greater"));
        }
        if self.duration_ms == 0 {
            return Err(CatalogError::invalid_step(&self.id, "duration must be positive"));
        }
        if self.duration_ms > MAX_STEP_DURATION_MS {
            return Err(CatalogError::invalid_step(
                &self.id,
                format!("duration exceeds {} ms", MAX_STEP_DURATION_MS),
            ));
        }

        for step_action in &self.actions {
            match &step_action.action {
                Action::CreateResource { resource } if step_action.target.host().is_none() => {
                    return Err(CatalogError::invalid_step(
                        &self.id,
                        format!("createResource {} must target hostA or hostB", resource),
                    ));
                }
                Action::DataExchange {
                    from_host, to_host, ..
                } if from_host == to_host => {
                    return Err(CatalogError::invalid_step(
                        &self.id,
                        format!("dataExchange from {} to itself", from_host),
                    ));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Display name of a phase ordinal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub number: u8,
    pub name: String,
}

/// Ordered, immutable demo script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub phases: Vec<Phase>,
    pub steps: Vec<Step>,
}

impl Catalog {
    pub fn new(id: impl Into<String>, name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            phases: Vec::new(),
            steps,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_phases(mut self, phases: &[(u8, &str)]) -> Self {
        self.phases = phases
            .iter()
            .map(|&(number, name)| Phase {
                number,
                name: name.to_string(),
            })
            .collect();
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn phase_name(&self, number: u8) -> Option<&str> {
        self.phases
            .iter()
            .find(|p| p.number == number)
            .map(|p| p.name.as_str())
    }

    /// Highest phase ordinal used by any step
    pub fn phase_count(&self) -> u8 {
        self.steps.iter().map(|s| s.phase).max().unwrap_or(0)
    }

    /// Playback time of the whole script at 1x
    pub fn total_duration(&self) -> Duration {
        self.steps
            .iter()
            .map(Step::duration)
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Check the structural rules a hand-written catalog must satisfy
    pub fn validate(&self) -> CatalogResult<()> {
        if self.steps.is_empty() {
            return Err(CatalogError::Empty {
                catalog: self.id.clone(),
            });
        }

        let mut seen = HashSet::with_capacity(self.steps.len());
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(CatalogError::DuplicateStepId {
                    step_id: step.id.clone(),
                });
            }
            step.validate()?;
        }

        debug!("Catalog '{}' valid: {} steps", self.id, self.steps.len());
        Ok(())
    }

    /// Parse and validate a catalog from JSON text
    pub fn from_json_str(json: &str) -> CatalogResult<Self> {
        let catalog: Catalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load and validate a catalog from a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        info!("Loading catalog from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> CatalogResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
