//! Host state projection
//!
//! Derived view state: per-host resources and QP state, plus the connection
//! and exchange visuals of the step being shown. A projection is a pure
//! function of (catalog, index); the player rebuilds it by replay whenever it
//! jumps.

use crate::catalog::{Action, ConnectionStyle, HostId, QpState, ResourceKind, Step};
use log::debug;
use serde::Serialize;
use std::collections::BTreeSet;

/// Payload tokens that mark a control-plane exchange (QP info swap)
const CONTROL_TOKENS: &[&str] = &["QP-INFO", "QPN", "GID", "QP Info"];
/// Payload tokens that mark an RDMA data transfer
const DATA_TOKENS: &[&str] = &["RDMA", "DATA"];

/// What kind of traffic the current step's exchange shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExchangeKind {
    /// Out-of-band QP number/GID/LID swap
    QpInfo,
    /// RDMA payload on the established connection
    Data,
}

impl ExchangeKind {
    /// Classify a data-exchange payload by keyword
    ///
    /// Control-plane tokens win when a payload matches both sets.
    pub fn classify(payload: &str) -> Option<Self> {
        if CONTROL_TOKENS.iter().any(|t| payload.contains(t)) {
            Some(Self::QpInfo)
        } else if DATA_TOKENS.iter().any(|t| payload.contains(t)) {
            Some(Self::Data)
        } else {
            None
        }
    }
}

/// Insertion-only set of resource badges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResourceSet(BTreeSet<ResourceKind>);

impl ResourceSet {
    /// Returns false when the kind was already present
    pub fn insert(&mut self, kind: ResourceKind) -> bool {
        self.0.insert(kind)
    }

    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.0.iter().copied()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl FromIterator<ResourceKind> for ResourceSet {
    fn from_iter<I: IntoIterator<Item = ResourceKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Derived state of one host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostState {
    pub qp_state: QpState,
    pub resources: ResourceSet,
}

/// Everything the presentation layer reads besides the step itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Projection {
    hosts: [HostState; 2],
    connection: Option<ConnectionStyle>,
    exchange: Option<ExchangeKind>,
}

impl Projection {
    pub fn host(&self, host: HostId) -> &HostState {
        &self.hosts[host.index()]
    }

    /// Connection line style, `None` when hidden
    pub fn connection(&self) -> Option<ConnectionStyle> {
        self.connection
    }

    pub fn exchange(&self) -> Option<ExchangeKind> {
        self.exchange
    }

    /// Back to the not-started state
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn host_mut(&mut self, host: HostId) -> &mut HostState {
        &mut self.hosts[host.index()]
    }

    fn set_qp_state(&mut self, host: HostId, state: QpState) {
        let slot = &mut self.host_mut(host).qp_state;
        debug!("{} QP: {} -> {}", host, slot, state);
        *slot = state;
    }

    fn add_resource(&mut self, host: HostId, kind: ResourceKind) {
        if self.host_mut(host).resources.insert(kind) {
            debug!("{} gained {}", host, kind);
        }
    }

    /// Apply the effects that accumulate across steps
    ///
    /// Only the QP state change and resource creation carry forward; replay
    /// runs this for every step before a jump target.
    pub fn apply_cumulative(&mut self, step: &Step) {
        if let Some(change) = step.state_change {
            self.set_qp_state(change.host, change.to);
        }

        for step_action in &step.actions {
            if let Action::CreateResource { resource } = step_action.action {
                if let Some(host) = step_action.target.host() {
                    self.add_resource(host, resource);
                }
            }
        }
    }

    /// Apply a step in full as the one being shown
    ///
    /// Connection and exchange visuals belong to the shown step alone and are
    /// recomputed from scratch here.
    pub fn apply_step(&mut self, step: &Step) {
        self.connection = None;
        self.exchange = None;

        if let Some(change) = step.state_change {
            self.set_qp_state(change.host, change.to);
        }

        for step_action in &step.actions {
            match &step_action.action {
                Action::CreateResource { resource } => match step_action.target.host() {
                    Some(host) => self.add_resource(host, *resource),
                    None => debug!(
                        "Step {}: createResource {} has no host target, skipped",
                        step.id, resource
                    ),
                },
                Action::ShowConnection { style, .. } => {
                    self.connection = Some(*style);
                }
                Action::DataExchange { payload, .. } => {
                    if let Some(kind) = ExchangeKind::classify(payload) {
                        self.exchange = Some(kind);
                    }
                }
                // Display-only; the presentation layer reads these off the step
                Action::Highlight { .. }
                | Action::CreateQueuePair
                | Action::ModifyQueuePair { .. }
                | Action::ShowCode { .. }
                | Action::ShowParameters { .. }
                | Action::ShowInfo { .. }
                | Action::ShowSuccess { .. } => {}
            }
        }
    }

    /// Rebuild the projection for `steps[..=target]` from nothing
    ///
    /// An out-of-range target yields the empty projection.
    pub fn replay(steps: &[Step], target: usize) -> Self {
        let mut projection = Self::default();
        let Some((shown, before)) = steps.get(..=target).and_then(<[Step]>::split_last) else {
            return projection;
        };

        for step in before {
            projection.apply_cumulative(step);
        }
        projection.apply_step(shown);
        projection
    }
}
