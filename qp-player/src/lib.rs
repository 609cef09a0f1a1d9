//! Step player for the RDMA queue-pair connection walkthrough
//!
//! Two hosts bring up an RC connection: allocate PD/CQ/MR, create QPs, swap
//! QP info out of band and move both QPs RESET → INIT → RTR → RTS. A
//! [`Catalog`] scripts that walkthrough as discrete steps; the
//! [`StepPlayer`] walks it and keeps a [`Projection`] of each host's
//! resources and QP state that presenters render.
//!
//! Layers:
//! - `catalog`: step data model, JSON scripts and the built-in scenarios
//! - `projection`: derived host state and step replay
//! - `player`: playback state machine with id-based autoplay ticks
//! - `animator`: frame-driven playback with fractional progress
//! - `driver`: tokio session loop that owns the real timer

pub mod animator;
pub mod catalog;
pub mod driver;
pub mod error;
pub mod player;
pub mod projection;

pub use animator::{Animator, AnimatorObserver, NullObserver};
pub use catalog::{builtin, builtin_ids, Catalog, HostId, QpState, ResourceKind, Step};
pub use driver::{run_session, Command, PlayerHandle, Presenter, SessionConfig, SessionEnd};
pub use error::{CatalogError, CatalogResult};
pub use player::{cycle_speed, PlayerConfig, PlayerSnapshot, StepPlayer, SPEED_PRESETS};
pub use projection::{ExchangeKind, HostState, Projection, ResourceSet};
