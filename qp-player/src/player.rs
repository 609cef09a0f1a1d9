//! Step player: the playback state machine
//!
//! Walks an immutable [`Catalog`] one step at a time, applies each step's
//! effects to the [`Projection`], and owns the autoplay tick.
//!
//! The player never sleeps or spawns. When autoplay needs a tick it records
//! an [`ArmedTick`]; whatever scheduling primitive drives the player (the
//! tokio driver, a test, a frame loop) waits `delay` and calls
//! [`StepPlayer::fire`] with the tick's id. Arming again or cancelling
//! invalidates older ids, so at most one tick is ever outstanding.
//!
//! No operation fails: out-of-range jumps and bad speeds are ignored.

use crate::catalog::{Catalog, HostId, Step};
use crate::projection::{HostState, Projection};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Speed multipliers offered by the selector
pub const SPEED_PRESETS: [f64; 4] = [0.5, 1.0, 1.5, 2.0];

/// Slowest accepted speed multiplier
pub const MIN_SPEED: f64 = 0.1;
/// Fastest accepted speed multiplier
pub const MAX_SPEED: f64 = 16.0;

/// Whether `speed` is a multiplier the player accepts
pub fn is_valid_speed(speed: f64) -> bool {
    (MIN_SPEED..=MAX_SPEED).contains(&speed)
}

/// `step`'s duration at `speed`, saturating instead of overflowing
pub fn scaled_duration(step: &Step, speed: f64) -> Duration {
    Duration::try_from_secs_f64(step.duration().as_secs_f64() / speed).unwrap_or(Duration::MAX)
}

/// Next preset after `current`, wrapping around
pub fn cycle_speed(current: f64) -> f64 {
    SPEED_PRESETS
        .iter()
        .copied()
        .find(|&s| s > current)
        .unwrap_or(SPEED_PRESETS[0])
}

/// Player construction options
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Initial speed multiplier
    pub speed: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self { speed: 1.0 }
    }
}

/// Identity of an armed autoplay tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickId(u64);

/// The single outstanding autoplay tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTick {
    pub id: TickId,
    /// Step duration scaled by the speed in effect when armed
    pub delay: Duration,
}

/// Serializable read surface for presenters
#[derive(Debug, Clone, Serialize)]
pub struct PlayerSnapshot {
    pub scenario: String,
    pub index: Option<usize>,
    pub total_steps: usize,
    pub step_id: Option<String>,
    pub title: Option<String>,
    pub phase: Option<u8>,
    pub playing: bool,
    pub speed: f64,
    pub state: Projection,
}

pub struct StepPlayer {
    catalog: Arc<Catalog>,
    current: Option<usize>,
    playing: bool,
    speed: f64,
    projection: Projection,
    pending: Option<ArmedTick>,
    tick_seq: u64,
}

impl StepPlayer {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::with_config(catalog, &PlayerConfig::default())
    }

    pub fn with_config(catalog: Arc<Catalog>, config: &PlayerConfig) -> Self {
        let mut player = Self {
            catalog,
            current: None,
            playing: false,
            speed: 1.0,
            projection: Projection::default(),
            pending: None,
            tick_seq: 0,
        };
        player.set_speed(config.speed);
        player
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// `None` until the first step has been applied
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.current.and_then(|i| self.catalog.step(i))
    }

    pub fn total_steps(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn host(&self, host: HostId) -> &HostState {
        self.projection.host(host)
    }

    /// True on the last step, and always for an empty catalog
    pub fn is_at_end(&self) -> bool {
        match self.catalog.len().checked_sub(1) {
            Some(last) => self.current == Some(last),
            None => true,
        }
    }

    pub fn pending_tick(&self) -> Option<ArmedTick> {
        self.pending
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let step = self.current_step();
        PlayerSnapshot {
            scenario: self.catalog.id.clone(),
            index: self.current,
            total_steps: self.total_steps(),
            step_id: step.map(|s| s.id.clone()),
            title: step.map(|s| s.title.clone()),
            phase: step.map(|s| s.phase),
            playing: self.playing,
            speed: self.speed,
            state: self.projection.clone(),
        }
    }

    /// Start autoplay
    ///
    /// An unstarted player shows step 0 immediately rather than after the
    /// first tick.
    pub fn play(&mut self) {
        if self.is_at_end() {
            debug!("play: already at the last step");
            return;
        }
        if self.current.is_none() {
            self.show(0);
        }
        if self.playing {
            return;
        }

        info!("Playback started at step {}", self.position());
        self.playing = true;
        self.arm();
    }

    pub fn pause(&mut self) {
        self.cancel();
        if self.playing {
            info!("Playback paused at step {}", self.position());
            self.playing = false;
        }
    }

    pub fn reset(&mut self) {
        self.pause();
        if self.current.is_some() {
            info!("Player reset");
        }
        self.current = None;
        self.projection.clear();
    }

    /// Advance one step; past the end this pauses instead
    pub fn next_step(&mut self) {
        let next = self.current.map_or(0, |i| i + 1);
        if next >= self.catalog.len() {
            self.pause();
            return;
        }
        self.show(next);
    }

    /// Step back by replaying up to the previous step; at step 0 this resets
    pub fn prev_step(&mut self) {
        match self.current {
            Some(0) => self.reset(),
            Some(i) => self.go_to_step(i - 1),
            None => {}
        }
    }

    /// Jump to `target` by replaying from step 0
    pub fn go_to_step(&mut self, target: usize) {
        if target >= self.catalog.len() {
            warn!(
                "Ignoring jump to step {} (catalog has {} steps)",
                target,
                self.catalog.len()
            );
            return;
        }

        debug!("Replaying steps 0..={}", target);
        self.projection = Projection::replay(&self.catalog.steps, target);
        self.current = Some(target);
        if self.playing {
            self.arm();
        }
    }

    /// Change the multiplier used for the next armed tick
    pub fn set_speed(&mut self, speed: f64) {
        if !is_valid_speed(speed) {
            warn!(
                "Ignoring speed {} (accepted range {}..={})",
                speed, MIN_SPEED, MAX_SPEED
            );
            return;
        }
        debug!("Speed {}x -> {}x", self.speed, speed);
        self.speed = speed;
    }

    /// Deliver an autoplay tick
    ///
    /// Returns false when `id` is no longer the pending tick (cancelled or
    /// superseded), in which case nothing happens.
    pub fn fire(&mut self, id: TickId) -> bool {
        if self.pending.map(|t| t.id) != Some(id) {
            debug!("Dropping stale tick {:?}", id);
            return false;
        }
        self.pending = None;
        self.next_step();
        true
    }

    /// Apply step `index` on top of the current state
    fn show(&mut self, index: usize) {
        let Some(step) = self.catalog.step(index) else {
            return;
        };
        debug!("Step {}/{}: {}", index + 1, self.catalog.len(), step.title);
        self.projection.apply_step(step);
        self.current = Some(index);
        if self.playing {
            self.arm();
        }
    }

    fn arm(&mut self) {
        let Some(step) = self.current_step() else {
            return;
        };
        let delay = scaled_duration(step, self.speed);

        self.tick_seq += 1;
        let tick = ArmedTick {
            id: TickId(self.tick_seq),
            delay,
        };
        debug!("Armed tick {:?} in {:?}", tick.id, delay);
        self.pending = Some(tick);
    }

    fn cancel(&mut self) {
        if let Some(tick) = self.pending.take() {
            debug!("Cancelled tick {:?}", tick.id);
        }
    }

    /// 1-based position for log lines, 0 before start
    fn position(&self) -> usize {
        self.current.map_or(0, |i| i + 1)
    }
}
