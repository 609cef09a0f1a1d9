//! Frame-driven animator
//!
//! The canvas flavour of playback: instead of arming a tick per step, the
//! caller pumps [`Animator::frame`] from its render loop and receives a
//! fractional progress for the current step. Step transitions are delegated
//! to the wrapped [`StepPlayer`], so the host projection stays identical to
//! what timer-driven playback would show.
//!
//! Clock readings are passed in rather than sampled, which keeps the
//! animator deterministic under test.

use crate::catalog::{Catalog, Step};
use crate::player::{scaled_duration, PlayerConfig, StepPlayer};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Callbacks fired by the animator
///
/// All methods default to no-ops so observers only implement what they use.
pub trait AnimatorObserver {
    /// A step became current or finished; `None` after a reset
    fn on_step_change(&mut self, _step: Option<&Step>, _index: usize, _total: usize) {}

    /// The last step ran to completion
    fn on_scenario_complete(&mut self) {}

    /// Progress of the current step in `[0, 1]`, once per frame
    fn on_update(&mut self, _progress: f64) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl AnimatorObserver for NullObserver {}

pub struct Animator<O: AnimatorObserver> {
    player: StepPlayer,
    observer: O,
    playing: bool,
    paused: bool,
    step_started: Option<Instant>,
    /// Elapsed time banked across pauses for the current step
    banked: Duration,
    progress: f64,
    completed: Vec<bool>,
}

impl<O: AnimatorObserver> Animator<O> {
    pub fn new(catalog: Arc<Catalog>, observer: O) -> Self {
        Self::with_config(catalog, &PlayerConfig::default(), observer)
    }

    pub fn with_config(catalog: Arc<Catalog>, config: &PlayerConfig, observer: O) -> Self {
        let completed = vec![false; catalog.len()];
        Self {
            player: StepPlayer::with_config(catalog, config),
            observer,
            playing: false,
            paused: false,
            step_started: None,
            banked: Duration::ZERO,
            progress: 0.0,
            completed,
        }
    }

    pub fn player(&self) -> &StepPlayer {
        &self.player
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn speed(&self) -> f64 {
        self.player.speed()
    }

    /// Progress of the current step as of the last frame
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Fraction of the whole scenario, counting the current step partially
    pub fn overall_progress(&self) -> f64 {
        let total = self.player.total_steps();
        if total == 0 {
            return 0.0;
        }
        let index = self.player.current_index().unwrap_or(0);
        (index as f64 + self.progress) / total as f64
    }

    pub fn is_completed(&self, index: usize) -> bool {
        self.completed.get(index).copied().unwrap_or(false)
    }

    /// Start animating from the current step, entering step 0 if needed
    pub fn play(&mut self, now: Instant) {
        if self.player.total_steps() == 0 {
            warn!("Animator has an empty scenario, nothing to play");
            return;
        }
        let last = self.player.total_steps() - 1;
        if self.player.is_at_end() && self.is_completed(last) {
            debug!("play: scenario already complete");
            return;
        }

        if self.player.current_index().is_none() {
            self.player.next_step();
            self.notify_step_change();
        }

        info!("Animation started");
        self.playing = true;
        self.paused = false;
        self.step_started = Some(now);
        self.banked = Duration::ZERO;
        self.progress = 0.0;
    }

    /// Freeze the clock; [`resume`](Self::resume) continues from the same progress
    pub fn pause(&mut self, now: Instant) {
        if !self.playing {
            return;
        }
        self.banked += self.elapsed_since_start(now);
        self.step_started = None;
        self.playing = false;
        self.paused = true;
        debug!("Animation paused at {:.2}", self.progress);
    }

    pub fn resume(&mut self, now: Instant) {
        if !self.paused {
            return;
        }
        self.paused = false;
        self.playing = true;
        self.step_started = Some(now);
        debug!("Animation resumed");
    }

    pub fn stop(&mut self) {
        self.playing = false;
        self.paused = false;
        self.step_started = None;
        self.banked = Duration::ZERO;
    }

    pub fn reset(&mut self) {
        self.stop();
        self.player.reset();
        self.completed.iter_mut().for_each(|c| *c = false);
        self.progress = 0.0;
        self.observer
            .on_step_change(None, 0, self.player.total_steps());
    }

    /// Manual advance; completes the scenario when already on the last step
    pub fn next_step(&mut self) {
        self.stop();
        let before = self.player.current_index();
        self.player.next_step();
        self.progress = 0.0;

        if self.player.current_index() != before {
            self.notify_step_change();
        } else if before.is_some() {
            self.observer.on_scenario_complete();
        }
    }

    /// Manual step back; the step being left loses its completed mark
    pub fn prev_step(&mut self) {
        self.stop();
        let Some(left) = self.player.current_index() else {
            return;
        };

        self.player.prev_step();
        self.progress = 0.0;
        if let Some(flag) = self.completed.get_mut(left) {
            *flag = false;
        }
        self.notify_step_change();
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.player.set_speed(speed);
    }

    /// Swap in another scenario, keeping the speed
    pub fn load(&mut self, catalog: Arc<Catalog>) {
        self.stop();
        info!("Animator loaded scenario '{}'", catalog.id);
        let config = PlayerConfig {
            speed: self.player.speed(),
        };
        self.completed = vec![false; catalog.len()];
        self.player = StepPlayer::with_config(catalog, &config);
        self.progress = 0.0;
        self.observer.on_update(0.0);
    }

    /// Advance the animation to `now` and report progress
    ///
    /// When the current step's scaled duration has elapsed the step is
    /// marked completed and playback moves on, or stops after the last step.
    pub fn frame(&mut self, now: Instant) -> f64 {
        if !self.playing {
            return self.progress;
        }
        let Some(step) = self.player.current_step() else {
            return self.progress;
        };

        let scaled = scaled_duration(step, self.player.speed());
        let elapsed = self.banked + self.elapsed_since_start(now);
        let progress = if scaled.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f64() / scaled.as_secs_f64()).min(1.0)
        };

        self.progress = progress;
        self.observer.on_update(progress);

        if progress >= 1.0 {
            self.finish_step(now);
        }
        progress
    }

    fn finish_step(&mut self, now: Instant) {
        let Some(index) = self.player.current_index() else {
            return;
        };
        if let Some(flag) = self.completed.get_mut(index) {
            *flag = true;
        }
        self.notify_step_change();

        if self.player.is_at_end() {
            info!("Scenario '{}' complete", self.player.catalog().id);
            self.playing = false;
            self.step_started = None;
            self.banked = Duration::ZERO;
            self.observer.on_scenario_complete();
        } else {
            self.player.next_step();
            self.step_started = Some(now);
            self.banked = Duration::ZERO;
            self.progress = 0.0;
        }
    }

    fn elapsed_since_start(&self, now: Instant) -> Duration {
        self.step_started
            .map_or(Duration::ZERO, |start| now.saturating_duration_since(start))
    }

    fn notify_step_change(&mut self) {
        let total = self.player.total_steps();
        let index = self.player.current_index().unwrap_or(0);
        self.observer
            .on_step_change(self.player.current_step(), index, total);
    }
}
