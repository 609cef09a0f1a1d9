//! Async playback driver
//!
//! Owns the only real timer. The session loop waits on two things at once:
//! commands from the UI side and the deadline of the player's pending tick.
//! Every state change is followed by a call to the [`Presenter`].
//!
//! The player itself is shared behind a `parking_lot` mutex so presenters
//! and input threads can take snapshots, but only this loop mutates it.

use crate::player::{StepPlayer, TickId};
use anyhow::{Context, Result};
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

/// Player shared between the driver and its observers
pub type PlayerHandle = Arc<Mutex<StepPlayer>>;

pub fn shared(player: StepPlayer) -> PlayerHandle {
    Arc::new(Mutex::new(player))
}

/// User intent delivered to the session loop
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    TogglePlay,
    Reset,
    Next,
    Prev,
    /// Jump to a 0-based step index
    GoTo(usize),
    SetSpeed(f64),
    Quit,
}

impl Command {
    /// Parse one line of interactive input
    ///
    /// Step numbers typed after `g` are 1-based, as shown on screen.
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line == " " {
            return Some(Command::TogglePlay);
        }

        let mut words = line.split_whitespace();
        let command = match words.next()? {
            "p" | "space" => Command::TogglePlay,
            "n" | "right" | "\u{1b}[C" => Command::Next,
            "b" | "left" | "\u{1b}[D" => Command::Prev,
            "r" => Command::Reset,
            "q" | "quit" => Command::Quit,
            "g" => {
                let number: usize = words.next()?.parse().ok()?;
                Command::GoTo(number.checked_sub(1)?)
            }
            "s" => Command::SetSpeed(words.next()?.parse().ok()?),
            _ => return None,
        };
        Some(command)
    }

    /// Apply to `player`; returns false for [`Command::Quit`], which ends the session
    fn apply(self, player: &mut StepPlayer) -> bool {
        match self {
            Command::Play => player.play(),
            Command::Pause => player.pause(),
            Command::TogglePlay => {
                if player.is_playing() {
                    player.pause();
                } else {
                    player.play();
                }
            }
            Command::Reset => player.reset(),
            Command::Next => player.next_step(),
            Command::Prev => player.prev_step(),
            Command::GoTo(index) => player.go_to_step(index),
            Command::SetSpeed(speed) => player.set_speed(speed),
            Command::Quit => return false,
        }
        true
    }
}

/// Receives the player after every change
pub trait Presenter {
    fn present(&mut self, player: &StepPlayer) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// End the session once autoplay stops on the last step
    pub exit_on_finish: bool,
}

/// Why a session returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Quit,
    Finished,
    /// Every command sender was dropped
    Disconnected,
}

fn is_finished(player: &StepPlayer) -> bool {
    player.is_at_end() && !player.is_playing()
}

/// Drive `handle` until quit, disconnect or (optionally) the end of the script
pub async fn run_session<P: Presenter>(
    handle: PlayerHandle,
    mut commands: mpsc::Receiver<Command>,
    presenter: &mut P,
    config: &SessionConfig,
) -> Result<SessionEnd> {
    let mut deadline: Option<(TickId, Instant)> = None;

    {
        let player = handle.lock();
        info!(
            "Session started: '{}' ({} steps)",
            player.catalog().id,
            player.total_steps()
        );
        presenter
            .present(&player)
            .context("Failed to present initial state")?;
    }

    let end = loop {
        let wake = {
            let player = handle.lock();
            if config.exit_on_finish && is_finished(&player) {
                break SessionEnd::Finished;
            }

            match player.pending_tick() {
                Some(tick) => match deadline {
                    Some((id, at)) if id == tick.id => Some(at),
                    _ => {
                        let at = Instant::now() + tick.delay;
                        deadline = Some((tick.id, at));
                        Some(at)
                    }
                },
                None => {
                    deadline = None;
                    None
                }
            }
        };

        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break SessionEnd::Disconnected;
                };
                debug!("Command {:?}", command);
                let mut player = handle.lock();
                if !command.apply(&mut player) {
                    break SessionEnd::Quit;
                }
                presenter.present(&player).context("Failed to present step")?;
            }
            _ = sleep_until(wake.unwrap_or_else(Instant::now)), if wake.is_some() => {
                let Some((id, _)) = deadline.take() else {
                    continue;
                };
                let mut player = handle.lock();
                if player.fire(id) {
                    presenter.present(&player).context("Failed to present step")?;
                }
            }
        }
    };

    handle.lock().pause();
    info!("Session ended: {:?}", end);
    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Action, Catalog, HostId, ResourceKind, Step, Target};
    use std::time::Duration;

    #[derive(Default)]
    struct Trace {
        indices: Vec<Option<usize>>,
    }

    impl Presenter for Trace {
        fn present(&mut self, player: &StepPlayer) -> Result<()> {
            self.indices.push(player.current_index());
            Ok(())
        }
    }

    struct Broken;

    impl Presenter for Broken {
        fn present(&mut self, _player: &StepPlayer) -> Result<()> {
            anyhow::bail!("stdout closed")
        }
    }

    fn three_steps() -> PlayerHandle {
        let catalog = Catalog::new(
            "three",
            "Three",
            vec![
                Step::new("s0", 1, "PD", "", 1000)
                    .with_action(Target::HostA, Action::CreateResource { resource: ResourceKind::Pd }),
                Step::new("s1", 1, "CQ", "", 2000)
                    .with_action(Target::HostA, Action::CreateResource { resource: ResourceKind::Cq }),
                Step::new("s2", 1, "MR", "", 3000)
                    .with_action(Target::HostA, Action::CreateResource { resource: ResourceKind::Mr }),
            ],
        );
        shared(StepPlayer::new(Arc::new(catalog)))
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse(" "), Some(Command::TogglePlay));
        assert_eq!(Command::parse("p\n"), Some(Command::TogglePlay));
        assert_eq!(Command::parse("n"), Some(Command::Next));
        assert_eq!(Command::parse("\u{1b}[D"), Some(Command::Prev));
        assert_eq!(Command::parse("r"), Some(Command::Reset));
        assert_eq!(Command::parse("g 3"), Some(Command::GoTo(2)));
        assert_eq!(Command::parse("s 1.5"), Some(Command::SetSpeed(1.5)));
        assert_eq!(Command::parse("q"), Some(Command::Quit));

        assert_eq!(Command::parse("g 0"), None);
        assert_eq!(Command::parse("g"), None);
        assert_eq!(Command::parse("s fast"), None);
        assert_eq!(Command::parse("x"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn test_apply_reports_quit() {
        let handle = three_steps();
        let mut player = handle.lock();
        assert!(Command::Play.apply(&mut player));
        assert!(Command::SetSpeed(1e-300).apply(&mut player));
        assert_eq!(player.speed(), 1.0);

        let before = player.current_index();
        assert!(!Command::Quit.apply(&mut player));
        assert_eq!(player.current_index(), before);
        assert!(player.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_skips_presenting() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Command::Quit).await.unwrap();
        let mut trace = Trace::default();
        let end = run_session(three_steps(), rx, &mut trace, &SessionConfig::default())
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Quit);
        assert_eq!(trace.indices, vec![None]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_autoplay_runs_to_finish() {
        let handle = three_steps();
        let (tx, rx) = mpsc::channel(8);
        tx.send(Command::Play).await.unwrap();

        let mut trace = Trace::default();
        let config = SessionConfig {
            exit_on_finish: true,
        };
        let start = Instant::now();
        let end = run_session(handle.clone(), rx, &mut trace, &config)
            .await
            .unwrap();

        assert_eq!(end, SessionEnd::Finished);
        // The final tick pauses on the last step and is presented as well
        assert_eq!(trace.indices, vec![None, Some(0), Some(1), Some(2), Some(2)]);
        // Each step is shown for its full duration, the last one included
        assert_eq!(start.elapsed(), Duration::from_millis(6000));

        let player = handle.lock();
        assert_eq!(player.host(HostId::A).resources.len(), 3);
        assert!(!player.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_change_applies_to_next_tick() {
        let handle = three_steps();
        let (tx, rx) = mpsc::channel(8);
        let mut trace = Trace::default();
        let config = SessionConfig::default();

        let observer = handle.clone();
        let script = async move {
            tx.send(Command::Play).await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            tx.send(Command::SetSpeed(2.0)).await.unwrap();

            // First tick still lands at 1000ms; step 1 then lasts 2000/2
            tokio::time::sleep(Duration::from_millis(1000)).await;
            assert_eq!(observer.lock().current_index(), Some(1));
            tokio::time::sleep(Duration::from_millis(600)).await;
            assert_eq!(observer.lock().current_index(), Some(2));

            tx.send(Command::Quit).await.unwrap();
        };

        let (end, ()) = tokio::join!(run_session(handle.clone(), rx, &mut trace, &config), script);
        assert_eq!(end.unwrap(), SessionEnd::Quit);
        assert!(handle.lock().pending_tick().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_cancels_pending_tick() {
        let handle = three_steps();
        let (tx, rx) = mpsc::channel(8);
        let mut trace = Trace::default();
        let config = SessionConfig::default();

        let observer = handle.clone();
        let script = async move {
            tx.send(Command::Play).await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            tx.send(Command::Pause).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5000)).await;
            assert_eq!(observer.lock().current_index(), Some(0));

            tx.send(Command::GoTo(2)).await.unwrap();
            tx.send(Command::Prev).await.unwrap();
        };

        let (end, ()) = tokio::join!(run_session(handle.clone(), rx, &mut trace, &config), script);
        assert_eq!(end.unwrap(), SessionEnd::Disconnected);
        assert_eq!(trace.indices, vec![None, Some(0), Some(0), Some(2), Some(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_presenter_error_ends_session() {
        let (_tx, rx) = mpsc::channel(1);
        let err = run_session(three_steps(), rx, &mut Broken, &SessionConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("initial state"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_catalog_finishes_immediately() {
        let handle = shared(StepPlayer::new(Arc::new(Catalog::new("e", "Empty", vec![]))));
        let (_tx, rx) = mpsc::channel(1);
        let config = SessionConfig {
            exit_on_finish: true,
        };
        let end = run_session(handle, rx, &mut Trace::default(), &config)
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Finished);
    }
}
