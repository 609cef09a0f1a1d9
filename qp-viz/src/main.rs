//! qp-viz: terminal player for the RDMA QP connection walkthrough
//!
//! Usage:
//! ```bash
//! qp-viz list
//! qp-viz show connection --step 11
//! qp-viz play connection --speed 2 --interactive
//! qp-viz animate qp-creation --fps 30
//! qp-viz --catalog my-scenario.json export
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use qp_player::driver::{self, Command};
use qp_player::player::{is_valid_speed, MAX_SPEED, MIN_SPEED};
use qp_player::{
    builtin, builtin_ids, Animator, AnimatorObserver, Catalog, PlayerConfig, SessionConfig,
    Step, StepPlayer,
};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

mod render;

use render::{progress_bar, CatalogListing, StepView, TextPresenter};

const DEFAULT_SCENARIO: &str = "connection";

#[derive(Parser, Debug)]
#[command(
    name = "qp-viz",
    about = "Step through RDMA queue pair connection setup",
    version = env!("CARGO_PKG_VERSION")
)]
struct Args {
    /// Load the scenario from a JSON catalog instead of the built-ins
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List scenarios and their steps
    List {
        #[arg(long)]
        json: bool,
    },
    /// Render the state after a given step
    Show {
        scenario: Option<String>,
        /// 1-based step number
        #[arg(short, long, default_value_t = 1)]
        step: usize,
        #[arg(long)]
        json: bool,
    },
    /// Autoplay with the step timer
    Play {
        scenario: Option<String>,
        #[arg(short, long, default_value_t = 1.0, value_parser = parse_speed)]
        speed: f64,
        /// Read playback keys from stdin
        #[arg(short, long)]
        interactive: bool,
        /// Emit one JSON snapshot per state change
        #[arg(long)]
        json: bool,
    },
    /// Frame-driven playback with a progress bar
    Animate {
        scenario: Option<String>,
        #[arg(short, long, default_value_t = 1.0, value_parser = parse_speed)]
        speed: f64,
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..=240))]
        fps: u32,
    },
    /// Print the scenario as JSON
    Export { scenario: Option<String> },
}

fn parse_speed(s: &str) -> std::result::Result<f64, String> {
    let speed: f64 = s.parse().map_err(|e| format!("invalid speed '{}': {}", s, e))?;
    if !is_valid_speed(speed) {
        return Err(format!(
            "speed must be between {} and {}, got {}",
            MIN_SPEED, MAX_SPEED, s
        ));
    }
    Ok(speed)
}

/// Resolve the scenario from `--catalog` or the built-ins
fn load_catalog(path: Option<&Path>, scenario: Option<&str>) -> Result<Arc<Catalog>> {
    let catalog = match path {
        Some(path) => {
            let catalog = Catalog::from_path(path)
                .with_context(|| format!("Failed to load catalog {}", path.display()))?;
            if let Some(id) = scenario {
                if id != catalog.id {
                    bail!("Catalog {} holds '{}', not '{}'", path.display(), catalog.id, id);
                }
            }
            catalog
        }
        None => builtin(scenario.unwrap_or(DEFAULT_SCENARIO))?,
    };
    info!("Scenario '{}': {} steps", catalog.id, catalog.len());
    Ok(Arc::new(catalog))
}

#[derive(Serialize)]
struct ScenarioSummary<'a> {
    id: &'a str,
    name: &'a str,
    steps: usize,
    duration_ms: u64,
}

impl<'a> From<&'a Catalog> for ScenarioSummary<'a> {
    fn from(catalog: &'a Catalog) -> Self {
        Self {
            id: &catalog.id,
            name: &catalog.name,
            steps: catalog.len(),
            duration_ms: u64::try_from(catalog.total_duration().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

fn list(path: Option<&Path>, json: bool) -> Result<()> {
    let catalogs = match path {
        Some(_) => vec![load_catalog(path, None)?],
        None => builtin_ids()
            .iter()
            .map(|id| builtin(id).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?,
    };

    let mut out = io::stdout().lock();
    if json {
        let summaries: Vec<_> = catalogs.iter().map(|c| ScenarioSummary::from(c.as_ref())).collect();
        serde_json::to_writer_pretty(&mut out, &summaries)?;
        writeln!(out)?;
    } else {
        for catalog in &catalogs {
            writeln!(out, "{}", CatalogListing(catalog))?;
        }
    }
    Ok(())
}

fn show(catalog: Arc<Catalog>, step: usize, json: bool) -> Result<()> {
    let total = catalog.len();
    let Some(index) = step.checked_sub(1).filter(|&i| i < total) else {
        bail!("Step {} out of range (scenario has {} steps)", step, total);
    };

    let mut player = StepPlayer::new(catalog);
    player.go_to_step(index);

    let mut out = io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &player.snapshot())?;
        writeln!(out)?;
    } else {
        write!(out, "{}", StepView(&player))?;
    }
    Ok(())
}

/// Forward stdin lines as commands until EOF or quit
fn spawn_stdin_reader(tx: mpsc::Sender<Command>) -> Result<()> {
    thread::Builder::new()
        .name("stdin-keys".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match Command::parse(&line) {
                    Some(command) => {
                        let quit = command == Command::Quit;
                        if tx.blocking_send(command).is_err() || quit {
                            break;
                        }
                    }
                    None => warn!("Unknown key '{}' (space/p n b r g N s X q)", line.trim()),
                }
            }
            debug!("stdin reader finished");
        })
        .context("Failed to spawn stdin reader")?;
    Ok(())
}

fn install_ctrlc(tx: mpsc::Sender<Command>) -> Result<()> {
    ctrlc::set_handler(move || {
        info!("Received Ctrl+C, stopping");
        let _ = tx.try_send(Command::Quit);
    })
    .context("Failed to set Ctrl+C handler")
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")
}

fn play(catalog: Arc<Catalog>, speed: f64, interactive: bool, json: bool) -> Result<()> {
    let (tx, rx) = mpsc::channel(32);
    install_ctrlc(tx.clone())?;
    if interactive {
        spawn_stdin_reader(tx.clone())?;
    }
    tx.try_send(Command::Play)
        .context("Failed to queue initial play command")?;

    let handle = driver::shared(StepPlayer::with_config(catalog, &PlayerConfig { speed }));
    let config = SessionConfig {
        exit_on_finish: !interactive,
    };
    let mut presenter = TextPresenter::new(io::stdout(), json);

    let end = runtime()?.block_on(driver::run_session(handle, rx, &mut presenter, &config))?;
    info!("Playback ended: {:?}", end);
    Ok(())
}

/// Prints the title of each step as it is entered or finished
struct AnimationPrinter {
    complete: bool,
}

impl AnimatorObserver for AnimationPrinter {
    fn on_step_change(&mut self, step: Option<&Step>, index: usize, total: usize) {
        if let Some(step) = step {
            println!("\n[{}/{}] {}", index + 1, total, step.title);
        }
    }

    fn on_scenario_complete(&mut self) {
        self.complete = true;
    }
}

fn animate(catalog: Arc<Catalog>, speed: f64, fps: u32) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(4);
    install_ctrlc(tx)?;

    let mut animator = Animator::with_config(
        catalog,
        &PlayerConfig { speed },
        AnimationPrinter { complete: false },
    );

    runtime()?.block_on(async {
        let mut frames = tokio::time::interval(Duration::from_secs(1) / fps);
        animator.play(Instant::now());

        loop {
            tokio::select! {
                _ = frames.tick() => {
                    let progress = animator.frame(Instant::now());
                    let mut out = io::stdout().lock();
                    write!(
                        out,
                        "\r  step {} overall {}",
                        progress_bar(progress),
                        progress_bar(animator.overall_progress())
                    )?;
                    out.flush()?;
                }
                Some(Command::Quit) = rx.recv() => break,
            }
            if animator.observer().complete {
                break;
            }
        }
        println!();
        Ok::<_, anyhow::Error>(())
    })?;

    if animator.observer().complete {
        print!("{}", StepView(animator.player()));
        info!("Animation complete");
    }
    Ok(())
}

fn export(catalog: &Catalog) -> Result<()> {
    println!("{}", catalog.to_json_pretty()?);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    debug!("qp-viz {} {:?}", env!("CARGO_PKG_VERSION"), args.command);
    let path = args.catalog.as_deref();

    match args.command {
        Commands::List { json } => list(path, json),
        Commands::Show {
            scenario,
            step,
            json,
        } => show(load_catalog(path, scenario.as_deref())?, step, json),
        Commands::Play {
            scenario,
            speed,
            interactive,
            json,
        } => play(load_catalog(path, scenario.as_deref())?, speed, interactive, json),
        Commands::Animate {
            scenario,
            speed,
            fps,
        } => animate(load_catalog(path, scenario.as_deref())?, speed, fps),
        Commands::Export { scenario } => {
            let catalog = load_catalog(path, scenario.as_deref())?;
            export(&catalog)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::try_parse_from([
            "qp-viz",
            "play",
            "qp-creation",
            "--speed",
            "1.5",
            "--interactive",
            "--verbose",
        ])
        .unwrap();

        assert!(args.verbose);
        match args.command {
            Commands::Play {
                scenario,
                speed,
                interactive,
                json,
            } => {
                assert_eq!(scenario.as_deref(), Some("qp-creation"));
                assert_eq!(speed, 1.5);
                assert!(interactive);
                assert!(!json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["qp-viz", "show"]).unwrap();
        assert!(!args.verbose);
        assert!(args.catalog.is_none());
        match args.command {
            Commands::Show { scenario, step, json } => {
                assert_eq!(scenario, None);
                assert_eq!(step, 1);
                assert!(!json);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let args = Args::try_parse_from(["qp-viz", "animate", "--catalog", "s.json"]).unwrap();
        assert_eq!(args.catalog, Some(PathBuf::from("s.json")));
        assert!(matches!(args.command, Commands::Animate { fps: 30, .. }));
    }

    #[test]
    fn test_args_reject_bad_values() {
        assert!(Args::try_parse_from(["qp-viz", "play", "--speed", "0"]).is_err());
        assert!(Args::try_parse_from(["qp-viz", "play", "--speed", "fast"]).is_err());
        assert!(Args::try_parse_from(["qp-viz", "play", "--speed", "1e-300"]).is_err());
        assert!(Args::try_parse_from(["qp-viz", "animate", "--fps", "0"]).is_err());
        assert!(Args::try_parse_from(["qp-viz"]).is_err());
    }

    #[test]
    fn test_parse_speed() {
        assert_eq!(parse_speed("0.5"), Ok(0.5));
        assert_eq!(parse_speed("16"), Ok(16.0));
        assert!(parse_speed("-1").is_err());
        assert!(parse_speed("inf").is_err());
        assert!(parse_speed("1e-300").is_err());
        assert!(parse_speed("17").is_err());
    }

    #[test]
    fn test_load_builtin_catalog() {
        let catalog = load_catalog(None, None).unwrap();
        assert_eq!(catalog.id, DEFAULT_SCENARIO);
        assert!(load_catalog(None, Some("data-plane")).is_ok());
        assert!(load_catalog(None, Some("nope")).is_err());
    }

    #[test]
    fn test_load_catalog_file() {
        let path = std::env::temp_dir().join(format!("qp-viz-test-{}.json", std::process::id()));
        let json = builtin("qp-creation").unwrap().to_json_pretty().unwrap();
        std::fs::write(&path, json).unwrap();

        let catalog = load_catalog(Some(path.as_path()), None).unwrap();
        assert_eq!(catalog.id, "qp-creation");
        assert!(load_catalog(Some(path.as_path()), Some("qp-creation")).is_ok());
        let err = load_catalog(Some(path.as_path()), Some("connection")).unwrap_err();
        assert!(err.to_string().contains("not 'connection'"));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_scenario_summary() {
        let catalog = builtin("data-plane").unwrap();
        let summary = ScenarioSummary::from(&catalog);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["id"], "data-plane");
        assert_eq!(json["steps"], 8);
        assert_eq!(json["duration_ms"], 7100);
    }
}
