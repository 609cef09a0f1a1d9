//! Terminal rendering of the player state
//!
//! Two host cards side by side, the connection line between them, and the
//! current step's code/parameter panel underneath.

use anyhow::{Context, Result};
use qp_player::catalog::{Action, Catalog, ConnectionStyle, HostId};
use qp_player::{ExchangeKind, Presenter, Projection, StepPlayer};
use std::fmt;
use std::io::Write;

const CARD_WIDTH: usize = 34;
const BAR_WIDTH: usize = 30;

/// Full-screen text view of a player
pub struct StepView<'a>(pub &'a StepPlayer);

impl fmt::Display for StepView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let player = self.0;
        let catalog = player.catalog();
        let total = player.total_steps();

        writeln!(f, "== {} ({}) ==", catalog.name, catalog.id)?;
        match (player.current_index(), player.current_step()) {
            (Some(index), Some(step)) => {
                let phase = catalog.phase_name(step.phase).unwrap_or("");
                writeln!(
                    f,
                    "[{:>2}/{}] Phase {} {} | {}",
                    index + 1,
                    total,
                    step.phase,
                    phase,
                    step.title
                )?;
                writeln!(f, "        {}", step.description)?;
            }
            _ => writeln!(f, "[ 0/{}] Not started", total)?,
        }
        writeln!(f)?;

        let cards = HostId::ALL.map(|host| host_card(player, host));
        for (left, right) in cards[0].iter().zip(cards[1].iter()) {
            writeln!(f, "  {:<width$}{}", left, right, width = CARD_WIDTH)?;
        }
        writeln!(f, "  {}", connection_line(player.projection()))?;

        if let Some(step) = player.current_step() {
            for action in &step.actions {
                if let Action::DataExchange {
                    from_host,
                    to_host,
                    payload,
                    label,
                } = &action.action
                {
                    match label {
                        Some(label) => writeln!(f, "    {} -> {}: {} ({})", from_host, to_host, payload, label)?,
                        None => writeln!(f, "    {} -> {}: {}", from_host, to_host, payload)?,
                    }
                }
            }
            writeln!(f)?;

            if let Some((code, location)) = step.code() {
                for line in code.lines() {
                    writeln!(f, "  | {}", line)?;
                }
                if let Some(location) = location {
                    writeln!(f, "  @ {}", location)?;
                }
            }
            let params: Vec<_> = step.parameters().collect();
            if !params.is_empty() {
                writeln!(f, "  Parameters:")?;
                for param in params {
                    writeln!(f, "    - {}", param)?;
                }
            }
            for info in step.info() {
                writeln!(f, "  i {}", info)?;
            }
            if let Some(success) = step.success() {
                writeln!(f, "  ✓ {}", success)?;
            }
        }

        writeln!(
            f,
            "{} | {}x",
            if player.is_playing() { "▶ playing" } else { "⏸ paused" },
            player.speed()
        )
    }
}

/// Three lines per host: name, QP state, resources
fn host_card(player: &StepPlayer, host: HostId) -> [String; 3] {
    let state = player.host(host);
    let highlights: Vec<_> = player
        .current_step()
        .map(|step| step.highlights(host).collect())
        .unwrap_or_default();

    let name = if highlights.is_empty() {
        host.to_string()
    } else {
        format!("{} [{}]", host, highlights.join(", "))
    };
    let qp = format!("QP: {}", state.qp_state);
    let resources = if state.resources.is_empty() {
        "Resources: -".to_string()
    } else {
        let labels: Vec<_> = state.resources.iter().map(|r| r.label()).collect();
        format!("Resources: {}", labels.join(" "))
    };

    [name, qp, resources]
}

fn connection_line(projection: &Projection) -> String {
    let line = match projection.connection() {
        None => return String::new(),
        Some(ConnectionStyle::Dashed) => "- - - - - - - - - -",
        Some(ConnectionStyle::Solid) => "===================",
    };
    match projection.exchange() {
        Some(ExchangeKind::QpInfo) => format!("Host A <{}> Host B   (QP info exchange)", line),
        Some(ExchangeKind::Data) => format!("Host A <{}> Host B   (RDMA data transfer)", line),
        None => format!("Host A <{}> Host B", line),
    }
}

/// `[#####.....]  42%` style bar for a fraction in `[0, 1]`
pub fn progress_bar(fraction: f64) -> String {
    let fraction = fraction.clamp(0.0, 1.0);
    let filled = (fraction * BAR_WIDTH as f64).round() as usize;
    format!(
        "[{}{}] {:>3.0}%",
        "#".repeat(filled),
        ".".repeat(BAR_WIDTH - filled),
        fraction * 100.0
    )
}

/// Scenario summary for `list`
pub struct CatalogListing<'a>(pub &'a Catalog);

impl fmt::Display for CatalogListing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let catalog = self.0;
        writeln!(
            f,
            "{} - {} ({} steps, {:.1}s at 1x)",
            catalog.id,
            catalog.name,
            catalog.len(),
            catalog.total_duration().as_secs_f64()
        )?;
        if !catalog.description.is_empty() {
            writeln!(f, "  {}", catalog.description)?;
        }
        for (index, step) in catalog.steps.iter().enumerate() {
            writeln!(f, "  {:>2}. [phase {}] {}", index + 1, step.phase, step.title)?;
        }
        Ok(())
    }
}

/// Presenter that writes each state to a stream, as text or JSON lines
pub struct TextPresenter<W: Write> {
    out: W,
    json: bool,
}

impl<W: Write> TextPresenter<W> {
    pub fn new(out: W, json: bool) -> Self {
        Self { out, json }
    }
}

impl<W: Write> Presenter for TextPresenter<W> {
    fn present(&mut self, player: &StepPlayer) -> Result<()> {
        if self.json {
            serde_json::to_writer(&mut self.out, &player.snapshot())
                .context("Failed to serialize snapshot")?;
            writeln!(self.out)?;
        } else {
            writeln!(self.out, "{}", StepView(player))?;
        }
        self.out.flush().context("Failed to flush output")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qp_player::builtin;
    use std::sync::Arc;

    fn connection_at(index: usize) -> StepPlayer {
        let mut player = StepPlayer::new(Arc::new(builtin("connection").unwrap()));
        player.go_to_step(index);
        player
    }

    #[test]
    fn test_render_not_started() {
        let player = StepPlayer::new(Arc::new(builtin("connection").unwrap()));
        let text = StepView(&player).to_string();
        assert!(text.contains("Not started"));
        assert!(text.contains("QP: -"));
        assert!(text.contains("Resources: -"));
        assert!(text.contains("⏸ paused"));
    }

    #[test]
    fn test_render_exchange_step() {
        let text = StepView(&connection_at(10)).to_string();
        assert!(text.contains("[11/18] Phase 2 QP creation | Exchange QP info"));
        assert!(text.contains("- - - -"));
        assert!(text.contains("(QP info exchange)"));
        assert!(text.contains("Host A -> Host B: QP-INFO (QPN_A, GID_A)"));
        assert!(text.contains("Host B -> Host A: QP-INFO (QPN_B, GID_B)"));
        assert!(text.contains("Resources: PD CQ MR"));
        assert!(text.contains("  @ src/rdma_common_net.c"));
    }

    #[test]
    fn test_render_connected_step() {
        let text = StepView(&connection_at(17)).to_string();
        assert!(text.contains("QP: RTS"));
        assert!(text.contains("====="));
        assert!(text.contains("(RDMA data transfer)"));
        assert!(text.contains("✓ RDMA connection ready for data transfer!"));
    }

    #[test]
    fn test_render_hides_line_without_connection() {
        let player = connection_at(12);
        assert_eq!(connection_line(player.projection()), "");
        let text = StepView(&player).to_string();
        assert!(text.contains("Parameters:") || text.contains("i Host B"));
    }

    #[test]
    fn test_host_card_highlights() {
        let player = connection_at(0);
        let [name, qp, resources] = host_card(&player, HostId::A);
        assert_eq!(name, "Host A [rnic]");
        assert_eq!(qp, "QP: -");
        assert_eq!(resources, "Resources: -");
        assert_eq!(host_card(&player, HostId::B)[0], "Host B");
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0.0), format!("[{}]   0%", ".".repeat(30)));
        assert_eq!(progress_bar(1.0), format!("[{}] 100%", "#".repeat(30)));
        assert_eq!(progress_bar(0.5), format!("[{}{}]  50%", "#".repeat(15), ".".repeat(15)));
        assert_eq!(progress_bar(7.0), progress_bar(1.0));
    }

    #[test]
    fn test_catalog_listing() {
        let catalog = builtin("qp-creation").unwrap();
        let text = CatalogListing(&catalog).to_string();
        assert!(text.starts_with("qp-creation - QP creation flow (8 steps, 7.2s at 1x)"));
        assert!(text.contains("   1. [phase 1] Allocate protection domain (PD)"));
    }

    #[test]
    fn test_json_presenter_writes_lines() {
        let player = connection_at(3);
        let mut buf = Vec::new();
        let mut presenter = TextPresenter::new(&mut buf, true);
        presenter.present(&player).unwrap();
        presenter.present(&player).unwrap();
        drop(presenter);

        let out = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let snapshot: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(snapshot["index"], 3);
        assert_eq!(snapshot["state"]["hosts"][0]["resources"], serde_json::json!(["PD", "CQ", "MR"]));
    }
}
