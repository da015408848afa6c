use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use colored::Colorize;
use log::{debug, info};
use nexus_game::{
    Arrival, BundledContent, EngineConfig, GameEngine, GameSession, MemoryStore, Severity,
};
use serde::Serialize;

use super::policy::{Autopilot, GameplayStrategy, PilotAction};

/// Consecutive idle turns after which a run is considered stranded.
const STRANDED_AFTER: u32 = 3;
const FINAL_SLOT: &str = "final";

/// Outcome of one autopilot run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub seed: u64,
    pub strategy: String,
    pub turns_played: u32,
    pub ticks: u64,
    pub credits: i64,
    pub level: u32,
    pub chapter: u32,
    pub systems_visited: u32,
    pub quests_completed: u32,
    pub combats_won: u32,
    pub combats_lost: u32,
    pub trades: u32,
    pub encounters: u32,
    pub events: u32,
    pub rejected_actions: u32,
    pub autosaves: u32,
    pub rng_draws: u64,
    pub stranded: bool,
    pub violations: Vec<String>,
    #[serde(skip)]
    pub duration: Duration,
}

impl RunReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Runs autopilot games against an in-memory save store.
pub struct Simulator {
    config: EngineConfig,
    verbose: bool,
}

impl Simulator {
    #[must_use]
    pub fn new(config: EngineConfig, verbose: bool) -> Self {
        Self { config, verbose }
    }

    /// Play one game for at most `turns` autopilot actions.
    ///
    /// # Errors
    ///
    /// Returns an error if content fails to load or the save store breaks.
    pub fn run(&self, seed: u64, strategy: GameplayStrategy, turns: u32) -> Result<RunReport> {
        let started = Instant::now();
        let engine = GameEngine::with_config(BundledContent, MemoryStore::new(), self.config.clone())
            .context("engine configuration rejected")?;
        let mut pilot = Autopilot::new(strategy.create_policy(seed));
        let mut session = engine
            .create_session(seed, "Autopilot", pilot.ship_class())
            .with_context(|| format!("failed to start seed {seed}"))?;
        info!("Run started | seed:{seed} strategy:{}", pilot.name());

        let mut report = RunReport {
            seed,
            strategy: strategy.label().to_string(),
            turns_played: 0,
            ticks: 0,
            credits: 0,
            level: 0,
            chapter: 0,
            systems_visited: 0,
            quests_completed: 0,
            combats_won: 0,
            combats_lost: 0,
            trades: 0,
            encounters: 0,
            events: 0,
            rejected_actions: 0,
            autosaves: 0,
            rng_draws: 0,
            stranded: false,
            violations: Vec::new(),
            duration: Duration::ZERO,
        };
        let mut idle = 0;

        for turn in 0..turns {
            let action = pilot.next_action(&session);
            report.turns_played = turn + 1;
            if action == PilotAction::Idle {
                idle += 1;
                if idle >= STRANDED_AFTER {
                    report.stranded = true;
                    break;
                }
                continue;
            }
            idle = 0;

            debug!("Turn {turn} | {action:?}");
            if !self.apply(&mut session, &action, &mut report) {
                report.rejected_actions += 1;
                pilot.note_rejection(session.state().tick);
            }
            if engine.autosave(&mut session)? {
                report.autosaves += 1;
            }
            self.show_notifications(&mut session);
            for violation in session.state().audit() {
                let entry = format!("tick {}: {violation}", session.state().tick);
                if !report.violations.contains(&entry) {
                    report.violations.push(entry);
                }
            }
        }

        report.rng_draws = session.rngs().total_draws();
        engine.save(&mut session, FINAL_SLOT)?;
        let reloaded = engine
            .load_session(FINAL_SLOT)?
            .context("final save vanished from the store")?;
        if reloaded.state() != session.state() {
            report
                .violations
                .push(String::from("save and reload changed the game state"));
        }
        session.drain_notifications();

        let state = session.state();
        let stats = &state.player.stats;
        report.ticks = state.tick;
        report.credits = state.player.credits;
        report.level = state.player.level;
        report.chapter = state.story.chapter;
        report.systems_visited = stats.systems_visited;
        report.quests_completed = stats.quests_completed;
        report.combats_won = stats.combats_won;
        report.combats_lost = stats.combats_lost;
        report.trades = stats.trades_completed;
        report.duration = started.elapsed();
        info!(
            "Run finished | seed:{seed} strategy:{} ticks:{} violations:{}",
            report.strategy,
            report.ticks,
            report.violations.len()
        );
        Ok(report)
    }

    /// Carry out one action; `false` when the session refused it.
    fn apply(&self, session: &mut GameSession, action: &PilotAction, report: &mut RunReport) -> bool {
        match action {
            PilotAction::ChooseDialogue(option_id) => session.select_dialogue_option(option_id).is_ok(),
            PilotAction::ResolveEvent(index) => session.resolve_event(*index).is_ok(),
            PilotAction::Combat(combat_action) => session.combat_action(*combat_action).is_ok(),
            PilotAction::FinishCombat => session.finish_combat().is_ok(),
            PilotAction::Sell {
                commodity_id,
                quantity,
            } => session.sell(commodity_id, *quantity).is_ok(),
            PilotAction::Buy {
                commodity_id,
                quantity,
            } => session.buy(commodity_id, *quantity).is_ok(),
            PilotAction::Refuel => session.refuel().is_ok(),
            PilotAction::Repair => session.repair().is_ok(),
            PilotAction::Upgrade(upgrade_id) => session.install_upgrade(upgrade_id).is_ok(),
            PilotAction::Travel(destination) => match session.travel(destination) {
                Ok(arrival) => {
                    match arrival {
                        Arrival::Event { .. } => report.events += 1,
                        Arrival::Combat { .. } => report.encounters += 1,
                        Arrival::Quiet => {}
                    }
                    if self.verbose {
                        println!("  {} {destination} {arrival:?}", "→".cyan());
                    }
                    true
                }
                Err(_) => false,
            },
            PilotAction::Idle => true,
        }
    }

    fn show_notifications(&self, session: &mut GameSession) {
        for note in session.drain_notifications() {
            debug!("Notice | tick:{} {:?} {}", note.tick, note.severity, note.message);
            if !self.verbose {
                continue;
            }
            let line = match note.severity {
                Severity::Info => note.message.normal(),
                Severity::Success => note.message.green(),
                Severity::Warning => note.message.yellow(),
                Severity::Danger => note.message.red(),
            };
            println!("  [{}] {line}", note.tick);
        }
    }
}
