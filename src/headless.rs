//! Headless match execution
//!
//! Runs a whole battle with AI-controlled heroes on a simulated clock,
//! suitable for automated testing and balance runs.

use serde::Serialize;
use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::config::GameConfig;
use crate::engine::oracle::{DecisionOracle, DiceService};
use crate::engine::protocol::{BattleEvent, CueId, Outcome};
use crate::engine::rng::GameRng;
use crate::engine::scheduler::Battle;
use crate::engine::timers::Millis;
use crate::model::game_state::CombatantStatus;

/// Simulated clock step.
pub const STEP_MS: Millis = 10;

/// How long every animation takes in a simulated match.
pub const ANIMATION_MS: Millis = 800;

const DICE_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// One battle event with the simulated time it happened at.
#[derive(Debug, Clone, Serialize)]
pub struct LoggedEvent {
    pub at_ms: Millis,
    #[serde(flatten)]
    pub event: BattleEvent,
}

/// Result of a completed headless match
#[derive(Debug, Clone, Serialize)]
pub struct MatchReport {
    /// `None` when the time limit ran out first
    pub outcome: Option<Outcome>,
    /// Rounds started, including the last one
    pub rounds: u32,
    /// Simulated match length
    pub duration_ms: Millis,
    /// Random seed used (if deterministic mode)
    pub seed: Option<u64>,
    pub boss: CombatantStatus,
    pub heroes: Vec<CombatantStatus>,
    pub events: Vec<LoggedEvent>,
}

impl MatchReport {
    /// Writes the report as pretty JSON to `path`, or to stdout.
    pub fn write_json(&self, path: Option<&Path>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        match path {
            Some(path) => {
                fs::write(path, json)
                    .with_context(|| format!("failed to write match report {}", path.display()))?;
                tracing::info!(path = %path.display(), "match report written");
            }
            None => println!("{json}"),
        }
        Ok(())
    }
}

/// Oracle backed by local dice, seeded from the match seed so a seeded run
/// replays exactly.
pub fn offline_oracle(seed: Option<u64>) -> DecisionOracle {
    let rng = GameRng::from_optional_seed(seed.map(|s| s ^ DICE_SALT));
    DecisionOracle::inline(DiceService::new(rng))
}

/// Plays one battle to the end or until `max_duration_secs` of simulated
/// time have passed. Every hero is AI-controlled regardless of the party's
/// player setting.
pub fn run_headless_match(config: &GameConfig, mut oracle: DecisionOracle, max_duration_secs: f32) -> MatchReport {
    let mut config = config.clone();
    config.party.player = None;

    let max_duration = (max_duration_secs.max(0.0) * 1000.0) as Millis;
    let mut battle = Battle::from_config(&config, GameRng::from_optional_seed(config.seed));
    let mut events = Vec::new();
    let mut cue: Option<(CueId, Millis)> = None;
    let mut now: Millis = 0;

    tracing::info!(seed = ?config.seed, max_duration, "headless match started");
    battle.start(now);

    loop {
        if let Some((pending, due)) = cue {
            if now >= due {
                cue = None;
                if let Err(err) = battle.complete_cue(now, pending) {
                    tracing::debug!(error = %err, "animation cue no longer wanted");
                }
            }
        }
        battle.update(now, &mut oracle);

        for event in battle.drain_events() {
            if let BattleEvent::ActionStarted { cue: started, .. } = event {
                cue = Some((started, now + ANIMATION_MS));
            }
            events.push(LoggedEvent { at_ms: now, event });
        }

        if battle.is_over() || now >= max_duration {
            break;
        }
        now += STEP_MS;
    }

    let outcome = battle.outcome();
    if outcome.is_none() {
        tracing::warn!(duration = now, "headless match hit the time limit");
    }
    battle.teardown(&mut oracle);

    MatchReport {
        outcome,
        rounds: battle.round(),
        duration_ms: now,
        seed: config.seed,
        boss: battle.boss().into(),
        heroes: battle.heroes().iter().map(CombatantStatus::from).collect(),
        events,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_duration_stops_after_the_first_step() {
        let config = GameConfig {
            seed: Some(3),
            ..GameConfig::default()
        };
        let report = run_headless_match(&config, offline_oracle(config.seed), 0.0);

        assert_eq!(report.outcome, None);
        assert_eq!(report.duration_ms, 0);
        assert_eq!(report.rounds, 1);
        assert!(matches!(report.events[0].event, BattleEvent::RoundStarted { round: 1 }));
    }

    #[test]
    fn report_serializes_with_flattened_events() {
        let config = GameConfig {
            seed: Some(3),
            ..GameConfig::default()
        };
        let report = run_headless_match(&config, offline_oracle(config.seed), 0.0);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["outcome"], serde_json::Value::Null);
        assert_eq!(json["events"][0]["event"], "round_started");
        assert_eq!(json["events"][0]["at_ms"], 0);
    }
}
