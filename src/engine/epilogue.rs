use std::collections::VecDeque;

use crate::config::{GameConfig, OracleSettings};
use crate::engine::narration::{NarrationChannel, SayOptions};
use crate::engine::oracle::{DecisionOracle, OracleTicket};
use crate::engine::prompt_builder::PromptBuilder;
use crate::engine::protocol::Outcome;
use crate::engine::rng::GameRng;
use crate::engine::timers::Millis;
use crate::model::message::Speaker;

pub const FALLBACK_MONOLOGUE: &str = "Did you witness my power? Those pathetic mortals dared to challenge me, and now they are nothing but dust beneath my claws. I am eternal, unstoppable!";

const CLOSING_LINES: [&str; 2] = [
    "Perhaps, in time, new heroes will emerge. But for now, the Black Keep stands as a monument to greed and the terrible price of gold.",
    "Thank you for experiencing this journey. May you carry its lessons forward.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Monologue,
    Roar,
    Storyteller,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpilogueEvent {
    Done(Outcome),
}

/// Post-battle narration. A lost battle may first give the boss the last
/// word.
pub struct Epilogue {
    outcome: Outcome,
    boss: String,
    settings: OracleSettings,
    pacing: Millis,
    steps: VecDeque<Step>,
    waiting: Option<(OracleTicket, Step)>,
    started: bool,
    done: bool,
    events: Vec<EpilogueEvent>,
}

impl Epilogue {
    pub fn new(outcome: Outcome, config: &GameConfig) -> Self {
        Self {
            outcome,
            boss: config.combat.boss_name.clone(),
            settings: config.oracle.clone(),
            pacing: config.timings.reply_pacing_ms,
            steps: VecDeque::new(),
            waiting: None,
            started: false,
            done: false,
            events: Vec::new(),
        }
    }

    pub fn start(
        &mut self,
        now: Millis,
        channel: &mut NarrationChannel,
        oracle: &mut DecisionOracle,
        rng: &mut GameRng,
        monologue_probability: f64,
    ) {
        if self.started {
            return;
        }
        self.started = true;

        if self.outcome == Outcome::Lose {
            if rng.chance(monologue_probability) {
                self.steps.push_back(Step::Monologue);
            } else {
                self.steps.push_back(Step::Roar);
            }
        }
        self.steps.push_back(Step::Storyteller);
        self.steps.push_back(Step::Closing);

        tracing::info!(outcome = ?self.outcome, steps = self.steps.len(), "epilogue started");
        self.next_step(now, channel, oracle);
    }

    fn next_step(&mut self, now: Millis, channel: &mut NarrationChannel, oracle: &mut DecisionOracle) {
        while self.waiting.is_none() {
            let Some(step) = self.steps.pop_front() else {
                return;
            };

            match step {
                Step::Monologue => {
                    let request = PromptBuilder::boss_monologue(&self.settings, &self.boss);
                    let ticket = oracle.ask(now, request, self.settings.narrative_timeout_ms);
                    channel.show_thinking();
                    self.waiting = Some((ticket, step));
                }
                Step::Storyteller => {
                    let request = PromptBuilder::storyteller(&self.settings, &self.boss, self.outcome);
                    let ticket = oracle.ask(now, request, self.settings.narrative_timeout_ms);
                    self.waiting = Some((ticket, step));
                }
                Step::Roar => {
                    let line = format!(
                        "{} rears back over the fallen heroes and lets out a thunderous roar of victory.",
                        self.boss
                    );
                    self.present(now, channel, Speaker::Narrator, line);
                }
                Step::Closing => {
                    for line in CLOSING_LINES {
                        self.present(now, channel, Speaker::Narrator, line.to_string());
                    }
                }
            }
        }
    }

    fn present(&self, now: Millis, channel: &mut NarrationChannel, speaker: Speaker, text: String) {
        channel.say(now, text, speaker, SayOptions::queued().hold_for(self.pacing));
    }

    fn fallback(&self, step: Step) -> String {
        match (step, self.outcome) {
            (Step::Monologue, _) => FALLBACK_MONOLOGUE.to_string(),
            (_, Outcome::Win) => format!(
                "The brave warriors have triumphed! Against all odds, they defeated the mighty dragon {} and claimed the treasure of the Black Keep.",
                self.boss
            ),
            (_, Outcome::Lose) => format!(
                "The dragon {} has defeated the human warriors who sought the treasure of the Black Keep. The beast's might proved insurmountable.",
                self.boss
            ),
        }
    }

    pub fn update(&mut self, now: Millis, channel: &mut NarrationChannel, oracle: &mut DecisionOracle) {
        if !self.started || self.done {
            return;
        }
        oracle.pump(now);

        if let Some((ticket, step)) = self.waiting {
            let Some(verdict) = oracle.take(ticket) else {
                return;
            };
            self.waiting = None;

            let text = verdict.into_answer().unwrap_or_else(|| {
                tracing::debug!(?step, "using fallback epilogue text");
                self.fallback(step)
            });
            let speaker = match step {
                Step::Monologue => Speaker::Boss(self.boss.clone()),
                _ => Speaker::Narrator,
            };
            self.present(now, channel, speaker, text);
            self.next_step(now, channel, oracle);
        }

        if self.waiting.is_none() && self.steps.is_empty() && channel.is_idle() {
            self.done = true;
            tracing::info!(outcome = ?self.outcome, "epilogue finished");
            self.events.push(EpilogueEvent::Done(self.outcome));
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn drain_events(&mut self) -> Vec<EpilogueEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn teardown(&mut self, oracle: &mut DecisionOracle) {
        if let Some((ticket, _)) = self.waiting.take() {
            oracle.cancel(ticket);
        }
        self.steps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::narration::NarrationEvent;
    use crate::engine::oracle::{Scripted, ScriptedBackend};

    fn spoken(channel: &mut NarrationChannel) -> Vec<(Speaker, String)> {
        channel
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                NarrationEvent::LineStarted { speaker, text, .. } => Some((speaker, text)),
                _ => None,
            })
            .collect()
    }

    fn run(epilogue: &mut Epilogue, channel: &mut NarrationChannel, oracle: &mut DecisionOracle) {
        let mut now = 0;
        while !epilogue.is_done() && now < 200_000 {
            now += 100;
            channel.update(now);
            epilogue.update(now, channel, oracle);
        }
    }

    #[test]
    fn lost_battle_with_failed_monologue_uses_the_fallback() {
        let config = GameConfig::default();
        let mut channel = NarrationChannel::silent(0);
        let mut oracle = DecisionOracle::scripted(ScriptedBackend::new(|_| Scripted::Fail("offline".into())));
        let mut rng = GameRng::from_seed(1);

        let mut epilogue = Epilogue::new(Outcome::Lose, &config);
        epilogue.start(0, &mut channel, &mut oracle, &mut rng, 1.0);
        run(&mut epilogue, &mut channel, &mut oracle);

        let lines = spoken(&mut channel);
        assert_eq!(lines[0], (Speaker::Boss("Avarrax".into()), FALLBACK_MONOLOGUE.to_string()));
        assert_eq!(lines.len(), 4);
        assert_eq!(epilogue.drain_events(), vec![EpilogueEvent::Done(Outcome::Lose)]);
    }

    #[test]
    fn roar_ending_skips_the_monologue() {
        let config = GameConfig::default();
        let mut channel = NarrationChannel::silent(0);
        let backend = ScriptedBackend::new(|_| Scripted::Reply("The keep is quiet.".into()));
        let log = backend.request_log();
        let mut oracle = DecisionOracle::scripted(backend);
        let mut rng = GameRng::from_seed(1);

        let mut epilogue = Epilogue::new(Outcome::Lose, &config);
        epilogue.start(0, &mut channel, &mut oracle, &mut rng, 0.0);
        run(&mut epilogue, &mut channel, &mut oracle);

        let lines = spoken(&mut channel);
        assert!(lines[0].1.contains("roar"));
        assert_eq!(lines[1].1, "The keep is quiet.");
        assert_eq!(log.len(), 1, "only the storyteller was asked");
    }

    #[test]
    fn victory_has_no_boss_lines() {
        let config = GameConfig::default();
        let mut channel = NarrationChannel::silent(0);
        let mut oracle = DecisionOracle::scripted(ScriptedBackend::silent());
        let mut rng = GameRng::from_seed(1);

        let mut epilogue = Epilogue::new(Outcome::Win, &config);
        epilogue.start(0, &mut channel, &mut oracle, &mut rng, 1.0);
        run(&mut epilogue, &mut channel, &mut oracle);

        let lines = spoken(&mut channel);
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|(speaker, _)| *speaker == Speaker::Narrator));
        assert!(lines[0].1.contains("triumphed"), "timeout falls back to the fixed narration");
    }
}
