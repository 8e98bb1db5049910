use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use crate::config::{ConfigError, GameConfig};
use crate::engine::conversation::{ConversationDirector, ConversationEvent};
use crate::engine::epilogue::{Epilogue, EpilogueEvent};
use crate::engine::narration::{InputRejected, NarrationChannel, NarrationEvent, SilentVoice};
use crate::engine::oracle::DecisionOracle;
use crate::engine::protocol::{BattleEvent, CueId, EngineCommand, EngineResponse, Outcome};
use crate::engine::rng::GameRng;
use crate::engine::scheduler::Battle;
use crate::engine::timers::Millis;
use crate::model::action::{DefenseAction, DefenseChoice, HeroAction};
use crate::model::game_state::CombatantStatus;

const TICK: Duration = Duration::from_millis(16);

/// How long the terminal pretends an animation takes.
pub const ANIMATION_MS: Millis = 800;

enum Stage {
    Conversation(ConversationDirector),
    Battle(Battle),
    Epilogue(Epilogue),
    Done(Option<Outcome>),
}

/// A parsed line typed during the battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleCommand {
    Continue,
    Act(HeroAction),
    Defend(DefenseChoice),
    QuickDefend,
}

impl BattleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let word = line.trim().to_lowercase();
        match word.as_str() {
            "" => Some(Self::Continue),
            "q" | "quick" => Some(Self::QuickDefend),
            "pass" | "none" => Some(Self::Defend(DefenseChoice::NoAction)),
            _ => DefenseAction::from_name(&word)
                .map(|d| Self::Defend(DefenseChoice::Defend(d)))
                .or_else(|| HeroAction::from_name(&word).map(Self::Act)),
        }
    }
}

/// Runs one whole session (talk, fight, epilogue) on its own thread and
/// talks to the terminal over channels.
pub struct Engine {
    rx: Receiver<EngineCommand>,
    tx: Sender<EngineResponse>,
    config: GameConfig,
    channel: NarrationChannel,
    oracle: DecisionOracle,
    rng: GameRng,
    stage: Stage,
    clock: Instant,
    line: String,
    revealed: usize,
    cue: Option<(CueId, Millis)>,
}

impl Engine {
    pub fn new(
        rx: Receiver<EngineCommand>,
        tx: Sender<EngineResponse>,
        config: GameConfig,
        oracle: DecisionOracle,
    ) -> Result<Self, ConfigError> {
        let statuses: Vec<CombatantStatus> = Battle::party_from_config(&config)
            .iter()
            .map(CombatantStatus::from)
            .collect();
        let director = ConversationDirector::from_config(&config)?.with_status(&statuses);
        let channel = NarrationChannel::new(Box::new(SilentVoice), config.timings.typing_interval_ms);
        let rng = GameRng::from_optional_seed(config.seed.map(|s| s.wrapping_add(1)));

        Ok(Self {
            rx,
            tx,
            config,
            channel,
            oracle,
            rng,
            stage: Stage::Conversation(director),
            clock: Instant::now(),
            line: String::new(),
            revealed: 0,
            cue: None,
        })
    }

    fn now(&self) -> Millis {
        self.clock.elapsed().as_millis() as Millis
    }

    fn send(&self, response: EngineResponse) {
        notify(&self.tx, response);
    }

    pub fn run(&mut self) {
        self.send(EngineResponse::Notice(
            "Press Enter to continue a line. Type to speak when prompted.".into(),
        ));
        if let Stage::Conversation(director) = &mut self.stage {
            director.start(0, &mut self.channel);
        }

        loop {
            match self.rx.recv_timeout(TICK) {
                Ok(EngineCommand::Input(line)) => {
                    let now = self.now();
                    self.handle_input(now, &line);
                }
                Ok(EngineCommand::Quit) | Err(RecvTimeoutError::Disconnected) => {
                    self.shutdown();
                    self.send(EngineResponse::Finished(None));
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }

            let now = self.now();
            self.tick(now);

            if let Stage::Done(outcome) = self.stage {
                self.send(EngineResponse::Finished(outcome));
                return;
            }
        }
    }

    fn tick(&mut self, now: Millis) {
        self.channel.update(now);

        let next = match &mut self.stage {
            Stage::Conversation(director) => {
                director.update(now, &mut self.channel, &mut self.oracle);
                for event in director.drain_events() {
                    if let ConversationEvent::Replied { npc } = event {
                        tracing::debug!(npc = %npc, "companion replied");
                    }
                }

                if director.is_finished() && self.channel.is_idle() {
                    let rng = GameRng::from_optional_seed(self.config.seed);
                    Some(Stage::Battle(Battle::from_config(&self.config, rng)))
                } else {
                    None
                }
            }

            Stage::Battle(battle) => {
                if let Some((cue, due)) = self.cue {
                    if now >= due {
                        self.cue = None;
                        if let Err(err) = battle.complete_cue(now, cue) {
                            tracing::debug!(error = %err, "stale animation cue");
                        }
                    }
                }
                battle.update(now, &mut self.oracle);

                for event in battle.drain_events() {
                    if let BattleEvent::ActionStarted { cue, .. } = &event {
                        self.cue = Some((*cue, now + ANIMATION_MS));
                    }
                    if let Some(text) = describe(&event, self.config.party.player.as_deref()) {
                        notify(&self.tx, match event {
                            BattleEvent::AwaitingHeroInput { .. } | BattleEvent::DefenseWindowOpened { .. } => {
                                EngineResponse::Prompt(text)
                            }
                            _ => EngineResponse::Notice(text),
                        });
                    }
                }

                battle.outcome().map(|outcome| {
                    battle.teardown(&mut self.oracle);
                    Stage::Epilogue(Epilogue::new(outcome, &self.config))
                })
            }

            Stage::Epilogue(epilogue) => {
                epilogue.update(now, &mut self.channel, &mut self.oracle);
                epilogue.drain_events().into_iter().next().map(|event| match event {
                    EpilogueEvent::Done(outcome) => Stage::Done(Some(outcome)),
                })
            }

            Stage::Done(_) => None,
        };

        if let Some(next) = next {
            self.enter(now, next);
        }
        self.render();
    }

    fn enter(&mut self, now: Millis, stage: Stage) {
        self.stage = stage;
        match &mut self.stage {
            Stage::Battle(battle) => battle.start(now),
            Stage::Epilogue(epilogue) => {
                let probability = self.config.combat.monologue_probability;
                epilogue.start(now, &mut self.channel, &mut self.oracle, &mut self.rng, probability);
            }
            Stage::Conversation(_) | Stage::Done(_) => {}
        }
    }

    fn handle_input(&mut self, now: Millis, line: &str) {
        match &mut self.stage {
            Stage::Conversation(director) => {
                if line.trim().is_empty() {
                    self.channel.skip(now);
                    return;
                }
                match director.submit_text(now, line, &mut self.channel, &mut self.oracle) {
                    Ok(()) => {}
                    Err(InputRejected::NotOpen) => {
                        self.channel.skip(now);
                    }
                    Err(err) => notify(&self.tx, EngineResponse::Notice(err.to_string())),
                }
            }

            Stage::Battle(battle) => {
                let Some(command) = BattleCommand::parse(line) else {
                    notify(&self.tx, EngineResponse::Notice(format!("Unknown command: {}", line.trim())));
                    return;
                };
                let player = self
                    .config
                    .party
                    .player
                    .as_deref()
                    .and_then(|name| battle.hero_index(name));

                let result = match (command, player) {
                    (BattleCommand::Continue, _) => {
                        self.channel.skip(now);
                        Ok(())
                    }
                    (BattleCommand::QuickDefend, _) => {
                        if battle.quick_defend(now) == 0 {
                            notify(&self.tx, EngineResponse::Notice("Nothing to defend against.".into()));
                        }
                        Ok(())
                    }
                    (_, None) => {
                        notify(&self.tx, EngineResponse::Notice("You are only watching this fight.".into()));
                        Ok(())
                    }
                    (BattleCommand::Act(action), Some(hero)) => battle.hero_action(now, hero, action),
                    (BattleCommand::Defend(choice), Some(hero)) => battle.defend(now, hero, choice),
                };
                if let Err(err) = result {
                    notify(&self.tx, EngineResponse::Notice(err.to_string()));
                }
            }

            Stage::Epilogue(_) | Stage::Done(_) => {
                self.channel.skip(now);
            }
        }
    }

    /// Mirrors the channel's typewriter onto the terminal.
    fn render(&mut self) {
        for event in self.channel.drain_events() {
            match event {
                NarrationEvent::LineStarted { speaker, text, .. } => {
                    self.send(EngineResponse::Speaker(speaker.label().to_string()));
                    self.line = text;
                    self.revealed = 0;
                }
                NarrationEvent::LinePresented { .. } => {
                    let rest: String = self.line.chars().skip(self.revealed).collect();
                    if !rest.is_empty() {
                        self.send(EngineResponse::Reveal(rest));
                    }
                    self.revealed = self.line.chars().count();
                    self.send(EngineResponse::LineDone);
                }
                NarrationEvent::ThinkingShown => {
                    self.send(EngineResponse::Notice("...".into()));
                }
                NarrationEvent::InputOpened(_) => {
                    self.send(EngineResponse::Prompt("> ".into()));
                }
                _ => {}
            }
        }

        if self.channel.current_token().is_some() {
            let visible = self.channel.visible_text();
            let count = visible.chars().count();
            if count > self.revealed {
                let delta: String = visible.chars().skip(self.revealed).collect();
                self.revealed = count;
                self.send(EngineResponse::Reveal(delta));
            }
        }
    }

    fn shutdown(&mut self) {
        match &mut self.stage {
            Stage::Conversation(director) => director.teardown(&mut self.oracle),
            Stage::Battle(battle) => battle.teardown(&mut self.oracle),
            Stage::Epilogue(epilogue) => epilogue.teardown(&mut self.oracle),
            Stage::Done(_) => {}
        }
        self.channel.clear();
        self.oracle.cancel_all();
        tracing::info!("session closed");
    }
}

fn notify(tx: &Sender<EngineResponse>, response: EngineResponse) {
    // The terminal side may already be gone.
    let _ = tx.send(response);
}

/// One terminal line for a battle event, or nothing for bookkeeping events.
pub fn describe(event: &BattleEvent, player: Option<&str>) -> Option<String> {
    let is_player = |name: &str| player.is_some_and(|p| p.eq_ignore_ascii_case(name));

    let text = match event {
        BattleEvent::RoundStarted { round } => format!("-- Round {round} --"),
        BattleEvent::TurnStarted { actor, .. } => format!("{actor}'s turn."),
        BattleEvent::AwaitingHeroInput { actions, .. } => {
            let names: Vec<&str> = actions.iter().map(|a| a.name()).collect();
            format!("Choose an action: {}", names.join(", "))
        }
        BattleEvent::ActionStarted { actor, action, .. } => format!("{actor} uses {action}!"),
        BattleEvent::AttackLanded { targets, .. } => format!("It bears down on {}.", targets.join(", ")),
        BattleEvent::DefenseWindowOpened { hero, attack, .. } if is_player(hero) => {
            format!("{attack} is coming for you! block, dodge or pass (q for quick defense)")
        }
        BattleEvent::DefenseWindowOpened { .. } => return None,
        BattleEvent::DefenseResolved {
            hero,
            choice,
            timed_out,
            damage,
            ..
        } => match (choice, timed_out) {
            (_, true) => format!("{hero} hesitates and takes {damage} damage."),
            (DefenseChoice::Defend(action), false) => format!("{hero} tries to {action} and takes {damage} damage."),
            (DefenseChoice::NoAction, false) => format!("{hero} stands firm and takes {damage} damage."),
        },
        BattleEvent::HealthChanged { name, health, .. } => format!("{name}: {health} HP"),
        BattleEvent::ResourceChanged { .. } => return None,
        BattleEvent::Defeated { name } => format!("{name} has fallen!"),
        BattleEvent::TurnSkipped { actor, reason } => format!("{actor} loses the turn ({reason:?})."),
        BattleEvent::TurnEnded { .. } => return None,
        BattleEvent::GameOver { outcome } => match outcome {
            Outcome::Win => "Victory!".to_string(),
            Outcome::Lose => "Defeat...".to_string(),
        },
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battle_commands_parse() {
        assert_eq!(BattleCommand::parse(""), Some(BattleCommand::Continue));
        assert_eq!(BattleCommand::parse(" Q "), Some(BattleCommand::QuickDefend));
        assert_eq!(
            BattleCommand::parse("block"),
            Some(BattleCommand::Defend(DefenseChoice::Defend(DefenseAction::Block)))
        );
        assert_eq!(
            BattleCommand::parse("pass"),
            Some(BattleCommand::Defend(DefenseChoice::NoAction))
        );
        assert_eq!(
            BattleCommand::parse("HeavySlash"),
            Some(BattleCommand::Act(HeroAction::HeavySlash))
        );
        assert_eq!(BattleCommand::parse("dance"), None);
    }

    #[test]
    fn only_the_players_windows_prompt() {
        let event = BattleEvent::DefenseWindowOpened {
            hero: "Elric".into(),
            attack: crate::model::action::BossAttack::Roar,
            deadline: 5_000,
        };
        assert!(describe(&event, Some("Ronan")).is_none());
        assert!(describe(&event, Some("elric")).is_some());
        assert!(describe(&BattleEvent::TurnEnded { actor: "Ronan".into() }, None).is_none());
    }

    #[test]
    fn companions_know_their_starting_condition() {
        let (_cmd_tx, cmd_rx) = std::sync::mpsc::channel();
        let (resp_tx, _resp_rx) = std::sync::mpsc::channel();
        let config = GameConfig::default();
        let oracle = DecisionOracle::scripted(crate::engine::oracle::ScriptedBackend::silent());

        let engine = Engine::new(cmd_rx, resp_tx, config.clone(), oracle).unwrap();
        let Stage::Conversation(director) = &engine.stage else {
            panic!("session opens with the conversation");
        };
        for npc in &director.state().npcs {
            let status = npc.status.as_ref().expect("status attached");
            assert_eq!(status.name, npc.persona.name);
            assert_eq!(status.health, config.combat.hero_max_health);
        }
    }
}
