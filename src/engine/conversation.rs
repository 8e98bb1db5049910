use std::collections::VecDeque;

use crate::config::{ConfigError, GameConfig, OracleSettings, Timings};
use crate::engine::narration::{InputMode, InputRejected, LineToken, NarrationChannel, PlayerInput, SayOptions};
use crate::engine::oracle::{DecisionOracle, OracleTicket, Verdict};
use crate::engine::prompt_builder::PromptBuilder;
use crate::engine::timers::Millis;
use crate::model::conversation::{ConversationState, Participant, Responders};
use crate::model::game_state::CombatantStatus;
use crate::model::message::{Message, Speaker};

pub const FILLER_LINE: &str = "The conversation pauses for a moment...";
pub const PROCEED_LINE: &str = "The party steels themselves and steps forward into the Black Keep...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    /// A companion's reply started on the channel.
    Replied { npc: String },
    /// Fired exactly once, when the party commits to the fight.
    BattleStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationPhase {
    NotStarted,
    Listening,
    Deciding,
    Replying,
    Finished,
}

#[derive(Debug)]
enum Pending {
    Proceed {
        ticket: OracleTicket,
        utterance: String,
    },
    Responders {
        ticket: OracleTicket,
        utterance: String,
    },
    Reply {
        ticket: OracleTicket,
        npc: usize,
        rest: Vec<usize>,
        utterance: String,
    },
}

#[derive(Debug, Clone, Copy)]
struct Reopen {
    delay: Millis,
    not_before: Option<Millis>,
}

/// Runs the pre-battle talk between the player and two companions.
pub struct ConversationDirector {
    state: ConversationState,
    settings: OracleSettings,
    timings: Timings,
    phase: ConversationPhase,
    pending: Option<Pending>,
    reopen: Option<Reopen>,
    /// Replies handed to the channel that have not started yet.
    unannounced: VecDeque<(LineToken, String)>,
    battle_started: bool,
    events: Vec<ConversationEvent>,
}

impl ConversationDirector {
    pub fn new(state: ConversationState, config: &GameConfig) -> Self {
        Self {
            state,
            settings: config.oracle.clone(),
            timings: config.timings.clone(),
            phase: ConversationPhase::NotStarted,
            pending: None,
            reopen: None,
            unannounced: VecDeque::new(),
            battle_started: false,
            events: Vec::new(),
        }
    }

    pub fn from_config(config: &GameConfig) -> Result<Self, ConfigError> {
        config.validate_conversation()?;

        let player = config
            .party
            .player_member()
            .map(|m| m.persona.clone())
            .ok_or_else(|| ConfigError::UnknownPlayer(config.party.player.clone().unwrap_or_default()))?;

        let companions = config.party.companions();
        let [first, second] = companions.as_slice() else {
            return Err(ConfigError::Companions(companions.len()));
        };

        let state = ConversationState::new(
            player,
            [
                Participant::new(first.persona.clone()),
                Participant::new(second.persona.clone()),
            ],
        );
        Ok(Self::new(state, config))
    }

    /// Lets replies mention how the companions are holding up.
    pub fn with_status(mut self, statuses: &[CombatantStatus]) -> Self {
        for npc in self.state.npcs.iter_mut() {
            npc.status = statuses
                .iter()
                .find(|s| s.name == npc.persona.name)
                .cloned();
        }
        self
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn phase(&self) -> ConversationPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase == ConversationPhase::Finished
    }

    pub fn drain_events(&mut self) -> Vec<ConversationEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn start(&mut self, now: Millis, channel: &mut NarrationChannel) {
        if self.phase != ConversationPhase::NotStarted {
            return;
        }

        let [first, second] = self.state.npc_names();
        let opening = format!(
            "You are {}. {} and {} stand with you. What do you say?",
            self.state.player.name, first, second
        );
        channel.say(now, opening.clone(), Speaker::Narrator, SayOptions::default());
        self.state.record(Message::Roleplay {
            speaker: Speaker::Narrator,
            text: opening,
        });

        channel.request_input(now, InputMode::Typed);
        self.phase = ConversationPhase::Listening;
    }

    pub fn submit_text(
        &mut self,
        now: Millis,
        text: &str,
        channel: &mut NarrationChannel,
        oracle: &mut DecisionOracle,
    ) -> Result<(), InputRejected> {
        let input = channel.submit_text(now, text)?;
        self.on_utterance(now, input, channel, oracle);
        Ok(())
    }

    fn on_utterance(
        &mut self,
        now: Millis,
        input: PlayerInput,
        channel: &mut NarrationChannel,
        oracle: &mut DecisionOracle,
    ) {
        let utterance = input.text().to_string();
        tracing::info!(player = %self.state.player.name, utterance = %utterance, "player spoke");

        self.state.record(Message::User(utterance.clone()));
        channel.show_thinking();

        let answers = vec!["yes".to_string(), "no".to_string()];
        let request = PromptBuilder::proceed_check(&self.settings, &utterance);
        let ticket = oracle.decide(now, request, &answers, self.settings.director_timeout_ms);

        self.pending = Some(Pending::Proceed { ticket, utterance });
        self.phase = ConversationPhase::Deciding;
    }

    pub fn update(&mut self, now: Millis, channel: &mut NarrationChannel, oracle: &mut DecisionOracle) {
        if self.phase == ConversationPhase::Finished {
            return;
        }
        oracle.pump(now);

        if let Some(pending) = self.pending.take() {
            self.poll_pending(now, pending, channel, oracle);
        }

        self.announce_started(channel);
        self.maybe_reopen(now, channel);
    }

    /// Line tokens grow monotonically, so a reply has started once the
    /// channel is on it or past it.
    fn announce_started(&mut self, channel: &NarrationChannel) {
        while let Some(&(token, _)) = self.unannounced.front() {
            let started = match channel.current_token() {
                Some(current) => current >= token,
                None => channel.queued() == 0,
            };
            if !started {
                break;
            }
            if let Some((_, npc)) = self.unannounced.pop_front() {
                self.events.push(ConversationEvent::Replied { npc });
            }
        }
    }

    fn poll_pending(
        &mut self,
        now: Millis,
        pending: Pending,
        channel: &mut NarrationChannel,
        oracle: &mut DecisionOracle,
    ) {
        match pending {
            Pending::Proceed { ticket, utterance } => {
                let Some(verdict) = oracle.take(ticket) else {
                    self.pending = Some(Pending::Proceed { ticket, utterance });
                    return;
                };

                match verdict {
                    Verdict::Answer(answer) if answer == "yes" => self.proceed_to_battle(now, channel),
                    Verdict::Failed(reason) => {
                        tracing::warn!(%reason, "proceed check failed");
                        self.filler(now, channel);
                    }
                    _ => self.ask_responders(now, utterance, oracle),
                }
            }

            Pending::Responders { ticket, utterance } => {
                let Some(verdict) = oracle.take(ticket) else {
                    self.pending = Some(Pending::Responders { ticket, utterance });
                    return;
                };

                if let Verdict::Failed(reason) = &verdict {
                    tracing::warn!(%reason, "responder choice failed");
                    self.filler(now, channel);
                    return;
                }

                let responders = self.responders_from(verdict.answer());
                tracing::debug!(?responders, "responders chosen");

                let mut queue: Vec<usize> = responders.indices().to_vec();
                if queue.is_empty() {
                    self.schedule_reopen(self.timings.input_reopen_delay_ms);
                    return;
                }
                let npc = queue.remove(0);
                self.ask_reply(now, npc, queue, utterance, oracle);
            }

            Pending::Reply {
                ticket,
                npc,
                rest,
                utterance,
            } => {
                let Some(verdict) = oracle.take(ticket) else {
                    self.pending = Some(Pending::Reply {
                        ticket,
                        npc,
                        rest,
                        utterance,
                    });
                    return;
                };

                match verdict {
                    Verdict::Answer(text) => {
                        self.present_reply(now, npc, text, channel);
                        let mut rest = rest;
                        if rest.is_empty() {
                            self.schedule_reopen(self.timings.input_reopen_delay_ms);
                        } else {
                            let next = rest.remove(0);
                            self.ask_reply(now, next, rest, utterance, oracle);
                        }
                    }
                    other => {
                        tracing::warn!(npc = %self.state.npcs[npc].persona.name, verdict = ?other, "reply unavailable");
                        self.filler(now, channel);
                    }
                }
            }
        }
    }

    fn responders_from(&self, answer: Option<&str>) -> Responders {
        let [first, second] = self.state.npc_names();
        match answer {
            Some(a) if a.eq_ignore_ascii_case("both") => Responders::Both,
            Some(a) if a.eq_ignore_ascii_case(first) => Responders::First,
            Some(a) if a.eq_ignore_ascii_case(second) => Responders::Second,
            _ => Responders::Neither,
        }
    }

    fn ask_responders(&mut self, now: Millis, utterance: String, oracle: &mut DecisionOracle) {
        let [first, second] = self.state.npc_names();
        let answers = vec![
            "both".to_string(),
            first.to_string(),
            second.to_string(),
            "neither".to_string(),
        ];
        let request = PromptBuilder::responders(&self.settings, &self.state, &utterance, &answers);
        let ticket = oracle.decide(now, request, &answers, self.settings.director_timeout_ms);

        self.pending = Some(Pending::Responders { ticket, utterance });
    }

    fn ask_reply(
        &mut self,
        now: Millis,
        npc: usize,
        rest: Vec<usize>,
        utterance: String,
        oracle: &mut DecisionOracle,
    ) {
        let request = PromptBuilder::npc_reply(&self.settings, &self.state, &self.state.npcs[npc], &utterance);
        let ticket = oracle.ask(now, request, self.settings.reply_timeout_ms);

        self.phase = ConversationPhase::Replying;
        self.pending = Some(Pending::Reply {
            ticket,
            npc,
            rest,
            utterance,
        });
    }

    fn present_reply(&mut self, now: Millis, npc: usize, text: String, channel: &mut NarrationChannel) {
        let name = self.state.npcs[npc].persona.name.clone();
        let speaker = Speaker::PartyMember(name.clone());

        let token = channel.say(
            now,
            text.clone(),
            speaker.clone(),
            SayOptions::queued().hold_for(self.timings.reply_pacing_ms),
        );
        self.state.record(Message::Roleplay { speaker, text });
        self.unannounced.push_back((token, name));
    }

    fn filler(&mut self, now: Millis, channel: &mut NarrationChannel) {
        channel.say(
            now,
            FILLER_LINE,
            Speaker::Narrator,
            SayOptions::queued()
                .hold_for(self.timings.filler_reopen_delay_ms)
                .without_voice(),
        );
        self.schedule_reopen(0);
    }

    fn proceed_to_battle(&mut self, now: Millis, channel: &mut NarrationChannel) {
        if self.battle_started {
            return;
        }
        self.battle_started = true;

        channel.say(
            now,
            PROCEED_LINE,
            Speaker::Narrator,
            SayOptions::default().hold_for(self.timings.reply_pacing_ms),
        );
        self.state.record(Message::Roleplay {
            speaker: Speaker::Narrator,
            text: PROCEED_LINE.to_string(),
        });

        tracing::info!("party proceeds into the keep");
        self.pending = None;
        self.reopen = None;
        self.phase = ConversationPhase::Finished;
        self.events.push(ConversationEvent::BattleStart);
    }

    fn schedule_reopen(&mut self, delay: Millis) {
        self.reopen = Some(Reopen {
            delay,
            not_before: None,
        });
    }

    /// Input comes back once the channel has gone quiet and stayed quiet for
    /// the delay.
    fn maybe_reopen(&mut self, now: Millis, channel: &mut NarrationChannel) {
        let Some(reopen) = self.reopen.as_mut() else {
            return;
        };

        if !channel.is_idle() {
            reopen.not_before = None;
            return;
        }
        let not_before = *reopen.not_before.get_or_insert(now + reopen.delay);
        if now < not_before {
            return;
        }

        self.reopen = None;
        channel.request_input(now, InputMode::Typed);
        self.phase = ConversationPhase::Listening;
    }

    pub fn teardown(&mut self, oracle: &mut DecisionOracle) {
        if let Some(pending) = self.pending.take() {
            let ticket = match pending {
                Pending::Proceed { ticket, .. }
                | Pending::Responders { ticket, .. }
                | Pending::Reply { ticket, .. } => ticket,
            };
            oracle.cancel(ticket);
        }
        self.reopen = None;
        self.unannounced.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::oracle::{Scripted, ScriptedBackend};

    fn director() -> ConversationDirector {
        ConversationDirector::from_config(&GameConfig::default()).unwrap()
    }

    #[test]
    fn opening_names_the_party_and_opens_typed_input() {
        let mut director = director();
        let mut channel = NarrationChannel::silent(0);
        director.start(0, &mut channel);

        assert_eq!(
            channel.visible_text(),
            "You are Ronan. Elric and Seraphine stand with you. What do you say?"
        );
        assert_eq!(channel.input_mode(), Some(&InputMode::Typed));
        assert_eq!(director.phase(), ConversationPhase::Listening);
    }

    #[test]
    fn responder_answers_map_to_participants() {
        let director = director();
        assert_eq!(director.responders_from(Some("both")), Responders::Both);
        assert_eq!(director.responders_from(Some("elric")), Responders::First);
        assert_eq!(director.responders_from(Some("Seraphine")), Responders::Second);
        assert_eq!(director.responders_from(Some("neither")), Responders::Neither);
        assert_eq!(director.responders_from(None), Responders::Neither);
    }

    #[test]
    fn silent_director_keeps_the_conversation_going() {
        let mut director = director();
        let mut channel = NarrationChannel::silent(0);
        let mut oracle = DecisionOracle::scripted(ScriptedBackend::new(|_| Scripted::Silent));
        let timeout = GameConfig::default().oracle.director_timeout_ms;

        director.start(0, &mut channel);
        director.submit_text(0, "hello", &mut channel, &mut oracle).unwrap();
        assert!(channel.is_thinking());

        director.update(timeout, &mut channel, &mut oracle);
        director.update(2 * timeout, &mut channel, &mut oracle);
        let reopen = 2 * timeout + GameConfig::default().timings.input_reopen_delay_ms;
        director.update(reopen, &mut channel, &mut oracle);

        assert_eq!(director.phase(), ConversationPhase::Listening);
        assert_eq!(channel.input_mode(), Some(&InputMode::Typed));
        assert!(director.drain_events().is_empty());
    }

    #[test]
    fn status_is_attached_by_name() {
        let status = CombatantStatus {
            name: "Elric".into(),
            role: crate::model::role::Role::Ranged,
            health: 20,
            max_health: 50,
            resource: 10,
            max_resource: 50,
            alive: true,
        };
        let director = director().with_status(&[status.clone()]);
        assert_eq!(director.state().npcs[0].status, Some(status));
        assert_eq!(director.state().npcs[1].status, None);
    }
}
