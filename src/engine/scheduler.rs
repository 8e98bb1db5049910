use crate::config::GameConfig;
use crate::engine::defense::{AttackOutcome, DefenseReport, DefenseResolver};
use crate::engine::oracle::{DecisionOracle, OracleTicket, Verdict};
use crate::engine::prompt_builder::PromptBuilder;
use crate::engine::protocol::{BattleEvent, CommandRejected, CueId, Outcome, Seat, TurnSkipReason};
use crate::engine::rng::GameRng;
use crate::engine::timers::{Millis, TimerQueue};
use crate::model::action::{ActionEffect, ActionName, BossAttack, DefenseChoice, HeroAction};
use crate::model::combatant::{Combatant, ControlMode};
use crate::model::game_state::{BattleSnapshot, CombatantStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattlePhase {
    Idle,
    Running,
    Over(Outcome),
    /// Torn down before it finished.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BattleTimer {
    BeginTurn { turn: u64 },
    TurnDeadline { turn: u64 },
    Advance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingEffect {
    BossAttack(BossAttack),
    HeroAction { hero: usize, action: HeroAction },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnStage {
    Warmup,
    AwaitingOracle(OracleTicket),
    AwaitingUser,
    Animating { cue: CueId, effect: PendingEffect },
    Defending,
}

#[derive(Debug, Clone, Copy)]
struct Turn {
    serial: u64,
    seat: Seat,
    stage: TurnStage,
}

/// The master turn loop: boss first, then the heroes left to right, round
/// after round until one side is down.
///
/// Everything is driven by `update(now)`. Animations are awaited through
/// [`CueId`]s that the host reports back with [`Battle::complete_cue`].
pub struct Battle {
    config: GameConfig,
    boss: Combatant,
    heroes: Vec<Combatant>,
    order: Vec<Seat>,
    resolver: DefenseResolver,
    timers: TimerQueue<BattleTimer>,
    rng: GameRng,
    phase: BattlePhase,
    cursor: Option<usize>,
    round: u32,
    turn: Option<Turn>,
    turn_serial: u64,
    next_cue: u64,
    stale_tickets: Vec<OracleTicket>,
    events: Vec<BattleEvent>,
}

impl Battle {
    /// Heroes are seated by position; the order never changes afterwards.
    pub fn new(config: GameConfig, boss: Combatant, mut heroes: Vec<Combatant>, rng: GameRng) -> Self {
        heroes.sort_by_key(|h| h.position);

        let mut order = vec![Seat::Boss];
        order.extend((0..heroes.len()).map(Seat::Hero));

        Self {
            config,
            boss,
            heroes,
            order,
            resolver: DefenseResolver::new(),
            timers: TimerQueue::new(),
            rng,
            phase: BattlePhase::Idle,
            cursor: None,
            round: 0,
            turn: None,
            turn_serial: 0,
            next_cue: 0,
            stale_tickets: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn from_config(config: &GameConfig, rng: GameRng) -> Self {
        let boss = Combatant::boss(config.combat.boss_name.clone(), config.combat.boss_max_health);
        Self::new(config.clone(), boss, Self::party_from_config(config), rng)
    }

    /// The configured heroes at full strength, the player's one under user
    /// control.
    pub fn party_from_config(config: &GameConfig) -> Vec<Combatant> {
        let combat = &config.combat;
        let player = config.party.player.as_deref();

        config
            .party
            .members
            .iter()
            .map(|member| {
                let persona = &member.persona;
                let control = if player.is_some_and(|p| p.eq_ignore_ascii_case(&persona.name)) {
                    ControlMode::User
                } else {
                    ControlMode::Ai
                };
                Combatant::hero(
                    persona.name.clone(),
                    persona.role,
                    control,
                    member.position,
                    combat.hero_max_health,
                    combat.hero_max_resource,
                )
            })
            .collect()
    }

    /* =========================
       Accessors
       ========================= */

    pub fn boss(&self) -> &Combatant {
        &self.boss
    }

    pub fn heroes(&self) -> &[Combatant] {
        &self.heroes
    }

    pub fn hero_index(&self, name: &str) -> Option<usize> {
        self.heroes
            .iter()
            .position(|h| h.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn order(&self) -> &[Seat] {
        &self.order
    }

    pub fn phase(&self) -> BattlePhase {
        self.phase
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self.phase {
            BattlePhase::Over(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn is_over(&self) -> bool {
        matches!(self.phase, BattlePhase::Over(_) | BattlePhase::Stopped)
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn current_seat(&self) -> Option<Seat> {
        self.turn.map(|t| t.seat)
    }

    pub fn current_actor(&self) -> Option<&str> {
        self.turn.map(|t| self.seat_name(t.seat))
    }

    /// True while a user-controlled hero may pick an action.
    pub fn is_awaiting_user(&self) -> bool {
        self.turn
            .is_some_and(|t| t.stage == TurnStage::AwaitingUser)
    }

    /// The animation the battle is waiting on, if any.
    pub fn pending_cue(&self) -> Option<CueId> {
        match self.turn?.stage {
            TurnStage::Animating { cue, .. } => Some(cue),
            _ => None,
        }
    }

    pub fn open_windows(&self) -> usize {
        self.resolver.outstanding()
    }

    pub fn snapshot(&self) -> BattleSnapshot {
        let snapshot = BattleSnapshot::capture(self.round, &self.boss, &self.heroes);
        match self.current_actor() {
            Some(actor) => snapshot.acting(actor),
            None => snapshot,
        }
    }

    pub fn drain_events(&mut self) -> Vec<BattleEvent> {
        std::mem::take(&mut self.events)
    }

    fn seat_name(&self, seat: Seat) -> &str {
        match seat {
            Seat::Boss => &self.boss.name,
            Seat::Hero(i) => &self.heroes[i].name,
        }
    }

    /* =========================
       Loop
       ========================= */

    pub fn start(&mut self, now: Millis) {
        if self.phase != BattlePhase::Idle {
            return;
        }
        self.phase = BattlePhase::Running;
        tracing::info!(heroes = self.heroes.len(), boss = %self.boss.name, "battle started");
        self.start_round(now);
    }

    fn start_round(&mut self, now: Millis) {
        self.cursor = None;
        self.begin_round();
        self.advance(now);
    }

    fn begin_round(&mut self) {
        self.round += 1;
        tracing::info!(round = self.round, "round started");
        self.events.push(BattleEvent::RoundStarted { round: self.round });
    }

    /// Moves to the next living seat. A no-op while a turn is in flight.
    pub fn advance(&mut self, now: Millis) {
        if self.phase != BattlePhase::Running {
            return;
        }
        if let Some(turn) = &self.turn {
            tracing::debug!(turn = turn.serial, "advance ignored, turn in flight");
            return;
        }
        if self.check_game_over() {
            return;
        }

        loop {
            let next = self.cursor.map_or(0, |c| c + 1);
            if next >= self.order.len() {
                self.cursor = None;
                self.begin_round();
                continue;
            }
            self.cursor = Some(next);

            let seat = self.order[next];
            match seat {
                Seat::Boss if self.boss.is_dead() => continue,
                Seat::Boss => {}
                Seat::Hero(i) => {
                    if self.heroes[i].is_dead() {
                        continue;
                    }
                    let regen = self.config.combat.resource_regen;
                    if self.heroes[i].restore_resource(regen) > 0 {
                        self.events.push(resource_changed(&self.heroes[i]));
                    }
                }
            }

            self.begin_turn(now, seat);
            return;
        }
    }

    fn begin_turn(&mut self, now: Millis, seat: Seat) {
        self.turn_serial += 1;
        let serial = self.turn_serial;
        let actor = self.seat_name(seat).to_string();

        tracing::info!(round = self.round, actor = %actor, "turn started");
        self.events.push(BattleEvent::TurnStarted {
            actor: actor.clone(),
            seat,
        });

        let timings = &self.config.timings;
        let stage = match seat {
            Seat::Boss => {
                self.timers
                    .schedule(now + timings.boss_turn_delay_ms, BattleTimer::BeginTurn { turn: serial });
                TurnStage::Warmup
            }
            Seat::Hero(i) => match self.heroes[i].control {
                ControlMode::Ai => {
                    self.timers
                        .schedule(now + timings.ai_turn_delay_ms, BattleTimer::BeginTurn { turn: serial });
                    TurnStage::Warmup
                }
                ControlMode::User => {
                    let deadline = now + timings.turn_time_limit_ms;
                    self.timers
                        .schedule(deadline, BattleTimer::TurnDeadline { turn: serial });
                    self.events.push(BattleEvent::AwaitingHeroInput {
                        hero: actor,
                        actions: self.heroes[i]
                            .capability()
                            .offense
                            .iter()
                            .map(|m| m.action)
                            .collect(),
                        deadline,
                    });
                    TurnStage::AwaitingUser
                }
            },
        };

        self.turn = Some(Turn {
            serial,
            seat,
            stage,
        });
    }

    pub fn update(&mut self, now: Millis, oracle: &mut DecisionOracle) {
        for ticket in self.stale_tickets.drain(..) {
            oracle.cancel(ticket);
        }
        if self.phase != BattlePhase::Running {
            return;
        }

        oracle.pump(now);

        while let Some(timer) = self.timers.pop_due(now) {
            self.on_timer(now, timer, oracle);
            if self.phase != BattlePhase::Running {
                return;
            }
        }

        if let Some(Turn {
            stage: TurnStage::AwaitingOracle(ticket),
            ..
        }) = self.turn
        {
            if let Some(verdict) = oracle.take(ticket) {
                self.on_verdict(now, verdict);
            }
        }

        if self.resolver.is_resolving() {
            let reports = self.resolver.update(now, &mut self.heroes, &mut self.rng);
            for report in reports {
                self.on_defense(now, report);
                if self.phase != BattlePhase::Running {
                    return;
                }
            }
        }
    }

    fn on_timer(&mut self, now: Millis, timer: BattleTimer, oracle: &mut DecisionOracle) {
        match timer {
            BattleTimer::Advance => self.advance(now),

            BattleTimer::BeginTurn { turn } => {
                let Some(current) = self.turn.filter(|t| t.serial == turn) else {
                    return;
                };
                match current.seat {
                    Seat::Boss => self.choose_boss_attack(now, oracle),
                    Seat::Hero(i) => {
                        let capability = self.heroes[i].capability();
                        let snapshot = self.snapshot();
                        let status = CombatantStatus::from(&self.heroes[i]);
                        let actions = capability.action_names();
                        let request = PromptBuilder::hero_action(
                            &self.config.oracle,
                            &snapshot,
                            &status,
                            &actions,
                        );
                        let ticket = oracle.decide(
                            now,
                            request,
                            &actions,
                            self.config.oracle.decision_timeout_ms,
                        );
                        self.set_stage(TurnStage::AwaitingOracle(ticket));
                    }
                }
            }

            BattleTimer::TurnDeadline { turn } => {
                let Some(current) = self.turn.filter(|t| t.serial == turn) else {
                    return;
                };
                if current.stage != TurnStage::AwaitingUser {
                    return;
                }
                let actor = self.seat_name(current.seat).to_string();
                tracing::info!(actor = %actor, "turn timed out");
                self.events.push(BattleEvent::TurnSkipped {
                    actor,
                    reason: TurnSkipReason::TimedOut,
                });
                self.end_turn(now);
            }
        }
    }

    fn choose_boss_attack(&mut self, now: Millis, oracle: &mut DecisionOracle) {
        if self.rng.chance(self.config.combat.boss_oracle_probability) {
            let names = BossAttack::names();
            let request = PromptBuilder::boss_attack(&self.config.oracle, &self.snapshot(), &names);
            let ticket = oracle.decide(now, request, &names, self.config.oracle.decision_timeout_ms);
            self.set_stage(TurnStage::AwaitingOracle(ticket));
        } else {
            let attack = self.random_attack();
            self.launch(now, Seat::Boss, PendingEffect::BossAttack(attack));
        }
    }

    fn random_attack(&mut self) -> BossAttack {
        BossAttack::ALL[self.rng.index(BossAttack::ALL.len())]
    }

    fn on_verdict(&mut self, now: Millis, verdict: Verdict) {
        let Some(turn) = self.turn else {
            return;
        };

        match turn.seat {
            Seat::Boss => {
                let attack = match verdict.answer().and_then(BossAttack::from_name) {
                    Some(attack) => attack,
                    None => {
                        tracing::debug!(?verdict, "no usable boss decision, rolling instead");
                        self.random_attack()
                    }
                };
                self.launch(now, Seat::Boss, PendingEffect::BossAttack(attack));
            }
            Seat::Hero(i) => match verdict.answer().and_then(HeroAction::from_name) {
                Some(action) => self.perform(now, i, action),
                None => {
                    let actor = self.heroes[i].name.clone();
                    tracing::info!(actor = %actor, ?verdict, "no decision, turn passes");
                    self.events.push(BattleEvent::TurnSkipped {
                        actor,
                        reason: TurnSkipReason::NoDecision,
                    });
                    self.end_turn(now);
                }
            },
        }
    }

    /// Pays for and starts a hero action. Not enough stamina ends the turn
    /// without effect.
    fn perform(&mut self, now: Millis, hero: usize, action: HeroAction) {
        let Some(offensive) = self.heroes[hero].capability().offensive(action).copied() else {
            tracing::warn!(hero = %self.heroes[hero].name, action = %action, "action not in role");
            self.end_turn(now);
            return;
        };

        if !self.heroes[hero].spend_resource(offensive.cost) {
            let actor = self.heroes[hero].name.clone();
            tracing::info!(
                actor = %actor,
                action = %action,
                cost = offensive.cost,
                resource = self.heroes[hero].resource(),
                "not enough stamina"
            );
            self.events.push(BattleEvent::TurnSkipped {
                actor,
                reason: TurnSkipReason::InsufficientResource,
            });
            self.end_turn(now);
            return;
        }

        self.events.push(resource_changed(&self.heroes[hero]));
        self.launch(now, Seat::Hero(hero), PendingEffect::HeroAction { hero, action });
    }

    fn launch(&mut self, _now: Millis, seat: Seat, effect: PendingEffect) {
        self.next_cue += 1;
        let cue = CueId(self.next_cue);

        let action = match effect {
            PendingEffect::BossAttack(attack) => ActionName::Boss(attack),
            PendingEffect::HeroAction { action, .. } => ActionName::Hero(action),
        };
        let actor = self.seat_name(seat).to_string();

        tracing::info!(actor = %actor, action = %action, cue = cue.0, "action started");
        self.events.push(BattleEvent::ActionStarted { cue, actor, action });
        self.set_stage(TurnStage::Animating { cue, effect });
    }

    /// The presentation layer finished the animation for `cue`. Effects are
    /// applied here and nowhere earlier.
    pub fn complete_cue(&mut self, now: Millis, cue: CueId) -> Result<(), CommandRejected> {
        self.ensure_running()?;

        let effect = match self.turn.map(|t| t.stage) {
            Some(TurnStage::Animating { cue: pending, effect }) if pending == cue => effect,
            _ => return Err(CommandRejected::UnknownCue(cue.0)),
        };

        match effect {
            PendingEffect::BossAttack(attack) => {
                let timing = self.config.window_timing();
                let outcome = self.resolver.handle_attack(
                    now,
                    attack.name(),
                    &mut self.heroes,
                    &mut self.rng,
                    timing,
                );

                match outcome {
                    AttackOutcome::Opened { targets, .. } => {
                        self.events.push(BattleEvent::AttackLanded {
                            attack,
                            targets: targets.iter().map(|&i| self.heroes[i].name.clone()).collect(),
                        });
                        for &i in &targets {
                            if let Some(window) = self.heroes[i].window() {
                                self.events.push(BattleEvent::DefenseWindowOpened {
                                    hero: self.heroes[i].name.clone(),
                                    attack,
                                    deadline: window.deadline,
                                });
                            }
                        }
                        self.set_stage(TurnStage::Defending);
                    }
                    AttackOutcome::NoTargets | AttackOutcome::Ignored => self.end_turn(now),
                }
            }

            PendingEffect::HeroAction { hero, action } => {
                if let Some(offensive) = self.heroes[hero].capability().offensive(action).copied() {
                    self.apply_effect(hero, offensive.effect);
                }
                if self.phase == BattlePhase::Running {
                    self.end_turn(now);
                }
            }
        }

        Ok(())
    }

    fn apply_effect(&mut self, hero: usize, effect: ActionEffect) {
        match effect {
            ActionEffect::DamageBoss { amount } => {
                let report = self.boss.take_damage(amount);
                tracing::info!(
                    hero = %self.heroes[hero].name,
                    damage = report.dealt,
                    boss_health = self.boss.health(),
                    "boss hit"
                );
                self.events.push(health_changed(&self.boss));
                if report.defeated {
                    self.events.push(BattleEvent::Defeated {
                        name: self.boss.name.clone(),
                    });
                    self.check_game_over();
                }
            }
            ActionEffect::RestorePartyResource { amount } => {
                for i in 0..self.heroes.len() {
                    if self.heroes[i].restore_resource(amount) > 0 {
                        self.events.push(resource_changed(&self.heroes[i]));
                    }
                }
            }
        }
    }

    fn on_defense(&mut self, now: Millis, report: DefenseReport) {
        let hero = &self.heroes[report.hero];

        self.events.push(BattleEvent::DefenseResolved {
            hero: hero.name.clone(),
            choice: report.choice,
            timed_out: report.timed_out,
            mitigated: report.mitigated,
            damage: report.damage.dealt,
        });
        if report.resource_spent > 0 {
            self.events.push(resource_changed(hero));
        }
        self.events.push(health_changed(hero));

        if report.damage.defeated {
            self.events.push(BattleEvent::Defeated {
                name: hero.name.clone(),
            });
            if self.check_game_over() {
                return;
            }
        }

        let defending = self
            .turn
            .is_some_and(|t| t.stage == TurnStage::Defending);
        if report.attack_done && defending {
            self.end_turn(now);
        }
    }

    /* =========================
       Commands
       ========================= */

    /// The acting user-controlled hero picks an action.
    pub fn hero_action(
        &mut self,
        now: Millis,
        hero: usize,
        action: HeroAction,
    ) -> Result<(), CommandRejected> {
        self.ensure_running()?;
        let combatant = self.heroes.get(hero).ok_or(CommandRejected::UnknownHero(hero))?;
        let name = combatant.name.clone();

        if combatant.control != ControlMode::User {
            return Err(CommandRejected::NotUserControlled(name));
        }
        let Some(turn) = self.turn.filter(|t| t.seat == Seat::Hero(hero)) else {
            return Err(CommandRejected::NotYourTurn(name));
        };
        if turn.stage != TurnStage::AwaitingUser {
            return Err(CommandRejected::NotReady(name));
        }
        if combatant.capability().offensive(action).is_none() {
            return Err(CommandRejected::ActionNotAllowed { hero: name, action });
        }

        self.timers
            .cancel_where(|t| matches!(t, BattleTimer::TurnDeadline { .. }));
        self.perform(now, hero, action);
        Ok(())
    }

    /// Answers a user-controlled hero's open decision window.
    pub fn defend(
        &mut self,
        now: Millis,
        hero: usize,
        choice: DefenseChoice,
    ) -> Result<(), CommandRejected> {
        self.ensure_running()?;
        let combatant = self.heroes.get(hero).ok_or(CommandRejected::UnknownHero(hero))?;

        if combatant.control != ControlMode::User {
            return Err(CommandRejected::NotUserControlled(combatant.name.clone()));
        }
        if !combatant.has_open_window() {
            return Err(CommandRejected::NoOpenWindow(combatant.name.clone()));
        }

        if let Some(report) = self.resolver.defend(hero, choice, &mut self.heroes) {
            self.on_defense(now, report);
        }
        Ok(())
    }

    /// Every user-controlled hero with an open window uses its role's
    /// defense. Returns how many defended.
    pub fn quick_defend(&mut self, now: Millis) -> usize {
        let candidates: Vec<(usize, DefenseChoice)> = self
            .heroes
            .iter()
            .enumerate()
            .filter(|(_, h)| h.control == ControlMode::User && h.has_open_window())
            .filter_map(|(i, h)| {
                h.capability()
                    .defense
                    .map(|d| (i, DefenseChoice::Defend(d.action)))
            })
            .collect();

        candidates
            .into_iter()
            .filter(|&(i, choice)| self.defend(now, i, choice).is_ok())
            .count()
    }

    fn ensure_running(&self) -> Result<(), CommandRejected> {
        match self.phase {
            BattlePhase::Running => Ok(()),
            _ => Err(CommandRejected::GameOver),
        }
    }

    /* =========================
       Turn end / game over
       ========================= */

    fn set_stage(&mut self, stage: TurnStage) {
        if let Some(turn) = self.turn.as_mut() {
            turn.stage = stage;
        }
    }

    /// Idempotent. Closes leftover windows, then schedules the next seat.
    fn end_turn(&mut self, now: Millis) {
        let Some(turn) = self.turn.take() else {
            return;
        };

        self.resolver.force_close(&mut self.heroes);
        self.timers.cancel_where(|t| {
            matches!(t, BattleTimer::BeginTurn { .. } | BattleTimer::TurnDeadline { .. })
        });
        if let TurnStage::AwaitingOracle(ticket) = turn.stage {
            self.stale_tickets.push(ticket);
        }

        let actor = self.seat_name(turn.seat).to_string();
        tracing::debug!(actor = %actor, "turn ended");
        self.events.push(BattleEvent::TurnEnded { actor });

        if self.check_game_over() {
            return;
        }
        self.timers
            .schedule(now + self.config.timings.end_turn_delay_ms, BattleTimer::Advance);
    }

    /// Latches the outcome the first time one side is down. Lose is checked
    /// before Win.
    fn check_game_over(&mut self) -> bool {
        match self.phase {
            BattlePhase::Over(_) | BattlePhase::Stopped => return true,
            BattlePhase::Idle | BattlePhase::Running => {}
        }

        let outcome = if self.heroes.iter().all(Combatant::is_dead) {
            Outcome::Lose
        } else if self.boss.is_dead() {
            Outcome::Win
        } else {
            return false;
        };

        tracing::info!(?outcome, round = self.round, "game over");
        self.phase = BattlePhase::Over(outcome);
        self.halt();
        self.events.push(BattleEvent::GameOver { outcome });
        true
    }

    fn halt(&mut self) {
        self.timers.clear();
        self.resolver.force_close(&mut self.heroes);
        if let Some(turn) = self.turn.take() {
            if let TurnStage::AwaitingOracle(ticket) = turn.stage {
                self.stale_tickets.push(ticket);
            }
        }
    }

    /// Leaves the battle: cancels timers, windows and oracle work.
    pub fn teardown(&mut self, oracle: &mut DecisionOracle) {
        self.halt();
        for ticket in self.stale_tickets.drain(..) {
            oracle.cancel(ticket);
        }
        if !matches!(self.phase, BattlePhase::Over(_)) {
            self.phase = BattlePhase::Stopped;
        }
        tracing::debug!("battle torn down");
    }
}

fn health_changed(c: &Combatant) -> BattleEvent {
    BattleEvent::HealthChanged {
        name: c.name.clone(),
        health: c.health(),
        percent: c.health_percent(),
    }
}

fn resource_changed(c: &Combatant) -> BattleEvent {
    BattleEvent::ResourceChanged {
        name: c.name.clone(),
        resource: c.resource(),
        percent: c.resource_percent(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::oracle::{Scripted, ScriptedBackend};
    use crate::model::role::Role;

    fn quiet_oracle() -> DecisionOracle {
        DecisionOracle::scripted(ScriptedBackend::silent())
    }

    fn battle(player: Option<&str>) -> Battle {
        let mut config = GameConfig::default();
        config.party.player = player.map(str::to_string);
        config.combat.boss_oracle_probability = 0.0;
        Battle::from_config(&config, GameRng::from_seed(11))
    }

    #[test]
    fn seats_follow_position_with_boss_first() {
        let config = GameConfig::default();
        let boss = Combatant::boss("Avarrax", 300);
        let heroes = vec![
            Combatant::hero("Right", Role::Caster, ControlMode::Ai, 9, 50, 50),
            Combatant::hero("Left", Role::Melee, ControlMode::Ai, -3, 50, 50),
            Combatant::hero("Mid", Role::Ranged, ControlMode::Ai, 0, 50, 50),
        ];
        let battle = Battle::new(config, boss, heroes, GameRng::from_seed(1));

        let names: Vec<&str> = battle.order().iter().map(|&s| battle.seat_name(s)).collect();
        assert_eq!(names, vec!["Avarrax", "Left", "Mid", "Right"]);
    }

    #[test]
    fn boss_opens_every_round() {
        let mut battle = battle(None);
        battle.start(0);

        assert_eq!(battle.round(), 1);
        assert_eq!(battle.current_seat(), Some(Seat::Boss));
        let events = battle.drain_events();
        assert_eq!(events[0], BattleEvent::RoundStarted { round: 1 });
    }

    #[test]
    fn advance_is_ignored_while_a_turn_is_in_flight() {
        let mut battle = battle(None);
        battle.start(0);

        battle.advance(10);
        battle.advance(20);
        assert_eq!(battle.current_seat(), Some(Seat::Boss));
        assert_eq!(battle.turn_serial, 1);
    }

    #[test]
    fn boss_attack_waits_for_its_animation() {
        let mut battle = battle(None);
        let mut oracle = quiet_oracle();
        battle.start(0);

        battle.update(1_000, &mut oracle);
        let cue = battle.pending_cue().expect("boss attack launched");
        assert!(battle.heroes().iter().all(|h| !h.has_open_window()));

        assert_eq!(
            battle.complete_cue(1_001, CueId(cue.0 + 100)),
            Err(CommandRejected::UnknownCue(cue.0 + 100))
        );
        battle.complete_cue(1_500, cue).unwrap();
        assert!(battle.open_windows() > 0);
        assert_eq!(
            battle.complete_cue(1_501, cue),
            Err(CommandRejected::UnknownCue(cue.0)),
            "a cue completes once"
        );
    }

    #[test]
    fn oracle_boss_decision_is_used_when_valid() {
        let mut config = GameConfig::default();
        config.party.player = None;
        config.combat.boss_oracle_probability = 1.0;
        let mut battle = Battle::from_config(&config, GameRng::from_seed(2));
        let mut oracle = DecisionOracle::scripted(ScriptedBackend::new(|_| {
            Scripted::Reply("I choose SweptTail.".into())
        }));

        battle.start(0);
        battle.update(1_000, &mut oracle);
        battle.update(1_001, &mut oracle);

        let started = battle.drain_events().into_iter().find_map(|e| match e {
            BattleEvent::ActionStarted { action, .. } => Some(action),
            _ => None,
        });
        assert_eq!(started, Some(ActionName::Boss(BossAttack::SweptTail)));
    }
}
