use serde::{Deserialize, Serialize};

use crate::engine::rng::GameRng;
use crate::engine::timers::Millis;
use crate::model::action::DefenseChoice;
use crate::model::role::{Role, RoleCapability};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Ai,
    User,
}

/// Identifies one boss attack while its decision windows are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttackId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowTiming {
    pub budget: Millis,
    /// How long an AI-controlled combatant "thinks" before answering.
    pub ai_delay: Millis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionWindow {
    pub attack: AttackId,
    pub opened_at: Millis,
    pub deadline: Millis,
    pub auto_decide_at: Option<Millis>,
}

/// Delivered exactly once per opened window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowResolution {
    pub attack: AttackId,
    pub choice: DefenseChoice,
    pub timed_out: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DamageReport {
    pub dealt: u32,
    /// True only on the call that killed the combatant.
    pub defeated: bool,
}

#[derive(Debug, Clone)]
pub struct Combatant {
    pub name: String,
    pub role: Role,
    pub control: ControlMode,
    /// Left-to-right placement; fixes the turn order at battle start.
    pub position: i32,
    health: u32,
    max_health: u32,
    resource: u32,
    max_resource: u32,
    dead: bool,
    window: Option<DecisionWindow>,
}

impl Combatant {
    pub fn hero(
        name: impl Into<String>,
        role: Role,
        control: ControlMode,
        position: i32,
        max_health: u32,
        max_resource: u32,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            control,
            position,
            health: max_health,
            max_health,
            resource: max_resource,
            max_resource,
            dead: max_health == 0,
            window: None,
        }
    }

    pub fn boss(name: impl Into<String>, max_health: u32) -> Self {
        Self {
            name: name.into(),
            role: Role::Boss,
            control: ControlMode::Ai,
            position: 0,
            health: max_health,
            max_health,
            resource: 0,
            max_resource: 0,
            dead: max_health == 0,
            window: None,
        }
    }

    pub fn health(&self) -> u32 {
        self.health
    }

    pub fn max_health(&self) -> u32 {
        self.max_health
    }

    pub fn resource(&self) -> u32 {
        self.resource
    }

    pub fn max_resource(&self) -> u32 {
        self.max_resource
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn is_alive(&self) -> bool {
        !self.dead
    }

    pub fn health_percent(&self) -> f32 {
        percent(self.health, self.max_health)
    }

    pub fn resource_percent(&self) -> f32 {
        percent(self.resource, self.max_resource)
    }

    pub fn capability(&self) -> &'static RoleCapability {
        self.role.capability()
    }

    pub fn window(&self) -> Option<&DecisionWindow> {
        self.window.as_ref()
    }

    pub fn has_open_window(&self) -> bool {
        self.window.is_some()
    }

    pub fn take_damage(&mut self, amount: u32) -> DamageReport {
        if self.dead {
            return DamageReport::default();
        }

        let dealt = amount.min(self.health);
        self.health -= dealt;

        let defeated = self.health == 0;
        if defeated {
            self.dead = true;
            tracing::info!(combatant = %self.name, "defeated");
        }

        DamageReport { dealt, defeated }
    }

    /// Fails without mutating when the combatant cannot pay.
    pub fn spend_resource(&mut self, amount: u32) -> bool {
        if self.dead || amount > self.resource {
            return false;
        }
        self.resource -= amount;
        true
    }

    /// Returns how much was actually restored.
    pub fn restore_resource(&mut self, amount: u32) -> u32 {
        if self.dead {
            return 0;
        }
        let before = self.resource;
        self.resource = self.resource.saturating_add(amount).min(self.max_resource);
        self.resource - before
    }

    /// Does nothing and returns false if a window is already open or the
    /// combatant is dead.
    pub fn open_decision_window(
        &mut self,
        now: Millis,
        timing: WindowTiming,
        attack: AttackId,
    ) -> bool {
        if self.dead || self.window.is_some() {
            return false;
        }

        let auto_decide_at = match self.control {
            ControlMode::Ai => Some(now + timing.ai_delay.min(timing.budget)),
            ControlMode::User => None,
        };

        self.window = Some(DecisionWindow {
            attack,
            opened_at: now,
            deadline: now + timing.budget,
            auto_decide_at,
        });

        tracing::debug!(combatant = %self.name, attack = attack.0, "decision window opened");
        true
    }

    /// Early resolution. `None` when no window is open (late input).
    pub fn resolve_window(&mut self, choice: DefenseChoice) -> Option<WindowResolution> {
        let window = self.window.take()?;
        Some(WindowResolution {
            attack: window.attack,
            choice,
            timed_out: false,
        })
    }

    /// Resolves with `NoAction` once the deadline has passed.
    pub fn expire_window(&mut self, now: Millis) -> Option<WindowResolution> {
        let deadline = self.window.as_ref()?.deadline;
        if now < deadline {
            return None;
        }
        let window = self.window.take()?;
        tracing::debug!(combatant = %self.name, attack = window.attack.0, "decision window expired");
        Some(WindowResolution {
            attack: window.attack,
            choice: DefenseChoice::NoAction,
            timed_out: true,
        })
    }

    /// Closes the window without producing a resolution.
    pub fn force_close_window(&mut self) -> Option<AttackId> {
        self.window.take().map(|w| w.attack)
    }

    pub fn wants_ai_decision(&self, now: Millis) -> bool {
        self.control == ControlMode::Ai
            && self
                .window
                .and_then(|w| w.auto_decide_at)
                .is_some_and(|at| now >= at)
    }

    /// Local, time-critical defense policy for AI-controlled heroes.
    ///
    /// Low health is checked first; only if that roll does not defend does a
    /// high-resource bonus roll get a chance.
    pub fn choose_defense(&self, rng: &mut GameRng) -> DefenseChoice {
        let Some(defense) = self.capability().defense else {
            return DefenseChoice::NoAction;
        };
        if self.resource < defense.cost {
            return DefenseChoice::NoAction;
        }

        let health_pct = self.health_percent();
        let base = if health_pct < LOW_HEALTH_PERCENT {
            0.9
        } else if health_pct < MID_HEALTH_PERCENT {
            0.6
        } else {
            0.4
        };

        let mut defend = rng.chance(base);
        if !defend && self.resource_percent() > HIGH_RESOURCE_PERCENT {
            defend = rng.chance(0.5);
        }

        if defend {
            DefenseChoice::Defend(defense.action)
        } else {
            DefenseChoice::NoAction
        }
    }
}

const LOW_HEALTH_PERCENT: f32 = 30.0;
const MID_HEALTH_PERCENT: f32 = 60.0;
const HIGH_RESOURCE_PERCENT: f32 = 80.0;

fn percent(value: u32, max: u32) -> f32 {
    if max == 0 {
        return 0.0;
    }
    value as f32 * 100.0 / max as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::action::DefenseAction;

    const TIMING: WindowTiming = WindowTiming {
        budget: 5_000,
        ai_delay: 2_000,
    };

    fn swordman(control: ControlMode) -> Combatant {
        Combatant::hero("Swordman", Role::Melee, control, 0, 50, 50)
    }

    #[test]
    fn health_and_resource_stay_in_bounds() {
        let mut hero = swordman(ControlMode::Ai);

        assert!(!hero.spend_resource(51));
        assert_eq!(hero.resource(), 50);
        assert!(hero.spend_resource(50));
        assert_eq!(hero.resource(), 0);
        assert!(!hero.spend_resource(1));

        assert_eq!(hero.restore_resource(500), 50);
        assert_eq!(hero.resource(), 50);

        let report = hero.take_damage(u32::MAX);
        assert_eq!(report.dealt, 50);
        assert_eq!(hero.health(), 0);
    }

    #[test]
    fn death_latches_and_notifies_once() {
        let mut hero = swordman(ControlMode::Ai);

        let first = hero.take_damage(60);
        assert!(first.defeated);
        assert!(hero.is_dead());

        let second = hero.take_damage(10);
        assert_eq!(second, DamageReport::default());
        assert_eq!(hero.health(), 0);
        assert!(hero.is_dead());

        assert_eq!(hero.restore_resource(10), 0, "the dead accrue nothing");
        assert!(!hero.spend_resource(0), "the dead cannot act");
    }

    #[test]
    fn only_one_window_at_a_time() {
        let mut hero = swordman(ControlMode::User);

        assert!(hero.open_decision_window(0, TIMING, AttackId(1)));
        assert!(!hero.open_decision_window(10, TIMING, AttackId(2)));
        assert_eq!(hero.window().map(|w| w.attack), Some(AttackId(1)));
    }

    #[test]
    fn window_resolves_exactly_once_early() {
        let mut hero = swordman(ControlMode::User);
        hero.open_decision_window(0, TIMING, AttackId(7));

        let resolution = hero.resolve_window(DefenseChoice::Defend(DefenseAction::Block));
        assert_eq!(
            resolution,
            Some(WindowResolution {
                attack: AttackId(7),
                choice: DefenseChoice::Defend(DefenseAction::Block),
                timed_out: false,
            })
        );
        assert!(hero.expire_window(10_000).is_none(), "no timeout after early resolve");
        assert!(hero.resolve_window(DefenseChoice::NoAction).is_none());
    }

    #[test]
    fn window_times_out_exactly_once() {
        let mut hero = swordman(ControlMode::User);
        hero.open_decision_window(1_000, TIMING, AttackId(3));

        assert!(hero.expire_window(5_999).is_none());
        let expired = hero.expire_window(6_000).expect("deadline reached");
        assert_eq!(expired.choice, DefenseChoice::NoAction);
        assert!(expired.timed_out);

        assert!(
            hero.resolve_window(DefenseChoice::Defend(DefenseAction::Block)).is_none(),
            "late input is ignored"
        );
        assert!(hero.open_decision_window(7_000, TIMING, AttackId(4)), "window can reopen");
    }

    #[test]
    fn forced_close_produces_no_resolution() {
        let mut hero = swordman(ControlMode::User);
        hero.open_decision_window(0, TIMING, AttackId(9));

        assert_eq!(hero.force_close_window(), Some(AttackId(9)));
        assert!(hero.expire_window(100_000).is_none());
    }

    #[test]
    fn ai_window_asks_for_a_decision_after_delay() {
        let mut hero = swordman(ControlMode::Ai);
        hero.open_decision_window(0, TIMING, AttackId(1));

        assert!(!hero.wants_ai_decision(1_999));
        assert!(hero.wants_ai_decision(2_000));

        let mut user = swordman(ControlMode::User);
        user.open_decision_window(0, TIMING, AttackId(1));
        assert!(!user.wants_ai_decision(4_999));
    }

    #[test]
    fn ai_without_defense_or_resource_takes_the_hit() {
        let mut rng = GameRng::from_seed(1);

        let caster = Combatant::hero("Magician", Role::Caster, ControlMode::Ai, 2, 50, 50);
        for _ in 0..50 {
            assert_eq!(caster.choose_defense(&mut rng), DefenseChoice::NoAction);
        }

        let mut tired = swordman(ControlMode::Ai);
        tired.spend_resource(40);
        for _ in 0..50 {
            assert_eq!(tired.choose_defense(&mut rng), DefenseChoice::NoAction);
        }
    }

    #[test]
    fn ai_defends_more_often_when_hurt() {
        let mut rng = GameRng::from_seed(42);

        let mut hurt = swordman(ControlMode::Ai);
        hurt.take_damage(40);
        hurt.spend_resource(30);

        let mut healthy = swordman(ControlMode::Ai);
        healthy.spend_resource(30);

        let trials = 2_000;
        let count = |c: &Combatant, rng: &mut GameRng| {
            (0..trials)
                .filter(|_| c.choose_defense(rng) != DefenseChoice::NoAction)
                .count()
        };
        let hurt_rate = count(&hurt, &mut rng);
        let healthy_rate = count(&healthy, &mut rng);

        assert!(
            hurt_rate > healthy_rate,
            "hurt {hurt_rate} should defend more than healthy {healthy_rate}"
        );
    }
}
