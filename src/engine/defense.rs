use crate::engine::rng::GameRng;
use crate::engine::timers::Millis;
use crate::model::action::{AttackScope, BossAttack, DefenseChoice};
use crate::model::combatant::{AttackId, Combatant, DamageReport, WindowResolution, WindowTiming};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttackOutcome {
    /// Unknown attack name, or another attack is still resolving.
    Ignored,
    /// Nobody left to hit; the boss turn can end right away.
    NoTargets,
    Opened {
        id: AttackId,
        attack: BossAttack,
        targets: Vec<usize>,
    },
}

/// Damage applied to one hero when its window closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefenseReport {
    pub hero: usize,
    pub attack: BossAttack,
    pub choice: DefenseChoice,
    pub timed_out: bool,
    pub mitigated: bool,
    pub resource_spent: u32,
    pub damage: DamageReport,
    /// Set on the report that closed the attack's last window.
    pub attack_done: bool,
}

#[derive(Debug)]
struct PendingAttack {
    id: AttackId,
    attack: BossAttack,
    opened: usize,
    resolved: usize,
}

/// Turns a landed boss attack into decision windows and applies damage as
/// each one closes.
#[derive(Debug, Default)]
pub struct DefenseResolver {
    pending: Option<PendingAttack>,
    next_id: u64,
}

impl DefenseResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_attack(
        &mut self,
        now: Millis,
        attack_name: &str,
        heroes: &mut [Combatant],
        rng: &mut GameRng,
        timing: WindowTiming,
    ) -> AttackOutcome {
        let Some(attack) = BossAttack::from_name(attack_name) else {
            tracing::warn!(attack = attack_name, "unknown attack ignored");
            return AttackOutcome::Ignored;
        };
        if let Some(pending) = &self.pending {
            tracing::warn!(
                attack = %attack,
                in_flight = %pending.attack,
                "attack ignored while another is resolving"
            );
            return AttackOutcome::Ignored;
        }

        let living: Vec<usize> = (0..heroes.len()).filter(|&i| heroes[i].is_alive()).collect();
        let candidates = match attack.scope() {
            AttackScope::Global => living,
            AttackScope::Single => rng.pick(&living).map(|&i| vec![i]).unwrap_or_default(),
        };

        self.next_id += 1;
        let id = AttackId(self.next_id);

        let targets: Vec<usize> = candidates
            .into_iter()
            .filter(|&i| heroes[i].open_decision_window(now, timing, id))
            .collect();

        if targets.is_empty() {
            tracing::info!(attack = %attack, "attack found no targets");
            return AttackOutcome::NoTargets;
        }

        tracing::info!(attack = %attack, targets = targets.len(), "decision windows opened");
        self.pending = Some(PendingAttack {
            id,
            attack,
            opened: targets.len(),
            resolved: 0,
        });

        AttackOutcome::Opened { id, attack, targets }
    }

    /// Closes `hero`'s window with the given choice. `None` when no window
    /// was open, so late input does nothing.
    pub fn defend(
        &mut self,
        hero: usize,
        choice: DefenseChoice,
        heroes: &mut [Combatant],
    ) -> Option<DefenseReport> {
        let resolution = heroes.get_mut(hero)?.resolve_window(choice)?;
        self.apply(hero, resolution, heroes)
    }

    /// Lets AI heroes answer and expires overdue windows.
    pub fn update(
        &mut self,
        now: Millis,
        heroes: &mut [Combatant],
        rng: &mut GameRng,
    ) -> Vec<DefenseReport> {
        let mut reports = Vec::new();

        for i in 0..heroes.len() {
            let resolution = if heroes[i].wants_ai_decision(now) {
                let choice = heroes[i].choose_defense(rng);
                heroes[i].resolve_window(choice)
            } else {
                heroes[i].expire_window(now)
            };

            if let Some(resolution) = resolution {
                if let Some(report) = self.apply(i, resolution, heroes) {
                    reports.push(report);
                }
            }
        }

        reports
    }

    fn apply(
        &mut self,
        index: usize,
        resolution: WindowResolution,
        heroes: &mut [Combatant],
    ) -> Option<DefenseReport> {
        let pending = self.pending.as_mut()?;
        if pending.id != resolution.attack {
            tracing::debug!(attack = resolution.attack.0, "stale window resolution");
            return None;
        }

        let hero = &mut heroes[index];
        let base = pending.attack.base_damage();

        // Paid at resolution time; the hero may have spent stamina since.
        let (damage, mitigated, resource_spent) = match resolution.choice {
            DefenseChoice::Defend(action) => match hero.capability().defends_with(action) {
                Some(defense) if hero.spend_resource(defense.cost) => {
                    (defense.mitigate(base), true, defense.cost)
                }
                _ => (base, false, 0),
            },
            DefenseChoice::NoAction => (base, false, 0),
        };

        let report = hero.take_damage(damage);
        tracing::info!(
            hero = %hero.name,
            attack = %pending.attack,
            mitigated,
            damage = report.dealt,
            timed_out = resolution.timed_out,
            "defense resolved"
        );

        pending.resolved += 1;
        let attack = pending.attack;
        let attack_done = pending.resolved >= pending.opened;
        if attack_done {
            self.pending = None;
        }

        Some(DefenseReport {
            hero: index,
            attack,
            choice: resolution.choice,
            timed_out: resolution.timed_out,
            mitigated,
            resource_spent,
            damage: report,
            attack_done,
        })
    }

    /// Drops every open window without applying damage.
    pub fn force_close(&mut self, heroes: &mut [Combatant]) -> usize {
        let closed = heroes
            .iter_mut()
            .filter_map(|hero| hero.force_close_window())
            .count();
        if let Some(pending) = self.pending.take() {
            tracing::debug!(attack = %pending.attack, closed, "attack windows force-closed");
        }
        closed
    }

    pub fn is_resolving(&self) -> bool {
        self.pending.is_some()
    }

    /// Windows still open for the current attack.
    pub fn outstanding(&self) -> usize {
        self.pending
            .as_ref()
            .map(|p| p.opened - p.resolved)
            .unwrap_or(0)
    }
}
