use serde::{Deserialize, Serialize};

use crate::model::combatant::Combatant;
use crate::model::role::Role;

/// A full snapshot of the battle sent to the decision service.
/// This is READ-ONLY outside the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleSnapshot {
    pub round: u32,
    pub boss: CombatantStatus,
    pub heroes: Vec<CombatantStatus>,

    /// Name of the combatant the question is about, if any.
    pub acting: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatantStatus {
    pub name: String,
    pub role: Role,
    pub health: u32,
    pub max_health: u32,
    pub resource: u32,
    pub max_resource: u32,
    pub alive: bool,
}

impl From<&Combatant> for CombatantStatus {
    fn from(c: &Combatant) -> Self {
        CombatantStatus {
            name: c.name.clone(),
            role: c.role,
            health: c.health(),
            max_health: c.max_health(),
            resource: c.resource(),
            max_resource: c.max_resource(),
            alive: c.is_alive(),
        }
    }
}

impl CombatantStatus {
    pub fn health_percent(&self) -> u32 {
        if self.max_health == 0 {
            return 0;
        }
        self.health * 100 / self.max_health
    }
}

impl BattleSnapshot {
    pub fn capture(round: u32, boss: &Combatant, heroes: &[Combatant]) -> Self {
        BattleSnapshot {
            round,
            boss: boss.into(),
            heroes: heroes.iter().map(CombatantStatus::from).collect(),
            acting: None,
        }
    }

    pub fn acting(mut self, name: impl Into<String>) -> Self {
        self.acting = Some(name.into());
        self
    }

    pub fn living_heroes(&self) -> impl Iterator<Item = &CombatantStatus> {
        self.heroes.iter().filter(|h| h.alive)
    }
}
