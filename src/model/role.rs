use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::action::{ActionEffect, DefenseAction, HeroAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Melee,
    Ranged,
    Caster,
    Boss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffensiveMove {
    pub action: HeroAction,
    pub cost: u32,
    pub effect: ActionEffect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefensiveMove {
    pub action: DefenseAction,
    pub cost: u32,
    /// Share of base damage still taken after a successful defense.
    pub damage_percent: u32,
}

impl DefensiveMove {
    pub fn mitigate(&self, base_damage: u32) -> u32 {
        base_damage * self.damage_percent / 100
    }
}

/// Everything that differs between roles. A role is data, not a subtype.
#[derive(Debug, PartialEq, Eq)]
pub struct RoleCapability {
    pub offense: &'static [OffensiveMove],
    pub defense: Option<DefensiveMove>,
}

static MELEE: RoleCapability = RoleCapability {
    offense: &[
        OffensiveMove {
            action: HeroAction::Slash,
            cost: 5,
            effect: ActionEffect::DamageBoss { amount: 10 },
        },
        OffensiveMove {
            action: HeroAction::HeavySlash,
            cost: 15,
            effect: ActionEffect::DamageBoss { amount: 15 },
        },
    ],
    defense: Some(DefensiveMove {
        action: DefenseAction::Block,
        cost: 15,
        damage_percent: 30,
    }),
};

static RANGED: RoleCapability = RoleCapability {
    offense: &[
        OffensiveMove {
            action: HeroAction::ShootArrow,
            cost: 15,
            effect: ActionEffect::DamageBoss { amount: 15 },
        },
        OffensiveMove {
            action: HeroAction::Stab,
            cost: 5,
            effect: ActionEffect::DamageBoss { amount: 10 },
        },
    ],
    defense: Some(DefensiveMove {
        action: DefenseAction::Dodge,
        cost: 20,
        damage_percent: 0,
    }),
};

static CASTER: RoleCapability = RoleCapability {
    offense: &[
        OffensiveMove {
            action: HeroAction::CastSpell,
            cost: 5,
            effect: ActionEffect::DamageBoss { amount: 10 },
        },
        OffensiveMove {
            action: HeroAction::CastHeavySpell,
            cost: 15,
            effect: ActionEffect::DamageBoss { amount: 15 },
        },
        OffensiveMove {
            action: HeroAction::HealStamina,
            cost: 15,
            effect: ActionEffect::RestorePartyResource { amount: 20 },
        },
    ],
    defense: None,
};

// The boss's attacks live in `BossAttack`; as a seat it has no hero moves.
static BOSS: RoleCapability = RoleCapability {
    offense: &[],
    defense: None,
};

impl Role {
    pub fn capability(self) -> &'static RoleCapability {
        match self {
            Role::Melee => &MELEE,
            Role::Ranged => &RANGED,
            Role::Caster => &CASTER,
            Role::Boss => &BOSS,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Role::Melee => "melee",
            Role::Ranged => "ranged",
            Role::Caster => "caster",
            Role::Boss => "boss",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl RoleCapability {
    pub fn offensive(&self, action: HeroAction) -> Option<&OffensiveMove> {
        self.offense.iter().find(|m| m.action == action)
    }

    /// Allowed answers when the oracle picks this role's action.
    pub fn action_names(&self) -> Vec<String> {
        self.offense
            .iter()
            .map(|m| m.action.name().to_string())
            .collect()
    }

    /// The defensive move if `action` is this role's valid defense.
    pub fn defends_with(&self, action: DefenseAction) -> Option<&DefensiveMove> {
        self.defense.as_ref().filter(|d| d.action == action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_role_has_at_most_one_defense() {
        assert_eq!(
            Role::Melee.capability().defense.map(|d| d.action),
            Some(DefenseAction::Block)
        );
        assert_eq!(
            Role::Ranged.capability().defense.map(|d| d.action),
            Some(DefenseAction::Dodge)
        );
        assert!(Role::Caster.capability().defense.is_none());
        assert!(Role::Boss.capability().defense.is_none());
    }

    #[test]
    fn block_keeps_thirty_percent_rounded_down() {
        let block = Role::Melee.capability().defense.unwrap();
        assert_eq!(block.mitigate(25), 7);
        let dodge = Role::Ranged.capability().defense.unwrap();
        assert_eq!(dodge.mitigate(30), 0);
    }

    #[test]
    fn wrong_defense_for_role_is_not_valid() {
        assert!(Role::Melee.capability().defends_with(DefenseAction::Dodge).is_none());
        assert!(Role::Caster.capability().defends_with(DefenseAction::Block).is_none());
    }
}
