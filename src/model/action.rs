use serde::{Deserialize, Serialize};
use std::fmt;

/// Boss attacks. Each name has exactly one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BossAttack {
    BreathFireHigh,
    BreathFireLow,
    Roar,
    StompFoot,
    SweptClaw,
    SweptTail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackScope {
    /// One uniformly chosen living hero.
    Single,
    /// Every living hero at once.
    Global,
}

impl BossAttack {
    pub const ALL: [BossAttack; 6] = [
        BossAttack::BreathFireHigh,
        BossAttack::BreathFireLow,
        BossAttack::Roar,
        BossAttack::StompFoot,
        BossAttack::SweptClaw,
        BossAttack::SweptTail,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BossAttack::BreathFireHigh => "BreathFireHigh",
            BossAttack::BreathFireLow => "BreathFireLow",
            BossAttack::Roar => "Roar",
            BossAttack::StompFoot => "StompFoot",
            BossAttack::SweptClaw => "SweptClaw",
            BossAttack::SweptTail => "SweptTail",
        }
    }

    pub fn base_damage(self) -> u32 {
        match self {
            BossAttack::BreathFireHigh => 25,
            BossAttack::BreathFireLow => 20,
            BossAttack::Roar => 15,
            BossAttack::StompFoot => 18,
            BossAttack::SweptClaw => 30,
            BossAttack::SweptTail => 28,
        }
    }

    pub fn scope(self) -> AttackScope {
        match self {
            BossAttack::BreathFireHigh
            | BossAttack::BreathFireLow
            | BossAttack::Roar
            | BossAttack::StompFoot => AttackScope::Global,
            BossAttack::SweptClaw | BossAttack::SweptTail => AttackScope::Single,
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|attack| attack.name().eq_ignore_ascii_case(name))
    }

    pub fn names() -> Vec<String> {
        Self::ALL.iter().map(|a| a.name().to_string()).collect()
    }
}

impl fmt::Display for BossAttack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Offensive or support actions a hero can take on its own turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeroAction {
    Slash,
    HeavySlash,
    ShootArrow,
    Stab,
    CastSpell,
    CastHeavySpell,
    HealStamina,
}

impl HeroAction {
    pub const ALL: [HeroAction; 7] = [
        HeroAction::Slash,
        HeroAction::HeavySlash,
        HeroAction::ShootArrow,
        HeroAction::Stab,
        HeroAction::CastSpell,
        HeroAction::CastHeavySpell,
        HeroAction::HealStamina,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HeroAction::Slash => "slash",
            HeroAction::HeavySlash => "heavyslash",
            HeroAction::ShootArrow => "shootarrow",
            HeroAction::Stab => "stab",
            HeroAction::CastSpell => "castspell",
            HeroAction::CastHeavySpell => "castheavyspell",
            HeroAction::HealStamina => "healstamina",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|action| action.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for HeroAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefenseAction {
    Block,
    Dodge,
}

impl DefenseAction {
    pub fn name(self) -> &'static str {
        match self {
            DefenseAction::Block => "block",
            DefenseAction::Dodge => "dodge",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "block" => Some(DefenseAction::Block),
            "dodge" => Some(DefenseAction::Dodge),
            _ => None,
        }
    }
}

impl fmt::Display for DefenseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a decision window resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "action", rename_all = "snake_case")]
pub enum DefenseChoice {
    Defend(DefenseAction),
    NoAction,
}

/// Applied when the action's animation completes, never before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionEffect {
    DamageBoss { amount: u32 },
    RestorePartyResource { amount: u32 },
}

/// Anything that gets an animation cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum ActionName {
    Boss(BossAttack),
    Hero(HeroAction),
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionName::Boss(attack) => attack.fmt(f),
            ActionName::Hero(action) => action.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_attack_has_one_scope_and_round_trips_its_name() {
        for attack in BossAttack::ALL {
            assert_eq!(BossAttack::from_name(attack.name()), Some(attack));
            assert_eq!(
                BossAttack::from_name(&attack.name().to_lowercase()),
                Some(attack)
            );
        }
        let globals = BossAttack::ALL
            .iter()
            .filter(|a| a.scope() == AttackScope::Global)
            .count();
        assert_eq!(globals, 4);
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert_eq!(BossAttack::from_name("TailWhip"), None);
        assert_eq!(HeroAction::from_name("fireball"), None);
        assert_eq!(DefenseAction::from_name("parry"), None);
    }
}
