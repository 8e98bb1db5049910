use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use anyhow::Context;

use crate::engine::timers::Millis;
use crate::model::combatant::WindowTiming;
use crate::model::conversation::Persona;
use crate::model::role::Role;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("{name} must be within 0..=1, got {value}")]
    Probability { name: &'static str, value: f64 },

    #[error("the AI defense delay ({delay} ms) must fit inside the decision window ({window} ms)")]
    AiDelayTooLong { delay: Millis, window: Millis },

    #[error("the party needs 1-3 heroes, got {0}")]
    PartySize(usize),

    #[error("player hero '{0}' is not in the party")]
    UnknownPlayer(String),

    #[error("the boss cannot be a party member ('{0}')")]
    BossInParty(String),

    #[error("a conversation needs the player plus exactly two companions, got {0} companions")]
    Companions(usize),
}

/* =========================
   Timings
   ========================= */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub decision_window_ms: Millis,
    pub ai_defense_delay_ms: Millis,
    pub turn_time_limit_ms: Millis,
    pub boss_turn_delay_ms: Millis,
    pub ai_turn_delay_ms: Millis,
    pub end_turn_delay_ms: Millis,
    pub typing_interval_ms: Millis,
    pub reply_pacing_ms: Millis,
    pub input_reopen_delay_ms: Millis,
    pub filler_reopen_delay_ms: Millis,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            decision_window_ms: 5_000,
            ai_defense_delay_ms: 2_000,
            turn_time_limit_ms: 10_000,
            boss_turn_delay_ms: 1_000,
            ai_turn_delay_ms: 1_000,
            end_turn_delay_ms: 500,
            typing_interval_ms: 30,
            reply_pacing_ms: 3_000,
            input_reopen_delay_ms: 500,
            filler_reopen_delay_ms: 2_000,
        }
    }
}

/* =========================
   Combat
   ========================= */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatTuning {
    pub boss_name: String,
    pub boss_max_health: u32,
    pub hero_max_health: u32,
    pub hero_max_resource: u32,
    pub resource_regen: u32,

    /// Chance that a boss turn asks the oracle instead of rolling locally.
    pub boss_oracle_probability: f64,

    /// Chance that a lost battle ends on the boss's spoken monologue.
    pub monologue_probability: f64,
}

impl Default for CombatTuning {
    fn default() -> Self {
        Self {
            boss_name: "Avarrax".into(),
            boss_max_health: 300,
            hero_max_health: 50,
            hero_max_resource: 50,
            resource_regen: 5,
            boss_oracle_probability: 0.5,
            monologue_probability: 0.5,
        }
    }
}

/* =========================
   Oracle
   ========================= */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    pub base_url: String,

    pub decision_model: String,
    pub dialogue_model: String,
    pub narrative_model: String,

    pub decision_temperature: f32,
    pub boss_temperature: f32,
    pub dialogue_temperature: f32,
    pub narrative_temperature: f32,

    pub decision_timeout_ms: Millis,
    pub director_timeout_ms: Millis,
    pub reply_timeout_ms: Millis,
    pub narrative_timeout_ms: Millis,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            decision_model: "gemma:7b".into(),
            dialogue_model: "llama3.1:8b".into(),
            narrative_model: "deepseek-r1:8b".into(),
            decision_temperature: 0.7,
            boss_temperature: 1.0,
            dialogue_temperature: 0.7,
            narrative_temperature: 0.9,
            decision_timeout_ms: 8_000,
            director_timeout_ms: 5_000,
            reply_timeout_ms: 20_000,
            narrative_timeout_ms: 30_000,
        }
    }
}

/* =========================
   Party
   ========================= */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyMember {
    pub persona: Persona,
    /// Left-to-right placement on the battlefield.
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartyConfig {
    pub members: Vec<PartyMember>,

    /// Name of the user-controlled hero. `None` lets the AI play everyone.
    pub player: Option<String>,
}

impl Default for PartyConfig {
    fn default() -> Self {
        Self {
            members: vec![
                PartyMember {
                    persona: Persona {
                        name: "Ronan".into(),
                        class: "Swordsman".into(),
                        role: Role::Melee,
                        personality: "A seasoned swordsman who protects allies. Speaks from experience, not bravado. Favors defensive positioning and reduces risk. Calm, steady, grounded.".into(),
                        perspective: Some("Every fallen comrade weighs on him; he means to bring this party home.".into()),
                    },
                    position: -5,
                },
                PartyMember {
                    persona: Persona {
                        name: "Elric".into(),
                        class: "Archer".into(),
                        role: Role::Ranged,
                        personality: "A disciplined archer who values efficiency over spectacle. Reads the battlefield spatially. Speaks concisely, pragmatically. Favors distance and precision.".into(),
                        perspective: None,
                    },
                    position: 0,
                },
                PartyMember {
                    persona: Persona {
                        name: "Seraphine".into(),
                        class: "Magician".into(),
                        role: Role::Caster,
                        personality: "A magician who knows power reshapes reality. Acts with restraint, warns of magical consequences. Speaks carefully with grave control.".into(),
                        perspective: None,
                    },
                    position: 5,
                },
            ],
            player: Some("Ronan".into()),
        }
    }
}

impl PartyConfig {
    pub fn player_member(&self) -> Option<&PartyMember> {
        let name = self.player.as_deref()?;
        self.members
            .iter()
            .find(|m| m.persona.name.eq_ignore_ascii_case(name))
    }

    /// Makes the first member with `role` the player. Returns false when no
    /// member has it.
    pub fn play_as(&mut self, role: Role) -> bool {
        let Some(member) = self.members.iter().find(|m| m.persona.role == role) else {
            return false;
        };
        self.player = Some(member.persona.name.clone());
        true
    }

    pub fn companions(&self) -> Vec<&PartyMember> {
        let player = self.player_member().map(|m| m.persona.name.as_str());
        self.members
            .iter()
            .filter(|m| Some(m.persona.name.as_str()) != player)
            .collect()
    }
}

/* =========================
   Game config
   ========================= */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GameConfig {
    pub timings: Timings,
    pub combat: CombatTuning,
    pub oracle: OracleSettings,
    pub party: PartyConfig,
    pub seed: Option<u64>,
}

pub fn config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("black_keep");
    path.push("config.json");
    path
}

impl GameConfig {
    /// Loads an explicit file, or the per-user file when `path` is `None`.
    ///
    /// A missing per-user file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("failed to parse config file {}", path.display()))?
            }
            None => {
                let path = config_path();
                match fs::read_to_string(&path) {
                    Ok(contents) => serde_json::from_str(&contents).with_context(|| {
                        format!("failed to parse config file {}", path.display())
                    })?,
                    Err(_) => GameConfig::default(),
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timings;
        for (name, value) in [
            ("decision_window_ms", t.decision_window_ms),
            ("turn_time_limit_ms", t.turn_time_limit_ms),
            ("typing_interval_ms", t.typing_interval_ms),
            ("decision_timeout_ms", self.oracle.decision_timeout_ms),
            ("director_timeout_ms", self.oracle.director_timeout_ms),
            ("reply_timeout_ms", self.oracle.reply_timeout_ms),
            ("narrative_timeout_ms", self.oracle.narrative_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::NotPositive(name));
            }
        }

        if t.ai_defense_delay_ms >= t.decision_window_ms {
            return Err(ConfigError::AiDelayTooLong {
                delay: t.ai_defense_delay_ms,
                window: t.decision_window_ms,
            });
        }

        let c = &self.combat;
        if c.boss_max_health == 0 {
            return Err(ConfigError::NotPositive("boss_max_health"));
        }
        if c.hero_max_health == 0 {
            return Err(ConfigError::NotPositive("hero_max_health"));
        }
        for (name, value) in [
            ("boss_oracle_probability", c.boss_oracle_probability),
            ("monologue_probability", c.monologue_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { name, value });
            }
        }

        let members = &self.party.members;
        if members.is_empty() || members.len() > 3 {
            return Err(ConfigError::PartySize(members.len()));
        }
        if let Some(boss) = members.iter().find(|m| m.persona.role == Role::Boss) {
            return Err(ConfigError::BossInParty(boss.persona.name.clone()));
        }
        if let Some(name) = &self.party.player {
            if self.party.player_member().is_none() {
                return Err(ConfigError::UnknownPlayer(name.clone()));
            }
        }

        Ok(())
    }

    /// Companions are required only when the pre-battle conversation runs.
    pub fn validate_conversation(&self) -> Result<(), ConfigError> {
        if self.party.player_member().is_none() {
            let name = self.party.player.clone().unwrap_or_default();
            return Err(ConfigError::UnknownPlayer(name));
        }
        let companions = self.party.companions().len();
        if companions != 2 {
            return Err(ConfigError::Companions(companions));
        }
        Ok(())
    }

    pub fn window_timing(&self) -> WindowTiming {
        WindowTiming {
            budget: self.timings.decision_window_ms,
            ai_delay: self.timings.ai_defense_delay_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = GameConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.validate_conversation(), Ok(()));
        assert_eq!(config.timings.decision_window_ms, 5_000);
        assert_eq!(config.timings.turn_time_limit_ms, 10_000);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: GameConfig =
            serde_json::from_str(r#"{ "combat": { "boss_oracle_probability": 0.0 }, "seed": 7 }"#)
                .unwrap();
        assert_eq!(config.combat.boss_oracle_probability, 0.0);
        assert_eq!(config.combat.boss_max_health, 300);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.party.members.len(), 3);
    }

    #[test]
    fn rejects_bad_probability_and_unknown_player() {
        let mut config = GameConfig::default();
        config.combat.boss_oracle_probability = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Probability { name: "boss_oracle_probability", .. })
        ));

        let mut config = GameConfig::default();
        config.party.player = Some("Nobody".into());
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnknownPlayer("Nobody".into()))
        );
    }

    #[test]
    fn ai_delay_must_fit_the_window() {
        let mut config = GameConfig::default();
        config.timings.ai_defense_delay_ms = 5_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::AiDelayTooLong { .. })
        ));
    }

    #[test]
    fn conversation_needs_two_companions() {
        let mut config = GameConfig::default();
        config.party.members.pop();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.validate_conversation(), Err(ConfigError::Companions(1)));
    }

    #[test]
    fn play_as_picks_the_member_with_that_role() {
        let mut party = PartyConfig::default();
        assert!(party.play_as(Role::Caster));
        assert_eq!(party.player.as_deref(), Some("Seraphine"));
        assert!(!party.play_as(Role::Boss));
        assert_eq!(party.player.as_deref(), Some("Seraphine"));
    }

    #[test]
    fn save_then_load_from_explicit_path() {
        let dir = std::env::temp_dir().join(format!("black_keep_cfg_{}", std::process::id()));
        let path = dir.join("config.json");

        let mut config = GameConfig::default();
        config.seed = Some(99);
        config.save(&path).unwrap();

        let loaded = GameConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);

        let _ = fs::remove_dir_all(dir);
    }
}
