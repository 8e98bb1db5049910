use serde::{Deserialize, Serialize};

use crate::model::message::Message;
use crate::model::role::Role;
use crate::model::game_state::CombatantStatus;

/// Fixed character sheet used to seed dialogue replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub class: String,
    pub role: Role,
    pub personality: String,

    #[serde(default)]
    pub perspective: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub persona: Persona,

    /// Present once the party knows its combat condition.
    pub status: Option<CombatantStatus>,
}

impl Participant {
    pub fn new(persona: Persona) -> Self {
        Self {
            persona,
            status: None,
        }
    }
}

/// Which non-player participants answer an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Responders {
    First,
    Second,
    Both,
    Neither,
}

impl Responders {
    pub fn indices(self) -> &'static [usize] {
        match self {
            Responders::First => &[0],
            Responders::Second => &[1],
            Responders::Both => &[0, 1],
            Responders::Neither => &[],
        }
    }
}

/// Lives from scene entry until the party walks into battle.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub player: Persona,
    pub npcs: [Participant; 2],
    pub transcript: Vec<Message>,
}

impl ConversationState {
    pub fn new(player: Persona, npcs: [Participant; 2]) -> Self {
        Self {
            player,
            npcs,
            transcript: Vec::new(),
        }
    }

    pub fn record(&mut self, message: Message) {
        self.transcript.push(message);
    }

    pub fn recent(&self, count: usize) -> &[Message] {
        let start = self.transcript.len().saturating_sub(count);
        &self.transcript[start..]
    }

    pub fn npc_names(&self) -> [&str; 2] {
        [
            self.npcs[0].persona.name.as_str(),
            self.npcs[1].persona.name.as_str(),
        ]
    }
}
