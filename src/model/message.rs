use serde::{Deserialize, Serialize};
use std::fmt;

/// Who is talking on the narration channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Speaker {
    Narrator,
    PartyMember(String),
    Boss(String),
}

impl Speaker {
    /// Voice profile handed to the speech collaborator.
    pub fn voice_profile(&self) -> String {
        match self {
            Speaker::Narrator => "storyteller".to_string(),
            Speaker::PartyMember(name) | Speaker::Boss(name) => name.to_lowercase(),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Speaker::Narrator => "Narrator",
            Speaker::PartyMember(name) | Speaker::Boss(name) => name,
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    User(String),
    Roleplay {
        speaker: Speaker,
        text: String,
    },
}
