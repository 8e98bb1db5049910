use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::timers::Millis;
use crate::model::action::{ActionName, BossAttack, DefenseChoice, HeroAction};

/// Handle for one animation the presentation layer must report back on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CueId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Lose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "seat", content = "index", rename_all = "snake_case")]
pub enum Seat {
    Boss,
    Hero(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnSkipReason {
    /// The oracle gave nothing usable.
    NoDecision,
    InsufficientResource,
    /// The per-turn countdown ran out.
    TimedOut,
}

/// Everything the battle tells the outside world, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BattleEvent {
    RoundStarted {
        round: u32,
    },
    TurnStarted {
        actor: String,
        seat: Seat,
    },
    AwaitingHeroInput {
        hero: String,
        actions: Vec<HeroAction>,
        deadline: Millis,
    },
    /// Play this animation and report back with `complete_cue`.
    ActionStarted {
        cue: CueId,
        actor: String,
        action: ActionName,
    },
    AttackLanded {
        attack: BossAttack,
        targets: Vec<String>,
    },
    DefenseWindowOpened {
        hero: String,
        attack: BossAttack,
        deadline: Millis,
    },
    DefenseResolved {
        hero: String,
        choice: DefenseChoice,
        timed_out: bool,
        mitigated: bool,
        damage: u32,
    },
    HealthChanged {
        name: String,
        health: u32,
        percent: f32,
    },
    ResourceChanged {
        name: String,
        resource: u32,
        percent: f32,
    },
    Defeated {
        name: String,
    },
    TurnSkipped {
        actor: String,
        reason: TurnSkipReason,
    },
    TurnEnded {
        actor: String,
    },
    GameOver {
        outcome: Outcome,
    },
}

/// Why a battle command was refused. A rejection never changes state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandRejected {
    #[error("the battle is over")]
    GameOver,

    #[error("there is no hero #{0}")]
    UnknownHero(usize),

    #[error("{0} is controlled by the AI")]
    NotUserControlled(String),

    #[error("it is not {0}'s turn")]
    NotYourTurn(String),

    #[error("{0} cannot act yet")]
    NotReady(String),

    #[error("{hero} cannot use {action}")]
    ActionNotAllowed { hero: String, action: HeroAction },

    #[error("{0} has no decision window open")]
    NoOpenWindow(String),

    #[error("no animation is waiting on cue {0}")]
    UnknownCue(u64),
}

/* =========================
   Terminal session messages
   ========================= */

pub enum EngineCommand {
    /// One line typed by the player.
    Input(String),
    Quit,
}

pub enum EngineResponse {
    /// A new line starts; print the speaker label.
    Speaker(String),
    /// Newly revealed characters of the current line.
    Reveal(String),
    LineDone,
    Prompt(String),
    Notice(String),
    Finished(Option<Outcome>),
}
