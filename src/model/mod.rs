pub mod action;
pub mod combatant;
pub mod conversation;
pub mod game_state;
pub mod message;
pub mod role;
