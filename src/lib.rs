//! Turn-based boss battle and LLM-driven dialogue core for the Black Keep.
//!
//! The whole crate runs on a virtual millisecond clock: every component is
//! advanced with `update(now)`, so tests and the headless runner can drive
//! a match without sleeping.

pub mod cli;
pub mod config;
pub mod engine;
pub mod headless;
pub mod model;
