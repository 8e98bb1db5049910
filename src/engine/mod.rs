pub mod engine;
pub mod protocol;
pub mod timers;
pub mod rng;

pub mod narration;
pub mod oracle;
pub mod defense;
pub mod scheduler;
pub mod conversation;
pub mod epilogue;

pub mod prompt_builder;
pub mod llm_client;
