//! Command-line interface for the Black Keep.
//!
//! Runs an interactive terminal session by default, or a fully simulated
//! match with `--headless`.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Boss battle and party dialogue in the Black Keep
#[derive(Parser, Debug)]
#[command(name = "black_keep")]
#[command(about = "Boss battle and party dialogue in the Black Keep")]
#[command(version)]
pub struct Args {
    /// Config file to load instead of the per-user one
    #[arg(long, value_name = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Write the effective config to disk and exit
    #[arg(long)]
    pub write_config: bool,

    /// Simulate a whole battle with AI heroes and print a JSON report
    #[arg(long)]
    pub headless: bool,

    /// Output path for the match report (headless mode only)
    #[arg(long, value_name = "OUTPUT_PATH")]
    pub output: Option<PathBuf>,

    /// Use local dice instead of the LLM service
    #[arg(long)]
    pub offline: bool,

    /// Random seed for a reproducible match
    #[arg(long)]
    pub seed: Option<u64>,

    /// The character you play
    #[arg(long, value_enum)]
    pub hero: Option<HeroChoice>,

    /// Maximum simulated match duration in seconds (headless mode only)
    #[arg(long, default_value = "600")]
    pub max_duration: f32,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeroChoice {
    Swordman,
    Archer,
    Magician,
}

impl HeroChoice {
    /// The party member this choice stands for in the default party.
    pub fn role(self) -> crate::model::role::Role {
        use crate::model::role::Role;
        match self {
            HeroChoice::Swordman => Role::Melee,
            HeroChoice::Archer => Role::Ranged,
            HeroChoice::Magician => Role::Caster,
        }
    }
}

pub fn parse_args() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_flags_parse() {
        let args = Args::parse_from([
            "black_keep",
            "--headless",
            "--offline",
            "--seed",
            "42",
            "--hero",
            "archer",
        ]);
        assert!(args.headless);
        assert!(args.offline);
        assert_eq!(args.seed, Some(42));
        assert_eq!(args.hero, Some(HeroChoice::Archer));
        assert_eq!(args.max_duration, 600.0);
    }
}
