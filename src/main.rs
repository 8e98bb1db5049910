use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::thread;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use black_keep::cli::{self, Args};
use black_keep::config::{self, GameConfig};
use black_keep::engine::engine::Engine;
use black_keep::engine::llm_client::OllamaClient;
use black_keep::engine::oracle::DecisionOracle;
use black_keep::engine::protocol::{EngineCommand, EngineResponse, Outcome};
use black_keep::headless;

fn main() -> anyhow::Result<()> {
    let args = cli::parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let config = load_config(&args)?;

    if args.write_config {
        let path = args.config.clone().unwrap_or_else(config::config_path);
        config.save(&path)?;
        println!("Config written to {}", path.display());
        return Ok(());
    }

    let oracle = build_oracle(&args, &config)?;

    if args.headless {
        let report = headless::run_headless_match(&config, oracle, args.max_duration);
        report.write_json(args.output.as_deref())?;
        return Ok(());
    }

    run_session(config, oracle)
}

fn load_config(args: &Args) -> anyhow::Result<GameConfig> {
    let mut config = GameConfig::load(args.config.as_deref())?;

    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(hero) = args.hero {
        if !config.party.play_as(hero.role()) {
            anyhow::bail!("no party member can play as {hero:?}");
        }
    }

    config.validate()?;
    Ok(config)
}

fn build_oracle(args: &Args, config: &GameConfig) -> anyhow::Result<DecisionOracle> {
    if args.offline {
        tracing::info!("offline mode, decisions are rolled locally");
        return Ok(headless::offline_oracle(config.seed));
    }

    let client = OllamaClient::new(config.oracle.base_url.clone())?;
    match client.test_connection() {
        Ok(models) => tracing::info!(url = %config.oracle.base_url, %models, "LLM service reachable"),
        Err(err) => tracing::warn!(error = %err, "LLM service unreachable, fallbacks will be used"),
    }

    if args.headless {
        Ok(DecisionOracle::inline(client))
    } else {
        Ok(DecisionOracle::threaded(client))
    }
}

fn run_session(config: GameConfig, oracle: DecisionOracle) -> anyhow::Result<()> {
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let (resp_tx, resp_rx) = mpsc::channel();

    let mut engine = Engine::new(cmd_rx, resp_tx, config, oracle)?;
    let worker = thread::spawn(move || engine.run());

    let input_tx = cmd_tx.clone();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if input_tx.send(EngineCommand::Input(line)).is_err() {
                return;
            }
        }
        let _ = input_tx.send(EngineCommand::Quit);
    });

    let mut stdout = io::stdout();
    let mut outcome = None;
    for response in resp_rx {
        match response {
            EngineResponse::Speaker(name) => write!(stdout, "\n{name}: ")?,
            EngineResponse::Reveal(text) => write!(stdout, "{text}")?,
            EngineResponse::LineDone => writeln!(stdout)?,
            EngineResponse::Prompt(text) => write!(stdout, "\n{text}")?,
            EngineResponse::Notice(text) => writeln!(stdout, "\n[{text}]")?,
            EngineResponse::Finished(result) => {
                outcome = result;
                break;
            }
        }
        stdout.flush()?;
    }

    drop(cmd_tx);
    worker
        .join()
        .map_err(|_| anyhow::anyhow!("session thread panicked"))
        .context("session ended abnormally")?;

    match outcome {
        Some(Outcome::Win) => println!("\nThe Black Keep has fallen silent. You won."),
        Some(Outcome::Lose) => println!("\nThe Black Keep claims another party."),
        None => println!("\nFarewell."),
    }
    Ok(())
}
