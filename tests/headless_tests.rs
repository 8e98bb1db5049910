use black_keep::config::GameConfig;
use black_keep::engine::protocol::BattleEvent;
use black_keep::headless::{offline_oracle, run_headless_match};

fn seeded(seed: u64) -> GameConfig {
    GameConfig {
        seed: Some(seed),
        ..GameConfig::default()
    }
}

#[test]
fn offline_match_reaches_an_outcome() {
    let config = seeded(2024);
    let report = run_headless_match(&config, offline_oracle(config.seed), 600.0);

    let outcome = report.outcome.expect("match finished within the time limit");
    assert!(report.rounds >= 1);
    assert_eq!(
        report
            .events
            .iter()
            .filter(|e| matches!(e.event, BattleEvent::GameOver { .. }))
            .count(),
        1
    );
    assert!(matches!(
        report.events.last().map(|e| &e.event),
        Some(BattleEvent::GameOver { outcome: o }) if *o == outcome
    ));

    let boss_down = report.boss.health == 0;
    let party_down = report.heroes.iter().all(|h| h.health == 0);
    assert!(boss_down || party_down, "someone actually lost");
}

#[test]
fn player_setting_is_ignored() {
    let mut config = seeded(5);
    config.party.player = Some("Ronan".into());
    let report = run_headless_match(&config, offline_oracle(config.seed), 600.0);

    assert!(
        !report
            .events
            .iter()
            .any(|e| matches!(e.event, BattleEvent::AwaitingHeroInput { .. })),
        "nobody waits for a human"
    );
}

#[test]
fn same_seed_replays_the_same_match() {
    let config = seeded(77);
    let first = run_headless_match(&config, offline_oracle(config.seed), 600.0);
    let second = run_headless_match(&config, offline_oracle(config.seed), 600.0);

    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}
