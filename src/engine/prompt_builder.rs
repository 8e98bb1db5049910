use crate::config::OracleSettings;
use crate::engine::oracle::OracleRequest;
use crate::engine::protocol::Outcome;
use crate::model::conversation::{ConversationState, Participant};
use crate::model::game_state::{BattleSnapshot, CombatantStatus};
use crate::model::message::Message;

/// Builds every request sent to the decision service.
/// This struct only formats text: no parsing, no networking.
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn boss_attack(settings: &OracleSettings, snapshot: &BattleSnapshot, attacks: &[String]) -> OracleRequest {
        let mut prompt = String::new();

        prompt.push_str(&format!(
            "You are {}, a dragon boss in combat.\n\n",
            snapshot.boss.name
        ));
        push_battle_state(&mut prompt, snapshot);
        let targets: Vec<&str> = snapshot.living_heroes().map(|h| h.name.as_str()).collect();
        prompt.push_str(&format!("Living Targets: {}\n\n", targets.join(", ")));
        push_allowed_answers(&mut prompt, "Allowed Attacks", attacks);
        prompt.push_str(
            "Respond with ONLY ONE ATTACK from the allowed list. No explanation.\n",
        );

        OracleRequest {
            model: settings.decision_model.clone(),
            system: None,
            prompt,
            temperature: settings.boss_temperature,
            answers: attacks.to_vec(),
            timeout: 0,
        }
    }

    pub fn hero_action(
        settings: &OracleSettings,
        snapshot: &BattleSnapshot,
        hero: &CombatantStatus,
        actions: &[String],
    ) -> OracleRequest {
        let mut prompt = String::new();

        prompt.push_str(
            "You are an AI agent controlling a character in a turn-based RPG combat game.\n\n",
        );
        push_battle_state(&mut prompt, snapshot);
        prompt.push_str(&format!("You are: {}\n", hero.name));
        prompt.push_str(&format!(
            "Your Stats: {}/{} HP, {}/{} Stamina\n\n",
            hero.health, hero.max_health, hero.resource, hero.max_resource
        ));
        push_allowed_answers(&mut prompt, "Allowed Actions", actions);
        prompt.push_str(
            "Respond with ONLY ONE ACTION from the allowed list. No explanation, just the action name.\n",
        );

        OracleRequest {
            model: settings.decision_model.clone(),
            system: None,
            prompt,
            temperature: settings.decision_temperature,
            answers: actions.to_vec(),
            timeout: 0,
        }
    }

    pub fn proceed_check(settings: &OracleSettings, utterance: &str) -> OracleRequest {
        let mut prompt = String::new();

        prompt.push_str(&format!("Analyze this player input: \"{}\"\n\n", utterance.trim()));
        prompt.push_str(
            "Does this indicate the party wants to proceed deeper into the keep, move forward, or end the conversation?\n\
Look for phrases like: \"let's go\", \"we should go\", \"proceed\", \"move forward\", \"enter\", \"continue\".\n\n",
        );
        prompt.push_str("Respond with only: \"yes\" or \"no\"\n");

        OracleRequest {
            model: settings.dialogue_model.clone(),
            system: Some("You are a conversation director. Answer yes or no.".into()),
            prompt,
            temperature: 0.0,
            answers: Vec::new(),
            timeout: 0,
        }
    }

    pub fn responders(
        settings: &OracleSettings,
        state: &ConversationState,
        utterance: &str,
        answers: &[String],
    ) -> OracleRequest {
        let mut prompt = String::new();

        prompt.push_str("Given this conversation context:\n");
        push_history_lines(&mut prompt, state.recent(6));
        prompt.push_str(&format!(
            "{} just said: \"{}\"\n\n",
            state.player.name,
            utterance.trim()
        ));

        let [first, second] = &state.npcs;
        prompt.push_str(&format!(
            "Who should respond? {} ({}) or {} ({})? Both, or neither?\n\n",
            first.persona.name, first.persona.class, second.persona.name, second.persona.class
        ));
        push_allowed_answers(&mut prompt, "Allowed Answers", answers);
        prompt.push_str("Respond with just one of the allowed answers.\n");

        OracleRequest {
            model: settings.dialogue_model.clone(),
            system: Some("You are a conversation director. Decide who should respond.".into()),
            prompt,
            temperature: 0.0,
            answers: answers.to_vec(),
            timeout: 0,
        }
    }

    pub fn npc_reply(
        settings: &OracleSettings,
        state: &ConversationState,
        npc: &Participant,
        utterance: &str,
    ) -> OracleRequest {
        let mut system = String::new();
        push_persona_section(&mut system, npc);
        push_reply_rules(&mut system);

        let mut prompt = String::new();
        let earlier = state.transcript.len().saturating_sub(1);
        let history = &state.transcript[..earlier];
        if !history.is_empty() {
            prompt.push_str("RECENT HISTORY:\n");
            let start = history.len().saturating_sub(6);
            push_history_lines(&mut prompt, &history[start..]);
        }
        prompt.push_str(&format!(
            "{} says: \"{}\"\n\nHow do you respond?",
            state.player.name,
            utterance.trim()
        ));

        OracleRequest {
            model: settings.dialogue_model.clone(),
            system: Some(system),
            prompt,
            temperature: settings.dialogue_temperature,
            answers: Vec::new(),
            timeout: 0,
        }
    }

    pub fn boss_monologue(settings: &OracleSettings, boss: &str) -> OracleRequest {
        let mut prompt = String::new();

        prompt.push_str(&format!(
            "You are {}, an ancient dragon. The heroes who challenged you in the Black Keep have all fallen.\n\n",
            boss
        ));
        prompt.push_str(
            "Speak a short victory monologue over their remains.\n\
- 2-4 sentences\n\
- Arrogant, menacing, triumphant\n\
- No stage directions, no narration, only your words\n",
        );

        OracleRequest {
            model: settings.narrative_model.clone(),
            system: None,
            prompt,
            temperature: settings.narrative_temperature,
            answers: Vec::new(),
            timeout: 0,
        }
    }

    pub fn storyteller(settings: &OracleSettings, boss: &str, outcome: Outcome) -> OracleRequest {
        let result = match outcome {
            Outcome::Win => format!("The human warriors have defeated the dragon {} and claimed victory", boss),
            Outcome::Lose => format!("The dragon {} has defeated the human warriors", boss),
        };

        let mut system = String::new();
        system.push_str("You are a wise storyteller narrating the conclusion of an epic battle.\n");
        system.push_str(&format!("The battle result is: {}.\n", result));
        system.push_str(
            "Provide a brief, poetic narration about the outcome of this battle and its meaning. Keep it to 2-3 sentences.\n",
        );

        OracleRequest {
            model: settings.narrative_model.clone(),
            system: Some(system),
            prompt: "The battle has ended. Tell me about the result of this match.".into(),
            temperature: settings.narrative_temperature,
            answers: Vec::new(),
            timeout: 0,
        }
    }
}

fn push_battle_state(prompt: &mut String, snapshot: &BattleSnapshot) {
    prompt.push_str("Current Game State:\n");
    prompt.push_str(&format!("- Round: {}\n", snapshot.round));
    prompt.push_str(&format!(
        "- {} (boss): {}/{} HP\n",
        snapshot.boss.name, snapshot.boss.health, snapshot.boss.max_health
    ));
    prompt.push_str("- Heroes:\n");
    for hero in &snapshot.heroes {
        prompt.push_str(&format!(
            "  * {} ({}): {}/{} HP, {}/{} Stamina, Status: {}\n",
            hero.name,
            hero.role,
            hero.health,
            hero.max_health,
            hero.resource,
            hero.max_resource,
            if hero.alive { "ALIVE" } else { "DEAD" }
        ));
    }
    prompt.push('\n');

    // Machine-readable copy for models that prefer structured input.
    if let Ok(json) = serde_json::to_string(snapshot) {
        prompt.push_str("STATE JSON:\n");
        prompt.push_str(&json);
        prompt.push_str("\n\n");
    }
}

fn push_allowed_answers(prompt: &mut String, title: &str, answers: &[String]) {
    prompt.push_str(&format!("{}: {}\n\n", title, answers.join(", ")));
}

fn push_persona_section(prompt: &mut String, npc: &Participant) {
    let persona = &npc.persona;

    prompt.push_str(&format!("You are {}, a {}.\n\n", persona.name, persona.class));
    prompt.push_str(&format!("PERSONALITY: {}\n\n", persona.personality));
    prompt.push_str(&format!(
        "PERSPECTIVE: {}\n\n",
        persona
            .perspective
            .as_deref()
            .unwrap_or("Ready to face the challenge ahead")
    ));

    prompt.push_str("STATUS:\n");
    match &npc.status {
        Some(status) => {
            prompt.push_str(&format!(
                "- Health: {}/{} ({}%)\n",
                status.health,
                status.max_health,
                status.health_percent()
            ));
            prompt.push_str(&format!(
                "- Stamina: {}/{}\n",
                status.resource, status.max_resource
            ));
        }
        None => prompt.push_str("- Ready for action\n"),
    }
    prompt.push('\n');

    prompt.push_str(
        "CONTEXT: At the gates of the Black Keep, about to confront the dragon Avarrax.\n\n",
    );
}

fn push_reply_rules(prompt: &mut String) {
    prompt.push_str(
        "RULES:\n\
- Stay in character\n\
- Speak naturally (2-3 sentences max)\n\
- Never break the fourth wall\n\
- Favor survival and caution\n",
    );
}

fn push_history_lines(prompt: &mut String, history: &[Message]) {
    for msg in history {
        match msg {
            Message::User(text) => {
                prompt.push_str(&format!("[PLAYER] {}\n", text));
            }
            Message::Roleplay { speaker, text } => {
                prompt.push_str(&format!("[{}] {}\n", speaker.label().to_uppercase(), text));
            }
        }
    }

    prompt.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::combatant::{Combatant, ControlMode};
    use crate::model::conversation::Persona;
    use crate::model::message::Speaker;
    use crate::model::role::Role;

    fn snapshot() -> BattleSnapshot {
        let boss = Combatant::boss("Avarrax", 300);
        let mut heroes = vec![
            Combatant::hero("Ronan", Role::Melee, ControlMode::User, 0, 50, 50),
            Combatant::hero("Elric", Role::Ranged, ControlMode::Ai, 1, 50, 50),
        ];
        heroes[1].take_damage(50);
        BattleSnapshot::capture(3, &boss, &heroes)
    }

    fn persona(name: &str, role: Role) -> Persona {
        Persona {
            name: name.into(),
            class: role.name().into(),
            role,
            personality: "Terse.".into(),
            perspective: None,
        }
    }

    #[test]
    fn boss_prompt_lists_state_and_attacks() {
        let settings = OracleSettings::default();
        let attacks = vec!["Roar".to_string(), "SweptClaw".to_string()];
        let req = PromptBuilder::boss_attack(&settings, &snapshot(), &attacks);

        assert_eq!(req.model, settings.decision_model);
        assert!(req.prompt.contains("Avarrax (boss): 300/300 HP"));
        assert!(req.prompt.contains("Elric (ranged): 0/50 HP, 50/50 Stamina, Status: DEAD"));
        assert!(req.prompt.contains("Allowed Attacks: Roar, SweptClaw"));
        assert!(req.prompt.contains("STATE JSON:"));
    }

    #[test]
    fn hero_prompt_names_the_actor() {
        let settings = OracleSettings::default();
        let snap = snapshot().acting("Ronan");
        let actions = vec!["slash".to_string(), "heavyslash".to_string()];
        let req = PromptBuilder::hero_action(&settings, &snap, &snap.heroes[0], &actions);

        assert!(req.prompt.contains("You are: Ronan"));
        assert!(req.prompt.contains("Allowed Actions: slash, heavyslash"));
    }

    #[test]
    fn reply_prompt_carries_persona_and_history() {
        let settings = OracleSettings::default();
        let mut state = ConversationState::new(
            persona("Ronan", Role::Melee),
            [
                Participant::new(persona("Elric", Role::Ranged)),
                Participant::new(persona("Seraphine", Role::Caster)),
            ],
        );
        state.record(Message::Roleplay {
            speaker: Speaker::Narrator,
            text: "The gate looms.".into(),
        });
        state.record(Message::User("Ready?".into()));

        let req = PromptBuilder::npc_reply(&settings, &state, &state.npcs[1], "Ready?");
        let system = req.system.unwrap();
        assert!(system.starts_with("You are Seraphine"));
        assert!(system.contains("- Ready for action"));
        assert!(req.prompt.contains("[NARRATOR] The gate looms."));
        assert!(req.prompt.ends_with("Ronan says: \"Ready?\"\n\nHow do you respond?"));
    }
}
