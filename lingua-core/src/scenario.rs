//! Per-session roleplay configuration.

use serde::{Deserialize, Serialize};

/// Output contract appended to every persona instruction.
pub const REPLY_SCHEMA_INSTRUCTION: &str = "\
IMPORTANT: You are a role-play partner.
You MUST return a JSON object for every response.
The JSON must strictly follow this schema:
{
  \"characterResponse\": \"Your in-character reply in English.\",
  \"translation\": \"The Portuguese translation of your reply.\",
  \"feedback\": \"Helpful feedback in Portuguese about the user's grammar/vocab in their last message. If their English was perfect, say 'Excelente!' or give a relevant tip.\"
}
Do not output markdown code blocks. Output raw JSON.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Immutable configuration for one practice session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioContext {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Persona the assistant plays, in the practice language.
    pub persona_instruction: String,
    pub difficulty: Difficulty,
}

impl ScenarioContext {
    /// Persona instruction followed by the strict reply-schema requirement.
    pub fn system_instruction(&self) -> String {
        format!(
            "{}\n\n{}",
            self.persona_instruction.trim(),
            REPLY_SCHEMA_INSTRUCTION
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_instruction_carries_persona_and_schema() {
        let ctx = ScenarioContext {
            id: "cafe".into(),
            title: "Cafeteria".into(),
            description: "Order a coffee".into(),
            persona_instruction: "  You are a friendly barista.  ".into(),
            difficulty: Difficulty::Easy,
        };
        let text = ctx.system_instruction();
        assert!(text.starts_with("You are a friendly barista.\n\n"));
        assert!(text.contains("\"characterResponse\""));
        assert!(text.contains("\"feedback\""));
    }

    #[test]
    fn scenario_deserializes_from_camel_case() {
        let json = r#"{
            "id": "party",
            "title": "Festa",
            "description": "Make friends",
            "personaInstruction": "You are a guest.",
            "difficulty": "hard"
        }"#;
        let ctx: ScenarioContext = serde_json::from_str(json).unwrap();
        assert_eq!(ctx.difficulty, Difficulty::Hard);
        assert_eq!(ctx.persona_instruction, "You are a guest.");
    }
}
