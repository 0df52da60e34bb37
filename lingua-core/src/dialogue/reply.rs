//! The structured reply contract.

use serde::{Deserialize, Serialize};

use crate::error::{LinguaError, Result};

pub const FALLBACK_RESPONSE: &str = "I'm sorry, I didn't catch that. Could you say it again?";
pub const FALLBACK_TRANSLATION: &str = "Desculpe, não entendi. Pode repetir?";
pub const FALLBACK_FEEDBACK: &str = "Ocorreu um erro técnico. Tente novamente.";

/// One validated assistant payload. All three fields are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredReply {
    /// In-character reply in the practice language.
    pub character_response: String,
    pub translation: String,
    /// Feedback on the learner's previous message.
    pub feedback: String,
}

impl StructuredReply {
    /// Validate raw provider text.
    ///
    /// # Errors
    /// `LinguaError::ContractViolation` if the text is not a JSON object with
    /// all three string fields, or if `characterResponse` is blank.
    pub fn parse(raw: &str) -> Result<Self> {
        let reply: StructuredReply = serde_json::from_str(raw.trim())?;
        if reply.character_response.trim().is_empty() {
            return Err(LinguaError::ContractViolation(
                "characterResponse is blank".into(),
            ));
        }
        Ok(reply)
    }

    /// Fixed apology used whenever the contract is violated.
    pub fn fallback() -> Self {
        Self {
            character_response: FALLBACK_RESPONSE.into(),
            translation: FALLBACK_TRANSLATION.into(),
            feedback: FALLBACK_FEEDBACK.into(),
        }
    }
}
