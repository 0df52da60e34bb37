//! Word definition lookup.
//!
//! Absence is the only failure mode visible to callers: provider errors,
//! malformed JSON and empty example lists all come back as `None`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LinguaError, Result};
use crate::provider::WordDefiner;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordDefinition {
    pub word: String,
    pub portuguese_definition: String,
    /// Example sentences in the practice language. Never empty.
    pub examples: Vec<String>,
}

impl WordDefinition {
    /// # Errors
    /// `LinguaError::LookupUnavailable` on malformed JSON or no examples.
    pub fn parse(raw: &str) -> Result<Self> {
        let def: WordDefinition = serde_json::from_str(raw.trim())
            .map_err(|e| LinguaError::LookupUnavailable(format!("malformed definition: {e}")))?;
        if def.examples.is_empty() {
            return Err(LinguaError::LookupUnavailable("definition has no examples".into()));
        }
        Ok(def)
    }
}

/// Strip everything that is not a letter, digit, `_` or `'`.
///
/// `"coffee."` → `"coffee"`, `"don't!"` → `"don't"`.
pub fn clean_word(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '\'')
        .collect()
}

/// Look `raw_word` up as used in `sentence`.
pub async fn lookup_word(
    definer: &dyn WordDefiner,
    raw_word: &str,
    sentence: &str,
    timeout: Duration,
) -> Option<WordDefinition> {
    let word = clean_word(raw_word);
    if word.is_empty() {
        debug!(raw_word, "nothing left to look up after cleaning");
        return None;
    }

    let result = match tokio::time::timeout(timeout, definer.define(word.clone(), sentence.to_string())).await {
        Ok(Ok(raw)) => WordDefinition::parse(&raw),
        Ok(Err(e)) => Err(LinguaError::LookupUnavailable(e.to_string())),
        Err(_) => Err(LinguaError::Timeout(timeout)),
    };

    match result {
        Ok(def) => Some(def),
        Err(e) => {
            warn!(word = word.as_str(), "word lookup unavailable: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleaning_strips_punctuation() {
        assert_eq!(clean_word("coffee."), "coffee");
        assert_eq!(clean_word("\"Hello,\""), "Hello");
        assert_eq!(clean_word("don't!"), "don't");
        assert_eq!(clean_word("snake_case?"), "snake_case");
        assert_eq!(clean_word("..."), "");
    }

    #[test]
    fn definition_requires_examples() {
        let ok = r#"{"word":"coffee","portugueseDefinition":"café","examples":["I like coffee."]}"#;
        assert_eq!(WordDefinition::parse(ok).unwrap().portuguese_definition, "café");

        let empty = r#"{"word":"coffee","portugueseDefinition":"café","examples":[]}"#;
        assert!(WordDefinition::parse(empty).is_err());

        let missing = r#"{"word":"coffee","examples":["x"]}"#;
        assert!(WordDefinition::parse(missing).is_err());
    }

    #[test]
    fn definition_serializes_with_camel_case() {
        let def = WordDefinition {
            word: "size".into(),
            portuguese_definition: "tamanho".into(),
            examples: vec!["What size is it?".into()],
        };
        let json = serde_json::to_value(&def).unwrap();
        assert!(json.get("portugueseDefinition").is_some());
        assert_eq!(json.as_object().unwrap().len(), 3);
    }
}
