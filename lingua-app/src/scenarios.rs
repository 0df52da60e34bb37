//! Built-in roleplay scenarios.

use lingua_core::{Difficulty, ScenarioContext};

struct Entry {
    id: &'static str,
    title: &'static str,
    description: &'static str,
    persona: &'static str,
    difficulty: Difficulty,
}

const CATALOG: &[Entry] = &[
    Entry {
        id: "cafe",
        title: "Cafeteria",
        description: "Peça um café e um lanche como um local.",
        persona: "You are a friendly barista at a coffee shop in New York. The user is a customer. \
                  Start by welcoming them and asking what they would like to order.",
        difficulty: Difficulty::Easy,
    },
    Entry {
        id: "airport",
        title: "Imigração",
        description: "Responda às perguntas do oficial de imigração.",
        persona: "You are a serious but polite US Immigration Officer. The user is a traveler \
                  arriving in the country. Ask for their passport and purpose of visit.",
        difficulty: Difficulty::Medium,
    },
    Entry {
        id: "interview",
        title: "Entrevista de Emprego",
        description: "Fale sobre suas qualidades e experiências.",
        persona: "You are a hiring manager for a tech company. The user is a candidate for a \
                  software developer role. Start by asking them to introduce themselves.",
        difficulty: Difficulty::Hard,
    },
    Entry {
        id: "party",
        title: "Festa",
        description: "Faça novos amigos em uma festa informal.",
        persona: "You are a friendly guest at a house party. You see the user standing nearby and \
                  decide to strike up a conversation. Start with a casual greeting about the music or food.",
        difficulty: Difficulty::Easy,
    },
];

impl Entry {
    fn context(&self) -> ScenarioContext {
        ScenarioContext {
            id: self.id.into(),
            title: self.title.into(),
            description: self.description.into(),
            persona_instruction: self.persona.into(),
            difficulty: self.difficulty,
        }
    }
}

pub fn all() -> Vec<ScenarioContext> {
    CATALOG.iter().map(Entry::context).collect()
}

pub fn find(id: &str) -> Option<ScenarioContext> {
    let id = id.trim();
    CATALOG
        .iter()
        .find(|e| e.id.eq_ignore_ascii_case(id))
        .map(Entry::context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_ids_are_unique() {
        let mut ids: Vec<_> = all().into_iter().map(|s| s.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), CATALOG.len());
    }

    #[test]
    fn find_is_case_insensitive() {
        let s = find(" Airport").unwrap();
        assert_eq!(s.difficulty, Difficulty::Medium);
        assert!(s.persona_instruction.contains("Immigration Officer"));
        assert!(find("moon").is_none());
    }

    #[test]
    fn personas_are_single_spaced() {
        for s in all() {
            assert!(!s.persona_instruction.contains("  "), "{}", s.id);
        }
    }
}
