//! Conversation logic: the structured reply contract, word lookup and the
//! turn orchestrator that ties provider, codec, transcript and playback
//! together.

pub mod lookup;
pub mod orchestrator;
pub mod reply;

pub use lookup::{clean_word, WordDefinition};
pub use orchestrator::{
    ExportedAudio, PracticeSession, SessionConfig, TurnOrchestrator, OPENING_REQUEST,
};
pub use reply::StructuredReply;
