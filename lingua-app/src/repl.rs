//! Line-oriented front end for one practice session.
//!
//! Plain text is sent as the learner's turn. An empty line sends whatever the
//! microphone has recognized so far. Everything else is a slash command.

use std::path::PathBuf;
use std::sync::Arc;

use lingua_core::{
    transcript::Speaker, CaptureEvent, LinguaError, PlaybackEvent, PracticeSession, SpeechCapture,
    Turn, TurnId,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::scenarios;

pub const HELP: &str = "\
Commands:
  <text>                 send a message
  <empty line>           send the text recognized by the microphone
  /mic                   start or stop listening
  /play <turn>           replay a turn's audio
  /stop                  stop playback
  /save <turn>           write a turn's audio as WAV
  /define <word> [sent]  define a word (sentence defaults to the last reply)
  /history               print the transcript
  /scenarios             list scenarios
  /help                  show this help
  /exit                  end the session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    SendPending,
    Mic,
    Play(TurnId),
    Stop,
    Save(TurnId),
    Define { word: String, sentence: Option<String> },
    History,
    Scenarios,
    Help,
    Exit,
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Command {
        let line = line.trim();
        if line.is_empty() {
            return Command::SendPending;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Say(line.to_string());
        };

        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };
        match name.to_ascii_lowercase().as_str() {
            "mic" => Command::Mic,
            "stop" => Command::Stop,
            "play" => parse_turn_id(args).map_or_else(Command::Invalid, Command::Play),
            "save" => parse_turn_id(args).map_or_else(Command::Invalid, Command::Save),
            "define" => match args.split_once(char::is_whitespace) {
                Some((word, sentence)) => Command::Define {
                    word: word.to_string(),
                    sentence: Some(sentence.trim().to_string()),
                },
                None if !args.is_empty() => Command::Define {
                    word: args.to_string(),
                    sentence: None,
                },
                None => Command::Invalid("usage: /define <word> [sentence]".into()),
            },
            "history" => Command::History,
            "scenarios" => Command::Scenarios,
            "help" | "?" => Command::Help,
            "exit" | "quit" => Command::Exit,
            other => Command::Invalid(format!("unknown command /{other}, try /help")),
        }
    }
}

fn parse_turn_id(args: &str) -> std::result::Result<TurnId, String> {
    args.trim_start_matches('#')
        .parse::<TurnId>()
        .map_err(|_| format!("expected a turn id, got {args:?}"))
}

pub fn render_turn(turn: &Turn) -> String {
    match turn.speaker() {
        Speaker::User => format!("[{}] you: {}", turn.id(), turn.text()),
        Speaker::Assistant => {
            let mut out = format!("[{}] partner: {}", turn.id(), turn.text());
            if let Some(translation) = turn.translation() {
                out.push_str(&format!("\n      pt: {translation}"));
            }
            if let Some(feedback) = turn.feedback() {
                out.push_str(&format!("\n      feedback: {feedback}"));
            }
            if turn.audio().is_some() {
                out.push_str("\n      (audio)");
            }
            out
        }
    }
}

pub fn render_capture_event(event: &CaptureEvent) -> Option<String> {
    match event {
        CaptureEvent::Listening => Some("(listening...)".into()),
        CaptureEvent::Recognized { pending, .. } => {
            Some(format!("(heard) {pending}  (press enter to send)"))
        }
        CaptureEvent::Error { message } => Some(format!("(microphone) {message}")),
        CaptureEvent::Idle => None,
    }
}

/// Only starts are shown; the rest is visible at debug level.
pub fn render_playback_event(event: &PlaybackEvent) -> Option<String> {
    match event {
        PlaybackEvent::Started { .. } => Some(format!("(playing #{})", event.turn_id())),
        _ => None,
    }
}

/// Drive the session until `/exit` or end of input.
pub async fn run(
    session: Arc<PracticeSession>,
    capture: Option<SpeechCapture>,
    export_dir: PathBuf,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Say(text) => submit(&session, text),
            Command::SendPending => {
                let Some(capture) = capture.as_ref() else {
                    continue;
                };
                let text = capture.take_pending_input();
                if text.trim().is_empty() {
                    println!("nothing recognized yet");
                } else {
                    submit(&session, text);
                }
            }
            Command::Mic => match capture.as_ref() {
                Some(capture) if capture.is_listening() => {
                    capture.stop();
                }
                Some(capture) => {
                    capture.start();
                }
                None => println!("microphone disabled"),
            },
            Command::Play(turn_id) => {
                let session = Arc::clone(&session);
                if let Err(e) = tokio::task::spawn_blocking(move || session.replay(turn_id)).await? {
                    println!("cannot play #{turn_id}: {e}");
                }
            }
            Command::Stop => {
                let session = Arc::clone(&session);
                if tokio::task::spawn_blocking(move || session.stop_playback())
                    .await?
                    .is_none()
                {
                    println!("nothing is playing");
                }
            }
            Command::Save(turn_id) => match session.save_audio(turn_id, &export_dir) {
                Ok(path) => println!("saved {}", path.display()),
                Err(e) => println!("cannot save #{turn_id}: {e}"),
            },
            Command::Define { word, sentence } => {
                let sentence = sentence.unwrap_or_else(|| last_assistant_text(&session));
                let session = Arc::clone(&session);
                tokio::spawn(async move {
                    match session.lookup_word(&word, &sentence).await {
                        Some(def) => {
                            println!("{}: {}", def.word, def.portuguese_definition);
                            for example in &def.examples {
                                println!("  - {example}");
                            }
                        }
                        None => println!("no definition available for {word:?}"),
                    }
                });
            }
            Command::History => {
                for turn in session.transcript().snapshot() {
                    println!("{}", render_turn(&turn));
                }
            }
            Command::Scenarios => {
                for s in scenarios::all() {
                    println!("{:<10} {:?}  {} - {}", s.id, s.difficulty, s.title, s.description);
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Exit => break,
            Command::Invalid(message) => println!("{message}"),
        }
    }

    if let Some(capture) = capture {
        capture.stop();
    }
    tokio::task::spawn_blocking(move || session.end()).await?;
    Ok(())
}

fn submit(session: &Arc<PracticeSession>, text: String) {
    if session.is_busy() {
        println!("still waiting for the previous reply");
        return;
    }
    let session = Arc::clone(session);
    tokio::spawn(async move {
        match session.submit_user_turn(&text).await {
            Ok(turn) => debug!(turn_id = turn.id(), "exchange complete"),
            Err(LinguaError::Busy) => println!("still waiting for the previous reply"),
            Err(LinguaError::SessionEnded) => debug!("reply arrived after the session ended"),
            Err(e) => warn!("message not sent: {e}"),
        }
    });
}

fn last_assistant_text(session: &PracticeSession) -> String {
    session
        .transcript()
        .snapshot()
        .iter()
        .rev()
        .find(|t| t.speaker() == Speaker::Assistant)
        .map(|t| t.text().to_string())
        .unwrap_or_default()
}
