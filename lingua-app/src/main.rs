mod repl;
mod scenarios;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use lingua_core::{
    provider::Transcriber, CpalOutput, EndpointConfig, GeminiClient, MicRecognizer,
    NoOutputDevice, OutputDevice, PracticeSession, Providers, SpeechCapture, TranscriptChange,
    TurnOrchestrator,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Roleplay conversation practice in the terminal.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario id (see --list).
    #[arg(short, long)]
    scenario: Option<String>,

    /// Settings file. Defaults to the per-user data directory.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Directory for saved turn audio.
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Disable speaker output and the microphone.
    #[arg(long)]
    no_audio: bool,

    /// Print the scenario catalog and exit.
    #[arg(long)]
    list: bool,

    /// Write the effective settings back to the settings file.
    #[arg(long)]
    save_settings: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lingua=info")),
        )
        .init();

    let args = Args::parse();

    if args.list {
        for s in scenarios::all() {
            println!("{:<10} {:?}  {} - {}", s.id, s.difficulty, s.title, s.description);
        }
        return Ok(());
    }

    // ── Settings ──────────────────────────────────────────────────────────
    let settings_path = args.settings.clone().unwrap_or_else(settings::default_settings_path);
    let mut app_settings = settings::load_settings(&settings_path);
    if let Some(id) = args.scenario.as_ref() {
        app_settings.scenario = id.clone();
    }
    if let Some(dir) = args.export_dir.as_ref() {
        app_settings.export_dir = Some(dir.display().to_string());
    }
    if args.no_audio {
        app_settings.audio_enabled = false;
    }
    app_settings.normalize();

    if args.save_settings {
        settings::save_settings(&settings_path, &app_settings)
            .with_context(|| format!("writing {}", settings_path.display()))?;
        info!(path = %settings_path.display(), "settings saved");
    }

    let scenario = scenarios::find(&app_settings.scenario)
        .with_context(|| format!("unknown scenario {:?}, try --list", app_settings.scenario))?;

    // ── Providers ─────────────────────────────────────────────────────────
    let client = Arc::new(GeminiClient::new(app_settings.gemini_config()).context(
        "no Gemini API key: set LINGUA_GEMINI_API_KEY or geminiApiKey in the settings file",
    )?);
    let providers = Providers::from_single(Arc::clone(&client));

    // ── Audio ─────────────────────────────────────────────────────────────
    let device: Arc<dyn OutputDevice> = if app_settings.audio_enabled {
        match CpalOutput::open_default() {
            Ok(output) => {
                info!(sample_rate = output.sample_rate, "audio output ready");
                Arc::new(output)
            }
            Err(e) => {
                warn!("audio output unavailable, replies will be text only: {e}");
                Arc::new(NoOutputDevice)
            }
        }
    } else {
        Arc::new(NoOutputDevice)
    };

    let capture = app_settings.audio_enabled.then(|| {
        let transcriber: Arc<dyn Transcriber> = client.clone();
        let recognizer = MicRecognizer::new(transcriber, EndpointConfig::default());
        SpeechCapture::with_language(Arc::new(recognizer), app_settings.language.clone())
    });

    // ── Session ───────────────────────────────────────────────────────────
    println!("{} ({:?}): {}", scenario.title, scenario.difficulty, scenario.description);
    let orchestrator = TurnOrchestrator::new(providers, device, app_settings.session_config());
    let session = Arc::new(orchestrator.start_session(scenario).await?);

    for turn in session.transcript().snapshot() {
        println!("{}", repl::render_turn(&turn));
    }
    spawn_transcript_printer(&session);
    spawn_playback_printer(&session);
    if let Some(capture) = capture.as_ref() {
        spawn_capture_printer(capture);
    }

    repl::run(session, capture, app_settings.export_dir()).await
}

fn spawn_transcript_printer(session: &Arc<PracticeSession>) {
    let mut changes = session.transcript().subscribe();
    let transcript = Arc::clone(session.transcript());
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(TranscriptChange::Appended { turn_id, .. }) => {
                    if let Some(turn) = transcript.get(turn_id) {
                        println!("{}", repl::render_turn(&turn));
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!("transcript printer skipped {n} changes"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn spawn_playback_printer(session: &Arc<PracticeSession>) {
    let mut events = session.playback().subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    debug!(turn_id = event.turn_id(), ?event, "playback");
                    if let Some(line) = repl::render_playback_event(&event) {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn spawn_capture_printer(capture: &SpeechCapture) {
    let mut events = capture.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(line) = repl::render_capture_event(&event) {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });
}
