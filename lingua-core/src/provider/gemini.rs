//! Gemini REST client (`generateContent`).
//!
//! One [`GeminiClient`] implements every provider role:
//!
//! | Role | Model | Output |
//! |------|-------|--------|
//! | dialogue | `chat_model` | JSON text constrained by `responseSchema` |
//! | synthesis | `tts_model` | `inlineData` base64 PCM16LE, 24 kHz mono |
//! | definition | `chat_model` | JSON text constrained by `responseSchema` |
//! | transcription | `chat_model` | plain text |

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{
    DialogueChannel, DialogueProvider, ProviderFuture, SpeechSynthesizer, Transcriber, WordDefiner,
};
use crate::error::{LinguaError, Result};

const API_KEY_HEADER: &str = "x-goog-api-key";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeminiConfig {
    #[serde(skip_serializing)]
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub tts_model: String,
    /// Prebuilt voice used for every synthesized reply.
    pub voice: String,
    /// Per-request HTTP timeout.
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            chat_model: "gemini-2.5-flash".into(),
            tts_model: "gemini-2.5-flash-preview-tts".into(),
            voice: "Kore".into(),
            timeout_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.into()),
                inline_data: None,
            }],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<serde_json::Value>,
}

impl GenerationConfig {
    fn json_schema(schema: serde_json::Value) -> Self {
        Self {
            response_mime_type: Some("application/json".into()),
            response_schema: Some(schema),
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateResponse {
    fn first_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or_default()
    }

    /// Concatenated text of the first candidate.
    fn text(&self) -> Option<String> {
        let text: String = self
            .first_parts()
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!text.is_empty()).then_some(text)
    }

    fn inline_audio(&self) -> Option<String> {
        self.first_parts()
            .iter()
            .find_map(|p| p.inline_data.as_ref())
            .map(|d| d.data.clone())
    }
}

fn reply_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "characterResponse": { "type": "STRING" },
            "translation": { "type": "STRING" },
            "feedback": { "type": "STRING" }
        },
        "required": ["characterResponse", "translation", "feedback"]
    })
}

fn definition_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "word": { "type": "STRING" },
            "portugueseDefinition": {
                "type": "STRING",
                "description": "Short definition in Portuguese"
            },
            "examples": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "2 simple example sentences in English using this word"
            }
        },
        "required": ["word", "portugueseDefinition", "examples"]
    })
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client shared by every role. Cheap to clone.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    config: Arc<GeminiConfig>,
}

impl GeminiClient {
    /// # Errors
    /// `LinguaError::Provider` if the API key is empty or the HTTP client
    /// cannot be built.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(LinguaError::Provider("missing Gemini API key".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| LinguaError::Provider(format!("http client: {e}")))?;
        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }

    async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<GenerateResponse> {
        let resp = self
            .http
            .post(self.endpoint(model))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| LinguaError::Provider(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| LinguaError::Provider(e.to_string()))?;
        debug!(model, %status, bytes = body.len(), "gemini response");

        if !status.is_success() {
            return Err(LinguaError::Provider(format!(
                "gemini HTTP {status}: {}",
                truncate(&body, 300)
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| LinguaError::Provider(format!("unreadable gemini response: {e}")))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Chat session: the history grows by one user/model pair per successful send.
struct GeminiChannel {
    client: GeminiClient,
    system_instruction: Content,
    history: Mutex<Vec<Content>>,
}

impl DialogueChannel for GeminiChannel {
    fn send(&self, message: String) -> ProviderFuture<'_, Result<String>> {
        Box::pin(async move {
            let user = Content::text(Some("user"), message);
            let mut contents = self.history.lock().clone();
            contents.push(user.clone());

            let request = GenerateRequest {
                contents,
                system_instruction: Some(self.system_instruction.clone()),
                generation_config: Some(GenerationConfig::json_schema(reply_schema())),
            };
            let resp = self
                .client
                .generate(&self.client.config.chat_model, &request)
                .await?;
            let text = resp
                .text()
                .ok_or_else(|| LinguaError::ContractViolation("no response text".into()))?;

            let mut history = self.history.lock();
            history.push(user);
            history.push(Content::text(Some("model"), text.clone()));
            Ok(text)
        })
    }
}

impl DialogueProvider for GeminiClient {
    fn open_channel(&self, system_instruction: &str) -> Result<Box<dyn DialogueChannel>> {
        Ok(Box::new(GeminiChannel {
            client: self.clone(),
            system_instruction: Content::text(None, system_instruction),
            history: Mutex::new(Vec::new()),
        }))
    }
}

impl SpeechSynthesizer for GeminiClient {
    fn synthesize(&self, text: String) -> ProviderFuture<'_, Result<Option<String>>> {
        Box::pin(async move {
            let request = GenerateRequest {
                contents: vec![Content::text(None, text)],
                system_instruction: None,
                generation_config: Some(GenerationConfig {
                    response_modalities: Some(vec!["AUDIO".into()]),
                    speech_config: Some(json!({
                        "voiceConfig": {
                            "prebuiltVoiceConfig": { "voiceName": self.config.voice }
                        }
                    })),
                    ..Default::default()
                }),
            };
            let resp = self
                .generate(&self.config.tts_model, &request)
                .await
                .map_err(|e| LinguaError::SynthesisUnavailable(e.to_string()))?;
            let audio = resp.inline_audio();
            if audio.is_none() {
                warn!("synthesis response carried no audio");
            }
            Ok(audio)
        })
    }
}

impl WordDefiner for GeminiClient {
    fn define(&self, word: String, sentence: String) -> ProviderFuture<'_, Result<String>> {
        Box::pin(async move {
            let prompt = format!(
                "Define the word \"{word}\" based on its usage in this sentence: \"{sentence}\". Return a JSON."
            );
            let request = GenerateRequest {
                contents: vec![Content::text(Some("user"), prompt)],
                system_instruction: None,
                generation_config: Some(GenerationConfig::json_schema(definition_schema())),
            };
            let resp = self
                .generate(&self.config.chat_model, &request)
                .await
                .map_err(|e| LinguaError::LookupUnavailable(e.to_string()))?;
            resp.text()
                .ok_or_else(|| LinguaError::LookupUnavailable("no response text".into()))
        })
    }
}

impl Transcriber for GeminiClient {
    fn transcribe(&self, wav: Vec<u8>, language: String) -> ProviderFuture<'_, Result<String>> {
        Box::pin(async move {
            use base64::{engine::general_purpose::STANDARD, Engine as _};

            let request = GenerateRequest {
                contents: vec![Content {
                    role: Some("user".into()),
                    parts: vec![
                        Part {
                            text: Some(format!(
                                "Transcribe this {language} speech verbatim. \
                                 Reply with the transcript only, or with nothing if there is no speech."
                            )),
                            inline_data: None,
                        },
                        Part {
                            text: None,
                            inline_data: Some(InlineData {
                                mime_type: "audio/wav".into(),
                                data: STANDARD.encode(&wav),
                            }),
                        },
                    ],
                }],
                system_instruction: None,
                generation_config: None,
            };
            let resp = self
                .generate(&self.config.chat_model, &request)
                .await
                .map_err(|e| LinguaError::Capture(e.to_string()))?;
            Ok(resp.text().map(|t| t.trim().to_string()).unwrap_or_default())
        })
    }
}
